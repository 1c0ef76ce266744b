pub mod api;
pub mod cache;
pub mod config;
pub mod dashscope;
pub mod entities;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod migrator;
pub mod orchestration;
pub mod poller;
pub mod prompts;
pub mod relay;
pub mod retry;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use sea_orm;
