use crate::error::ConfigError;
use crate::retry::{PollPolicy, SubmitPolicy};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tower_cookies::Key;

const DEFAULT_DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";
const DEFAULT_PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";
/// Signing keys need 64 bytes of material.
const MIN_SESSION_SECRET_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct Config {
    pub dashscope_api_key: String,
    pub dashscope_base_url: String,
    pub database_url: String,
    pub bucket: String,
    pub public_base_url: String,
    pub cache_dir: PathBuf,
    pub port: u16,
    pub cors_origin: String,
    /// Signs the session cookie.
    pub session_key: Key,
    pub image_poll: PollPolicy,
    pub video_poll: PollPolicy,
    pub submit: SubmitPolicy,
}

impl Config {
    /// Reads the process environment. Secrets have no fallback values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let query_timeout =
            Duration::from_millis(parse_or(&lookup, "STATUS_QUERY_TIMEOUT_MS", 15_000)?);
        let image_poll = PollPolicy {
            interval: Duration::from_millis(parse_or(&lookup, "IMAGE_POLL_INTERVAL_MS", 2_000)?),
            max_attempts: parse_or(&lookup, "IMAGE_POLL_MAX_ATTEMPTS", 90)?,
            query_timeout,
        };
        let video_poll = PollPolicy {
            interval: Duration::from_millis(parse_or(&lookup, "VIDEO_POLL_INTERVAL_MS", 3_000)?),
            max_attempts: parse_or(&lookup, "VIDEO_POLL_MAX_ATTEMPTS", 180)?,
            query_timeout,
        };
        let submit = SubmitPolicy {
            max_retries: parse_or(&lookup, "SUBMIT_MAX_RETRIES", 3)?,
            backoff_base: Duration::from_millis(parse_or(&lookup, "SUBMIT_BACKOFF_MS", 1_000)?),
        };

        let session_secret = required("SESSION_SECRET")?;
        let session_key = Key::try_from(session_secret.as_bytes()).map_err(|_| ConfigError::TooShort {
            name: "SESSION_SECRET",
            min: MIN_SESSION_SECRET_LEN,
        })?;

        Ok(Self {
            dashscope_api_key: required("DASHSCOPE_API_KEY")?,
            dashscope_base_url: lookup("DASHSCOPE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DASHSCOPE_BASE_URL.to_string()),
            database_url: required("DATABASE_URL")?,
            bucket: required("GCS_BUCKET_NAME")?,
            public_base_url: lookup("MEDIA_PUBLIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string()),
            cache_dir: lookup("CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./cache")),
            port: parse_or(&lookup, "PORT", 3001)?,
            cors_origin: lookup("CORS_ORIGIN")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            session_key,
            image_poll: image_poll.at_least_once(),
            video_poll: video_poll.at_least_once(),
            submit: submit.at_least_once(),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
