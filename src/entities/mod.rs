pub mod cat;
pub mod user;
pub mod video_interaction;

pub use cat::Entity as Cat;
pub use user::Entity as User;
pub use video_interaction::Entity as VideoInteraction;
