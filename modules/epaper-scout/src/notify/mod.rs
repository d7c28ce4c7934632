pub mod backend;
pub mod discord;
pub mod message;
pub mod noop;

pub use backend::NotifyBackend;
pub use discord::DiscordWebhook;
pub use message::{Notification, NotificationField};
pub use noop::NoopBackend;
