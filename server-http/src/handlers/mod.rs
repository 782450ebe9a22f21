pub mod admin;
pub mod events;
pub mod health;
pub mod proxy;

pub use admin::{activate, list_caches, push, sync};
pub use events::stream_events;
pub use health::health_check;
pub use proxy::proxy;
