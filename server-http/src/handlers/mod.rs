pub mod admin;
pub mod events;
pub mod health;
pub mod items;

pub use admin::{delete_item, reset_items};
pub use events::stream_events;
pub use health::health_check;
pub use items::{dismiss_item, get_or_create_item, get_or_create_items, restore_item};
