//! Core of the dismissible-items service: the item model, the storage port,
//! the lifecycle state machine and the durable key-value adapter.

pub mod clock;
pub mod domain;
pub mod events;
pub mod persistence;
pub mod planes;
pub mod ports;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{Item, ItemFactory};
pub use events::ItemEvent;
pub use planes::control::{AdminOperations, AdminService};
pub use planes::data::{LifecycleOperations, LifecycleService};
pub use ports::{ItemStore, StoreFactory};
