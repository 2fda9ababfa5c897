//! Domain events and the bus that delivers them.
//!
//! - **`event`**: the events the platform raises (`course_updated`,
//!   `user_enrolled`, `lesson_completed`, `quiz_finished`,
//!   `plugin_activated`, `plugin_deactivated`)
//! - **`bus`**: handler registration and synchronous dispatch

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventHandler, Subscription};
pub use event::{DomainEvent, EventKind};
