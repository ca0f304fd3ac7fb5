pub mod events;
pub mod refresh;

pub use events::{EventBus, RefreshEvent};
pub use refresh::{RefreshCoordinator, TriggerResponse};
