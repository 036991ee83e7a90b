//! Deployment pipeline: build a DIG's context, run it past the
//! sub-controllers, hand it to the sync engine, and journal the result.

pub mod builder;
pub mod lifecycle;
pub mod scheduler;
pub mod state;
pub mod status;
pub mod sync;

pub use builder::AppContextBuilder;
pub use lifecycle::DigLifecycle;
pub use scheduler::{ControllerInvoker, ControllerReply, ControllerScheduler, SchedulePlan, ScheduledController};
pub use state::{ActionEntry, DigState, StateInfo};
pub use status::{AppClusters, AppResources, DigStatus, StatusAggregator, StatusQuery, StatusView};
pub use sync::SyncEngine;
