#![allow(dead_code)]

pub mod bundle;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod helm;
pub mod orchestrator;
pub mod output;
pub mod placement;
pub mod registry;
pub mod rpc;
pub mod store;

pub use error::{OrchError, Result};
pub use orchestrator::Orchestrator;
