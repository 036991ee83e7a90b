//! Placement predicates and their expansion into concrete cluster targets.

pub mod intent;
pub mod resolver;

pub use intent::{AllOf, AnyOf, ClusterList, ClusterRef, IntentStruc, LabelSelector, OptionalGroup};
pub use resolver::{resolve, LabelIndex};
