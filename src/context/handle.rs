use std::fmt;

use serde::{Deserialize, Serialize};

/// Typed address of a node in a run-time context.
///
/// Handles are compound key paths (`/context/<id>/app/<name>/…/`), always
/// ending in `/`. Ordering is lexical on the path, so handles compare the same
/// way the keyspace iterates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(String);

pub(crate) const ROOT_PREFIX: &str = "/context/";

impl Handle {
    pub fn root(context_id: &str) -> Self {
        Handle(format!("{ROOT_PREFIX}{context_id}/"))
    }

    /// Child node `<self><segment>/<name>/`.
    pub fn child(&self, segment: &str, name: &str) -> Self {
        Handle(format!("{}{}/{}/", self.0, segment, name))
    }

    /// Level value `<self><level>/` attached to this node.
    pub fn level(&self, level: &str) -> Self {
        Handle(format!("{}{}/", self.0, level))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Context id this handle belongs to.
    pub fn context_id(&self) -> Option<&str> {
        self.0.strip_prefix(ROOT_PREFIX)?.split('/').next()
    }

    /// Last named segment of the path (the node's own name).
    pub fn name(&self) -> Option<&str> {
        self.0.trim_end_matches('/').rsplit('/').next()
    }

    /// True when `key` names a direct `<segment>/<name>/` child of this node,
    /// returning the child name.
    pub(crate) fn direct_child_name<'a>(&self, segment: &str, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(self.0.as_str())?;
        let rest = rest.strip_prefix(segment)?.strip_prefix('/')?;
        let name = rest.strip_suffix('/')?;
        if name.is_empty() || name.contains('/') {
            None
        } else {
            Some(name)
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
