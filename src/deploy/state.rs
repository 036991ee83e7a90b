use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchError, Result};
use crate::registry::{DeploymentIntentGroupManager, DigRef};

/// Attempts at an optimistic state append before giving up with `Conflict`.
pub const MAX_STATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigState {
    Created,
    Approved,
    Instantiated,
    Updated,
    Terminated,
    InstantiateStopped,
    TerminateStopped,
}

impl fmt::Display for DigState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DigState::Created => "Created",
            DigState::Approved => "Approved",
            DigState::Instantiated => "Instantiated",
            DigState::Updated => "Updated",
            DigState::Terminated => "Terminated",
            DigState::InstantiateStopped => "InstantiateStopped",
            DigState::TerminateStopped => "TerminateStopped",
        };
        f.write_str(s)
    }
}

/// One entry of a DIG's action log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub state: DigState,
    /// Run-time context the action applied to; empty for Created/Approved.
    #[serde(rename = "instance", default)]
    pub context_id: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub revision: u64,
}

/// Append-only action log of a DIG plus the context id status observers
/// follow across context replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateInfo {
    #[serde(rename = "statusctxid", default)]
    pub status_context_id: String,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
}

impl StateInfo {
    /// The log every new DIG starts with.
    pub fn created() -> Self {
        let mut info = Self::default();
        info.push(DigState::Created, "", 0);
        info
    }

    pub fn push(&mut self, state: DigState, context_id: &str, revision: u64) {
        self.actions.push(ActionEntry {
            state,
            context_id: context_id.to_string(),
            time: Utc::now(),
            revision,
        });
    }

    pub fn latest(&self) -> Option<&ActionEntry> {
        self.actions.last()
    }

    /// State of the newest entry; an empty log reads as Created.
    pub fn current_state(&self) -> DigState {
        self.latest().map(|a| a.state).unwrap_or(DigState::Created)
    }

    /// Newest entry that carries a context id.
    pub fn last_context(&self) -> Option<&str> {
        self.actions
            .iter()
            .rev()
            .find(|a| !a.context_id.is_empty())
            .map(|a| a.context_id.as_str())
    }

    /// Newest `Instantiated` entry.
    pub fn last_instantiated(&self) -> Option<&ActionEntry> {
        self.actions.iter().rev().find(|a| a.state == DigState::Instantiated)
    }

    /// Highest revision reached by an `Instantiated` entry, 0 when none.
    pub fn latest_revision(&self) -> u64 {
        self.actions
            .iter()
            .filter(|a| a.state == DigState::Instantiated)
            .map(|a| a.revision)
            .max()
            .unwrap_or(0)
    }

    pub fn next_revision(&self) -> u64 {
        self.latest_revision() + 1
    }

    /// Context last instantiated under `revision`.
    pub fn context_for_revision(&self, revision: u64) -> Option<&str> {
        self.actions
            .iter()
            .rev()
            .find(|a| a.state == DigState::Instantiated && a.revision == revision)
            .map(|a| a.context_id.as_str())
    }

    pub fn contains_context(&self, context_id: &str) -> bool {
        self.actions.iter().any(|a| a.context_id == context_id)
    }
}

/// Read-modify-write the action log of `dig` with optimistic concurrency.
///
/// `mutate` sees the freshly read log on every attempt, so transition checks
/// always run against the latest state; it returns `false` when there is
/// nothing to write. A compare-and-swap miss re-reads.
pub async fn update_state<F>(
    digs: &dyn DeploymentIntentGroupManager,
    dig: &DigRef,
    mut mutate: F,
) -> Result<StateInfo>
where
    F: FnMut(&mut StateInfo) -> Result<bool> + Send,
{
    for attempt in 1..=MAX_STATE_ATTEMPTS {
        let current = digs.state(dig).await?;
        let mut info = current.value;
        if !mutate(&mut info)? {
            return Ok(info);
        }
        if digs.replace_state(dig, &info, current.version).await? {
            if let Some(entry) = info.latest() {
                tracing::info!(
                    dig = %dig,
                    state = %entry.state,
                    context_id = %entry.context_id,
                    revision = entry.revision,
                    "DIG state appended"
                );
            }
            return Ok(info);
        }
        tracing::debug!(dig = %dig, attempt, "stateInfo changed underneath, retrying");
    }
    Err(OrchError::Conflict(format!(
        "state of {dig} kept changing after {MAX_STATE_ATTEMPTS} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::registry::{CompositeAppRef, DeploymentIntentGroup, DigIntents};
    use crate::store::Versioned;

    /// Action log whose first `misses` writes lose to another writer.
    struct ContendedLog {
        misses: AtomicUsize,
        reads: AtomicUsize,
        row: Mutex<Versioned<StateInfo>>,
    }

    impl ContendedLog {
        fn new(misses: usize) -> Self {
            Self {
                misses: AtomicUsize::new(misses),
                reads: AtomicUsize::new(0),
                row: Mutex::new(Versioned {
                    value: StateInfo::created(),
                    version: 1,
                }),
            }
        }

        fn stored(&self) -> StateInfo {
            self.row.lock().unwrap().value.clone()
        }
    }

    #[async_trait]
    impl DeploymentIntentGroupManager for ContendedLog {
        async fn create_dig(
            &self,
            _: &CompositeAppRef,
            _: &DeploymentIntentGroup,
        ) -> Result<DeploymentIntentGroup> {
            unreachable!()
        }
        async fn get_dig(&self, _: &DigRef) -> Result<DeploymentIntentGroup> {
            unreachable!()
        }
        async fn list_digs(&self, _: &CompositeAppRef) -> Result<Vec<DeploymentIntentGroup>> {
            unreachable!()
        }
        async fn update_dig(
            &self,
            _: &DigRef,
            _: &DeploymentIntentGroup,
        ) -> Result<DeploymentIntentGroup> {
            unreachable!()
        }
        async fn delete_dig(&self, _: &DigRef) -> Result<()> {
            unreachable!()
        }
        async fn set_intents(&self, _: &DigRef, _: &DigIntents) -> Result<DigIntents> {
            unreachable!()
        }
        async fn intents(&self, _: &DigRef) -> Result<DigIntents> {
            unreachable!()
        }

        async fn state(&self, _: &DigRef) -> Result<Versioned<StateInfo>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let row = self.row.lock().unwrap();
            Ok(Versioned {
                value: row.value.clone(),
                version: row.version,
            })
        }

        async fn replace_state(
            &self,
            _: &DigRef,
            info: &StateInfo,
            expected_version: i64,
        ) -> Result<bool> {
            let mut row = self.row.lock().unwrap();
            if self.misses.load(Ordering::SeqCst) > 0 {
                self.misses.fetch_sub(1, Ordering::SeqCst);
                // Someone else appended first.
                row.value.push(DigState::Approved, "", 0);
                row.version += 1;
                return Ok(false);
            }
            if row.version != expected_version {
                return Ok(false);
            }
            row.value = info.clone();
            row.version += 1;
            Ok(true)
        }
    }

    fn dig() -> DigRef {
        DigRef::new("p", "ca", "v1", "d")
    }

    #[tokio::test]
    async fn test_update_state_retries_after_lost_write() {
        let log = ContendedLog::new(MAX_STATE_ATTEMPTS - 1);
        let mut seen = Vec::new();
        let info = update_state(&log, &dig(), |info| {
            seen.push(info.actions.len());
            info.push(DigState::Instantiated, "ctx", 1);
            Ok(true)
        })
        .await
        .unwrap();

        // Every attempt works on a fresh read that includes the rival write.
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(log.reads.load(Ordering::SeqCst), MAX_STATE_ATTEMPTS);
        assert_eq!(info.current_state(), DigState::Instantiated);
        assert_eq!(log.stored(), info);
    }

    #[tokio::test]
    async fn test_update_state_gives_up_with_conflict() {
        let log = ContendedLog::new(MAX_STATE_ATTEMPTS);
        let err = update_state(&log, &dig(), |info| {
            info.push(DigState::Instantiated, "ctx", 1);
            Ok(true)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, OrchError::Conflict(_)), "{err}");
        assert_eq!(log.reads.load(Ordering::SeqCst), MAX_STATE_ATTEMPTS);
        assert!(log.stored().last_context().is_none());
    }

    #[tokio::test]
    async fn test_update_state_rechecks_transition_on_retry() {
        let log = ContendedLog::new(1);
        let err = update_state(&log, &dig(), |info| {
            if info.current_state() != DigState::Created {
                return Err(OrchError::state_invalid("moved on"));
            }
            info.push(DigState::Approved, "", 0);
            Ok(true)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, OrchError::StateInvalid(_)));
    }

    #[tokio::test]
    async fn test_update_state_without_change_writes_nothing() {
        let log = ContendedLog::new(0);
        update_state(&log, &dig(), |_| Ok(false)).await.unwrap();
        assert_eq!(log.row.lock().unwrap().version, 1);
    }

    #[test]
    fn test_revision_accounting() {
        let mut info = StateInfo::created();
        info.push(DigState::Approved, "", 0);
        assert_eq!(info.next_revision(), 1);
        info.push(DigState::Instantiated, "a", 1);
        info.push(DigState::Updated, "a", 1);
        info.push(DigState::Instantiated, "b", 2);
        assert_eq!(info.latest_revision(), 2);
        assert_eq!(info.context_for_revision(1), Some("a"));
        assert_eq!(info.context_for_revision(7), None);
        assert_eq!(info.current_state(), DigState::Instantiated);
        assert_eq!(info.last_context(), Some("b"));
    }

    #[test]
    fn test_wire_field_names() {
        let mut info = StateInfo::created();
        info.status_context_id = "s".into();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["statusctxid"], "s");
        assert_eq!(json["actions"][0]["state"], "Created");
        assert_eq!(json["actions"][0]["instance"], "");
    }
}
