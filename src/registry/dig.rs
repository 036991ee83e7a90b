use std::sync::Arc;

use async_trait::async_trait;

use super::common::{check_update_name, from_value, get_as, list_as, require_parent, to_value, validate_name};
use super::keys::{composite_profile_key, generic_placement_intent_key, CompositeAppRef, DigRef};
use super::types::{DeploymentIntentGroup, DigIntents};
use crate::deploy::state::{DigState, StateInfo};
use crate::error::{OrchError, Result};
use crate::store::{tags, DocumentStore, Versioned, ORCHESTRATOR_COLLECTION};

#[async_trait]
pub trait DeploymentIntentGroupManager: Send + Sync {
    /// Store the DIG and seed its action log with `Created`.
    async fn create_dig(&self, ca: &CompositeAppRef, dig: &DeploymentIntentGroup) -> Result<DeploymentIntentGroup>;
    async fn get_dig(&self, dig: &DigRef) -> Result<DeploymentIntentGroup>;
    async fn list_digs(&self, ca: &CompositeAppRef) -> Result<Vec<DeploymentIntentGroup>>;
    async fn update_dig(&self, dig: &DigRef, body: &DeploymentIntentGroup) -> Result<DeploymentIntentGroup>;
    async fn delete_dig(&self, dig: &DigRef) -> Result<()>;

    /// Attach controller intents (controller name → intent name).
    async fn set_intents(&self, dig: &DigRef, intents: &DigIntents) -> Result<DigIntents>;
    async fn intents(&self, dig: &DigRef) -> Result<DigIntents>;

    /// Versioned action log.
    async fn state(&self, dig: &DigRef) -> Result<Versioned<StateInfo>>;
    /// Write the action log if nobody changed it since `expected_version`.
    async fn replace_state(&self, dig: &DigRef, info: &StateInfo, expected_version: i64) -> Result<bool>;
}

pub struct DeploymentIntentGroupClient {
    store: Arc<dyn DocumentStore>,
}

impl DeploymentIntentGroupClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DeploymentIntentGroupManager for DeploymentIntentGroupClient {
    async fn create_dig(&self, ca: &CompositeAppRef, dig: &DeploymentIntentGroup) -> Result<DeploymentIntentGroup> {
        validate_name("deployment intent group", &dig.metadata.name)?;
        validate_name("release version", &dig.spec.version)?;
        if dig.spec.logical_cloud.is_empty() {
            return Err(OrchError::validation(format!(
                "deployment intent group {} names no logical cloud",
                dig.metadata.name
            )));
        }
        require_parent(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &ca.key(), tags::COMPOSITE_APP, || {
            format!("composite app {ca}")
        })
        .await?;
        require_parent(
            self.store.as_ref(),
            ORCHESTRATOR_COLLECTION,
            &composite_profile_key(ca, &dig.spec.profile),
            tags::COMPOSITE_PROFILE,
            || format!("composite profile {} in {ca}", dig.spec.profile),
        )
        .await?;

        let addr = ca.dig(&dig.metadata.name);
        let key = addr.key();
        let initial = to_value(&StateInfo::created())?;
        self.store
            .create(ORCHESTRATOR_COLLECTION, &key, tags::DEPLOYMENT_INTENT_GROUP, &to_value(dig)?, &[])
            .await?;
        let seeded = self
            .store
            .compare_and_swap(ORCHESTRATOR_COLLECTION, &key, tags::STATE_INFO, &initial, 0)
            .await;
        let refused = match seeded {
            Ok(true) => None,
            Ok(false) => Some(OrchError::Conflict(format!("state of {addr} already exists"))),
            Err(e) => Some(e),
        };
        if let Some(e) = refused {
            // A DIG row without an action log is unusable.
            if let Err(cleanup) = self
                .store
                .remove_tag(ORCHESTRATOR_COLLECTION, &key, tags::DEPLOYMENT_INTENT_GROUP)
                .await
            {
                tracing::error!(dig = %addr, error = %cleanup, "Failed to remove DIG row");
            }
            return Err(e);
        }
        tracing::info!(dig = %addr, "Deployment intent group created");
        Ok(dig.clone())
    }

    async fn get_dig(&self, dig: &DigRef) -> Result<DeploymentIntentGroup> {
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &dig.key(), tags::DEPLOYMENT_INTENT_GROUP, || {
            format!("deployment intent group {dig}")
        })
        .await
    }

    async fn list_digs(&self, ca: &CompositeAppRef) -> Result<Vec<DeploymentIntentGroup>> {
        let key = ca.dig("").key();
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::DEPLOYMENT_INTENT_GROUP).await
    }

    async fn update_dig(&self, dig: &DigRef, body: &DeploymentIntentGroup) -> Result<DeploymentIntentGroup> {
        check_update_name("deployment intent group", &dig.dig, &body.metadata.name)?;
        self.get_dig(dig).await?;
        self.store
            .insert(ORCHESTRATOR_COLLECTION, &dig.key(), tags::DEPLOYMENT_INTENT_GROUP, &to_value(body)?)
            .await?;
        Ok(body.clone())
    }

    async fn delete_dig(&self, dig: &DigRef) -> Result<()> {
        let state = self.state(dig).await?.value.current_state();
        if matches!(state, DigState::Instantiated | DigState::InstantiateStopped) {
            return Err(OrchError::state_invalid(format!(
                "deployment intent group {dig} is {state}; terminate it first"
            )));
        }
        self.store.remove(ORCHESTRATOR_COLLECTION, &dig.key()).await
    }

    async fn set_intents(&self, dig: &DigRef, intents: &DigIntents) -> Result<DigIntents> {
        self.get_dig(dig).await?;
        if let Some(gpi) = intents.generic_placement_intent() {
            require_parent(
                self.store.as_ref(),
                ORCHESTRATOR_COLLECTION,
                &generic_placement_intent_key(dig, gpi),
                tags::GENERIC_PLACEMENT_INTENT,
                || format!("generic placement intent {gpi} in {dig}"),
            )
            .await?;
        }
        self.store
            .insert(ORCHESTRATOR_COLLECTION, &dig.key(), tags::DIG_INTENTS, &to_value(intents)?)
            .await?;
        Ok(intents.clone())
    }

    async fn intents(&self, dig: &DigRef) -> Result<DigIntents> {
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &dig.key(), tags::DIG_INTENTS, || {
            format!("intents of deployment intent group {dig}")
        })
        .await
    }

    async fn state(&self, dig: &DigRef) -> Result<Versioned<StateInfo>> {
        let row = self
            .store
            .get_versioned(ORCHESTRATOR_COLLECTION, &dig.key(), tags::STATE_INFO)
            .await?
            .ok_or_else(|| OrchError::NotFound(format!("state of deployment intent group {dig}")))?;
        Ok(Versioned {
            value: from_value(row.value)?,
            version: row.version,
        })
    }

    async fn replace_state(&self, dig: &DigRef, info: &StateInfo, expected_version: i64) -> Result<bool> {
        self.store
            .compare_and_swap(
                ORCHESTRATOR_COLLECTION,
                &dig.key(),
                tags::STATE_INFO,
                &to_value(info)?,
                expected_version,
            )
            .await
    }
}
