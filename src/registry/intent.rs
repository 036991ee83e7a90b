use std::sync::Arc;

use async_trait::async_trait;

use super::common::{
    check_update_name, from_value, get_as, list_as, require_parent, to_value, validate_name,
};
use super::keys::{app_intent_key, app_key, fields, generic_placement_intent_key, DigRef};
use super::types::{AppIntent, GenericPlacementIntent};
use crate::error::{OrchError, Result};
use crate::store::{tags, DocumentStore, ORCHESTRATOR_COLLECTION};

// ─── Generic placement intents ──────────────────────────────────────────────

#[async_trait]
pub trait GenericPlacementIntentManager: Send + Sync {
    async fn create_generic_placement_intent(
        &self,
        dig: &DigRef,
        intent: &GenericPlacementIntent,
    ) -> Result<GenericPlacementIntent>;
    async fn get_generic_placement_intent(&self, dig: &DigRef, name: &str) -> Result<GenericPlacementIntent>;
    async fn list_generic_placement_intents(&self, dig: &DigRef) -> Result<Vec<GenericPlacementIntent>>;
    async fn update_generic_placement_intent(
        &self,
        dig: &DigRef,
        name: &str,
        intent: &GenericPlacementIntent,
    ) -> Result<GenericPlacementIntent>;
    async fn delete_generic_placement_intent(&self, dig: &DigRef, name: &str) -> Result<()>;
}

pub struct GenericPlacementIntentClient {
    store: Arc<dyn DocumentStore>,
}

impl GenericPlacementIntentClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GenericPlacementIntentManager for GenericPlacementIntentClient {
    async fn create_generic_placement_intent(
        &self,
        dig: &DigRef,
        intent: &GenericPlacementIntent,
    ) -> Result<GenericPlacementIntent> {
        validate_name("generic placement intent", &intent.metadata.name)?;
        require_parent(
            self.store.as_ref(),
            ORCHESTRATOR_COLLECTION,
            &dig.key(),
            tags::DEPLOYMENT_INTENT_GROUP,
            || format!("deployment intent group {dig}"),
        )
        .await?;
        let key = generic_placement_intent_key(dig, &intent.metadata.name);
        self.store
            .create(ORCHESTRATOR_COLLECTION, &key, tags::GENERIC_PLACEMENT_INTENT, &to_value(intent)?, &[])
            .await?;
        Ok(intent.clone())
    }

    async fn get_generic_placement_intent(&self, dig: &DigRef, name: &str) -> Result<GenericPlacementIntent> {
        let key = generic_placement_intent_key(dig, name);
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::GENERIC_PLACEMENT_INTENT, || {
            format!("generic placement intent {name} in {dig}")
        })
        .await
    }

    async fn list_generic_placement_intents(&self, dig: &DigRef) -> Result<Vec<GenericPlacementIntent>> {
        let key = generic_placement_intent_key(dig, "");
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::GENERIC_PLACEMENT_INTENT).await
    }

    async fn update_generic_placement_intent(
        &self,
        dig: &DigRef,
        name: &str,
        intent: &GenericPlacementIntent,
    ) -> Result<GenericPlacementIntent> {
        check_update_name("generic placement intent", name, &intent.metadata.name)?;
        self.get_generic_placement_intent(dig, name).await?;
        self.store
            .insert(
                ORCHESTRATOR_COLLECTION,
                &generic_placement_intent_key(dig, name),
                tags::GENERIC_PLACEMENT_INTENT,
                &to_value(intent)?,
            )
            .await?;
        Ok(intent.clone())
    }

    async fn delete_generic_placement_intent(&self, dig: &DigRef, name: &str) -> Result<()> {
        self.store
            .remove(ORCHESTRATOR_COLLECTION, &generic_placement_intent_key(dig, name))
            .await
    }
}

// ─── App intents ────────────────────────────────────────────────────────────

#[async_trait]
pub trait AppIntentManager: Send + Sync {
    async fn create_app_intent(&self, dig: &DigRef, intent: &str, app_intent: &AppIntent) -> Result<AppIntent>;
    async fn get_app_intent(&self, dig: &DigRef, intent: &str, name: &str) -> Result<AppIntent>;
    /// The placement predicate for `app` under a generic placement intent.
    async fn get_app_intent_by_app(&self, dig: &DigRef, intent: &str, app: &str) -> Result<AppIntent>;
    async fn list_app_intents(&self, dig: &DigRef, intent: &str) -> Result<Vec<AppIntent>>;
    async fn update_app_intent(
        &self,
        dig: &DigRef,
        intent: &str,
        name: &str,
        app_intent: &AppIntent,
    ) -> Result<AppIntent>;
    async fn delete_app_intent(&self, dig: &DigRef, intent: &str, name: &str) -> Result<()>;
}

pub struct AppIntentClient {
    store: Arc<dyn DocumentStore>,
}

impl AppIntentClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    async fn find_by_app(&self, dig: &DigRef, intent: &str, app: &str) -> Result<Option<AppIntent>> {
        let found = self
            .store
            .find_by_index(
                ORCHESTRATOR_COLLECTION,
                &app_intent_key(dig, intent, ""),
                tags::APP_INTENT,
                fields::APP,
                app,
            )
            .await?;
        found.into_iter().next().map(from_value).transpose()
    }

    async fn check_references(&self, dig: &DigRef, intent: &str, app_intent: &AppIntent) -> Result<()> {
        app_intent.spec.intent.validate()?;
        require_parent(
            self.store.as_ref(),
            ORCHESTRATOR_COLLECTION,
            &generic_placement_intent_key(dig, intent),
            tags::GENERIC_PLACEMENT_INTENT,
            || format!("generic placement intent {intent} in {dig}"),
        )
        .await?;
        let app = &app_intent.spec.app;
        require_parent(
            self.store.as_ref(),
            ORCHESTRATOR_COLLECTION,
            &app_key(&dig.composite_app(), app),
            tags::APP,
            || format!("app {app} in {}", dig.composite_app()),
        )
        .await
    }
}

#[async_trait]
impl AppIntentManager for AppIntentClient {
    async fn create_app_intent(&self, dig: &DigRef, intent: &str, app_intent: &AppIntent) -> Result<AppIntent> {
        validate_name("app intent", &app_intent.metadata.name)?;
        self.check_references(dig, intent, app_intent).await?;
        if self.find_by_app(dig, intent, &app_intent.spec.app).await?.is_some() {
            return Err(OrchError::Conflict(format!(
                "generic placement intent {intent} already places app {}",
                app_intent.spec.app
            )));
        }
        let key = app_intent_key(dig, intent, &app_intent.metadata.name);
        self.store
            .create(
                ORCHESTRATOR_COLLECTION,
                &key,
                tags::APP_INTENT,
                &to_value(app_intent)?,
                &[(fields::APP, app_intent.spec.app.as_str())],
            )
            .await?;
        tracing::info!(dig = %dig, intent, app = %app_intent.spec.app, "App intent created");
        Ok(app_intent.clone())
    }

    async fn get_app_intent(&self, dig: &DigRef, intent: &str, name: &str) -> Result<AppIntent> {
        let key = app_intent_key(dig, intent, name);
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::APP_INTENT, || {
            format!("app intent {name} in {dig}/{intent}")
        })
        .await
    }

    async fn get_app_intent_by_app(&self, dig: &DigRef, intent: &str, app: &str) -> Result<AppIntent> {
        self.find_by_app(dig, intent, app)
            .await?
            .ok_or_else(|| OrchError::NotFound(format!("app intent for app {app} in {dig}/{intent}")))
    }

    async fn list_app_intents(&self, dig: &DigRef, intent: &str) -> Result<Vec<AppIntent>> {
        let key = app_intent_key(dig, intent, "");
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::APP_INTENT).await
    }

    async fn update_app_intent(
        &self,
        dig: &DigRef,
        intent: &str,
        name: &str,
        app_intent: &AppIntent,
    ) -> Result<AppIntent> {
        check_update_name("app intent", name, &app_intent.metadata.name)?;
        let current = self.get_app_intent(dig, intent, name).await?;
        self.check_references(dig, intent, app_intent).await?;
        if current.spec.app != app_intent.spec.app
            && self.find_by_app(dig, intent, &app_intent.spec.app).await?.is_some()
        {
            return Err(OrchError::Conflict(format!(
                "generic placement intent {intent} already places app {}",
                app_intent.spec.app
            )));
        }
        self.store
            .insert_indexed(
                ORCHESTRATOR_COLLECTION,
                &app_intent_key(dig, intent, name),
                tags::APP_INTENT,
                &to_value(app_intent)?,
                &[(fields::APP, app_intent.spec.app.as_str())],
            )
            .await?;
        Ok(app_intent.clone())
    }

    async fn delete_app_intent(&self, dig: &DigRef, intent: &str, name: &str) -> Result<()> {
        self.store
            .remove(ORCHESTRATOR_COLLECTION, &app_intent_key(dig, intent, name))
            .await
    }
}
