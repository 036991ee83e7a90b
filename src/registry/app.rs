use std::sync::Arc;

use async_trait::async_trait;

use super::blob::BlobPolicy;
use super::common::{
    check_update_name, from_value, get_as, list_as, require_parent, to_value, validate_name,
};
use super::keys::{app_key, app_profile_key, composite_profile_key, fields, CompositeAppRef};
use super::types::{App, AppProfile, CompositeProfile};
use crate::error::{OrchError, Result};
use crate::store::{tags, DocumentStore, ORCHESTRATOR_COLLECTION};

// ─── Apps ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait AppManager: Send + Sync {
    /// Store the app metadata with its chart tarball.
    async fn create_app(&self, ca: &CompositeAppRef, app: &App, chart: &[u8]) -> Result<App>;
    async fn get_app(&self, ca: &CompositeAppRef, name: &str) -> Result<App>;
    async fn get_app_content(&self, ca: &CompositeAppRef, name: &str) -> Result<Vec<u8>>;
    async fn list_apps(&self, ca: &CompositeAppRef) -> Result<Vec<App>>;
    /// Replace metadata and chart together.
    async fn update_app(&self, ca: &CompositeAppRef, name: &str, app: &App, chart: &[u8]) -> Result<App>;
    async fn delete_app(&self, ca: &CompositeAppRef, name: &str) -> Result<()>;
}

pub struct AppClient {
    store: Arc<dyn DocumentStore>,
    blobs: BlobPolicy,
}

impl AppClient {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: BlobPolicy) -> Self {
        Self { store, blobs }
    }

    async fn write(&self, ca: &CompositeAppRef, app: &App, chart: &[u8], create: bool) -> Result<App> {
        let mut app = app.clone();
        app.chart = Some(self.blobs.validate("chart", chart)?);
        let key = app_key(ca, &app.metadata.name);
        if create {
            self.store
                .create(ORCHESTRATOR_COLLECTION, &key, tags::APP, &to_value(&app)?, &[])
                .await?;
        } else {
            self.store
                .insert(ORCHESTRATOR_COLLECTION, &key, tags::APP, &to_value(&app)?)
                .await?;
        }
        self.store
            .put_blob(ORCHESTRATOR_COLLECTION, &key, tags::APP_CONTENT, chart)
            .await?;
        Ok(app)
    }
}

#[async_trait]
impl AppManager for AppClient {
    async fn create_app(&self, ca: &CompositeAppRef, app: &App, chart: &[u8]) -> Result<App> {
        validate_name("app", &app.metadata.name)?;
        require_parent(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &ca.key(), tags::COMPOSITE_APP, || {
            format!("composite app {ca}")
        })
        .await?;
        let app = self.write(ca, app, chart, true).await?;
        tracing::info!(composite_app = %ca, app = %app.metadata.name, "App created");
        Ok(app)
    }

    async fn get_app(&self, ca: &CompositeAppRef, name: &str) -> Result<App> {
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &app_key(ca, name), tags::APP, || {
            format!("app {name} in {ca}")
        })
        .await
    }

    async fn get_app_content(&self, ca: &CompositeAppRef, name: &str) -> Result<Vec<u8>> {
        self.store
            .get_blob(ORCHESTRATOR_COLLECTION, &app_key(ca, name), tags::APP_CONTENT)
            .await?
            .ok_or_else(|| OrchError::NotFound(format!("chart of app {name} in {ca}")))
    }

    async fn list_apps(&self, ca: &CompositeAppRef) -> Result<Vec<App>> {
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &app_key(ca, ""), tags::APP).await
    }

    async fn update_app(&self, ca: &CompositeAppRef, name: &str, app: &App, chart: &[u8]) -> Result<App> {
        check_update_name("app", name, &app.metadata.name)?;
        self.get_app(ca, name).await?;
        self.write(ca, app, chart, false).await
    }

    async fn delete_app(&self, ca: &CompositeAppRef, name: &str) -> Result<()> {
        self.store.remove(ORCHESTRATOR_COLLECTION, &app_key(ca, name)).await
    }
}

// ─── Composite profiles ─────────────────────────────────────────────────────

#[async_trait]
pub trait CompositeProfileManager: Send + Sync {
    async fn create_composite_profile(&self, ca: &CompositeAppRef, profile: &CompositeProfile) -> Result<CompositeProfile>;
    async fn get_composite_profile(&self, ca: &CompositeAppRef, name: &str) -> Result<CompositeProfile>;
    async fn list_composite_profiles(&self, ca: &CompositeAppRef) -> Result<Vec<CompositeProfile>>;
    async fn update_composite_profile(
        &self,
        ca: &CompositeAppRef,
        name: &str,
        profile: &CompositeProfile,
    ) -> Result<CompositeProfile>;
    async fn delete_composite_profile(&self, ca: &CompositeAppRef, name: &str) -> Result<()>;
}

pub struct CompositeProfileClient {
    store: Arc<dyn DocumentStore>,
}

impl CompositeProfileClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CompositeProfileManager for CompositeProfileClient {
    async fn create_composite_profile(&self, ca: &CompositeAppRef, profile: &CompositeProfile) -> Result<CompositeProfile> {
        validate_name("composite profile", &profile.metadata.name)?;
        require_parent(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &ca.key(), tags::COMPOSITE_APP, || {
            format!("composite app {ca}")
        })
        .await?;
        let key = composite_profile_key(ca, &profile.metadata.name);
        self.store
            .create(ORCHESTRATOR_COLLECTION, &key, tags::COMPOSITE_PROFILE, &to_value(profile)?, &[])
            .await?;
        Ok(profile.clone())
    }

    async fn get_composite_profile(&self, ca: &CompositeAppRef, name: &str) -> Result<CompositeProfile> {
        let key = composite_profile_key(ca, name);
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::COMPOSITE_PROFILE, || {
            format!("composite profile {name} in {ca}")
        })
        .await
    }

    async fn list_composite_profiles(&self, ca: &CompositeAppRef) -> Result<Vec<CompositeProfile>> {
        let key = composite_profile_key(ca, "");
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::COMPOSITE_PROFILE).await
    }

    async fn update_composite_profile(
        &self,
        ca: &CompositeAppRef,
        name: &str,
        profile: &CompositeProfile,
    ) -> Result<CompositeProfile> {
        check_update_name("composite profile", name, &profile.metadata.name)?;
        self.get_composite_profile(ca, name).await?;
        self.store
            .insert(
                ORCHESTRATOR_COLLECTION,
                &composite_profile_key(ca, name),
                tags::COMPOSITE_PROFILE,
                &to_value(profile)?,
            )
            .await?;
        Ok(profile.clone())
    }

    async fn delete_composite_profile(&self, ca: &CompositeAppRef, name: &str) -> Result<()> {
        self.store
            .remove(ORCHESTRATOR_COLLECTION, &composite_profile_key(ca, name))
            .await
    }
}

// ─── App profiles ───────────────────────────────────────────────────────────

#[async_trait]
pub trait AppProfileManager: Send + Sync {
    async fn create_app_profile(
        &self,
        ca: &CompositeAppRef,
        profile: &str,
        app_profile: &AppProfile,
        content: &[u8],
    ) -> Result<AppProfile>;
    async fn get_app_profile(&self, ca: &CompositeAppRef, profile: &str, name: &str) -> Result<AppProfile>;
    async fn get_app_profile_content(&self, ca: &CompositeAppRef, profile: &str, name: &str) -> Result<Vec<u8>>;
    /// The profile bound to `app` within a composite profile.
    async fn get_app_profile_by_app(&self, ca: &CompositeAppRef, profile: &str, app: &str) -> Result<AppProfile>;
    async fn get_app_profile_content_by_app(&self, ca: &CompositeAppRef, profile: &str, app: &str) -> Result<Vec<u8>>;
    async fn list_app_profiles(&self, ca: &CompositeAppRef, profile: &str) -> Result<Vec<AppProfile>>;
    async fn update_app_profile(
        &self,
        ca: &CompositeAppRef,
        profile: &str,
        name: &str,
        app_profile: &AppProfile,
        content: &[u8],
    ) -> Result<AppProfile>;
    async fn delete_app_profile(&self, ca: &CompositeAppRef, profile: &str, name: &str) -> Result<()>;
}

pub struct AppProfileClient {
    store: Arc<dyn DocumentStore>,
    blobs: BlobPolicy,
}

impl AppProfileClient {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: BlobPolicy) -> Self {
        Self { store, blobs }
    }

    async fn write(
        &self,
        ca: &CompositeAppRef,
        profile: &str,
        app_profile: &AppProfile,
        content: &[u8],
        create: bool,
    ) -> Result<AppProfile> {
        let mut app_profile = app_profile.clone();
        app_profile.profile = Some(self.blobs.validate("profile", content)?);
        let key = app_profile_key(ca, profile, &app_profile.metadata.name);
        let index = [(fields::APP, app_profile.spec.app.as_str())];
        let value = to_value(&app_profile)?;
        if create {
            self.store
                .create(ORCHESTRATOR_COLLECTION, &key, tags::APP_PROFILE, &value, &index)
                .await?;
        } else {
            self.store
                .insert_indexed(ORCHESTRATOR_COLLECTION, &key, tags::APP_PROFILE, &value, &index)
                .await?;
        }
        self.store
            .put_blob(ORCHESTRATOR_COLLECTION, &key, tags::APP_PROFILE_CONTENT, content)
            .await?;
        Ok(app_profile)
    }

    async fn check_references(&self, ca: &CompositeAppRef, profile: &str, app: &str) -> Result<()> {
        require_parent(
            self.store.as_ref(),
            ORCHESTRATOR_COLLECTION,
            &composite_profile_key(ca, profile),
            tags::COMPOSITE_PROFILE,
            || format!("composite profile {profile} in {ca}"),
        )
        .await?;
        require_parent(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &app_key(ca, app), tags::APP, || {
            format!("app {app} in {ca}")
        })
        .await
    }
}

#[async_trait]
impl AppProfileManager for AppProfileClient {
    async fn create_app_profile(
        &self,
        ca: &CompositeAppRef,
        profile: &str,
        app_profile: &AppProfile,
        content: &[u8],
    ) -> Result<AppProfile> {
        validate_name("app profile", &app_profile.metadata.name)?;
        self.check_references(ca, profile, &app_profile.spec.app).await?;
        let existing = self
            .store
            .find_by_index(
                ORCHESTRATOR_COLLECTION,
                &app_profile_key(ca, profile, ""),
                tags::APP_PROFILE,
                fields::APP,
                &app_profile.spec.app,
            )
            .await?;
        if !existing.is_empty() {
            return Err(OrchError::Conflict(format!(
                "composite profile {profile} already has a profile for app {}",
                app_profile.spec.app
            )));
        }
        let created = self.write(ca, profile, app_profile, content, true).await?;
        tracing::info!(
            composite_app = %ca,
            profile,
            app = %created.spec.app,
            "App profile created"
        );
        Ok(created)
    }

    async fn get_app_profile(&self, ca: &CompositeAppRef, profile: &str, name: &str) -> Result<AppProfile> {
        let key = app_profile_key(ca, profile, name);
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::APP_PROFILE, || {
            format!("app profile {name} in {ca}/{profile}")
        })
        .await
    }

    async fn get_app_profile_content(&self, ca: &CompositeAppRef, profile: &str, name: &str) -> Result<Vec<u8>> {
        self.store
            .get_blob(
                ORCHESTRATOR_COLLECTION,
                &app_profile_key(ca, profile, name),
                tags::APP_PROFILE_CONTENT,
            )
            .await?
            .ok_or_else(|| OrchError::NotFound(format!("content of app profile {name} in {ca}/{profile}")))
    }

    async fn get_app_profile_by_app(&self, ca: &CompositeAppRef, profile: &str, app: &str) -> Result<AppProfile> {
        let found = self
            .store
            .find_by_index(
                ORCHESTRATOR_COLLECTION,
                &app_profile_key(ca, profile, ""),
                tags::APP_PROFILE,
                fields::APP,
                app,
            )
            .await?;
        match found.into_iter().next() {
            Some(value) => from_value(value),
            None => Err(OrchError::NotFound(format!(
                "app profile for app {app} in {ca}/{profile}"
            ))),
        }
    }

    async fn get_app_profile_content_by_app(&self, ca: &CompositeAppRef, profile: &str, app: &str) -> Result<Vec<u8>> {
        let app_profile = self.get_app_profile_by_app(ca, profile, app).await?;
        self.get_app_profile_content(ca, profile, &app_profile.metadata.name)
            .await
    }

    async fn list_app_profiles(&self, ca: &CompositeAppRef, profile: &str) -> Result<Vec<AppProfile>> {
        let key = app_profile_key(ca, profile, "");
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::APP_PROFILE).await
    }

    async fn update_app_profile(
        &self,
        ca: &CompositeAppRef,
        profile: &str,
        name: &str,
        app_profile: &AppProfile,
        content: &[u8],
    ) -> Result<AppProfile> {
        check_update_name("app profile", name, &app_profile.metadata.name)?;
        let current = self.get_app_profile(ca, profile, name).await?;
        if current.spec.app != app_profile.spec.app {
            self.check_references(ca, profile, &app_profile.spec.app).await?;
            if self
                .get_app_profile_by_app(ca, profile, &app_profile.spec.app)
                .await
                .is_ok()
            {
                return Err(OrchError::Conflict(format!(
                    "composite profile {profile} already has a profile for app {}",
                    app_profile.spec.app
                )));
            }
        }
        self.write(ca, profile, app_profile, content, false).await
    }

    async fn delete_app_profile(&self, ca: &CompositeAppRef, profile: &str, name: &str) -> Result<()> {
        self.store
            .remove(ORCHESTRATOR_COLLECTION, &app_profile_key(ca, profile, name))
            .await
    }
}
