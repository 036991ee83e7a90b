use std::sync::Arc;

use async_trait::async_trait;

use super::common::{check_update_name, get_as, list_as, require_parent, to_value, validate_name};
use super::keys::{project_key, CompositeAppRef};
use super::types::{CompositeApp, Project};
use crate::error::Result;
use crate::store::{tags, DocumentStore, ORCHESTRATOR_COLLECTION};

#[async_trait]
pub trait ProjectManager: Send + Sync {
    async fn create_project(&self, project: &Project) -> Result<Project>;
    async fn get_project(&self, name: &str) -> Result<Project>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn update_project(&self, name: &str, project: &Project) -> Result<Project>;
    async fn delete_project(&self, name: &str) -> Result<()>;
}

pub struct ProjectClient {
    store: Arc<dyn DocumentStore>,
}

impl ProjectClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ProjectManager for ProjectClient {
    async fn create_project(&self, project: &Project) -> Result<Project> {
        validate_name("project", &project.metadata.name)?;
        let key = project_key(&project.metadata.name);
        self.store
            .create(ORCHESTRATOR_COLLECTION, &key, tags::PROJECT, &to_value(project)?, &[])
            .await?;
        tracing::info!(project = %project.metadata.name, "Project created");
        Ok(project.clone())
    }

    async fn get_project(&self, name: &str) -> Result<Project> {
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &project_key(name), tags::PROJECT, || {
            format!("project {name}")
        })
        .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &project_key(""), tags::PROJECT).await
    }

    async fn update_project(&self, name: &str, project: &Project) -> Result<Project> {
        check_update_name("project", name, &project.metadata.name)?;
        self.get_project(name).await?;
        self.store
            .insert(ORCHESTRATOR_COLLECTION, &project_key(name), tags::PROJECT, &to_value(project)?)
            .await?;
        Ok(project.clone())
    }

    async fn delete_project(&self, name: &str) -> Result<()> {
        self.store.remove(ORCHESTRATOR_COLLECTION, &project_key(name)).await
    }
}

#[async_trait]
pub trait CompositeAppManager: Send + Sync {
    async fn create_composite_app(&self, project: &str, ca: &CompositeApp) -> Result<CompositeApp>;
    async fn get_composite_app(&self, ca: &CompositeAppRef) -> Result<CompositeApp>;
    async fn list_composite_apps(&self, project: &str) -> Result<Vec<CompositeApp>>;
    async fn update_composite_app(&self, ca: &CompositeAppRef, body: &CompositeApp) -> Result<CompositeApp>;
    async fn delete_composite_app(&self, ca: &CompositeAppRef) -> Result<()>;
}

pub struct CompositeAppClient {
    store: Arc<dyn DocumentStore>,
}

impl CompositeAppClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CompositeAppManager for CompositeAppClient {
    async fn create_composite_app(&self, project: &str, ca: &CompositeApp) -> Result<CompositeApp> {
        validate_name("composite app", &ca.metadata.name)?;
        validate_name("composite app version", &ca.spec.version)?;
        require_parent(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &project_key(project), tags::PROJECT, || {
            format!("project {project}")
        })
        .await?;
        let addr = CompositeAppRef::new(project, &ca.metadata.name, &ca.spec.version);
        self.store
            .create(ORCHESTRATOR_COLLECTION, &addr.key(), tags::COMPOSITE_APP, &to_value(ca)?, &[])
            .await?;
        tracing::info!(composite_app = %addr, "Composite app created");
        Ok(ca.clone())
    }

    async fn get_composite_app(&self, ca: &CompositeAppRef) -> Result<CompositeApp> {
        get_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &ca.key(), tags::COMPOSITE_APP, || {
            format!("composite app {ca}")
        })
        .await
    }

    async fn list_composite_apps(&self, project: &str) -> Result<Vec<CompositeApp>> {
        let key = CompositeAppRef::new(project, "", "").key();
        list_as(self.store.as_ref(), ORCHESTRATOR_COLLECTION, &key, tags::COMPOSITE_APP).await
    }

    async fn update_composite_app(&self, ca: &CompositeAppRef, body: &CompositeApp) -> Result<CompositeApp> {
        check_update_name("composite app", &ca.composite_app, &body.metadata.name)?;
        check_update_name("composite app version", &ca.version, &body.spec.version)?;
        self.get_composite_app(ca).await?;
        self.store
            .insert(ORCHESTRATOR_COLLECTION, &ca.key(), tags::COMPOSITE_APP, &to_value(body)?)
            .await?;
        Ok(body.clone())
    }

    async fn delete_composite_app(&self, ca: &CompositeAppRef) -> Result<()> {
        self.store.remove(ORCHESTRATOR_COLLECTION, &ca.key()).await
    }
}
