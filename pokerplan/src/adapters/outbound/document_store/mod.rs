//! Document store implementation of the ProjectRepository port.

mod conversions;

use async_trait::async_trait;
use docstore::{
    Direction, Document, DocumentStore, FieldValue, FilterOp, Query, WriteBatch, MAX_IN_VALUES,
};
use itertools::Itertools;
use tracing::{debug, error, info, warn};

use crate::domain::{
    models::{NewProject, OwnerId, Project, ProjectId, ProjectUpdate, SprintStatus},
    ports::outbound::{
        CountCorrection, ErrorCallback, ProjectRepository, ProjectSubscription, ProjectsCallback,
        ReconcileReport,
    },
    ProjectError,
};

use conversions::{fields, PROJECTS, SPRINTS};

/// Most writes a single atomic commit may carry.
const MAX_BATCH_WRITES: usize = 500;

/// Adapter that implements ProjectRepository on top of any DocumentStore.
pub struct DocStoreProjectRepository<S> {
    store: S,
}

impl<S: DocumentStore> DocStoreProjectRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn owner_query(owner: &OwnerId) -> Query {
        Query::collection(PROJECTS)
            .filter(fields::OWNER_ID, FilterOp::Equal, owner.as_str())
            .order_by(fields::CREATED_AT, Direction::Descending)
    }

    fn sprints_of(id: &ProjectId) -> Query {
        Query::collection(SPRINTS).filter(fields::PROJECT_ID, FilterOp::Equal, id.as_str())
    }

    async fn owned_project_documents(&self, owner: &OwnerId) -> Result<Vec<Document>, docstore::StoreError> {
        self.store.run_query(&Self::owner_query(owner)).await
    }
}

/// Decode project documents, skipping (and logging) malformed ones so a
/// single bad record does not hide the rest of the list.
fn decode_projects(docs: &[Document]) -> Vec<Project> {
    docs.iter()
        .filter_map(|doc| match conversions::to_domain_project(doc) {
            Ok(project) => Some(project),
            Err(e) => {
                warn!(project_id = %doc.id, error = %e, "Skipping malformed project document");
                None
            }
        })
        .collect()
}

#[async_trait]
impl<S: DocumentStore> ProjectRepository for DocStoreProjectRepository<S> {
    async fn create(&self, project: &NewProject, owner: &OwnerId) -> Result<ProjectId, ProjectError> {
        let id = ProjectId::generate();

        self.store
            .set(
                PROJECTS,
                id.as_str(),
                conversions::new_project_fields(project, owner),
            )
            .await
            .map_err(|e| {
                error!(owner_id = %owner, error = %e, "Failed to create project");
                ProjectError::Creation(e.to_string())
            })?;

        info!(project_id = %id, owner_id = %owner, "Project created");
        Ok(id)
    }

    async fn fetch_by_owner(&self, owner: &OwnerId) -> Result<Vec<Project>, ProjectError> {
        let docs = self.owned_project_documents(owner).await.map_err(|e| {
            error!(owner_id = %owner, error = %e, "Failed to fetch projects");
            ProjectError::Fetch(e.to_string())
        })?;

        Ok(decode_projects(&docs))
    }

    async fn fetch_one(&self, id: &ProjectId) -> Result<Option<Project>, ProjectError> {
        let doc = self.store.get(PROJECTS, id.as_str()).await.map_err(|e| {
            error!(project_id = %id, error = %e, "Failed to fetch project");
            ProjectError::Fetch(e.to_string())
        })?;

        doc.map(|doc| conversions::to_domain_project(&doc))
            .transpose()
            .map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to decode project");
                ProjectError::Fetch(e.to_string())
            })
    }

    async fn update(&self, id: &ProjectId, update: &ProjectUpdate) -> Result<(), ProjectError> {
        self.store
            .update(PROJECTS, id.as_str(), conversions::update_fields(update))
            .await
            .map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to update project");
                ProjectError::Update(e.to_string())
            })?;

        debug!(project_id = %id, "Project updated");
        Ok(())
    }

    async fn delete(&self, id: &ProjectId) -> Result<(), ProjectError> {
        self.store.delete(PROJECTS, id.as_str()).await.map_err(|e| {
            error!(project_id = %id, error = %e, "Failed to delete project");
            ProjectError::Deletion(e.to_string())
        })?;

        info!(project_id = %id, "Project deleted");
        Ok(())
    }

    async fn delete_cascade(&self, id: &ProjectId) -> Result<usize, ProjectError> {
        let sprints = self
            .store
            .run_query(&Self::sprints_of(id))
            .await
            .map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to list sprints for deletion");
                ProjectError::Deletion(e.to_string())
            })?;

        if sprints.len() + 1 > MAX_BATCH_WRITES {
            return Err(ProjectError::Deletion(format!(
                "project {} has {} sprints, more than one atomic batch can delete",
                id,
                sprints.len()
            )));
        }

        let mut batch = WriteBatch::new();
        for sprint in &sprints {
            batch.delete(SPRINTS, sprint.id.as_str());
        }
        batch.delete(PROJECTS, id.as_str());

        self.store.commit(batch).await.map_err(|e| {
            error!(project_id = %id, error = %e, "Failed to delete project with sprints");
            ProjectError::Deletion(e.to_string())
        })?;

        info!(project_id = %id, sprints = sprints.len(), "Project deleted with its sprints");
        Ok(sprints.len())
    }

    async fn subscribe(
        &self,
        owner: &OwnerId,
        on_change: ProjectsCallback,
        on_error: ErrorCallback,
    ) -> Result<ProjectSubscription, ProjectError> {
        let mut stream = self
            .store
            .listen(Self::owner_query(owner))
            .await
            .map_err(|e| {
                error!(owner_id = %owner, error = %e, "Failed to subscribe to projects");
                ProjectError::Fetch(e.to_string())
            })?;

        let owner = owner.clone();
        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(docs) => on_change(decode_projects(&docs)),
                    Err(e) => {
                        error!(owner_id = %owner, error = %e, "Project subscription error");
                        on_error(ProjectError::Fetch(e.to_string()));
                    }
                }
            }
        });

        Ok(ProjectSubscription::new(task))
    }

    async fn increment_sprint_count(&self, id: &ProjectId) -> Result<(), ProjectError> {
        let current = self
            .store
            .get(PROJECTS, id.as_str())
            .await
            .map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to read sprint count");
                ProjectError::Update(e.to_string())
            })?
            .map(|doc| conversions::stored_sprints_count(&doc))
            .unwrap_or(0);

        self.store
            .update(
                PROJECTS,
                id.as_str(),
                conversions::sprints_count_fields(conversions::count_value(current + 1)),
            )
            .await
            .map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to increment sprint count");
                ProjectError::Update(e.to_string())
            })
    }

    async fn increment_sprint_count_atomic(&self, id: &ProjectId) -> Result<(), ProjectError> {
        self.store
            .update(
                PROJECTS,
                id.as_str(),
                conversions::sprints_count_fields(FieldValue::Increment(1)),
            )
            .await
            .map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to increment sprint count");
                ProjectError::Update(e.to_string())
            })
    }

    async fn try_count_sprints_for_project(&self, id: &ProjectId) -> Result<u64, ProjectError> {
        self.store
            .count(&Self::sprints_of(id))
            .await
            .map_err(|e| ProjectError::Count(e.to_string()))
    }

    async fn try_count_active_sprints_across_owner(&self, owner: &OwnerId) -> Result<u64, ProjectError> {
        let ids: Vec<ProjectId> = self
            .owned_project_documents(owner)
            .await
            .map_err(|e| ProjectError::Count(e.to_string()))?
            .into_iter()
            .map(|doc| ProjectId::new(doc.id))
            .unique()
            .collect();

        if ids.is_empty() {
            return Ok(0);
        }

        let mut total = 0;
        for chunk in ids.chunks(MAX_IN_VALUES) {
            let query = Query::collection(SPRINTS)
                .filter(fields::PROJECT_ID, FilterOp::In, conversions::id_values(chunk))
                .filter(fields::STATUS, FilterOp::Equal, SprintStatus::Active.as_str());
            total += self
                .store
                .count(&query)
                .await
                .map_err(|e| ProjectError::Count(e.to_string()))?;
        }

        Ok(total)
    }

    async fn reconcile_counts(&self, owner: &OwnerId) -> Result<ReconcileReport, ProjectError> {
        let docs = self.owned_project_documents(owner).await.map_err(|e| {
            error!(owner_id = %owner, error = %e, "Failed to list projects for reconciliation");
            ProjectError::Sync(e.to_string())
        })?;

        let mut batch = WriteBatch::new();
        let mut report = ReconcileReport {
            projects_checked: docs.len(),
            corrections: Vec::new(),
        };

        for doc in &docs {
            let id = ProjectId::new(doc.id.clone());
            let actual = self.try_count_sprints_for_project(&id).await.map_err(|e| {
                error!(project_id = %id, error = %e, "Failed to count sprints during reconciliation");
                ProjectError::Sync(e.to_string())
            })?;
            let stored = conversions::raw_sprints_count(doc);

            // Negative, missing or non-integer counters are drift too.
            if stored != i64::try_from(actual).ok() {
                debug!(project_id = %id, stored = ?stored, actual, "Sprint count drifted");
                batch.update(
                    PROJECTS,
                    id.as_str(),
                    conversions::sprints_count_fields(conversions::count_value(actual)),
                );
                report.corrections.push(CountCorrection {
                    project_id: id,
                    stored,
                    actual,
                });
            }
        }

        if batch.len() > MAX_BATCH_WRITES {
            return Err(ProjectError::Sync(format!(
                "{} corrections exceed the atomic batch limit of {}",
                batch.len(),
                MAX_BATCH_WRITES
            )));
        }

        if !batch.is_empty() {
            self.store.commit(batch).await.map_err(|e| {
                error!(owner_id = %owner, error = %e, "Failed to commit sprint count corrections");
                ProjectError::Sync(e.to_string())
            })?;
        }

        info!(
            owner_id = %owner,
            projects = report.projects_checked,
            corrected = report.corrections.len(),
            "Sprint counts reconciled"
        );
        Ok(report)
    }
}
