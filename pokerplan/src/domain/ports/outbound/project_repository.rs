//! Project repository port (outbound).
//!
//! Defines the interface for persisting projects and reading the sprint
//! counts derived from them.

use async_trait::async_trait;

use crate::domain::{
    models::{NewProject, OwnerId, Project, ProjectId, ProjectUpdate},
    ProjectError,
};

/// Callback receiving the full, ordered project list on every change.
pub type ProjectsCallback = Box<dyn Fn(Vec<Project>) + Send + Sync + 'static>;

/// Callback receiving errors raised inside a live subscription.
pub type ErrorCallback = Box<dyn Fn(ProjectError) + Send + Sync + 'static>;

/// A counter correction staged by [`ProjectRepository::reconcile_counts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountCorrection {
    pub project_id: ProjectId,
    /// Counter as found; `None` when missing or not an integer.
    pub stored: Option<i64>,
    pub actual: u64,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub projects_checked: usize,
    pub corrections: Vec<CountCorrection>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Handle of a live project subscription.
///
/// The feed stays open until [`ProjectSubscription::unsubscribe`] is called
/// or the handle is dropped.
pub struct ProjectSubscription {
    task: tokio::task::JoinHandle<()>,
}

impl ProjectSubscription {
    pub fn new(task: tokio::task::JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn unsubscribe(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for ProjectSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Outbound port for project persistence.
#[async_trait]
pub trait ProjectRepository: Send + Sync + 'static {
    /// Create a project owned by `owner` with a fresh id and a zero sprint
    /// count. Returns the new id.
    async fn create(&self, project: &NewProject, owner: &OwnerId) -> Result<ProjectId, ProjectError>;

    /// All projects owned by `owner`, newest first.
    async fn fetch_by_owner(&self, owner: &OwnerId) -> Result<Vec<Project>, ProjectError>;

    /// A single project, or `None` if it does not exist.
    async fn fetch_one(&self, id: &ProjectId) -> Result<Option<Project>, ProjectError>;

    /// Write the supplied fields and refresh `updated_at`.
    async fn update(&self, id: &ProjectId, update: &ProjectUpdate) -> Result<(), ProjectError>;

    /// Remove the project. Its sprints are left in place.
    async fn delete(&self, id: &ProjectId) -> Result<(), ProjectError>;

    /// Remove the project and all of its sprints in one atomic batch.
    ///
    /// Returns the number of sprints removed.
    async fn delete_cascade(&self, id: &ProjectId) -> Result<usize, ProjectError>;

    /// Watch the projects owned by `owner`.
    ///
    /// `on_change` is called with the current list and again after every
    /// change. Errors go to `on_error` and do not end the subscription.
    async fn subscribe(
        &self,
        owner: &OwnerId,
        on_change: ProjectsCallback,
        on_error: ErrorCallback,
    ) -> Result<ProjectSubscription, ProjectError>;

    /// Read the cached sprint count and write it back plus one.
    ///
    /// Not atomic: two concurrent calls can both read the same value and
    /// one increment is lost. Use
    /// [`ProjectRepository::increment_sprint_count_atomic`] where that
    /// matters.
    async fn increment_sprint_count(&self, id: &ProjectId) -> Result<(), ProjectError>;

    /// Increment the cached sprint count with a server-side transform.
    async fn increment_sprint_count_atomic(&self, id: &ProjectId) -> Result<(), ProjectError>;

    /// Number of sprints referencing the project.
    async fn try_count_sprints_for_project(&self, id: &ProjectId) -> Result<u64, ProjectError>;

    /// Number of active sprints across all of `owner`'s projects.
    async fn try_count_active_sprints_across_owner(&self, owner: &OwnerId) -> Result<u64, ProjectError>;

    /// Like [`ProjectRepository::try_count_sprints_for_project`], but a
    /// failed query counts as 0.
    async fn count_sprints_for_project(&self, id: &ProjectId) -> u64 {
        match self.try_count_sprints_for_project(id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(project_id = %id, error = %e, "Sprint count failed, reporting 0");
                0
            }
        }
    }

    /// Like [`ProjectRepository::try_count_active_sprints_across_owner`],
    /// but a failed query counts as 0.
    async fn count_active_sprints_across_owner(&self, owner: &OwnerId) -> u64 {
        match self.try_count_active_sprints_across_owner(owner).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(owner_id = %owner, error = %e, "Active sprint count failed, reporting 0");
                0
            }
        }
    }

    /// Recount every project of `owner` and commit all drifted counters in
    /// one atomic batch.
    async fn reconcile_counts(&self, owner: &OwnerId) -> Result<ReconcileReport, ProjectError>;
}
