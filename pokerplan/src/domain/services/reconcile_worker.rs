//! Background worker for periodic sprint count reconciliation.

use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::domain::{models::OwnerId, ports::outbound::ProjectRepository};

/// Totals for one pass over all configured owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub owners: usize,
    pub projects_checked: usize,
    pub corrections: usize,
    pub errors: usize,
}

/// Reconcile every owner once.
///
/// Owners are processed sequentially. A failing owner is logged and counted,
/// and the cycle moves on.
pub async fn run_reconcile_cycle<R>(repo: &R, owners: &[OwnerId]) -> CycleStats
where
    R: ProjectRepository + ?Sized,
{
    let mut stats = CycleStats {
        owners: owners.len(),
        ..CycleStats::default()
    };

    for owner in owners {
        match repo.reconcile_counts(owner).await {
            Ok(report) => {
                info!(
                    owner_id = %owner,
                    projects = report.projects_checked,
                    corrected = report.corrections.len(),
                    "Owner reconciled"
                );
                stats.projects_checked += report.projects_checked;
                stats.corrections += report.corrections.len();
            }
            Err(e) => {
                error!(owner_id = %owner, error = %e, "Owner reconciliation failed");
                stats.errors += 1;
            }
        }
    }

    stats
}

/// Runs reconciliation for `owners` every `interval`, forever.
pub async fn run_reconcile_worker<R>(repo: Arc<R>, owners: Vec<OwnerId>, interval: Duration)
where
    R: ProjectRepository + ?Sized,
{
    info!(
        interval_secs = interval.as_secs(),
        owners = owners.len(),
        "Reconcile worker started"
    );

    let mut ticker = tokio::time::interval(interval);

    // First tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if owners.is_empty() {
            info!("No owners configured, skipping reconcile cycle");
            continue;
        }

        let stats = run_reconcile_cycle(repo.as_ref(), &owners).await;
        info!(
            owners = stats.owners,
            projects = stats.projects_checked,
            corrected = stats.corrections,
            errors = stats.errors,
            "Reconcile cycle completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::RwLock};

    use async_trait::async_trait;

    use super::*;
    use crate::domain::{
        models::{NewProject, Project, ProjectId, ProjectUpdate},
        ports::outbound::{
            CountCorrection, ErrorCallback, ProjectSubscription, ProjectsCallback, ReconcileReport,
        },
        ProjectError,
    };

    /// Repository double that only answers reconcile_counts, from a
    /// prepared table of outcomes.
    #[derive(Default)]
    struct MockRepository {
        outcomes: HashMap<OwnerId, Result<ReconcileReport, ProjectError>>,
        calls: RwLock<Vec<OwnerId>>,
    }

    #[async_trait]
    impl ProjectRepository for MockRepository {
        async fn create(&self, _: &NewProject, _: &OwnerId) -> Result<ProjectId, ProjectError> {
            unimplemented!()
        }

        async fn fetch_by_owner(&self, _: &OwnerId) -> Result<Vec<Project>, ProjectError> {
            unimplemented!()
        }

        async fn fetch_one(&self, _: &ProjectId) -> Result<Option<Project>, ProjectError> {
            unimplemented!()
        }

        async fn update(&self, _: &ProjectId, _: &ProjectUpdate) -> Result<(), ProjectError> {
            unimplemented!()
        }

        async fn delete(&self, _: &ProjectId) -> Result<(), ProjectError> {
            unimplemented!()
        }

        async fn delete_cascade(&self, _: &ProjectId) -> Result<usize, ProjectError> {
            unimplemented!()
        }

        async fn subscribe(
            &self,
            _: &OwnerId,
            _: ProjectsCallback,
            _: ErrorCallback,
        ) -> Result<ProjectSubscription, ProjectError> {
            unimplemented!()
        }

        async fn increment_sprint_count(&self, _: &ProjectId) -> Result<(), ProjectError> {
            unimplemented!()
        }

        async fn increment_sprint_count_atomic(&self, _: &ProjectId) -> Result<(), ProjectError> {
            unimplemented!()
        }

        async fn try_count_sprints_for_project(&self, _: &ProjectId) -> Result<u64, ProjectError> {
            unimplemented!()
        }

        async fn try_count_active_sprints_across_owner(
            &self,
            _: &OwnerId,
        ) -> Result<u64, ProjectError> {
            unimplemented!()
        }

        async fn reconcile_counts(&self, owner: &OwnerId) -> Result<ReconcileReport, ProjectError> {
            self.calls.write().unwrap().push(owner.clone());
            self.outcomes
                .get(owner)
                .cloned()
                .unwrap_or_else(|| Ok(ReconcileReport::default()))
        }
    }

    fn report(projects_checked: usize, corrected: usize) -> ReconcileReport {
        ReconcileReport {
            projects_checked,
            corrections: (0..corrected)
                .map(|i| CountCorrection {
                    project_id: ProjectId::new(format!("project_{i}")),
                    stored: Some(0),
                    actual: 1,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn cycle_sums_reports_across_owners() {
        let mut repo = MockRepository::default();
        repo.outcomes.insert(OwnerId::new("a"), Ok(report(3, 1)));
        repo.outcomes.insert(OwnerId::new("b"), Ok(report(2, 2)));

        let stats = run_reconcile_cycle(&repo, &[OwnerId::new("a"), OwnerId::new("b")]).await;

        assert_eq!(
            stats,
            CycleStats {
                owners: 2,
                projects_checked: 5,
                corrections: 3,
                errors: 0,
            }
        );
    }

    #[tokio::test]
    async fn failing_owner_does_not_stop_the_cycle() {
        let mut repo = MockRepository::default();
        repo.outcomes.insert(
            OwnerId::new("a"),
            Err(ProjectError::Sync("store unavailable".into())),
        );
        repo.outcomes.insert(OwnerId::new("b"), Ok(report(1, 0)));
        let owners = [OwnerId::new("a"), OwnerId::new("b")];

        let stats = run_reconcile_cycle(&repo, &owners).await;

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.projects_checked, 1);
        assert_eq!(*repo.calls.read().unwrap(), owners.to_vec());
    }

    #[tokio::test]
    async fn cycle_against_document_store_fixes_counts() {
        use crate::adapters::outbound::DocStoreProjectRepository;
        use docstore::{DocumentStore, FieldValue, FieldWrites, MemoryStore};

        let store = MemoryStore::new();
        let repo = DocStoreProjectRepository::new(store.clone());
        let owner = OwnerId::new("user-1");
        let id = repo.create(&NewProject::new("Apollo"), &owner).await.unwrap();

        let mut sprint = FieldWrites::new();
        sprint.insert("projectId".into(), FieldValue::value(id.as_str()));
        sprint.insert("status".into(), FieldValue::value("active"));
        store.set("sprints", "s1", sprint).await.unwrap();

        let stats = run_reconcile_cycle(&repo, &[owner]).await;

        assert_eq!(stats.corrections, 1);
        assert_eq!(repo.fetch_one(&id).await.unwrap().unwrap().sprints_count, 1);
    }
}
