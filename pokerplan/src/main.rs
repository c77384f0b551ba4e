mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use docstore::{
    firestore::{Credentials, FirestoreClient, FirestoreOptions, FirestoreURL},
    DocumentStore, MemoryStore,
};
use pokerplan::{
    adapters::outbound::DocStoreProjectRepository,
    config::{read_config, Backend, StoreSettings},
    domain::{
        models::OwnerId,
        ports::outbound::ProjectRepository,
        services::run_reconcile_worker,
    },
};
use time::format_description::well_known::Rfc3339;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};

fn build_store(backend: Backend, settings: &StoreSettings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match backend {
        Backend::Memory => Ok(Arc::new(MemoryStore::new())),
        Backend::Firestore => {
            let project_id = settings
                .project_id
                .as_deref()
                .context("store.project_id is required for the firestore backend")?;

            let (url, credentials) = match (&settings.emulator_host, &settings.access_token) {
                (Some(host), _) => (
                    FirestoreURL::emulator(host, project_id, &settings.database),
                    Credentials::Emulator,
                ),
                (None, Some(token)) => (
                    FirestoreURL::production(project_id, &settings.database),
                    Credentials::BearerToken(token.clone()),
                ),
                (None, None) => {
                    bail!("store.access_token or store.emulator_host is required for the firestore backend")
                }
            };

            let options = FirestoreOptions {
                request_timeout: settings.request_timeout(),
                poll_interval: settings.poll_interval(),
            };
            let client = FirestoreClient::new(url, credentials, options)
                .context("Failed to build Firestore client")?;
            Ok(Arc::new(client))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::from_filename(".env.local").ok();

    let cli = Cli::parse();
    let settings = read_config().context("Failed to read configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.application.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let backend = cli.backend.unwrap_or(settings.store.backend);
    info!(%backend, "Using document store");
    let repo = Arc::new(DocStoreProjectRepository::new(build_store(
        backend,
        &settings.store,
    )?));

    match cli.command {
        Commands::Reconcile { owner } => {
            let report = repo.reconcile_counts(&OwnerId::new(owner)).await?;
            println!("Checked {} projects", report.projects_checked);
            for correction in &report.corrections {
                let stored = correction
                    .stored
                    .map_or_else(|| "missing".to_string(), |count| count.to_string());
                println!(
                    "{}: {} -> {}",
                    correction.project_id, stored, correction.actual
                );
            }
        }
        Commands::Projects { owner } => {
            let projects = repo.fetch_by_owner(&OwnerId::new(owner)).await?;
            for project in &projects {
                let created = project.created_at.format(&Rfc3339)?;
                println!(
                    "{}  {}  {} sprints  created {}",
                    project.id, project.name, project.sprints_count, created
                );
            }
        }
        Commands::Worker => {
            let worker = tokio::spawn(run_reconcile_worker(
                repo,
                settings.reconcile.owner_ids(),
                settings.reconcile.interval(),
            ));

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down reconcile worker");
            worker.abort();
        }
    }

    Ok(())
}
