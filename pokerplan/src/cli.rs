use clap::{Parser, Subcommand};
use pokerplan::config::Backend;

#[derive(Debug, Parser)]
#[command(name = "pokerplan")]
#[command(about = "Planning poker project store maintenance")]
pub struct Cli {
    /// Document store to use, overriding the configured backend.
    /// `memory` starts empty, so it only suits dry runs
    #[arg(long, global = true, value_enum)]
    pub backend: Option<Backend>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Recount the sprints of every project owned by a user, once
    Reconcile {
        #[arg(long)]
        owner: String,
    },
    /// List a user's projects, newest first
    Projects {
        #[arg(long)]
        owner: String,
    },
    /// Reconcile the configured owners periodically until Ctrl-C
    Worker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reconcile_with_backend_override() {
        let cli = Cli::try_parse_from([
            "pokerplan",
            "reconcile",
            "--owner",
            "user-1",
            "--backend",
            "firestore",
        ])
        .unwrap();

        assert_eq!(cli.backend, Some(Backend::Firestore));
        assert!(matches!(cli.command, Commands::Reconcile { owner } if owner == "user-1"));
    }

    #[test]
    fn projects_requires_an_owner() {
        assert!(Cli::try_parse_from(["pokerplan", "projects"]).is_err());
    }
}
