use std::{path::Path, str::FromStr, time::Duration};

use serde::Deserialize;
use serde_with::serde_as;
use strum::{Display, EnumString};

use crate::domain::models::OwnerId;

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub store: StoreSettings,
    pub reconcile: ReconcileSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    /// Default tracing filter, used when `RUST_LOG` is unset.
    pub log_level: String,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// Empty in-process store, discarded on exit. Dry runs only.
    Memory,
    Firestore,
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
pub struct StoreSettings {
    pub backend: Backend,
    pub project_id: Option<String>,
    pub database: String,
    /// When set, requests go to the local emulator without credentials.
    pub emulator_host: Option<String>,
    pub access_token: Option<String>,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub request_timeout_secs: u64,
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub poll_interval_secs: u64,
}

impl StoreSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[serde_as]
#[derive(Deserialize, Clone, Debug)]
pub struct ReconcileSettings {
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub interval_secs: u64,
    #[serde(default)]
    pub owners: Vec<String>,
}

impl ReconcileSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn owner_ids(&self) -> Vec<OwnerId> {
        self.owners.iter().map(OwnerId::new).collect()
    }
}

/// Read settings from `./config`, for the environment named by
/// `APP_ENVIRONMENT` (default `local`).
pub fn read_config() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

    let environment = Environment::from_str(
        std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .as_str(),
    )
    .map_err(|e| config::ConfigError::Message(format!("Failed to parse APP_ENVIRONMENT: {e}")))?;

    read_config_from(&base_path.join("config"), &environment)
}

pub fn read_config_from(
    config_directory: &Path,
    environment: &Environment,
) -> Result<Settings, config::ConfigError> {
    let environment_filename = format!("{}.yaml", environment);

    let settings = config::Config::builder()
        .add_source(config::File::from(config_directory.join("base.yaml")))
        .add_source(config::File::from(
            config_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("POKERPLAN")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("reconcile.owners")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[derive(Display, Debug, EnumString)]
pub enum Environment {
    #[strum(ascii_case_insensitive, serialize = "local")]
    Local,
    #[strum(ascii_case_insensitive, serialize = "production")]
    Production,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn config_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
    }

    #[test]
    fn base_settings_default_to_the_memory_backend() {
        let settings = config::Config::builder()
            .add_source(config::File::from(config_dir().join("base.yaml")))
            .build()
            .unwrap()
            .try_deserialize::<Settings>()
            .unwrap();

        assert_eq!(settings.store.backend, Backend::Memory);
    }

    #[test]
    fn local_settings_target_the_emulator() {
        let settings = read_config_from(&config_dir(), &Environment::Local).unwrap();

        assert_eq!(settings.store.backend, Backend::Firestore);
        assert_eq!(settings.store.emulator_host.as_deref(), Some("localhost:8080"));
        assert_eq!(settings.store.project_id.as_deref(), Some("pokerplan-local"));
        assert_eq!(settings.store.database, "(default)");
        assert_eq!(settings.reconcile.interval(), Duration::from_secs(60));
    }

    #[test]
    fn production_settings_use_firestore() {
        let settings = read_config_from(&config_dir(), &Environment::Production).unwrap();

        assert_eq!(settings.store.backend, Backend::Firestore);
        assert!(settings.store.emulator_host.is_none());
        assert_eq!(settings.reconcile.interval(), Duration::from_secs(3600));
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert!(matches!(
            Environment::from_str("PRODUCTION"),
            Ok(Environment::Production)
        ));
        assert!(Environment::from_str("staging").is_err());
    }

    #[test]
    fn backend_names_are_lowercase() {
        assert_eq!(Backend::Firestore.to_string(), "firestore");
        assert_eq!(Backend::from_str("memory").unwrap(), Backend::Memory);
    }
}
