// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the storeplane control plane.

use std::path::PathBuf;
use std::time::Duration;

/// Control plane configuration loaded from environment variables.
///
/// Every key is optional; defaults target a local single-node setup
/// (file-backed SQLite, `*.localhost` store domains, plain HTTP).
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL (source of truth for store state)
    pub database_url: String,
    /// Port for the REST listener
    pub http_port: u16,
    /// Suffix for store domains (`<name>.<base_domain>`)
    pub base_domain: String,
    /// Serve store URLs as https instead of http
    pub tls_enabled: bool,
    /// Helm chart directory
    pub helm_chart_path: PathBuf,
    /// Base values file, relative to the chart directory
    pub helm_values_file: String,
    /// Environment overrides values file, relative to the chart directory
    pub helm_env_values_file: String,
    /// Execution timeout for `helm install`
    pub helm_install_timeout: Duration,
    /// Execution timeout for `helm uninstall`
    pub helm_uninstall_timeout: Duration,
    /// Overall readiness timeout per store (Helm CLI time excluded)
    pub provisioning_timeout: Duration,
    /// Cadence of the readiness poll loop
    pub provisioning_poll_interval: Duration,
    /// Ceiling on simultaneously running provisioning tasks
    pub provisioning_max_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:storeplane.db?mode=rwc".to_string(),
            http_port: 5000,
            base_domain: "localhost".to_string(),
            tls_enabled: false,
            helm_chart_path: PathBuf::from("helm/store"),
            helm_values_file: "values.yaml".to_string(),
            helm_env_values_file: "values-local.yaml".to_string(),
            helm_install_timeout: Duration::from_secs(300),
            helm_uninstall_timeout: Duration::from_secs(120),
            provisioning_timeout: Duration::from_secs(600),
            provisioning_poll_interval: Duration::from_secs(5),
            provisioning_max_workers: 5,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `KUBECONFIG` is deliberately not read here: the kube client honors
    /// it through its own config inference.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            http_port: parse_env("HTTP_PORT", defaults.http_port)?,
            base_domain: std::env::var("BASE_DOMAIN").unwrap_or(defaults.base_domain),
            tls_enabled: parse_env_bool("TLS_ENABLED", defaults.tls_enabled),
            helm_chart_path: std::env::var("HELM_CHART_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.helm_chart_path),
            helm_values_file: std::env::var("HELM_VALUES_FILE")
                .unwrap_or(defaults.helm_values_file),
            helm_env_values_file: std::env::var("HELM_ENV_VALUES_FILE")
                .unwrap_or(defaults.helm_env_values_file),
            helm_install_timeout: parse_env_secs(
                "HELM_INSTALL_TIMEOUT_SECONDS",
                defaults.helm_install_timeout,
            )?,
            helm_uninstall_timeout: parse_env_secs(
                "HELM_UNINSTALL_TIMEOUT_SECONDS",
                defaults.helm_uninstall_timeout,
            )?,
            provisioning_timeout: parse_env_secs(
                "PROVISIONING_TIMEOUT_SECONDS",
                defaults.provisioning_timeout,
            )?,
            provisioning_poll_interval: parse_env_secs(
                "PROVISIONING_POLL_INTERVAL_SECONDS",
                defaults.provisioning_poll_interval,
            )?,
            provisioning_max_workers: parse_env(
                "PROVISIONING_MAX_WORKERS",
                defaults.provisioning_max_workers,
            )?,
        })
    }

    /// Scheme used when assembling store URLs.
    pub fn store_scheme(&self) -> &'static str {
        if self.tls_enabled { "https" } else { "http" }
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_env_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(parse_env(key, default.as_secs())?))
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds an unparseable value.
    #[error("Invalid value for {key}: {value}")]
    Invalid {
        /// The offending variable.
        key: &'static str,
        /// The raw value found.
        value: String,
    },
}
