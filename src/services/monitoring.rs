// src/services/monitoring.rs
//! Optional Sentry error reporting.
//!
//! Enabled only when `SENTRY_DSN` is set; the returned guard must live as long
//! as the process so buffered events are flushed on shutdown.

use std::env;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct MonitoringConfig {
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub traces_sample_rate: f32,
}

impl MonitoringConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            sentry_dsn: lookup("SENTRY_DSN")
                .map(|dsn| dsn.trim().to_string())
                .filter(|dsn| !dsn.is_empty()),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            traces_sample_rate: lookup("SENTRY_TRACES_SAMPLE_RATE")
                .and_then(|rate| rate.parse::<f32>().ok())
                .filter(|rate| (0.0..=1.0).contains(rate))
                .unwrap_or(0.0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sentry_dsn.is_some()
    }
}

/// Initializes the Sentry client, or returns `None` when no DSN is configured.
pub fn init_sentry(config: &MonitoringConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_deref()?;

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            traces_sample_rate: config.traces_sample_rate,
            ..Default::default()
        },
    ));

    info!(environment = %config.environment, "Sentry initialized");
    Some(guard)
}
