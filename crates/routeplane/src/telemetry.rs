//! Tracing setup driven by configuration

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ConfigError, Configuration};
use crate::environment;

/// Trace output settings read from `routeplane.trace.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSettings {
    pub enabled: bool,
    pub level: Level,
    pub show_target: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            level: Level::INFO,
            show_target: false,
        }
    }
}

impl TraceSettings {
    pub fn from_config(config: &Configuration) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let enabled = if config.contains(environment::TRACE_ENABLED) {
            config.get_bool(environment::TRACE_ENABLED)?
        } else {
            defaults.enabled
        };
        let level = if config.contains(environment::TRACE_LEVEL) {
            config.get_parsed::<Level, _>(environment::TRACE_LEVEL)?
        } else {
            defaults.level
        };
        let show_target = if config.contains(environment::TRACE_SHOW_TARGET) {
            config.get_bool(environment::TRACE_SHOW_TARGET)?
        } else {
            defaults.show_target
        };
        Ok(Self {
            enabled,
            level,
            show_target,
        })
    }

    /// Filter directive used when `RUST_LOG` is not set.
    pub fn directive(&self) -> String {
        if !self.enabled {
            return "off".to_string();
        }
        let level = self.level.as_str().to_ascii_lowercase();
        format!("{level},routeplane={level},tower_http={level}")
    }

    /// Install the global subscriber. `RUST_LOG` takes precedence over the
    /// configured level.
    pub fn init(&self) -> Result<()> {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| self.directive().into()))
            .with(tracing_subscriber::fmt::layer().with_target(self.show_target))
            .try_init()
            .context("Failed to install tracing subscriber")
    }
}
