use std::str::FromStr as _;

use anyhow::Context as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitoringConfig {
    pub logs: EnvFilterConfig,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EnvFilterConfig {
    pub default_level: String,
    #[serde(default)]
    pub filters: Vec<String>,
}

impl EnvFilterConfig {
    fn with_default_level(&self, level: &str) -> Self {
        Self {
            default_level: level.to_owned(),
            filters: self.filters.clone(),
        }
    }
}

impl TryInto<EnvFilter> for EnvFilterConfig {
    type Error = anyhow::Error;

    fn try_into(self) -> Result<EnvFilter, Self::Error> {
        //a bare word parses as a target directive, only accept real levels here
        let level = LevelFilter::from_str(&self.default_level)
            .with_context(|| format!("Invalid default log level '{}'", self.default_level))?;

        EnvFilter::builder()
            .with_default_directive(level.into())
            .parse(self.filters.join(","))
            .context("Invalid log filter")
    }
}

/// Swaps the active log filter after start-up, e.g. when debug logging is toggled in the settings.
#[derive(Clone)]
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    base: EnvFilterConfig,
}

impl LogLevelHandle {
    pub fn set_debug(&self, enabled: bool) -> anyhow::Result<()> {
        let config = if enabled {
            self.base.with_default_level("debug")
        } else {
            self.base.clone()
        };

        let level = config.default_level.clone();
        let filter: EnvFilter = config.try_into()?;
        self.handle.reload(filter).context("Error reloading log filter")?;

        tracing::info!("Log level set to {}", level);
        Ok(())
    }
}

impl MonitoringConfig {
    pub fn init(&self, debug_enabled: bool) -> anyhow::Result<LogLevelHandle> {
        let start_config = if debug_enabled {
            self.logs.with_default_level("debug")
        } else {
            self.logs.clone()
        };

        let filter: EnvFilter = start_config.try_into()?;
        let (filter_layer, handle) = reload::Layer::new(filter);

        let json_layer = self.json.then(|| tracing_subscriber::fmt::layer().json());
        let text_layer = (!self.json).then(tracing_subscriber::fmt::layer);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(json_layer)
            .with(text_layer)
            .try_init()
            .context("Error initializing tracing subscriber")?;

        Ok(LogLevelHandle {
            handle,
            base: self.logs.clone(),
        })
    }
}
