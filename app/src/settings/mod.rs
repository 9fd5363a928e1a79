mod migration;

pub use migration::{CURRENT_VERSION, migrate};

use std::time::Duration;

use anyhow::Context as _;
use config::{Config, Environment, File};
use infrastructure::{HttpServerConfig, LogLevelHandle, MonitoringConfig};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    adapter::{api::ApiSettings, shell::ShellSettings},
    switch::{ConfigHandle, ControlConfig, SwitchConfig, SwitchError, SwitchRegistry, ThermalThresholds},
};

pub const CONFIG_PATH_VAR: &str = "PRINTSWITCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub http_server: HttpServerConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub settings_version: u64,
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
    #[serde(default)]
    pub thermal_runaway_monitoring: bool,
    #[serde(default)]
    pub thermal_runaway_max_bed: f64,
    #[serde(default)]
    pub thermal_runaway_max_extruder: f64,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub shell: ShellSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_polling_interval")]
    pub interval_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_polling_interval(),
        }
    }
}

fn default_polling_interval() -> u64 {
    15 * 60
}

impl PollingSettings {
    /// Polling interval, if polling is enabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.enabled && self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned())
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("PRINTSWITCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api.api_keys"),
            )
            .build()
            .with_context(|| format!("Error reading configuration from {}", path))?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> anyhow::Result<Self> {
        let mut document: Value = config
            .try_deserialize()
            .context("Error reading configuration document")?;

        migrate(&mut document);

        serde_json::from_value(document).context("Error deserializing settings")
    }

    pub fn thermal_thresholds(&self) -> ThermalThresholds {
        ThermalThresholds {
            max_bed_temp: self.thermal_runaway_max_bed,
            max_extruder_temp: self.thermal_runaway_max_extruder,
            monitoring_enabled: self.thermal_runaway_monitoring,
        }
    }

    pub fn control_config(&self) -> Result<ControlConfig, SwitchError> {
        Ok(ControlConfig {
            registry: SwitchRegistry::new(self.switches.clone())?,
            thermal: self.thermal_thresholds(),
        })
    }
}

/// Re-reads the configuration file and swaps the control configuration in one step.
#[derive(Clone)]
pub struct SettingsReloader {
    path: String,
    config: ConfigHandle,
    log_level: Option<LogLevelHandle>,
}

impl SettingsReloader {
    pub fn new(path: impl Into<String>, config: ConfigHandle, log_level: Option<LogLevelHandle>) -> Self {
        Self {
            path: path.into(),
            config,
            log_level,
        }
    }

    /// On any error the active configuration stays in place.
    pub fn reload(&self) -> anyhow::Result<Settings> {
        let settings = Settings::load(&self.path)?;
        self.apply(settings)
    }

    fn apply(&self, settings: Settings) -> anyhow::Result<Settings> {
        let control = settings
            .control_config()
            .context("Rejecting reloaded settings")?;

        let switch_count = control.registry.len();
        self.config.replace(control);

        if let Some(log_level) = &self.log_level {
            log_level.set_debug(settings.debug_logging)?;
        }

        tracing::info!("Settings reloaded with {} switches", switch_count);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;

    fn settings(toml: &str) -> Settings {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();

        Settings::from_config(config).unwrap()
    }

    const BASE: &str = r#"
        settings_version = 2
        thermal_runaway_monitoring = true
        thermal_runaway_max_bed = 120
        thermal_runaway_max_extruder = 280.5

        [http_server]
        port = 5000

        [monitoring.logs]
        default_level = "info"

        [api]
        api_keys = ["secret"]

        [[switches]]
        ip = "10.0.0.5"
        label = "Printer"
        gcode_enabled = true
        gcode_on_delay = 2.5
        thermal_runaway = true
    "#;

    #[test]
    fn reads_switches_and_thresholds() {
        let settings = settings(BASE);

        assert_eq!(settings.http_server.port, 5000);
        assert_eq!(settings.api.api_keys, vec!["secret".to_owned()]);
        assert_eq!(settings.switches.len(), 1);
        assert_eq!(settings.switches[0].address, "10.0.0.5");
        assert!(settings.switches[0].thermal_runaway_enabled);
        assert_eq!(settings.switches[0].gcode_on_after(), Duration::from_millis(2500));

        let thermal = settings.thermal_thresholds();
        assert!(thermal.monitoring_enabled);
        assert_eq!(thermal.max_bed_temp, 120.0);
        assert_eq!(thermal.max_extruder_temp, 280.5);
    }

    #[test]
    fn polling_is_off_by_default() {
        let settings = settings(BASE);

        assert!(!settings.polling.enabled);
        assert_eq!(settings.polling.interval_secs, 900);
        assert_eq!(settings.polling.interval(), None);
    }

    #[test]
    fn old_documents_are_migrated_on_load() {
        let old = BASE
            .replace("settings_version = 2", "settings_version = 1")
            .replace("thermal_runaway = true", "");
        let settings = settings(&old);

        assert_eq!(settings.settings_version, CURRENT_VERSION);
        assert_eq!(settings.switches.len(), 1);
        assert!(!settings.switches[0].thermal_runaway_enabled);
    }

    #[test]
    fn rejected_reload_keeps_previous_config() {
        let valid = settings(BASE);
        let handle = ConfigHandle::new(valid.control_config().unwrap());
        let reloader = SettingsReloader::new("unused.toml", handle.clone(), None);

        let mut duplicate = valid.clone();
        duplicate.switches.push(SwitchConfig::new("10.0.0.5"));

        assert!(reloader.apply(duplicate).is_err());
        assert_eq!(handle.snapshot().registry.len(), 1);

        let mut extended = valid;
        extended.switches.push(SwitchConfig::new("10.0.0.6"));

        assert!(reloader.apply(extended).is_ok());
        assert_eq!(handle.snapshot().registry.len(), 2);
    }
}
