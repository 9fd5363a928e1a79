use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use super::{SwitchConfig, SwitchError, ThermalThresholds};

/// Longest accepted delay of any switch action, one year.
pub const MAX_DELAY_SECS: f64 = 365.0 * 24.0 * 3600.0;

/// Validated, read-only set of configured switches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwitchRegistry {
    switches: Vec<SwitchConfig>,
}

impl SwitchRegistry {
    pub fn new(switches: Vec<SwitchConfig>) -> Result<Self, SwitchError> {
        let mut seen = HashSet::new();

        for switch in &switches {
            if switch.address.trim().is_empty() {
                return Err(invalid(format!("switch '{}' has an empty address", switch.label)));
            }

            if !seen.insert(switch.address.as_str()) {
                return Err(invalid(format!("duplicate switch address {}", switch.address)));
            }

            for (name, value) in switch.delays() {
                if !(0.0..=MAX_DELAY_SECS).contains(&value) {
                    return Err(invalid(format!(
                        "{} of {} must be between 0 and {} seconds, got {}",
                        name, switch.address, MAX_DELAY_SECS, value
                    )));
                }
            }
        }

        Ok(Self { switches })
    }

    pub fn lookup(&self, address: &str) -> Result<&SwitchConfig, SwitchError> {
        self.switches
            .iter()
            .find(|switch| switch.address == address)
            .ok_or_else(|| SwitchError::unknown_device(address))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SwitchConfig> {
        self.switches.iter()
    }

    pub fn thermal_runaway_enabled(&self) -> impl Iterator<Item = &SwitchConfig> {
        self.switches.iter().filter(|switch| switch.thermal_runaway_enabled)
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}

fn invalid(reason: String) -> SwitchError {
    SwitchError::InvalidConfig { reason }
}

/// Everything the coordination core reads from the settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlConfig {
    pub registry: SwitchRegistry,
    pub thermal: ThermalThresholds,
}

/// Shared owner of the current [`ControlConfig`].
///
/// Readers take an immutable snapshot for the duration of one operation; a settings update
/// swaps the whole snapshot, so nobody observes a half-applied change.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<ControlConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: ControlConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn snapshot(&self) -> Arc<ControlConfig> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, config: ControlConfig) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SwitchRegistry {
        let mut printer = SwitchConfig::new("10.0.0.5");
        printer.label = "Printer".to_owned();
        let mut lights = SwitchConfig::new("lights.local");
        lights.label = "Lights".to_owned();

        SwitchRegistry::new(vec![printer, lights]).unwrap()
    }

    #[test]
    fn lookup_returns_exact_record() {
        let registry = registry();

        for address in ["10.0.0.5", "lights.local"] {
            assert_eq!(registry.lookup(address).unwrap().address, address);
        }
        assert_eq!(registry.lookup("lights.local").unwrap().label, "Lights");
    }

    #[test]
    fn lookup_of_unconfigured_address_fails() {
        let registry = registry();

        assert_eq!(registry.lookup("10.0.0.6"), Err(SwitchError::unknown_device("10.0.0.6")));
        assert_eq!(registry.lookup(""), Err(SwitchError::unknown_device("")));
    }

    #[test]
    fn rejects_empty_address() {
        let result = SwitchRegistry::new(vec![SwitchConfig::new("")]);

        assert!(matches!(result, Err(SwitchError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_duplicate_address() {
        let result = SwitchRegistry::new(vec![SwitchConfig::new("10.0.0.5"), SwitchConfig::new("10.0.0.5")]);

        assert!(matches!(result, Err(SwitchError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_negative_delay() {
        let mut switch = SwitchConfig::new("10.0.0.5");
        switch.gcode_off_delay = -1.0;

        assert!(matches!(
            SwitchRegistry::new(vec![switch]),
            Err(SwitchError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_delays_out_of_range() {
        for value in [1e20, f64::INFINITY, f64::NAN, MAX_DELAY_SECS + 1.0] {
            let mut switch = SwitchConfig::new("10.0.0.5");
            switch.gcode_off_delay = value;

            assert!(
                matches!(SwitchRegistry::new(vec![switch]), Err(SwitchError::InvalidConfig { .. })),
                "accepted {}",
                value
            );
        }

        let mut switch = SwitchConfig::new("10.0.0.5");
        switch.auto_connect_delay = MAX_DELAY_SECS;
        assert!(SwitchRegistry::new(vec![switch]).is_ok());
    }

    #[test]
    fn handle_swaps_whole_snapshot() {
        let handle = ConfigHandle::new(ControlConfig::default());
        let before = handle.snapshot();

        handle.replace(ControlConfig {
            registry: registry(),
            thermal: ThermalThresholds::default(),
        });

        assert!(before.registry.is_empty());
        assert_eq!(handle.snapshot().registry.len(), 2);
    }
}
