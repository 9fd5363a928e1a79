use std::collections::BTreeMap;

use serde::Deserialize;

use crate::switch::ThermalThresholds;

/// One telemetry channel of a temperature sample.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TemperatureReading {
    pub actual: f64,
    pub target: f64,
}

impl TemperatureReading {
    fn heating(&self) -> bool {
        self.target > 0.0
    }
}

pub type TemperatureSnapshot = BTreeMap<String, TemperatureReading>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heater {
    Bed,
    Extruder,
}

impl Heater {
    pub fn classify(channel: &str) -> Option<Self> {
        let numbered = |prefix: &str| {
            channel
                .strip_prefix(prefix)
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        };

        match channel {
            "bed" | "B" => Some(Heater::Bed),
            "T" | "extruder" => Some(Heater::Extruder),
            _ if numbered("T") || numbered("tool") || numbered("extruder-") => Some(Heater::Extruder),
            _ => None,
        }
    }
}

/// A heater that is commanded on and above its ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RunawayReading {
    pub channel: String,
    pub heater: Heater,
    pub reading: TemperatureReading,
    pub limit: f64,
}

/// Channels of the snapshot in thermal runaway. Empty when monitoring is disabled.
pub fn detect_runaway(snapshot: &TemperatureSnapshot, thresholds: &ThermalThresholds) -> Vec<RunawayReading> {
    if !thresholds.monitoring_enabled {
        return vec![];
    }

    snapshot
        .iter()
        .filter_map(|(channel, reading)| {
            let heater = Heater::classify(channel)?;
            let limit = match heater {
                Heater::Bed => thresholds.max_bed_temp,
                Heater::Extruder => thresholds.max_extruder_temp,
            };

            (reading.heating() && reading.actual > limit).then(|| RunawayReading {
                channel: channel.clone(),
                heater,
                reading: *reading,
                limit,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ThermalThresholds {
        ThermalThresholds {
            max_bed_temp: 120.0,
            max_extruder_temp: 280.0,
            monitoring_enabled: true,
        }
    }

    fn snapshot(readings: &[(&str, f64, f64)]) -> TemperatureSnapshot {
        readings
            .iter()
            .map(|(channel, actual, target)| {
                (
                    channel.to_string(),
                    TemperatureReading {
                        actual: *actual,
                        target: *target,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn classifies_channel_names() {
        assert_eq!(Heater::classify("bed"), Some(Heater::Bed));
        assert_eq!(Heater::classify("B"), Some(Heater::Bed));
        assert_eq!(Heater::classify("T"), Some(Heater::Extruder));
        assert_eq!(Heater::classify("T1"), Some(Heater::Extruder));
        assert_eq!(Heater::classify("tool0"), Some(Heater::Extruder));
        assert_eq!(Heater::classify("extruder-2"), Some(Heater::Extruder));
        assert_eq!(Heater::classify("chamber"), None);
        assert_eq!(Heater::classify("Tx"), None);
        assert_eq!(Heater::classify("tool"), None);
    }

    #[test]
    fn hot_bed_with_target_is_runaway() {
        let runaway = detect_runaway(&snapshot(&[("bed", 121.0, 5.0), ("tool0", 200.0, 210.0)]), &thresholds());

        assert_eq!(runaway.len(), 1);
        assert_eq!(runaway[0].channel, "bed");
        assert_eq!(runaway[0].heater, Heater::Bed);
        assert_eq!(runaway[0].limit, 120.0);
    }

    #[test]
    fn heater_without_target_is_not_runaway() {
        assert!(detect_runaway(&snapshot(&[("bed", 150.0, 0.0), ("tool0", 300.0, 0.0)]), &thresholds()).is_empty());
    }

    #[test]
    fn limit_itself_is_not_exceeded() {
        assert!(detect_runaway(&snapshot(&[("bed", 120.0, 60.0)]), &thresholds()).is_empty());
    }

    #[test]
    fn extruder_uses_extruder_limit() {
        let runaway = detect_runaway(&snapshot(&[("extruder-1", 281.0, 250.0), ("bed", 119.0, 60.0)]), &thresholds());

        assert_eq!(runaway.len(), 1);
        assert_eq!(runaway[0].heater, Heater::Extruder);
    }

    #[test]
    fn disabled_monitoring_never_triggers() {
        let mut thresholds = thresholds();
        thresholds.monitoring_enabled = false;

        assert!(detect_runaway(&snapshot(&[("bed", 500.0, 60.0)]), &thresholds).is_empty());
    }
}
