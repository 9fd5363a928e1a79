use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One configured smart switch, keyed by its network address.
///
/// Field names follow the persisted settings schema. Fields missing from a stored record
/// deserialize to their disabled value, so records written by older versions keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchConfig {
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub display_warning: bool,
    #[serde(default)]
    pub warn_printing: bool,
    #[serde(rename = "thermal_runaway", default)]
    pub thermal_runaway_enabled: bool,
    #[serde(default)]
    pub gcode_enabled: bool,
    #[serde(default)]
    pub gcode_on_delay: f64,
    #[serde(default)]
    pub gcode_off_delay: f64,
    #[serde(default)]
    pub auto_connect: bool,
    #[serde(default)]
    pub auto_connect_delay: f64,
    #[serde(default)]
    pub auto_disconnect: bool,
    #[serde(default)]
    pub auto_disconnect_delay: f64,
    #[serde(rename = "sys_cmd_on", default)]
    pub aux_command_on_enabled: bool,
    #[serde(rename = "sys_run_cmd_on", default)]
    pub aux_run_command_on: String,
    #[serde(rename = "sys_cmd_on_delay", default)]
    pub aux_command_on_delay: f64,
    #[serde(rename = "sys_cmd_off", default)]
    pub aux_command_off_enabled: bool,
    #[serde(rename = "sys_run_cmd_off", default)]
    pub aux_run_command_off: String,
    #[serde(rename = "sys_cmd_off_delay", default)]
    pub aux_command_off_delay: f64,
    #[serde(default)]
    pub current_state: SwitchState,
    #[serde(default)]
    pub btn_color: String,
}

/// Auxiliary system command attached to a power action.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxCommand {
    pub command: String,
    pub delay: Duration,
}

impl SwitchConfig {
    /// A new record with the defaults the settings UI starts from.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: String::new(),
            icon: "icon-bolt".to_owned(),
            display_warning: true,
            warn_printing: false,
            thermal_runaway_enabled: false,
            gcode_enabled: false,
            gcode_on_delay: 1.0,
            gcode_off_delay: 1.0,
            auto_connect: true,
            auto_connect_delay: 10.0,
            auto_disconnect: true,
            auto_disconnect_delay: 0.0,
            aux_command_on_enabled: false,
            aux_run_command_on: String::new(),
            aux_command_on_delay: 0.0,
            aux_command_off_enabled: false,
            aux_run_command_off: String::new(),
            aux_command_off_delay: 0.0,
            current_state: SwitchState::Unknown,
            btn_color: "#808080".to_owned(),
        }
    }

    pub fn gcode_on_after(&self) -> Duration {
        delay(self.gcode_on_delay)
    }

    pub fn gcode_off_after(&self) -> Duration {
        delay(self.gcode_off_delay)
    }

    /// Delay before reconnecting the printer after power-on, if enabled.
    pub fn reconnect_after(&self) -> Option<Duration> {
        self.auto_connect.then(|| delay(self.auto_connect_delay))
    }

    /// Time to wait after disconnecting the printer before cutting power, if enabled.
    pub fn disconnect_wait(&self) -> Option<Duration> {
        self.auto_disconnect.then(|| delay(self.auto_disconnect_delay))
    }

    pub fn aux_command_on(&self) -> Option<AuxCommand> {
        aux_command(self.aux_command_on_enabled, &self.aux_run_command_on, self.aux_command_on_delay)
    }

    pub fn aux_command_off(&self) -> Option<AuxCommand> {
        aux_command(self.aux_command_off_enabled, &self.aux_run_command_off, self.aux_command_off_delay)
    }

    pub(super) fn delays(&self) -> [(&'static str, f64); 6] {
        [
            ("gcode_on_delay", self.gcode_on_delay),
            ("gcode_off_delay", self.gcode_off_delay),
            ("auto_connect_delay", self.auto_connect_delay),
            ("auto_disconnect_delay", self.auto_disconnect_delay),
            ("sys_cmd_on_delay", self.aux_command_on_delay),
            ("sys_cmd_off_delay", self.aux_command_off_delay),
        ]
    }
}

fn aux_command(enabled: bool, command: &str, delay_secs: f64) -> Option<AuxCommand> {
    if !enabled || command.trim().is_empty() {
        return None;
    }

    Some(AuxCommand {
        command: command.to_owned(),
        delay: delay(delay_secs),
    })
}

//registry validation bounds delays, saturate anyway so a huge value never fires early
fn delay(secs: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(delay) => delay,
        Err(_) if secs > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
    #[default]
    Unknown,
}

impl SwitchState {
    /// Maps the binary-state code reported by a switch. Standby (8) means the relay is closed.
    pub fn from_raw(code: i32) -> Self {
        match code {
            1 | 8 => SwitchState::On,
            0 => SwitchState::Off,
            _ => SwitchState::Unknown,
        }
    }
}

/// Last thing the dispatcher learned about a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchObservation {
    pub state: SwitchState,
    pub reachable: bool,
}

impl SwitchObservation {
    pub fn reachable(state: SwitchState) -> Self {
        Self { state, reachable: true }
    }

    pub fn unreachable() -> Self {
        Self {
            state: SwitchState::Unknown,
            reachable: false,
        }
    }
}

/// State change pushed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchStateEvent {
    #[serde(rename = "ip")]
    pub address: String,
    #[serde(rename = "currentState")]
    pub current_state: SwitchState,
    pub reachable: bool,
}

impl SwitchStateEvent {
    pub fn new(address: impl Into<String>, observation: SwitchObservation) -> Self {
        Self {
            address: address.into(),
            current_state: observation.state,
            reachable: observation.reachable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThermalThresholds {
    pub max_bed_temp: f64,
    pub max_extruder_temp: f64,
    pub monitoring_enabled: bool,
}
