use serde_json::{Map, Value};

pub const CURRENT_VERSION: u64 = 2;

const VERSION_KEY: &str = "settings_version";
const SWITCHES_KEY: &str = "switches";

/// Brings a raw settings document up to [`CURRENT_VERSION`]. Migrations only add fields and
/// never touch values that are already present. Returns whether anything changed.
pub fn migrate(document: &mut Value) -> bool {
    let Some(root) = document.as_object_mut() else {
        tracing::warn!("Settings document is not a table, not migrating");
        return false;
    };

    let version = root.get(VERSION_KEY).and_then(Value::as_u64).unwrap_or(0);

    if version >= CURRENT_VERSION {
        if version > CURRENT_VERSION {
            tracing::warn!("Settings version {} is newer than supported version {}", version, CURRENT_VERSION);
        }
        return false;
    }

    tracing::info!("Migrating settings from version {} to {}", version, CURRENT_VERSION);

    if version < 1 {
        reset_switches(root);
    } else {
        add_thermal_runaway_flag(root);
    }

    root.insert(VERSION_KEY.to_owned(), Value::from(CURRENT_VERSION));
    true
}

//records from before versioning carry no usable schema
fn reset_switches(root: &mut Map<String, Value>) {
    let dropped = root
        .get(SWITCHES_KEY)
        .and_then(Value::as_array)
        .map_or(0, |switches| switches.len());

    if dropped > 0 {
        tracing::warn!("Discarding {} unversioned switch records", dropped);
    }

    root.insert(SWITCHES_KEY.to_owned(), Value::Array(vec![]));
}

fn add_thermal_runaway_flag(root: &mut Map<String, Value>) {
    let Some(switches) = root.get_mut(SWITCHES_KEY).and_then(Value::as_array_mut) else {
        return;
    };

    for switch in switches.iter_mut().filter_map(Value::as_object_mut) {
        switch.entry("thermal_runaway").or_insert(Value::Bool(false));
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn version_one_gains_thermal_flag() {
        let mut document = json!({
            "settings_version": 1,
            "switches": [
                { "ip": "10.0.0.5", "label": "Printer", "gcode_enabled": true },
                { "ip": "10.0.0.6", "thermal_runaway": true }
            ]
        });

        assert!(migrate(&mut document));

        assert_json_eq!(
            document,
            json!({
                "settings_version": 2,
                "switches": [
                    { "ip": "10.0.0.5", "label": "Printer", "gcode_enabled": true, "thermal_runaway": false },
                    { "ip": "10.0.0.6", "thermal_runaway": true }
                ]
            })
        );
    }

    #[test]
    fn unversioned_switches_are_reset() {
        let mut document = json!({
            "switches": [{ "ip": "10.0.0.5" }],
            "debug_logging": true
        });

        assert!(migrate(&mut document));

        assert_json_eq!(
            document,
            json!({
                "settings_version": 2,
                "switches": [],
                "debug_logging": true
            })
        );
    }

    #[test]
    fn migrating_twice_changes_nothing() {
        let mut document = json!({
            "settings_version": 1,
            "switches": [{ "ip": "10.0.0.5" }],
            "thermal_runaway_monitoring": true
        });

        migrate(&mut document);
        let once = document.clone();

        assert!(!migrate(&mut document));
        assert_eq!(document, once);
    }

    #[test]
    fn current_version_is_untouched() {
        let mut document = json!({
            "settings_version": 2,
            "switches": [{ "ip": "10.0.0.5" }]
        });
        let before = document.clone();

        assert!(!migrate(&mut document));
        assert_eq!(document, before);
    }
}
