mod directive;
mod thermal;

#[cfg(test)]
pub use thermal::TemperatureReading;
pub use thermal::TemperatureSnapshot;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use directive::parse_directive;
use thermal::detect_runaway;

use futures::future::join_all;

use crate::{
    command::{ActionHandle, ActionKind, CommandClient},
    port::{PrinterHost, SwitchDriver},
    switch::SwitchState,
};

const SHUTDOWN_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Maps instruction-stream directives and temperature samples onto scheduled dispatcher calls.
/// Never blocks the caller on device I/O.
pub struct TriggerRouter<D, H> {
    client: CommandClient<D, H>,
    check_active: Arc<AtomicBool>,
}

impl<D: SwitchDriver, H: PrinterHost> TriggerRouter<D, H> {
    pub fn new(client: CommandClient<D, H>) -> Self {
        Self {
            client,
            check_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Schedules the power action of a directive line. Lines that are not directives, or target
    /// switches not enabled for directives, are left alone.
    pub fn route_line(&self, line: &str) -> Option<ActionHandle> {
        let directive = parse_directive(line)?;
        let address = directive.address();

        let snapshot = self.client.config().snapshot();
        let switch = match snapshot.registry.lookup(address) {
            Ok(switch) => switch,
            Err(e) => {
                tracing::warn!("Ignoring directive '{}': {}", line.trim_end(), e);
                return None;
            }
        };

        if !switch.gcode_enabled {
            tracing::debug!("Directives are disabled for {}, ignoring '{}'", address, line.trim_end());
            return None;
        }

        let client = self.client.clone();
        let target = address.to_owned();

        let handle = if directive.is_power_on() {
            tracing::debug!("Received power on directive for {}", address);
            self.client
                .scheduler()
                .schedule(switch.gcode_on_after(), ActionKind::PowerOn, Some(address), async move {
                    if let Err(e) = client.turn_on(&target).await {
                        tracing::error!("Directive power on of {} failed: {}", target, e);
                    }
                })
        } else {
            tracing::debug!("Received power off directive for {}", address);
            self.client
                .scheduler()
                .schedule(switch.gcode_off_after(), ActionKind::PowerOff, Some(address), async move {
                    if let Err(e) = client.turn_off_unless_printing(&target).await {
                        tracing::error!("Directive power off of {} failed: {}", target, e);
                    }
                })
        };

        Some(handle)
    }

    /// Schedules evaluation of a temperature sample. The sample is dropped while an earlier
    /// check is still pending or running, so a hot printer doesn't pile up shutdowns.
    pub fn on_temperatures(&self, snapshot: TemperatureSnapshot) -> Option<ActionHandle> {
        if !self.client.config().snapshot().thermal.monitoring_enabled {
            return None;
        }

        if self.check_active.swap(true, Ordering::SeqCst) {
            tracing::trace!("Thermal check still active, skipping sample");
            return None;
        }

        let active = ActiveCheck(self.check_active.clone());
        let client = self.client.clone();

        let handle = self
            .client
            .scheduler()
            .schedule(Duration::ZERO, ActionKind::ThermalCheck, None, async move {
                let _active = active;
                check_temperatures(client, snapshot).await;
            });

        Some(handle)
    }
}

//clears the flag also when the check is cancelled before it ran
struct ActiveCheck(Arc<AtomicBool>);

impl Drop for ActiveCheck {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn check_temperatures<D: SwitchDriver, H: PrinterHost>(
    client: CommandClient<D, H>,
    snapshot: TemperatureSnapshot,
) {
    let runaway = detect_runaway(&snapshot, &client.config().snapshot().thermal);

    if runaway.is_empty() {
        return;
    }

    for hot in &runaway {
        tracing::warn!(
            "Thermal runaway of {:?} heater {}: {:.1} above limit {:.1} with target {:.1}",
            hot.heater,
            hot.channel,
            hot.reading.actual,
            hot.limit,
            hot.reading.target
        );
    }

    shut_down_for_runaway(client).await;
}

async fn shut_down_for_runaway<D: SwitchDriver, H: PrinterHost>(client: CommandClient<D, H>) {
    let snapshot = client.config().snapshot();
    let addresses: Vec<String> = snapshot
        .registry
        .thermal_runaway_enabled()
        .map(|switch| switch.address.clone())
        .collect();

    if addresses.is_empty() {
        tracing::warn!("Thermal runaway detected but no switch has thermal shutdown enabled");
        return;
    }

    let shutdowns = addresses.iter().map(|address| {
        let client = client.clone();
        //subscribe before acting so the resulting event can't be missed
        let mut events = client.subscribe();

        async move {
            tracing::info!("Thermal runaway, powering off {}", address);

            if let Err(e) = client.turn_off(address).await {
                tracing::error!("Thermal shutdown of {} failed: {}", address, e);
                return;
            }

            //earlier events for the address may still be buffered, only an off report counts
            let confirmed = events
                .recv_matching(SHUTDOWN_CONFIRMATION_TIMEOUT, |event| {
                    event.address == *address && event.current_state == SwitchState::Off
                })
                .await;

            match confirmed {
                Some(_) => tracing::info!("Thermal shutdown of {} confirmed", address),
                None => tracing::error!("Thermal shutdown of {} not confirmed, device did not report off", address),
            }
        }
    });

    join_all(shutdowns).await;
}
