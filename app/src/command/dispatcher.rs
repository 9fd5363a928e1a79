use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use infrastructure::{EventEmitter, EventListener};
use tokio::sync::OwnedMutexGuard;

use super::scheduler::{ActionKind, ActionScheduler};
use crate::port::{PrinterHost, SwitchDriver};
use crate::switch::{ConfigHandle, SwitchConfig, SwitchError, SwitchObservation, SwitchState, SwitchStateEvent};

/// Turns power intents into guarded step sequences against a switch and reports the outcome.
pub struct CommandDispatcher<D, H> {
    config: ConfigHandle,
    driver: Arc<D>,
    host: Arc<H>,
    scheduler: ActionScheduler,
    events: EventEmitter<SwitchStateEvent>,
    observed: Mutex<HashMap<String, SwitchObservation>>,
    device_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<D: SwitchDriver, H: PrinterHost> CommandDispatcher<D, H> {
    pub fn new(
        config: ConfigHandle,
        driver: D,
        host: H,
        scheduler: ActionScheduler,
        events: EventEmitter<SwitchStateEvent>,
    ) -> Self {
        Self {
            config,
            driver: Arc::new(driver),
            host: Arc::new(host),
            scheduler,
            events,
            observed: Mutex::new(HashMap::new()),
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    pub fn scheduler(&self) -> &ActionScheduler {
        &self.scheduler
    }

    pub fn subscribe(&self) -> EventListener<SwitchStateEvent> {
        self.events.subscribe()
    }

    #[tracing::instrument(skip(self))]
    pub async fn power_on(&self, address: &str) -> Result<SwitchObservation, SwitchError> {
        let snapshot = self.config.snapshot();
        let switch = snapshot.registry.lookup(address)?;
        tracing::debug!("Turning on {}", switch.address);

        let _device = self.lock_device(address).await;

        let ip = self.resolve(address).await?;
        self.send_switch(address, ip, true).await?;

        let observation = self.observe(address, ip).await;
        self.record(address, observation);

        self.schedule_power_on_effects(switch);

        Ok(observation)
    }

    /// Powers a switch off. A configured printer disconnect completes, including its wait time,
    /// before the power command is sent.
    #[tracing::instrument(skip(self))]
    pub async fn power_off(&self, address: &str) -> Result<SwitchObservation, SwitchError> {
        let snapshot = self.config.snapshot();
        let switch = snapshot.registry.lookup(address)?;
        tracing::debug!("Turning off {}", switch.address);

        let _device = self.lock_device(address).await;
        self.switch_off(switch).await
    }

    /// Power-off requested from the instruction stream. Suppressed entirely while printing if
    /// the switch asks for it. The print state is checked once this action owns the device.
    #[tracing::instrument(skip(self))]
    pub async fn power_off_unless_printing(&self, address: &str) -> Result<Option<SwitchObservation>, SwitchError> {
        let snapshot = self.config.snapshot();
        let switch = snapshot.registry.lookup(address)?;

        let _device = self.lock_device(address).await;

        if switch.warn_printing && self.host.is_printing() {
            tracing::info!("Not powering off {} because printer is printing", address);
            return Ok(None);
        }

        tracing::debug!("Turning off {}", switch.address);
        self.switch_off(switch).await.map(Some)
    }

    //caller holds the device lock
    async fn switch_off(&self, switch: &SwitchConfig) -> Result<SwitchObservation, SwitchError> {
        let address = switch.address.as_str();

        if let Some(aux) = switch.aux_command_off() {
            self.schedule_system_command(address, aux.command, aux.delay);
        }

        if let Some(wait) = switch.disconnect_wait() {
            tracing::info!("Disconnecting printer before powering off {}", address);
            if let Err(e) = self.host.disconnect().await {
                tracing::warn!("Error disconnecting printer before powering off {}: {:?}", address, e);
            }
            tokio::time::sleep(wait).await;
        }

        let ip = self.resolve(address).await?;
        self.send_switch(address, ip, false).await?;

        let observation = self.observe(address, ip).await;
        self.record(address, observation);

        Ok(observation)
    }

    /// Queries the device and emits its state. Never fails: lookup and connectivity problems
    /// degrade to an unknown state. Waits for a running power action on the device to finish.
    #[tracing::instrument(skip(self))]
    pub async fn query_state(&self, address: &str) -> SwitchObservation {
        tracing::debug!("Checking status of {}", address);

        if let Err(e) = self.config.snapshot().registry.lookup(address) {
            tracing::warn!("Not checking status: {}", e);
            return SwitchObservation::unreachable();
        }

        let _device = self.lock_device(address).await;

        let observation = match self.driver.resolve(address).await {
            Ok(ip) => self.observe(address, ip).await,
            Err(e) => {
                tracing::warn!("Could not resolve {}: {}", address, e);
                SwitchObservation::unreachable()
            }
        };

        self.record(address, observation);
        observation
    }

    /// Last known state, falling back to the persisted one for devices not yet queried.
    pub fn observation(&self, switch: &SwitchConfig) -> SwitchObservation {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&switch.address)
            .copied()
            .unwrap_or_else(|| SwitchObservation::reachable(switch.current_state))
    }

    async fn lock_device(&self, address: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address.to_owned())
            .or_default()
            .clone();

        lock.lock_owned().await
    }

    async fn resolve(&self, address: &str) -> Result<IpAddr, SwitchError> {
        match self.driver.resolve(address).await {
            Ok(ip) => Ok(ip),
            Err(e) => {
                tracing::warn!("Could not resolve {}: {}", address, e);
                self.record(address, SwitchObservation::unreachable());
                Err(e)
            }
        }
    }

    async fn send_switch(&self, address: &str, ip: IpAddr, on: bool) -> Result<(), SwitchError> {
        tracing::debug!("Sending command {} to {}", if on { "on" } else { "off" }, address);

        match self.driver.switch(address, ip, on).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("Could not switch {}: {:?}", address, e);
                self.record(address, SwitchObservation::unreachable());
                Err(SwitchError::driver_failure(address, &e))
            }
        }
    }

    async fn observe(&self, address: &str, ip: IpAddr) -> SwitchObservation {
        match self.driver.query(address, ip).await {
            Ok(code) => {
                let state = SwitchState::from_raw(code);
                if state == SwitchState::Unknown {
                    tracing::debug!("Unexpected state code {} from {}", code, address);
                }
                SwitchObservation::reachable(state)
            }
            Err(e) => {
                tracing::debug!("Could not connect to {}: {:?}", address, e);
                SwitchObservation::unreachable()
            }
        }
    }

    fn record(&self, address: &str, observation: SwitchObservation) {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_owned(), observation);

        self.events.send(SwitchStateEvent::new(address, observation));
    }

    fn schedule_power_on_effects(&self, switch: &SwitchConfig) {
        if let Some(delay) = switch.reconnect_after() {
            let host = self.host.clone();
            self.scheduler
                .schedule(delay, ActionKind::PrinterConnect, Some(&switch.address), async move {
                    tracing::info!("Reconnecting printer");
                    if let Err(e) = host.connect().await {
                        tracing::error!("Error reconnecting printer: {:?}", e);
                    }
                });
        }

        if let Some(aux) = switch.aux_command_on() {
            self.schedule_system_command(&switch.address, aux.command, aux.delay);
        }
    }

    fn schedule_system_command(&self, address: &str, command: String, delay: std::time::Duration) {
        let host = self.host.clone();
        self.scheduler
            .schedule(delay, ActionKind::AuxCommand, Some(address), async move {
                tracing::info!("Running system command '{}'", command);
                if let Err(e) = host.run_system_command(&command).await {
                    tracing::error!("System command '{}' failed: {:?}", command, e);
                }
            });
    }
}
