mod dispatcher;
mod scheduler;

pub use dispatcher::CommandDispatcher;
pub use scheduler::{ActionHandle, ActionId, ActionKind, ActionScheduler, PendingAction};

use std::sync::Arc;
use std::time::Duration;

use infrastructure::{EventBus, EventListener};
use serde::Serialize;

use crate::{
    port::{PrinterHost, SwitchDriver},
    switch::{ConfigHandle, SwitchError, SwitchObservation, SwitchState, SwitchStateEvent},
};

/// Configured switch together with what was last observed about it.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchStatus {
    #[serde(rename = "ip")]
    pub address: String,
    pub label: String,
    pub icon: String,
    pub btn_color: String,
    #[serde(rename = "currentState")]
    pub current_state: SwitchState,
    pub reachable: bool,
}

pub struct CommandRunner<D, H> {
    dispatcher: Arc<CommandDispatcher<D, H>>,
    event_bus: EventBus<SwitchStateEvent>,
}

pub struct CommandClient<D, H> {
    dispatcher: Arc<CommandDispatcher<D, H>>,
}

//derive would require D: Clone and H: Clone
impl<D, H> Clone for CommandClient<D, H> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<D: SwitchDriver, H: PrinterHost> CommandRunner<D, H> {
    pub fn new(config: ConfigHandle, driver: D, host: H) -> Self {
        let event_bus = EventBus::new(64);
        let dispatcher = Arc::new(CommandDispatcher::new(
            config,
            driver,
            host,
            ActionScheduler::new(),
            event_bus.emitter(),
        ));

        Self { dispatcher, event_bus }
    }

    pub fn client(&self) -> CommandClient<D, H> {
        CommandClient {
            dispatcher: self.dispatcher.clone(),
        }
    }

    pub fn subscribe(&self) -> EventListener<SwitchStateEvent> {
        self.event_bus.subscribe()
    }
}

impl<D: SwitchDriver, H: PrinterHost> CommandClient<D, H> {
    pub async fn turn_on(&self, address: &str) -> Result<SwitchObservation, SwitchError> {
        self.dispatcher.power_on(address).await
    }

    pub async fn turn_off(&self, address: &str) -> Result<SwitchObservation, SwitchError> {
        self.dispatcher.power_off(address).await
    }

    /// Power-off that respects the "don't power off while printing" setting of the switch.
    /// Returns `None` when the command was suppressed.
    pub async fn turn_off_unless_printing(&self, address: &str) -> Result<Option<SwitchObservation>, SwitchError> {
        self.dispatcher.power_off_unless_printing(address).await
    }

    pub async fn check_status(&self, address: &str) -> SwitchStateEvent {
        SwitchStateEvent::new(address, self.dispatcher.query_state(address).await)
    }

    pub fn switches(&self) -> Vec<SwitchStatus> {
        let snapshot = self.dispatcher.config().snapshot();

        snapshot
            .registry
            .iter()
            .map(|switch| {
                let observation = self.dispatcher.observation(switch);
                SwitchStatus {
                    address: switch.address.clone(),
                    label: switch.label.clone(),
                    icon: switch.icon.clone(),
                    btn_color: switch.btn_color.clone(),
                    current_state: observation.state,
                    reachable: observation.reachable,
                }
            })
            .collect()
    }

    pub fn config(&self) -> &ConfigHandle {
        self.dispatcher.config()
    }

    pub fn scheduler(&self) -> &ActionScheduler {
        self.dispatcher.scheduler()
    }

    pub fn pending(&self) -> Vec<PendingAction> {
        self.dispatcher.scheduler().pending()
    }

    pub fn cancel(&self, id: ActionId) -> bool {
        self.dispatcher.scheduler().cancel(id)
    }

    pub fn cancel_for(&self, address: &str) -> usize {
        self.dispatcher.scheduler().cancel_for(address)
    }

    pub fn subscribe(&self) -> EventListener<SwitchStateEvent> {
        self.dispatcher.subscribe()
    }

    /// Queries every configured switch once per interval until the task is dropped.
    pub async fn poll_states(&self, interval: Duration) {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            timer.tick().await;

            let addresses: Vec<String> = self
                .dispatcher
                .config()
                .snapshot()
                .registry
                .iter()
                .map(|switch| switch.address.clone())
                .collect();

            tracing::debug!("Polling state of {} switches", addresses.len());

            for address in addresses {
                self.dispatcher.query_state(&address).await;
            }
        }
    }
}
