use std::sync::Arc;

use adapter::{
    api::{ApiAccess, ApiState},
    shell::{PrinterActivity, ShellPrinterHost, ShellSwitchDriver},
};
use infrastructure::EventListener;
use settings::{Settings, SettingsReloader};

use crate::command::CommandRunner;
use crate::switch::{ConfigHandle, SwitchStateEvent};
use crate::trigger::TriggerRouter;

mod adapter;
mod command;
mod core;
pub mod port;
mod settings;
mod switch;
mod trigger;


#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let config_path = settings::config_path();
    let settings = Settings::load(&config_path).expect("Error reading configuration");

    let log_level = settings
        .monitoring
        .init(settings.debug_logging)
        .expect("Error initializing monitoring");

    let control_config = settings.control_config().expect("Invalid switch configuration");
    tracing::info!(
        "Loaded {} switches from {}, thermal runaway monitoring {}",
        control_config.registry.len(),
        config_path,
        if control_config.thermal.monitoring_enabled { "enabled" } else { "disabled" }
    );

    let config = ConfigHandle::new(control_config);
    let activity = PrinterActivity::default();

    let command_runner = CommandRunner::new(
        config.clone(),
        ShellSwitchDriver::new(settings.shell.clone()),
        ShellPrinterHost::new(settings.shell.clone(), activity.clone()),
    );
    let command_client = command_runner.client();

    let api_state = ApiState {
        client: command_client.clone(),
        router: Arc::new(TriggerRouter::new(command_client.clone())),
        activity,
        access: ApiAccess::new(settings.api.api_keys.clone()),
        reloader: SettingsReloader::new(config_path, config, Some(log_level)),
    };

    let state_logger = log_state_events(command_runner.subscribe());

    let polling_exec = {
        let interval = settings.polling.interval();
        let client = command_client.clone();

        async move {
            match interval {
                Some(interval) => {
                    tracing::info!("Polling switch states every {:?}", interval);
                    client.poll_states(interval).await
                }
                None => std::future::pending().await,
            }
        }
    };

    let http_server_exec = async move {
        settings
            .http_server
            .run_server(move || vec![adapter::api::new_routes(api_state.clone())])
            .await
            .expect("HTTP server execution failed");
    };

    tracing::info!("Starting main loop");

    tokio::select!(
        _ = http_server_exec => {},
        _ = state_logger => {},
        _ = polling_exec => {},
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        },
    );
}

async fn log_state_events(mut events: EventListener<SwitchStateEvent>) {
    while let Some(event) = events.recv().await {
        tracing::info!(
            address = %event.address,
            reachable = event.reachable,
            "Switch state is {:?}",
            event.current_state
        );
    }
}
