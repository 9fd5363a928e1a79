use actix_web::{
    HttpResponse,
    web::{self, Json},
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, ApiState, auth::Authorized};
use crate::{
    port::{PrinterHost, SwitchDriver},
    trigger::TemperatureSnapshot,
};

pub fn configure<D: SwitchDriver, H: PrinterHost>(cfg: &mut web::ServiceConfig) {
    cfg.route("/printer/commands", web::post().to(route_commands::<D, H>))
        .route("/printer/temperatures", web::post().to(receive_temperatures::<D, H>))
        .route("/printer/state", web::put().to(update_state::<D, H>));
}

#[derive(Debug, Serialize, Deserialize)]
struct CommandLines {
    lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PrinterState {
    printing: bool,
}

//the printer pipeline sends every outgoing line here and uses the response as-is
async fn route_commands<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
    Json(commands): Json<CommandLines>,
) -> ApiResponse {
    for line in &commands.lines {
        state.router.route_line(line);
    }

    Ok(HttpResponse::Ok().json(commands))
}

async fn receive_temperatures<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
    Json(snapshot): Json<TemperatureSnapshot>,
) -> ApiResponse {
    state.router.on_temperatures(snapshot);
    Ok(HttpResponse::Accepted().finish())
}

async fn update_state<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
    Json(printer): Json<PrinterState>,
) -> ApiResponse {
    state.activity.set_printing(printer.printing);
    Ok(HttpResponse::NoContent().finish())
}
