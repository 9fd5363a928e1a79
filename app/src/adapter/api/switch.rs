use actix_web::{
    HttpResponse,
    web::{self, Json, Path, Query},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiResponse, ApiState, auth::Authorized};
use crate::{
    command::ActionId,
    port::{PrinterHost, SwitchDriver},
};

pub fn configure<D: SwitchDriver, H: PrinterHost>(cfg: &mut web::ServiceConfig) {
    cfg.route("/plugin/switch", web::post().to(control::<D, H>))
        .route("/switches", web::get().to(list_switches::<D, H>))
        .route("/actions", web::get().to(list_actions::<D, H>))
        .route("/actions", web::delete().to(cancel_actions_for::<D, H>))
        .route("/actions/{id}", web::delete().to(cancel_action::<D, H>));
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    command: String,
    ip: String,
}

async fn control<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
    Json(request): Json<ControlRequest>,
) -> ApiResponse {
    tracing::debug!("Received {} for {}", request.command, request.ip);

    match request.command.as_str() {
        "turnOn" => {
            state.client.turn_on(&request.ip).await?;
            Ok(HttpResponse::NoContent().finish())
        }
        "turnOff" => {
            state.client.turn_off(&request.ip).await?;
            Ok(HttpResponse::NoContent().finish())
        }
        "checkStatus" => {
            let event = state.client.check_status(&request.ip).await;
            Ok(HttpResponse::Ok().json(event))
        }
        _ => Err(ApiError::UnknownCommand {
            command: request.command,
        }),
    }
}

async fn list_switches<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
) -> ApiResponse {
    Ok(HttpResponse::Ok().json(state.client.switches()))
}

async fn list_actions<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
) -> ApiResponse {
    Ok(HttpResponse::Ok().json(state.client.pending()))
}

async fn cancel_action<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
    id: Path<ActionId>,
) -> ApiResponse {
    let id = id.into_inner();

    if state.client.cancel(id) {
        tracing::info!("Cancelled pending action {}", id);
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::ActionNotFound { id })
    }
}

#[derive(Debug, Deserialize)]
struct ActionTarget {
    address: String,
}

async fn cancel_actions_for<D: SwitchDriver, H: PrinterHost>(
    _: Authorized,
    state: web::Data<ApiState<D, H>>,
    Query(target): Query<ActionTarget>,
) -> ApiResponse {
    let cancelled = state.client.cancel_for(&target.address);
    tracing::info!("Cancelled {} pending actions for {}", cancelled, target.address);

    Ok(HttpResponse::Ok().json(json!({ "cancelled": cancelled })))
}
