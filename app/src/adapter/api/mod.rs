mod auth;
mod printer;
mod switch;

pub use auth::ApiAccess;

use std::sync::Arc;

use actix_web::{
    HttpResponse, ResponseError,
    http::StatusCode,
    web::{self},
};
use derive_more::derive::{Display, Error};
use serde::Deserialize;

use crate::{
    adapter::shell::PrinterActivity,
    command::{ActionId, CommandClient},
    port::{PrinterHost, SwitchDriver},
    settings::SettingsReloader,
    switch::SwitchError,
    trigger::TriggerRouter,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSettings {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

pub struct ApiState<D, H> {
    pub client: CommandClient<D, H>,
    pub router: Arc<TriggerRouter<D, H>>,
    pub activity: PrinterActivity,
    pub access: ApiAccess,
    pub reloader: SettingsReloader,
}

impl<D, H> Clone for ApiState<D, H> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            router: self.router.clone(),
            activity: self.activity.clone(),
            access: self.access.clone(),
            reloader: self.reloader.clone(),
        }
    }
}

pub fn new_routes<D: SwitchDriver, H: PrinterHost>(state: ApiState<D, H>) -> actix_web::Scope {
    let access = state.access.clone();

    web::scope("/api")
        .configure(switch::configure::<D, H>)
        .configure(printer::configure::<D, H>)
        .route("/settings/reload", web::post().to(reload_settings::<D, H>))
        .app_data(web::Data::new(access))
        .app_data(web::Data::new(state))
}

type ApiResponse = Result<HttpResponse, ApiError>;

#[derive(Debug, Display, Error)]
enum ApiError {
    #[display("{_0}")]
    Switch(SwitchError),

    #[display("Unknown command {command}")]
    UnknownCommand { command: String },

    #[display("No pending action {id}")]
    ActionNotFound { id: ActionId },

    #[display("Settings rejected: {reason}")]
    SettingsRejected { reason: String },

    #[display("Internal error")]
    Internal,
}

impl From<SwitchError> for ApiError {
    fn from(error: SwitchError) -> Self {
        ApiError::Switch(error)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        tracing::warn!("ApiError: {:?}", self);

        match self {
            ApiError::Switch(SwitchError::PermissionDenied) => StatusCode::FORBIDDEN,
            ApiError::Switch(SwitchError::UnknownDevice { .. }) => StatusCode::NOT_FOUND,
            ApiError::Switch(SwitchError::Unreachable { .. } | SwitchError::DriverFailure { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Switch(SwitchError::InvalidConfig { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UnknownCommand { .. } => StatusCode::BAD_REQUEST,
            ApiError::ActionNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::SettingsRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

async fn reload_settings<D: SwitchDriver, H: PrinterHost>(
    _: auth::Authorized,
    state: web::Data<ApiState<D, H>>,
) -> ApiResponse {
    let reloader = state.reloader.clone();

    let settings = web::block(move || reloader.reload())
        .await
        .map_err(|e| {
            tracing::error!("Settings reload did not complete: {}", e);
            ApiError::Internal
        })?
        .map_err(|e| ApiError::SettingsRejected {
            reason: format!("{e:#}"),
        })?;

    state.access.replace(settings.api.api_keys);

    Ok(HttpResponse::NoContent().finish())
}
