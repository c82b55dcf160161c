use axum::extract::State;
use axum::Json;

use crate::api::types::{AppState, InfoResponse};
use crate::config::APP_NAME;

/// `GET /info`: liveness plus the deployment label.
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        message: format!(
            "Hello, World! the app: {APP_NAME} is Running in {} mode.",
            state.environment
        ),
    })
}
