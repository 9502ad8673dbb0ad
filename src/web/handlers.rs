//! HTTP handlers
//!
//! Ingress handlers only check the token and hand the event to a spawned
//! task; whatever the plugins do afterwards never changes the response.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use super::responses::{Accepted, ApiResponse};
use super::AppState;
use crate::database::PluginDataEntry;
use crate::errors::{AppResult, WebError};
use crate::models::{PluginInfo, TransferEvent, WebhookEvent};

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Compare the request token with `web.api_token` when one is configured
fn check_token(state: &AppState, query: &TokenQuery) -> AppResult<()> {
    let Some(expected) = state.config.web.api_token.as_deref().filter(|t| !t.is_empty()) else {
        return Ok(());
    };
    match query.token.as_deref() {
        Some(token) if token == expected => Ok(()),
        Some(_) => Err(WebError::invalid_auth("token mismatch").into()),
        None => Err(WebError::invalid_auth("token missing").into()),
    }
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    Json(event): Json<WebhookEvent>,
) -> AppResult<Accepted> {
    check_token(&state, &query)?;
    debug!(
        "Webhook '{}' for '{}' from {}",
        event.event,
        event.item_name.as_deref().unwrap_or_default(),
        event.user_name.as_deref().unwrap_or("unknown user")
    );

    let registry = state.registry.clone();
    tokio::spawn(async move {
        registry.dispatch_webhook(&event).await;
    });
    Ok(Accepted("webhook queued".to_string()))
}

pub async fn receive_transfer(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    Json(event): Json<TransferEvent>,
) -> AppResult<Accepted> {
    check_token(&state, &query)?;
    info!(
        "Transfer of '{}' with {} files",
        event.media.title,
        event.file_list_new.len()
    );

    let registry = state.registry.clone();
    tokio::spawn(async move {
        registry.dispatch_transfer(&event).await;
    });
    Ok(Accepted("transfer queued".to_string()))
}

pub async fn list_plugins(State(state): State<AppState>) -> ApiResponse<Vec<PluginInfo>> {
    ApiResponse::success(state.registry.list())
}

pub async fn get_plugin_data(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> AppResult<ApiResponse<Vec<PluginDataEntry>>> {
    check_token(&state, &query)?;
    let entries = state.registry.plugin_data(&id).await?;
    Ok(ApiResponse::success(entries))
}

pub async fn delete_plugin_data(
    Path((id, key)): Path<(String, String)>,
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> AppResult<ApiResponse<String>> {
    check_token(&state, &query)?;
    state.registry.delete_plugin_data(&id, &key).await?;
    Ok(ApiResponse::success(key))
}

pub async fn run_plugin(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> AppResult<Accepted> {
    check_token(&state, &query)?;
    let plugin = state.registry.runnable(&id)?;

    info!("Manual run of plugin '{}'", id);
    tokio::spawn(async move {
        if let Err(e) = plugin.run_once().await {
            error!("Manual run of plugin '{}' failed: {:#}", plugin.id(), e);
        }
    });
    Ok(Accepted(format!("plugin '{id}' started")))
}
