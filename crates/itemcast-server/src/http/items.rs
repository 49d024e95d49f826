//! Item CRUD endpoints.
//!
//! Each successful mutation writes the store first and then broadcasts one
//! [`ItemEvent`]. A request rejected by validation or by the store never
//! reaches the broadcaster.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::response::Json;
use itemcast_core::ItemEvent;
use metrics::counter;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::payload::{ItemValue, NewItem, Payload};
use crate::error::ApiError;
use crate::metrics::ITEM_MUTATIONS_TOTAL;
use crate::server::AppState;

/// Body of `GET /items/{key}`.
#[derive(Debug, Clone, Serialize)]
pub struct ItemBody {
    /// Item key.
    pub key: String,
    /// Item value.
    pub value: String,
}

fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

fn publish(state: &AppState, event: &ItemEvent) {
    counter!(ITEM_MUTATIONS_TOTAL, "action" => event.action().as_str()).increment(1);
    let report = state.broadcaster.broadcast_event(event);
    info!(
        action = %event.action(),
        key = event.key(),
        recipients = report.attempted,
        delivered = report.delivered,
        "item change broadcast"
    );
}

/// `GET /items`: every item as a `{key: value}` map.
pub async fn list_items(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, String>>, ApiError> {
    let items = state.items.list()?;
    Ok(Json(
        items.into_iter().map(|item| (item.key, item.value)).collect(),
    ))
}

/// `GET /items/{key}`.
pub async fn get_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ItemBody>, ApiError> {
    let item = state.items.get(&key)?.ok_or(ApiError::NotFound)?;
    Ok(Json(ItemBody {
        key: item.key,
        value: item.value,
    }))
}

/// `POST /items`: create or overwrite, then broadcast `created`.
#[instrument(skip_all)]
pub async fn create_item(
    State(state): State<AppState>,
    Payload(body): Payload<NewItem>,
) -> Result<Json<Value>, ApiError> {
    let body = body.validate()?;
    let item = state.items.upsert(&body.key, &body.value)?;
    publish(&state, &ItemEvent::created(item.key, item.value));
    Ok(ok())
}

/// `PUT /items/{key}`: overwrite an existing item, then broadcast `updated`.
#[instrument(skip_all, fields(key = %key))]
pub async fn update_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Payload(body): Payload<ItemValue>,
) -> Result<Json<Value>, ApiError> {
    let item = state
        .items
        .update(&key, &body.value)?
        .ok_or(ApiError::NotFound)?;
    publish(&state, &ItemEvent::updated(item.key, item.value));
    Ok(ok())
}

/// `DELETE /items/{key}`: remove if present and always broadcast `deleted`.
#[instrument(skip_all, fields(key = %key))]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let existed = state.items.delete(&key)?;
    if !existed {
        info!("delete of absent item");
    }
    publish(&state, &ItemEvent::deleted(key));
    Ok(ok())
}
