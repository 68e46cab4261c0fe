use axum::{Json, body::Bytes, extract::State, http::StatusCode};
use std::sync::Arc;
use tracing::debug;

use crate::models::Item;
use crate::state::AppState;

pub async fn get_items_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Item>> {
    let items = state.items.read().await;
    Json(items.clone())
}

// Body is decoded regardless of Content-Type; bad JSON is a 400 with the parser's message
pub async fn create_item_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Item>, (StatusCode, String)> {
    let item: Item =
        serde_json::from_slice(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    state.items.write().await.push(item.clone());
    debug!(id = %item.id, "item created");

    Ok(Json(item))
}
