//! Message store REST surface
//!
//! The caller's identity arrives in the `x-user-id` header; issuing and
//! checking credentials happens in front of this service.

use crate::config::AppState;
use crate::error::{Error, Result};
use axum::{
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    Json,
};
use quickchat_common::models::{ConversationsResponse, HistoryResponse, SendMessageResponse};
use quickchat_common::{SendMessageInput, UserId};
use serde_json::{json, Value};
use tracing::{info, warn};

pub const CALLER_HEADER: &str = "x-user-id";

/// Identity of the authenticated caller
#[derive(Debug, Clone)]
pub struct CallerId(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CallerId(v.to_string()))
            .ok_or(Error::Unauthorized)
    }
}

/// GET /api/messages/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<Json<ConversationsResponse>> {
    info!("GET /api/messages/conversations - {}", caller);
    let conversations = state.store.conversations(&caller).await?;
    Ok(Json(ConversationsResponse {
        success: true,
        conversations,
    }))
}

/// GET /api/messages/:peer_id
pub async fn get_history(
    Path(peer_id): Path<String>,
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<Json<HistoryResponse>> {
    info!("GET /api/messages/{} - {}", peer_id, caller);
    let messages = state.store.history(&caller, &peer_id).await?;
    Ok(Json(HistoryResponse {
        success: true,
        messages,
    }))
}

/// POST /api/messages/send/:peer_id
///
/// Persists first; the live relay runs exactly once and only after the
/// write succeeded.
pub async fn send_message(
    Path(peer_id): Path<String>,
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Json(input): Json<SendMessageInput>,
) -> Result<Json<SendMessageResponse>> {
    info!("POST /api/messages/send/{} - {}", peer_id, caller);

    let message = state
        .store
        .insert(&caller, &peer_id, input)
        .await
        .inspect_err(|e| warn!("Send from {} to {} failed: {}", caller, peer_id, e))?;

    let pushed = state.hub.relay(&message);
    info!("Relayed {} to {} live session(s)", message.id, pushed);

    Ok(Json(SendMessageResponse {
        success: true,
        message,
    }))
}

/// PUT /api/messages/mark/:id
pub async fn mark_seen(
    Path(id): Path<String>,
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<Json<Value>> {
    info!("PUT /api/messages/mark/{} - {}", id, caller);
    state.store.mark_seen(&id).await?;
    Ok(Json(json!({ "success": true })))
}
