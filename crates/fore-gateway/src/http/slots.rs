use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use fore_scheduler::QuickPick;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::app::AppState;
use crate::auth::{error_response, require_auth};

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    /// `morning`, `noon` or `evening`; omit for the next free slot of any kind.
    pub quick: Option<String>,
}

/// GET /api/slots/next: suggest a publish time that does not crowd existing posts.
pub async fn next_slot_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_auth(&state, &headers)?;

    let pick = query
        .quick
        .as_deref()
        .map(str::parse::<QuickPick>)
        .transpose()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, "INVALID_QUICK_PICK", e.to_string()))?;

    let now = Utc::now();
    // a day back covers every post that can share a local calendar day with `now`
    let existing = state.store.scheduled_times(now - Duration::days(1)).map_err(|e| {
        warn!(error = %e, "slot lookup failed");
        error_response(StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", e.to_string())
    })?;

    let slot = match pick {
        None => state.slots.next(&existing, now),
        Some(p) => state.slots.quick(p, &existing, now).ok_or_else(|| {
            error_response(
                StatusCode::NOT_FOUND,
                "NO_FREE_SLOT",
                "no free slot today or tomorrow",
            )
        })?,
    };

    Ok(Json(json!({
        "scheduled_time": slot,
        "local_time": slot.with_timezone(&state.slots.zone()).to_rfc3339(),
        "timezone": state.slots.zone().name(),
        "quick": pick,
    })))
}
