use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use fore_core::PostId;
use fore_events::PostView;
use fore_publisher::PublishError;
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;
use crate::auth::{error_response, require_auth};

/// POST /api/posts/{id}/publish: claim a draft or scheduled post and publish
/// it now. Responds once the post has reached `posted` or `failed`.
pub async fn publish_now_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_auth(&state, &headers)?;

    let id = PostId::from(id);
    info!(post_id = %id, "publish-now requested");

    match state.pipeline.publish_now(&id).await {
        Ok(receipt) => Ok(Json(json!({
            "post": current_view(&state, &id),
            "external_id": receipt.external_id,
            "warning": receipt.warning,
        }))),
        Err(e) => {
            let status = match &e {
                PublishError::NotFound(_) => StatusCode::NOT_FOUND,
                PublishError::InvalidState { .. } | PublishError::ClaimConflict(_) => StatusCode::CONFLICT,
                PublishError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ if e.marks_failed() => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let (status, Json(mut body)) = error_response(status, e.code(), e.to_string());
            if e.marks_failed() {
                body["post"] = json!(current_view(&state, &id));
            }
            Err((status, Json(body)))
        }
    }
}

fn current_view(state: &AppState, id: &PostId) -> Option<PostView> {
    state.store.get(id).ok().flatten().map(|p| PostView::from(&p))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use fore_core::{NewPost, PostStatus};
    use fore_store::PostStore;
    use tower::ServiceExt;

    use crate::app::{build_router, test_support::harness};

    async fn post(router: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router
            .oneshot(Request::post(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn draft_is_published_immediately() {
        let h = harness(None);
        let draft = h
            .store
            .insert(NewPost::scheduled("now please", "x", Utc::now()).with_status(PostStatus::Draft))
            .unwrap();

        let (status, json) = post(build_router(h.state), &format!("/api/posts/{}/publish", draft.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["post"]["status"], "posted");
        assert!(json["external_id"].as_str().unwrap().starts_with("dry-run-"));

        let saved = h.store.get(&draft.id).unwrap().unwrap();
        assert_eq!(saved.status, PostStatus::Posted);
        assert_eq!(saved.attempt_count, 1);
    }

    #[tokio::test]
    async fn second_publish_conflicts() {
        let h = harness(None);
        let p = h.store.insert(NewPost::scheduled("once", "x", Utc::now())).unwrap();
        let router = build_router(h.state);
        let uri = format!("/api/posts/{}/publish", p.id);

        assert_eq!(post(router.clone(), &uri).await.0, StatusCode::OK);
        let (status, json) = post(router, &uri).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn unsupported_platform_fails_the_post() {
        let h = harness(None);
        let p = h.store.insert(NewPost::scheduled("hi", "friendster", Utc::now())).unwrap();

        let (status, json) = post(build_router(h.state), &format!("/api/posts/{}/publish", p.id)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], "UNSUPPORTED_PLATFORM");
        assert_eq!(json["post"]["status"], "failed");
    }

    #[tokio::test]
    async fn unknown_post_is_404_and_auth_applies() {
        let h = harness(None);
        let (status, _) = post(build_router(h.state), "/api/posts/nope/publish").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let h = harness(Some("t"));
        let (status, json) = post(build_router(h.state), "/api/posts/nope/publish").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_FAILED");
    }
}
