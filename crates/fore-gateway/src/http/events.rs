//! GET /api/events: live post updates as `text/event-stream`.
//!
//! Every message is a single `data:` line holding the JSON event
//! (`{"type": "...", "data": ...}`). The stream opens with `connected`,
//! carries a `heartbeat` on the configured interval and ends on shutdown.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse,
    },
};
use futures_util::StreamExt;
use tracing::debug;

use crate::app::AppState;

pub async fn events_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscription = state.events.subscribe();
    debug!(subscriber = subscription.id(), "event stream opened");

    let mut shutdown = state.shutdown.clone();
    let stream = subscription
        .into_stream()
        .map(|event| Ok::<_, Infallible>(SseEvent::default().data(event.to_json())))
        .take_until(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use fore_core::{NewPost, PostStatus};
    use fore_events::Event;
    use fore_store::PostStore;
    use futures_util::StreamExt;
    use tower::ServiceExt;

    use crate::app::{build_router, test_support::harness};

    async fn next_frame(body: &mut (impl futures_util::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin)) -> String {
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .expect("frame should arrive")
            .expect("stream should be open")
            .unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn stream_starts_with_connected_and_carries_updates() {
        let h = harness(None);
        let resp = build_router(h.state.clone())
            .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "text/event-stream");
        assert_eq!(resp.headers()["cache-control"], "no-cache");
        assert_eq!(resp.headers()["x-accel-buffering"], "no");

        let mut body = resp.into_body().into_data_stream();
        assert_eq!(next_frame(&mut body).await, "data: {\"type\":\"connected\"}\n\n");

        let post = h
            .store
            .insert(NewPost::scheduled("hi", "x", chrono::Utc::now()).with_status(PostStatus::Posted))
            .unwrap();
        h.state.events.publish(Event::post_update(&post));

        let frame = next_frame(&mut body).await;
        assert!(frame.starts_with("data: {\"type\":\"post_update\""));
        assert!(frame.contains("\"status\":\"posted\""));
    }

    #[tokio::test]
    async fn stream_ends_on_shutdown() {
        let h = harness(None);
        let resp = build_router(h.state.clone())
            .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let mut body = resp.into_body().into_data_stream();
        let _ = next_frame(&mut body).await;

        h.shutdown.send(true).unwrap();
        let end = tokio::time::timeout(Duration::from_secs(2), body.next()).await.unwrap();
        assert!(end.is_none());
    }
}
