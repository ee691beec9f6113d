//! HTTP ingress for text submissions.
//!
//! `POST <path>` with `{"author": ..., "content": ..., "priority": ...}`
//! enqueues a `TextIn`; priority is optional and defaults to low.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::mpsc;

use vtuber_core::TextIn;

pub fn router(text_in: mpsc::Sender<TextIn>, route_path: &str) -> Router {
    let path = if route_path.trim().is_empty() {
        "/"
    } else {
        route_path
    };
    Router::new()
        .route(path, post(receive_text_in))
        .with_state(text_in)
}

async fn receive_text_in(
    State(text_in): State<mpsc::Sender<TextIn>>,
    payload: Result<Json<TextIn>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let text = match payload {
        Ok(Json(text)) => text,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": rejection.body_text()})),
            );
        }
    };

    tracing::info!(author = %text.author, content = %text.content, "text in from http");

    if text_in.send(text).await.is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "pipeline is shut down"})),
        );
    }
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtuber_core::Priority;

    #[tokio::test]
    async fn accepts_and_enqueues() {
        let (tx, mut rx) = mpsc::channel(8);
        let body: TextIn =
            serde_json::from_str(r#"{"author":"a","content":"hi","priority":2}"#).unwrap();

        let (status, Json(response)) = receive_text_in(State(tx), Ok(Json(body))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, json!({"status": "ok"}));

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.content, "hi");
        assert_eq!(queued.priority, Priority::HIGH);
    }

    #[tokio::test]
    async fn priority_defaults_to_low() {
        let body: TextIn = serde_json::from_str(r#"{"author":"a","content":"hi"}"#).unwrap();
        assert_eq!(body.priority, Priority::LOW);
    }

    #[tokio::test]
    async fn closed_pipeline_is_an_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let body = TextIn::new("a", "hi", Priority::LOW);

        let (status, _) = receive_text_in(State(tx), Ok(Json(body))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
