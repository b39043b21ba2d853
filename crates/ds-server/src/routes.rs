//! HTTP routing for the stream endpoint.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use ds_core::DataSourceRef;
use futures_util::StreamExt;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::publisher::Connection;
use crate::state::AppState;

/// Query parameters accepted by the stream endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    /// Relative path of the file to stream.
    pub data_source: Option<String>,
}

/// Builds the router serving the stream endpoint at the configured path.
pub fn router(state: AppState) -> Router {
    let endpoint = state.endpoint().to_owned();
    Router::new()
        .route(&endpoint, get(data_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Opens a long-lived event stream for `data_source`.
///
/// Validation happens before anything is written, so a rejected request
/// gets a plain 400 and never a stream.
async fn data_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ServerError> {
    let raw = params.data_source.unwrap_or_default();
    let source = DataSourceRef::parse(&raw, state.policy())
        .map_err(|err| ServerError::invalid_source(err, state.policy().rejection_message()))?;

    let open_state = state.clone();
    let connection =
        tokio::task::spawn_blocking(move || Connection::open(&open_state, source)).await??;

    let body = connection
        .take_until(state.shutdown().clone().cancelled_owned())
        .map(Ok::<_, Infallible>);

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use camino::Utf8PathBuf;
    use ds_core::{Config, Frame, FrameDecoder};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn fixture() -> (TempDir, AppState) {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 path");
        std::fs::create_dir_all(root.join("static/data")).expect("mkdir");
        std::fs::write(
            root.join("static/data/reels.json"),
            r#"{"reels": [{"id": 1}, {"id": 2}]}"#,
        )
        .expect("write");

        let mut config = Config::default();
        config.server.root = root;
        config.watch.debounce_ms = 50;
        config.watch.poll_interval_ms = Some(20);
        (dir, AppState::new(&config, CancellationToken::new()))
    }

    fn get_request(query: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/api/data-stream{query}"))
            .body(Body::empty())
            .expect("request")
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("UTF-8 body")
    }

    async fn read_frames(response: Response, count: usize) -> Vec<Frame> {
        let mut data = response.into_body().into_data_stream();
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        while frames.len() < count {
            let chunk = tokio::time::timeout(Duration::from_secs(5), data.next())
                .await
                .expect("timed out")
                .expect("stream ended")
                .expect("body error");
            frames.extend(decoder.push(&chunk));
        }
        frames
    }

    #[tokio::test]
    async fn test_untrusted_source_rejected() {
        let (_dir, state) = fixture();
        let app = router(state.clone());

        for query in [
            "?data_source=secrets/keys.json",
            "?data_source=static/data/reels.txt",
            "?data_source=static/data/../../etc/passwd.json",
            "?data_source=",
            "",
        ] {
            let response = app.clone().oneshot(get_request(query)).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{query}");
            assert_ne!(
                response.headers()[header::CONTENT_TYPE],
                "text/event-stream"
            );
            assert_eq!(
                body_text(response).await,
                "Invalid data source path. Must be within static/data/ directory and be a .json file"
            );
        }
        assert_eq!(state.hub().active_sources(), 0);
    }

    #[tokio::test]
    async fn test_missing_directory_not_found() {
        let (_dir, state) = fixture();
        let response = router(state)
            .oneshot(get_request("?data_source=static/data/missing/reels.json"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stream_acknowledges_then_sends_snapshot() {
        let (_dir, state) = fixture();
        let response = router(state)
            .oneshot(get_request("?data_source=static/data/reels.json"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");

        let frames = read_frames(response, 2).await;
        assert_eq!(frames[0], Frame::connected());
        assert!(frames[1].is_message());
        assert_eq!(frames[1].data, r#"[{"id":1},{"id":2}]"#);
    }

    #[tokio::test]
    async fn test_missing_file_streams_empty_snapshot() {
        let (_dir, state) = fixture();
        let response = router(state)
            .oneshot(get_request("?data_source=static/data/later.json"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let frames = read_frames(response, 2).await;
        assert_eq!(frames[1].data, "[]");
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream_and_releases_source() {
        let (_dir, state) = fixture();
        let response = router(state.clone())
            .oneshot(get_request("?data_source=static/data/reels.json"))
            .await
            .expect("response");
        assert_eq!(state.hub().active_sources(), 1);

        let mut data = response.into_body().into_data_stream();
        let first = data.next().await.expect("frame").expect("body error");
        assert!(first.starts_with(b"event: connected\n"));

        state.shutdown().cancel();
        tokio::time::timeout(Duration::from_secs(5), async {
            while data.next().await.is_some() {}
        })
        .await
        .expect("stream did not end");

        drop(data);
        assert_eq!(state.hub().active_sources(), 0);
    }
}
