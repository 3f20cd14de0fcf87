//! HTTP responder serving the packages snapshot

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::repository::{PackageCache, Snapshot};

pub const PACKAGES_PATH: &str = "/packages.json";

/// Build the router serving `GET /packages.json`
pub fn router(cache: Arc<PackageCache>) -> Router {
    Router::new()
        .route(PACKAGES_PATH, get(packages))
        .layer(TraceLayer::new_for_http())
        .with_state(cache)
}

/// Bind the listening socket ahead of serving
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))
}

/// Serve on `listener` until Ctrl+C or SIGTERM
pub async fn serve(listener: TcpListener, cache: Arc<PackageCache>) -> Result<()> {
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(cache))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix;
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("Received TERM signal");
            }
            Err(e) => {
                error!("Failed to install TERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn packages(State(cache): State<Arc<PackageCache>>, headers: HeaderMap) -> Response {
    // Regeneration serializes the whole index under the cache lock
    let snapshot = tokio::task::spawn_blocking(move || cache.snapshot())
        .await
        .context("Snapshot task failed")
        .and_then(|snapshot| snapshot);

    match snapshot {
        Ok(snapshot) => serve_snapshot(&snapshot, &headers),
        Err(e) => {
            error!("Failed to build packages snapshot: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("{e:#}"),
            )
                .into_response()
        }
    }
}

/// Answer with the snapshot, honouring `If-Modified-Since` and a single
/// byte `Range`.
fn serve_snapshot(snapshot: &Snapshot, headers: &HeaderMap) -> Response {
    let last_modified = http_date(snapshot.modified());

    if let Some(since) = header_str(headers, header::IF_MODIFIED_SINCE).and_then(parse_http_date) {
        // HTTP dates carry whole seconds only
        if snapshot.modified().timestamp() <= since.timestamp() {
            return (
                StatusCode::NOT_MODIFIED,
                [(header::LAST_MODIFIED, last_modified)],
            )
                .into_response();
        }
    }

    let content = snapshot.content();
    let len = content.len() as u64;

    let range = match header_str(headers, header::RANGE) {
        Some(range) if if_range_matches(headers, &last_modified) => parse_range(range, len),
        _ => ByteRange::Full,
    };

    match range {
        ByteRange::Full => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (header::LAST_MODIFIED, last_modified),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            content,
        )
            .into_response(),
        ByteRange::Partial { start, end } => (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (header::LAST_MODIFIED, last_modified),
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (header::CONTENT_RANGE, format!("bytes {start}-{end}/{len}")),
            ],
            content.slice(start as usize..=end as usize),
        )
            .into_response(),
        ByteRange::Unsatisfiable => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{len}"))],
        )
            .into_response(),
    }
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// A missing `If-Range` always matches; otherwise it must equal our
/// `Last-Modified`. Entity tags are not produced, so they never match.
fn if_range_matches(headers: &HeaderMap, last_modified: &str) -> bool {
    match header_str(headers, header::IF_RANGE) {
        None => true,
        Some(value) => value.trim() == last_modified,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    /// Inclusive bounds
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parse a `Range` header against a body of `len` bytes.
///
/// Only a single range is honoured; multiple or malformed ranges fall back
/// to the full body.
fn parse_range(value: &str, len: u64) -> ByteRange {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return ByteRange::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // Suffix range: the final `last` bytes
        let Ok(suffix) = last.parse::<u64>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || len == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Partial {
            start: len.saturating_sub(suffix),
            end: len - 1,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return ByteRange::Full;
    };
    let end = if last.is_empty() {
        len.saturating_sub(1)
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => end.min(len.saturating_sub(1)),
            _ => return ByteRange::Full,
        }
    };
    if start >= len {
        return ByteRange::Unsatisfiable;
    }
    ByteRange::Partial { start, end }
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|time| time.with_timezone(&Utc))
}
