// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use std::thread::{self, ThreadId};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{Level, LevelFilter, Log, Metadata, Record};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub uri: String,
    pub metadata_flavor: Option<String>,
}

/// Replays responses in order; the last one repeats forever.
#[derive(Debug)]
pub(crate) struct CannedResponses {
    queue: Mutex<VecDeque<(StatusCode, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl CannedResponses {
    pub fn new<'a>(responses: impl IntoIterator<Item = (StatusCode, &'a str)>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests seen so far whose path starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.uri.starts_with(prefix))
            .count()
    }

    fn respond(&self, req: &Request<Incoming>) -> Response<Full<Bytes>> {
        self.requests.lock().unwrap().push(RecordedRequest {
            uri: req.uri().to_string(),
            metadata_flavor: req
                .headers()
                .get("Metadata-Flavor")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        });

        let (status, body) = {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue
                    .front()
                    .cloned()
                    .unwrap_or((StatusCode::NOT_FOUND, String::new()))
            }
        };
        Response::builder()
            .status(status)
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }
}

async fn serve<S>(stream: S, canned: Arc<CannedResponses>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let canned = Arc::clone(&canned);
        async move { Ok::<_, Infallible>(canned.respond(&req)) }
    });
    let _ = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await;
}

/// Serves `canned` on a unix socket at `path` until the runtime shuts down.
pub(crate) async fn serve_unix(path: &Path, canned: Arc<CannedResponses>) {
    let listener = UnixListener::bind(path).unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, Arc::clone(&canned)));
        }
    });
}

/// Serves `canned` on an ephemeral localhost TCP port.
pub(crate) async fn serve_tcp(canned: Arc<CannedResponses>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, Arc::clone(&canned)));
        }
    });
    addr
}

/// Keeps every log line emitted in the process, tagged with its thread.
struct CapturingLogger {
    lines: Mutex<Vec<(ThreadId, Level, String)>>,
}

static LOGGER: CapturingLogger = CapturingLogger {
    lines: Mutex::new(Vec::new()),
};
static INSTALL_LOGGER: Once = Once::new();

impl Log for CapturingLogger {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.lines.lock().unwrap().push((
            thread::current().id(),
            record.level(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

/// Installs the capturing logger. Safe to call from every test.
pub(crate) fn capture_logs() {
    INSTALL_LOGGER.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
}

/// Error lines logged so far by the calling thread.
pub(crate) fn errors_logged_here() -> Vec<String> {
    let me = thread::current().id();
    LOGGER
        .lines
        .lock()
        .unwrap()
        .iter()
        .filter(|(thread, level, _)| *thread == me && *level == Level::Error)
        .map(|(_, _, line)| line.clone())
        .collect()
}
