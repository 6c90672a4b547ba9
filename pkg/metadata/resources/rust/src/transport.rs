// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! HTTP/1.1 over a unix domain socket.
//!
//! Targets are written as `unix://<percent-encoded socket path>/<path>?<query>`,
//! e.g. `unix://%2Fvar%2Frun%2Fdocker.sock/v1.24/containers/json?all=true`.
//! The authority only selects the socket; the remainder is sent as the
//! request-target. No TLS is ever negotiated.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper::header::HOST;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, warn};
use tokio::net::UnixStream;

use crate::errors::{Error, Result};

const SCHEME: &str = "unix://";
// Routing is by socket, so any syntactically valid host will do.
const PLACEHOLDER_HOST: &str = "localhost";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketUrl {
    socket_path: PathBuf,
    request_target: String,
}

impl SocketUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidSocketUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("scheme must be unix"))?;
        let (authority, target) = rest
            .find(['/', '?'])
            .map_or((rest, ""), |idx| rest.split_at(idx));

        if authority.is_empty() {
            return Err(invalid("missing socket path"));
        }
        // Socket paths are raw bytes; they need not be UTF-8.
        let socket_path = urlencoding::decode_binary(authority.as_bytes());

        let request_target = if target.is_empty() {
            "/".to_string()
        } else if target.starts_with('?') {
            format!("/{target}")
        } else {
            target.to_string()
        };

        Ok(Self {
            socket_path: PathBuf::from(OsStr::from_bytes(&socket_path)),
            request_target,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Path and query sent on the request line.
    pub fn request_target(&self) -> &str {
        &self.request_target
    }
}

impl FromStr for SocketUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone)]
pub struct SocketResponse {
    status: StatusCode,
    body: Bytes,
}

impl SocketResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Issues one request per connection; the connection is closed afterwards.
#[derive(Debug, Clone)]
pub struct UnixSocketClient {
    timeout: Duration,
}

impl Default for UnixSocketClient {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl UnixSocketClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn get(&self, url: &SocketUrl) -> Result<SocketResponse> {
        tokio::time::timeout(self.timeout, self.exchange(Method::GET, url))
            .await
            .map_err(|_| Error::Timeout(self.timeout))?
    }

    async fn exchange(&self, method: Method, url: &SocketUrl) -> Result<SocketResponse> {
        let stream = UnixStream::connect(url.socket_path())
            .await
            .map_err(|source| Error::SocketUnavailable {
                path: url.socket_path().to_path_buf(),
                source,
            })?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!("unix socket connection error: {e}");
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(url.request_target())
            .header(HOST, PLACEHOLDER_HOST)
            .body(Empty::<Bytes>::new())?;

        debug!(
            "{} {} via {}",
            request.method(),
            url.request_target(),
            url.socket_path().display()
        );
        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        Ok(SocketResponse { status, body })
    }
}
