// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::PathBuf;
use std::time::Duration;

use hyper::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("polling period must be greater than zero, got {0:?}")]
    InvalidPeriod(Duration),

    #[error("could not spawn polling thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("invalid socket url {url:?}: {reason}")]
    InvalidSocketUrl { url: String, reason: String },

    #[error("socket {} is unavailable: {source}", path.display())]
    SocketUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("http exchange failed: {0}")]
    Http(#[from] hyper::Error),

    #[error("could not build request: {0}")]
    RequestBuild(#[from] hyper::http::Error),

    #[error("metadata server request failed: {0}")]
    MetadataServer(#[from] reqwest::Error),

    #[error("unexpected response status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("could not look up {name}: {reason}")]
    EnvironmentLookupFailed { name: &'static str, reason: String },
}
