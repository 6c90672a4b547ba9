// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

use std::fs::{DirBuilder, OpenOptions, Permissions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dd_resource_metadata::config::{self, AgentConfig};
use dd_resource_metadata::{
    DockerMetadataQuery, EnvironmentMetadata, InMemoryResourceStore, MetadataServerClient,
    PollingScheduler, UnixSocketClient,
};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use tokio::net::UnixListener;
use tokio::runtime::Handle;
use tokio::signal::unix::{SignalKind, signal};

mod cli;

use cli::Args;

static NOTFOUND: &[u8] = b"Not found";

type ResponseBody = BoxBody<Bytes, std::io::Error>;

fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(parent)
            .context("Failed to create PID file parent directory")?;
    }

    let pid = std::process::id();
    let mut file = OpenOptions::new()
        .write(true)
        .mode(0o644)
        .truncate(true)
        .create(true)
        .open(path)
        .context("Failed to write PID file")?;
    file.write_all(pid.to_string().as_bytes())
        .context("Failed to write PID to file")?;

    info!("Created PID file at {}", path.display());
    Ok(())
}

fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        error!("Failed to remove PID file: {}", e);
    } else {
        info!("Removed PID file at {}", path.display());
    }
}

fn setup_socket(socket_path: &Path) -> Result<UnixListener> {
    std::fs::remove_file(socket_path)
        .or_else(|error| {
            if error.kind() == ErrorKind::NotFound {
                Ok(())
            } else {
                Err(error)
            }
        })
        .context("failed to remove existing socket")?;

    if let Some(parent) = socket_path.parent() {
        DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(parent)
            .context("could not create socket directory")?;
    }

    let sock = UnixListener::bind(socket_path)
        .with_context(|| format!("could not create {}", socket_path.display()))?;
    std::fs::set_permissions(socket_path, Permissions::from_mode(0o720))
        .context("could not set socket permissions")?;

    Ok(sock)
}

fn json_response<T: Serialize>(value: &T) -> Result<Response<ResponseBody>> {
    Response::builder()
        .header("Content-Type", "application/json")
        .body(
            Full::new(
                serde_json::to_vec(value)
                    .unwrap_or_else(|e| {
                        error!("Failed to serialize response: {e}");
                        b"Internal server error".to_vec()
                    })
                    .into(),
            )
            .map_err(|e| match e {})
            .boxed(),
        )
        .map_err(|e| anyhow!("Failed to build response: {}", e))
}

fn not_found() -> Result<Response<ResponseBody>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(NOTFOUND.into()).map_err(|e| match e {}).boxed())
        .map_err(|e| anyhow!("Failed to build not found response: {}", e))
}

fn handle_request(
    method: &Method,
    path: &str,
    store: &InMemoryResourceStore,
) -> Result<Response<ResponseBody>> {
    match (method, path) {
        (&Method::GET, "/metadata/resources") => {
            let resources = store.snapshot();
            info!("Serving {} resources", resources.len());
            json_response(&resources)
        }
        (&Method::GET, "/debug/stats") => json_response(&json!({ "resources": store.len() })),
        _ => {
            info!("{} Request to unknown endpoint: {}", method, path);
            not_found()
        }
    }
}

fn internal_error() -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .body(
            Full::new(Bytes::from(&b"Internal Server Error"[..]))
                .map_err(|e| match e {})
                .boxed(),
        )
        .unwrap_or_else(|_| {
            Response::new(
                Full::new(Bytes::from(&b"Error"[..]))
                    .map_err(|e| match e {})
                    .boxed(),
            )
        })
}

fn build_scheduler(
    config: &AgentConfig,
    store: Arc<InMemoryResourceStore>,
) -> Result<PollingScheduler> {
    let period = config.polling_period()?;
    let timeout = config.request_timeout()?;
    let server = MetadataServerClient::new(config.metadata_server_url.clone(), timeout)
        .context("Failed to build metadata server client")?;
    let environment = Arc::new(EnvironmentMetadata::with_overrides(
        server,
        config.project_id.clone(),
        config.zone.clone(),
    ));
    let query = DockerMetadataQuery::new(
        Handle::current(),
        &config.docker_endpoint_host,
        &config.docker_api_version,
        UnixSocketClient::new(timeout),
        environment,
    )
    .context("Invalid Docker endpoint")?;
    let socket = query.url().socket_path().to_path_buf();

    let scheduler = PollingScheduler::new(period, store, query)
        .context("Failed to create polling scheduler")?;
    info!(
        "Polling Docker at {} every {:?}",
        socket.display(),
        scheduler.period()
    );
    Ok(scheduler)
}

async fn serve(sock: UnixListener, store: Arc<InMemoryResourceStore>) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    loop {
        tokio::select! {
            accept_result = sock.accept() => {
                let (stream, _) = accept_result?;
                let io = TokioIo::new(stream);
                let store = Arc::clone(&store);

                tokio::task::spawn(async move {
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(
                            io,
                            service_fn(|req| {
                                let response = handle_request(req.method(), req.uri().path(), &store)
                                    .unwrap_or_else(|e| {
                                        error!("Request handling failed: {e}");
                                        internal_error()
                                    });
                                async move { Ok::<_, anyhow::Error>(response) }
                            }),
                        )
                        .await
                    {
                        error!("Error serving connection: {err}");
                    }
                });
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                return Ok(());
            }
        }
    }
}

async fn run_agent(config: AgentConfig) -> Result<()> {
    let store = Arc::new(InMemoryResourceStore::new());
    let mut scheduler = build_scheduler(&config, Arc::clone(&store))?;
    scheduler.start()?;

    info!("Using api socket path: {}", config.api_socket.display());
    let result = match setup_socket(&config.api_socket) {
        Ok(sock) => {
            let result = serve(sock, store).await;
            remove_socket(&config.api_socket);
            result
        }
        Err(e) => Err(e.context("Failed to setup Unix socket")),
    };

    if let Err(e) = scheduler.stop() {
        error!("Failed to stop scheduler: {e}");
    }
    // The poll thread may be blocked on this runtime; wait for it off the reactor.
    tokio::task::spawn_blocking(move || scheduler.join())
        .await
        .context("Failed to join scheduler")?;
    info!("Scheduler stopped");

    result
}

fn remove_socket(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        error!("Failed to remove socket {}: {e}", path.display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(args.config.as_deref())?;
    let log_level = config.log_level();
    simple_logger::init_with_level(log_level)?;
    info!("Log level set to: {:?}", log_level);

    if let Some(ref path) = args.pid {
        write_pid_file(path)?;
    }

    info!("Starting resource-metadata-agent");
    let result = run_agent(config).await;

    if let Some(path) = args.pid {
        remove_pid_file(&path);
    }

    result
}
