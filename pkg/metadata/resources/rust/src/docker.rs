// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::sync::Arc;

use log::{debug, error};
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::environment::EnvironmentMetadata;
use crate::errors::{Error, Result};
use crate::query::MetadataQuery;
use crate::resource::{MetadataRecord, MonitoredResource};
use crate::transport::{SocketUrl, UnixSocketClient};

pub const DEFAULT_ENDPOINT_HOST: &str = "unix://%2Fvar%2Frun%2Fdocker.sock/";
pub const DEFAULT_API_VERSION: &str = "v1.24";

const RESOURCE_TYPE: &str = "docker_container";
const ID_PREFIX: &str = "container/";

/// Why a single entry of the container list was ignored.
#[derive(Error, Debug)]
enum ElementSkipped {
    #[error("element {0} is not an object")]
    NotAnObject(Value),
    #[error("there is no container id in {0}")]
    MissingId(Value),
    #[error("container id {0} is not a string")]
    IdNotString(Value),
}

/// Lists every container known to the local Docker daemon.
///
/// Runs on the scheduler's thread and drives its async I/O on `runtime`.
pub struct DockerMetadataQuery {
    runtime: Handle,
    client: UnixSocketClient,
    url: SocketUrl,
    environment: Arc<EnvironmentMetadata>,
}

impl DockerMetadataQuery {
    pub fn new(
        runtime: Handle,
        endpoint_host: &str,
        api_version: &str,
        client: UnixSocketClient,
        environment: Arc<EnvironmentMetadata>,
    ) -> Result<Self> {
        let url = SocketUrl::parse(&container_list_url(endpoint_host, api_version))?;
        Ok(Self {
            runtime,
            client,
            url,
            environment,
        })
    }

    pub fn url(&self) -> &SocketUrl {
        &self.url
    }

    pub async fn fetch(&self) -> Result<Vec<MetadataRecord>> {
        let project_id = self.environment.project_id().await?;
        let zone = self.environment.zone().await?;

        let response = self.client.get(&self.url).await?;
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus(response.status()));
        }
        debug!("docker response: {}", response.text());
        parse_containers(response.body(), &project_id, &zone)
    }
}

impl MetadataQuery for DockerMetadataQuery {
    /// Never fails: any error is logged and yields an empty result.
    fn query(&self) -> Result<Vec<MetadataRecord>> {
        debug!("docker query called");
        match self.runtime.block_on(self.fetch()) {
            Ok(records) => Ok(records),
            Err(e) => {
                error!("docker metadata query failed: {e}");
                Ok(Vec::new())
            }
        }
    }
}

fn container_list_url(endpoint_host: &str, api_version: &str) -> String {
    format!(
        "{}/{}/containers/json?all=true",
        endpoint_host.trim_end_matches('/'),
        api_version.trim_matches('/')
    )
}

fn parse_containers(body: &[u8], project_id: &str, zone: &str) -> Result<Vec<MetadataRecord>> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedResponse(format!("invalid JSON: {e}")))?;
    let Value::Array(containers) = parsed else {
        return Err(Error::MalformedResponse(format!(
            "expected an array of containers, got {}",
            json_kind(&parsed)
        )));
    };

    Ok(containers
        .into_iter()
        .filter_map(
            |element| match container_record(element, project_id, zone) {
                Ok(record) => Some(record),
                Err(skipped) => {
                    error!("skipping container: {skipped}");
                    None
                }
            },
        )
        .collect())
}

fn container_record(
    element: Value,
    project_id: &str,
    zone: &str,
) -> Result<MetadataRecord, ElementSkipped> {
    if !element.is_object() {
        return Err(ElementSkipped::NotAnObject(element));
    }
    let id = match element.get("Id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => return Err(ElementSkipped::IdNotString(other.clone())),
        None => return Err(ElementSkipped::MissingId(element)),
    };

    let resource = MonitoredResource::new(
        RESOURCE_TYPE,
        [
            ("project_id", project_id.to_string()),
            ("location", zone.to_string()),
            ("container_id", id.clone()),
        ],
    );
    Ok(MetadataRecord::new(
        format!("{ID_PREFIX}{id}"),
        resource,
        element,
    ))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::environment::MetadataServerClient;
    use crate::test_utils::{
        CannedResponses, capture_logs, errors_logged_here, serve_tcp, serve_unix,
    };
    use hyper::StatusCode;
    use serde_json::json;
    use std::path::Path;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    const MIXED_RESPONSE: &str = r#"[{"Id":"abc123"}, {"Id": 5}, {"Name":"x"}, {"Id":"def456"}]"#;

    fn pinned_environment() -> Arc<EnvironmentMetadata> {
        // Nothing listens on the discard port; pinned facts never reach it.
        let server =
            MetadataServerClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        Arc::new(EnvironmentMetadata::with_overrides(
            server,
            Some("1234567890".to_string()),
            Some("us-central1-a".to_string()),
        ))
    }

    fn query_for(
        runtime: &Runtime,
        socket: &Path,
        environment: Arc<EnvironmentMetadata>,
    ) -> DockerMetadataQuery {
        let host = format!("unix://{}/", urlencoding::encode(&socket.to_string_lossy()));
        DockerMetadataQuery::new(
            runtime.handle().clone(),
            &host,
            DEFAULT_API_VERSION,
            UnixSocketClient::new(Duration::from_secs(5)),
            environment,
        )
        .unwrap()
    }

    #[test]
    fn test_default_container_list_url() {
        let url = SocketUrl::parse(&container_list_url(
            DEFAULT_ENDPOINT_HOST,
            DEFAULT_API_VERSION,
        ))
        .unwrap();
        assert_eq!(url.socket_path(), Path::new("/var/run/docker.sock"));
        assert_eq!(url.request_target(), "/v1.24/containers/json?all=true");
    }

    #[test]
    fn test_parse_skips_malformed_elements() {
        capture_logs();
        let records =
            parse_containers(MIXED_RESPONSE.as_bytes(), "1234567890", "us-central1-a").unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["container/abc123", "container/def456"]);

        let first = &records[0];
        assert_eq!(first.resource.resource_type(), "docker_container");
        assert_eq!(first.resource.label("project_id"), Some("1234567890"));
        assert_eq!(first.resource.label("location"), Some("us-central1-a"));
        assert_eq!(first.resource.label("container_id"), Some("abc123"));
        assert_eq!(first.payload, json!({"Id": "abc123"}));

        let errors = errors_logged_here();
        assert_eq!(errors.len(), 2, "one error per skipped element: {errors:?}");
        assert!(errors.iter().all(|line| line.starts_with("skipping container")));
    }

    #[test]
    fn test_parse_keeps_full_container_payload() {
        let body = r#"[{"Id":"abc","Names":["/web"],"State":"running","Labels":{"app":"web"}}]"#;
        let records = parse_containers(body.as_bytes(), "1", "z").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload["Names"], json!(["/web"]));
        assert_eq!(records[0].payload["Labels"]["app"], "web");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        let result = parse_containers(br#"{"error":"x"}"#, "1", "z");
        assert!(matches!(result, Err(Error::MalformedResponse(_))));

        let result = parse_containers(b"not json", "1", "z");
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_containers(b"[]", "1", "z").unwrap().is_empty());
    }

    #[test]
    fn test_container_record_skip_reasons() {
        assert!(matches!(
            container_record(json!("abc"), "1", "z"),
            Err(ElementSkipped::NotAnObject(_))
        ));
        assert!(matches!(
            container_record(json!({"Name": "x"}), "1", "z"),
            Err(ElementSkipped::MissingId(_))
        ));
        assert!(matches!(
            container_record(json!({"Id": 5}), "1", "z"),
            Err(ElementSkipped::IdNotString(_))
        ));
    }

    #[test]
    fn test_query_lists_containers_over_socket() {
        let runtime = Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");
        let canned = CannedResponses::new([(StatusCode::OK, MIXED_RESPONSE)]);
        runtime.block_on(serve_unix(&socket, canned.clone()));

        let query = query_for(&runtime, &socket, pinned_environment());
        let records = query.query().unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["container/abc123", "container/def456"]);
        assert_eq!(
            canned.requests()[0].uri,
            "/v1.24/containers/json?all=true"
        );
    }

    #[test]
    fn test_query_non_array_yields_nothing() {
        let runtime = Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");
        runtime.block_on(serve_unix(
            &socket,
            CannedResponses::new([(StatusCode::OK, r#"{"error":"x"}"#)]),
        ));

        capture_logs();
        let query = query_for(&runtime, &socket, pinned_environment());
        assert!(query.query().unwrap().is_empty());

        let errors = errors_logged_here();
        assert_eq!(errors.len(), 1, "non-array body logs once: {errors:?}");
        assert!(errors[0].contains("expected an array of containers"));
    }

    #[test]
    fn test_query_missing_socket_yields_nothing() {
        let runtime = Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let query = query_for(&runtime, &dir.path().join("absent.sock"), pinned_environment());
        assert!(query.query().unwrap().is_empty());
    }

    #[test]
    fn test_query_error_status_yields_nothing() {
        let runtime = Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");
        runtime.block_on(serve_unix(
            &socket,
            CannedResponses::new([(StatusCode::INTERNAL_SERVER_ERROR, "[]")]),
        ));

        let query = query_for(&runtime, &socket, pinned_environment());
        assert!(query.query().unwrap().is_empty());
    }

    #[test]
    fn test_query_lookup_failure_skips_daemon() {
        let runtime = Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");
        let docker = CannedResponses::new([(StatusCode::OK, MIXED_RESPONSE)]);
        runtime.block_on(serve_unix(&socket, docker.clone()));

        let metadata = CannedResponses::new([(StatusCode::OK, "")]);
        let addr = runtime.block_on(serve_tcp(metadata.clone()));
        let server =
            MetadataServerClient::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        let environment = Arc::new(EnvironmentMetadata::new(server));

        let query = query_for(&runtime, &socket, environment);
        assert!(query.query().unwrap().is_empty());
        assert!(query.query().unwrap().is_empty());

        // The empty project id was retried and never cached.
        assert_eq!(metadata.hits("/project/numeric-project-id"), 2);
        assert!(docker.requests().is_empty());
    }
}
