// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::OnceCell;

use crate::errors::{Error, Result};

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";
const PROJECT_ID_PATH: &str = "project/numeric-project-id";
const ZONE_PATH: &str = "instance/zone";

/// Plain-text client for the instance metadata server.
#[derive(Debug, Clone)]
pub struct MetadataServerClient {
    client: reqwest::Client,
    base_url: String,
}

impl MetadataServerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub async fn fetch(&self, path: &str) -> Result<String> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        debug!("querying metadata server: {url}");
        let response = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus(response.status()));
        }
        Ok(response.text().await?.trim().to_string())
    }
}

/// A scalar fact about the host, looked up once and cached.
///
/// Values are normalized before caching. Failed lookups and values that
/// normalize to empty leave the cache empty, so the next caller retries.
#[derive(Debug)]
pub struct CachedEnvironmentFact {
    name: &'static str,
    path: &'static str,
    normalize: fn(&str) -> &str,
    value: OnceCell<String>,
}

impl CachedEnvironmentFact {
    pub fn new(name: &'static str, path: &'static str) -> Self {
        Self {
            name,
            path,
            normalize: str::trim,
            value: OnceCell::new(),
        }
    }

    /// A fact pinned to `value`; the metadata server is never consulted.
    pub fn with_value(name: &'static str, path: &'static str, value: String) -> Self {
        Self {
            value: OnceCell::from(value),
            ..Self::new(name, path)
        }
    }

    /// Applies `normalize` to every value before it is cached, including a
    /// pinned one. A pinned value that normalizes to empty is dropped.
    pub fn with_normalizer(mut self, normalize: fn(&str) -> &str) -> Self {
        self.normalize = normalize;
        if let Some(pinned) = self.value.take() {
            let pinned = normalize(&pinned);
            if !pinned.is_empty() {
                self.value = OnceCell::from(pinned.to_string());
            }
        }
        self
    }

    pub async fn get(&self, server: &MetadataServerClient) -> Result<String> {
        self.value
            .get_or_try_init(|| async {
                let raw = server
                    .fetch(self.path)
                    .await
                    .map_err(|e| Error::EnvironmentLookupFailed {
                        name: self.name,
                        reason: e.to_string(),
                    })?;
                let value = (self.normalize)(&raw).to_string();
                if value.is_empty() {
                    return Err(Error::EnvironmentLookupFailed {
                        name: self.name,
                        reason: "metadata server returned an empty value".to_string(),
                    });
                }
                info!("resolved {}: {value}", self.name);
                Ok(value)
            })
            .await
            .cloned()
    }
}

/// Project and location facts used to label every discovered resource.
#[derive(Debug)]
pub struct EnvironmentMetadata {
    server: MetadataServerClient,
    project_id: CachedEnvironmentFact,
    zone: CachedEnvironmentFact,
}

impl EnvironmentMetadata {
    pub fn new(server: MetadataServerClient) -> Self {
        Self::with_overrides(server, None, None)
    }

    /// Pinned values take precedence over the metadata server.
    pub fn with_overrides(
        server: MetadataServerClient,
        project_id: Option<String>,
        zone: Option<String>,
    ) -> Self {
        let fact = |name: &'static str, path: &'static str, value: Option<String>| match value
            .filter(|v| !v.is_empty())
        {
            Some(value) => CachedEnvironmentFact::with_value(name, path, value),
            None => CachedEnvironmentFact::new(name, path),
        };
        Self {
            server,
            project_id: fact("numeric project id", PROJECT_ID_PATH, project_id),
            zone: fact("instance zone", ZONE_PATH, zone).with_normalizer(last_path_segment),
        }
    }

    pub async fn project_id(&self) -> Result<String> {
        self.project_id.get(&self.server).await
    }

    /// The zone name, e.g. `us-central1-a`. The metadata server reports it as
    /// `projects/<number>/zones/<zone>`.
    pub async fn zone(&self) -> Result<String> {
        self.zone.get(&self.server).await
    }
}

fn last_path_segment(value: &str) -> &str {
    value.trim().rsplit('/').next().unwrap_or_default()
}
