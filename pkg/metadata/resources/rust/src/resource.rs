// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Typed, labeled identifier for the entity a metadata record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    resource_type: String,
    labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    pub fn new<I, K, V>(resource_type: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            resource_type: resource_type.into(),
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// One workload discovered during a poll cycle, ready to be pushed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub id: String,
    pub resource: MonitoredResource,
    pub payload: Value,
}

impl MetadataRecord {
    pub fn new(id: impl Into<String>, resource: MonitoredResource, payload: Value) -> Self {
        Self {
            id: id.into(),
            resource,
            payload,
        }
    }
}
