// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use log::debug;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::resource::MonitoredResource;

/// Destination for discovered metadata. Implementations must tolerate
/// concurrent callers, since several schedulers may share one store.
pub trait MetadataStore: Send + Sync {
    fn update_resource(&self, id: String, resource: MonitoredResource, payload: Value);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredResource {
    pub id: String,
    pub resource: MonitoredResource,
    pub payload: Value,
    pub updated_at: String,
}

/// Keeps the latest record for each id in memory.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    entries: RwLock<HashMap<String, StoredResource>>,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<StoredResource> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored resources, sorted by id.
    pub fn snapshot(&self) -> Vec<StoredResource> {
        let mut resources: Vec<StoredResource> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));
        resources
    }
}

impl MetadataStore for InMemoryResourceStore {
    fn update_resource(&self, id: String, resource: MonitoredResource, payload: Value) {
        let updated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        debug!("updating resource {id}");
        let entry = StoredResource {
            id: id.clone(),
            resource,
            payload,
            updated_at,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);
    }
}
