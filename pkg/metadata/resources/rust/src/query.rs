// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use crate::errors::Result;
use crate::resource::MetadataRecord;

/// Source of metadata records, invoked once per scheduler tick.
pub trait MetadataQuery: Send + Sync {
    fn query(&self) -> Result<Vec<MetadataRecord>>;
}

impl<F> MetadataQuery for F
where
    F: Fn() -> Result<Vec<MetadataRecord>> + Send + Sync,
{
    fn query(&self) -> Result<Vec<MetadataRecord>> {
        self()
    }
}
