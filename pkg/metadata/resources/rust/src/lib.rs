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

mod cancel;
pub mod config;
mod docker;
mod environment;
mod errors;
mod query;
mod resource;
mod scheduler;
mod store;
mod transport;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export the public API
pub use cancel::{CancellationToken, WaitOutcome};
pub use docker::DockerMetadataQuery;
pub use environment::{CachedEnvironmentFact, EnvironmentMetadata, MetadataServerClient};
pub use errors::{Error, Result};
pub use query::MetadataQuery;
pub use resource::{MetadataRecord, MonitoredResource};
pub use scheduler::{PollingScheduler, SchedulerState};
pub use store::{InMemoryResourceStore, MetadataStore, StoredResource};
pub use transport::{SocketResponse, SocketUrl, UnixSocketClient};
