// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "resource-metadata-agent")]
#[command(about = "Publish Docker container metadata as monitored resources")]
pub struct Args {
    /// Path to the YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the process id to this file while running
    #[arg(long)]
    pub pid: Option<PathBuf>,
}
