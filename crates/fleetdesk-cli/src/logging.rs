// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const NOISY_TARGETS: [(&str, &str); 4] = [
    ("hyper", "warn"),
    ("hyper_util", "warn"),
    ("reqwest", "warn"),
    ("rustls", "warn"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget<'a> {
    Stderr,
    File(&'a Path),
}

// FLEETDESK_LOG, then RUST_LOG, then the configured level.
fn filter_directives(level: &str) -> String {
    let base = env::var("FLEETDESK_LOG")
        .ok()
        .or_else(|| env::var("RUST_LOG").ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| level.to_owned());

    let mut directives = vec![base];
    for (target, level) in NOISY_TARGETS {
        directives.push(format!("{target}={level}"));
    }
    directives.join(",")
}

fn build_env_filter(level: &str) -> Result<EnvFilter> {
    let directives = filter_directives(level);
    EnvFilter::try_new(&directives).map_err(|error| {
        anyhow!("invalid log filter {directives:?}: {error} -- fix FLEETDESK_LOG or [log].level")
    })
}

pub fn init(level: &str, target: LogTarget<'_>) -> Result<()> {
    let filter = build_env_filter(level)?;
    let layer = match target {
        LogTarget::Stderr => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_filter(filter)
            .boxed(),
        LogTarget::File(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| {
                    format!(
                        "open log file {} -- set [log].file to a writable path",
                        path.display()
                    )
                })?;
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_target(true)
                .with_filter(filter)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|error| anyhow!("initialise logging: {error}"))
}
