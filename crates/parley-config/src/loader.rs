// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Layered configuration: built-in defaults, then every config file found,
//! then the file named on the command line.

use std::path::{Path, PathBuf};

use anyhow::Context;
use toml::{Table, Value};
use tracing::debug;

use crate::Config;

const FILE_NAME: &str = "config.toml";

/// Where a layer comes from, lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    System,
    User,
    Project,
    Explicit,
}

/// Config files that are read when present.  The user file lives in the
/// platform config directory (`$XDG_CONFIG_HOME/parley` on Linux).
fn discovered_files() -> Vec<(Origin, PathBuf)> {
    let mut files = vec![(Origin::System, Path::new("/etc/parley").join(FILE_NAME))];
    if let Some(dir) = dirs::config_dir() {
        files.push((Origin::User, dir.join("parley").join(FILE_NAME)));
    }
    files.push((Origin::Project, Path::new(".parley").join(FILE_NAME)));
    files
}

/// Load the configuration.  `explicit` (from `--config`) must exist and is
/// applied last; discovered files are skipped when absent.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let mut layers = Vec::new();
    for (origin, path) in discovered_files() {
        if path.is_file() {
            layers.push((origin, read_table(&path)?));
        }
    }
    if let Some(path) = explicit {
        layers.push((Origin::Explicit, read_table(path)?));
    }
    resolve(layers)
}

fn read_table(path: &Path) -> anyhow::Result<Table> {
    debug!(path = %path.display(), "reading config file");
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    text.parse::<Table>().with_context(|| format!("parsing {}", path.display()))
}

/// Stack `layers` in origin order and deserialize the result; keys absent
/// from every layer keep their defaults.
fn resolve(mut layers: Vec<(Origin, Table)>) -> anyhow::Result<Config> {
    layers.sort_by_key(|(origin, _)| *origin);
    let mut merged = Table::new();
    for (origin, table) in layers {
        debug!(?origin, keys = table.len(), "applying config layer");
        overlay(&mut merged, table);
    }
    Value::Table(merged).try_into().context("invalid configuration")
}

/// Copy `top` onto `base`.  Tables present in both are merged key by key;
/// any other value in `top` replaces the one in `base`.
fn overlay(base: &mut Table, top: Table) {
    for (key, value) in top {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(inner)), Value::Table(upper)) => overlay(inner, upper),
            (Some(slot), value) => *slot = value,
            (None, value) => {
                base.insert(key, value);
            }
        }
    }
}
