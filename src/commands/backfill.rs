// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::Local;

use crate::config::Config;
use crate::rollup::RollupEngine;
use crate::store::Store;

pub fn handle<S: Store>(store: &S, cfg: &Config, m: &clap::ArgMatches) -> Result<()> {
    let months: u32 = m
        .get_one::<String>("months")
        .map(|s| s.parse())
        .transpose()
        .context("Invalid --months, expected a positive integer")?
        .unwrap_or(3);
    let today = Local::now().date_naive();

    RollupEngine::new(store, cfg).backfill(months, today)?;
    println!("Backfilled {} month(s)", months);
    Ok(())
}
