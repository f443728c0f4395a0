// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use crate::config::Config;
use crate::resolver::Resolver;
use crate::store::Store;
use crate::sync::SyncService;

pub fn handle<S: Store>(store: &S, cfg: &Config) -> Result<()> {
    let resolver = Resolver::new(cfg)?;
    let removed = SyncService::new(store, cfg, &resolver).remove_duplicates()?;
    if removed == 0 {
        println!("No duplicate expenses found");
    } else {
        println!("Archived {} duplicate expense page(s)", removed);
    }
    Ok(())
}
