// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod cli;
pub mod commands;
pub mod config;
pub mod installment;
pub mod models;
pub mod resolver;
pub mod rollup;
pub mod scraper;
pub mod store;
pub mod sync;
pub mod utils;
