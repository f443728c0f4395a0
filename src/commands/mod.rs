// Copyright (c) 2025 Expenser Maintainers.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod backfill;
pub mod dedupe;
pub mod doctor;
pub mod rollup;
pub mod sync;
