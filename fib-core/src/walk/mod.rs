// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The two navigation algorithms that drive hardware programming and change
//! propagation (spec §4.3, §4.4).

pub mod dependent;
pub mod forward;
