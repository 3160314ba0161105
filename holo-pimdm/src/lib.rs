//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod assert;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod instance;
pub mod interface;
pub mod mrib;
pub mod neighbor;
pub mod output;
pub mod packet;
pub mod rib;
pub mod sg;
pub mod tasks;
pub mod timer;
