// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # Accessory Emulator
//!
//! In-memory stand-ins for a platform accessory subsystem:
//! - An emulated duplex byte channel with a scriptable peer side
//! - An emulated host with configurable permission policy and open-failure
//!   injection
//! - An echo pump that turns a peer into a loopback accessory
//!
//! Used by the demo binary and by integration tests of the session stack.

pub mod channel;
pub mod echo;
pub mod host;

// Re-export commonly used types
pub use channel::{AccessoryPeer, EmulatedChannel};
pub use echo::spawn_echo;
pub use host::{EmulatedHost, PermissionPolicy};
