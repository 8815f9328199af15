// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! # Accessory Session Library
//!
//! This library manages the lifecycle of a session with an attached
//! accessory exposing a single duplex byte channel, including:
//! - Permission request/grant handshake with the host platform
//! - Opening the channel and running a background read loop
//! - Serialized writes and ordered delivery of inbound messages
//! - Clean teardown on detach or shutdown
//!
//! The host platform (attach notifications, permission broker, the channel
//! itself) sits behind the traits in [`host`], so the whole stack runs
//! against an emulated accessory in tests.

pub mod broker;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use broker::{PermissionBroker, PermissionOutcome, PermissionTicket};
pub use context::{MainContext, MainDriver};
pub use coordinator::{CoordinatorHandle, CoordinatorState, LifecycleCoordinator};
pub use dispatcher::InboundDispatcher;
pub use error::{Result, SessionError};
pub use host::{AccessoryChannel, AccessoryHost, PermissionDecision, PermissionResponder};
pub use session::{AccessorySession, WriteReceipt};
pub use types::{AccessoryHandle, ObserverCallback, PermissionState, SessionEvent};
