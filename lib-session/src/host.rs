// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Host platform abstraction.
//!
//! The platform that owns the physical accessory is reduced to two traits:
//! [`AccessoryHost`] for the permission broker and channel factory, and
//! [`AccessoryChannel`] for the duplex byte stream itself. Everything above
//! this module is host-agnostic.

use crate::error::Result;
use crate::types::AccessoryHandle;
use std::io;
use std::sync::Arc;
use tokio::sync::oneshot;

/// The user's answer to a permission prompt, as delivered by the host.
#[derive(Debug)]
pub struct PermissionDecision {
    pub handle: AccessoryHandle,
    pub granted: bool,
}

/// Single-shot reply object handed to the host together with a permission
/// prompt. The host resolves it once the user answers; dropping it
/// unanswered counts as a denial.
pub struct PermissionResponder {
    handle: AccessoryHandle,
    tx: oneshot::Sender<PermissionDecision>,
}

impl PermissionResponder {
    pub(crate) fn new(handle: AccessoryHandle, tx: oneshot::Sender<PermissionDecision>) -> Self {
        Self { handle, tx }
    }

    /// The accessory this prompt is about
    pub fn handle(&self) -> &AccessoryHandle {
        &self.handle
    }

    pub fn grant(self) {
        self.respond(true);
    }

    pub fn deny(self) {
        self.respond(false);
    }

    fn respond(self, granted: bool) {
        let _ = self.tx.send(PermissionDecision {
            handle: self.handle,
            granted,
        });
    }
}

/// Access to the host's permission broker and accessory channels
pub trait AccessoryHost: Send + Sync {
    /// Whether the application already holds permission for this accessory
    fn has_permission(&self, handle: &AccessoryHandle) -> bool;

    /// Trigger the host-level user-facing prompt for this accessory.
    ///
    /// Prompts exactly once per call; the decision arrives through the
    /// responder. Fails with `PermissionRequestFailed` when the broker is
    /// unavailable.
    fn request_permission(
        &self,
        handle: &AccessoryHandle,
        responder: PermissionResponder,
    ) -> Result<()>;

    /// Obtain the duplex byte channel for a granted accessory.
    ///
    /// Fails with `OpenFailed` when the host returns no valid channel,
    /// e.g. the device detached between grant and open.
    fn open_accessory(&self, handle: &AccessoryHandle) -> Result<Arc<dyn AccessoryChannel>>;
}

/// A bidirectional, unstructured byte stream with blocking read and write
/// directions sharing one underlying descriptor.
pub trait AccessoryChannel: Send + Sync {
    /// Blocking read. `Ok(0)` means the stream ended in an orderly way.
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Blocking write of the whole buffer.
    fn write(&self, data: &[u8]) -> io::Result<()>;

    /// Release the channel and unblock any in-flight read. Idempotent.
    fn shutdown(&self);
}
