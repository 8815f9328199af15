// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identification of a physical attached accessory, as supplied by the host.
///
/// Becomes meaningless once the device detaches; a re-attach delivers a
/// fresh handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessoryHandle {
    pub manufacturer: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl AccessoryHandle {
    pub fn new(manufacturer: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            serial: None,
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }
}

impl fmt::Display for AccessoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.serial {
            Some(serial) => write!(f, "{} {} ({})", self.manufacturer, self.model, serial),
            None => write!(f, "{} {}", self.manufacturer, self.model),
        }
    }
}

/// Permission state for one accessory handle.
///
/// `Unrequested -> Pending` when a request is issued,
/// `Pending -> Granted | Denied` when the host delivers the user's decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionState {
    #[default]
    Unrequested,
    Pending,
    Granted,
    Denied,
}

/// Advisory status and message stream delivered to the observer.
///
/// Each `Message` is one raw read chunk decoded as text. There is no
/// framing: a single logical message may arrive split across several
/// events, or several writes merged into one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Opened { handle: AccessoryHandle },
    Message { text: String },
    PermissionDenied { handle: AccessoryHandle },
    Fault { reason: String },
    Closed,
}

/// Callback type for observer notifications
pub type ObserverCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;
