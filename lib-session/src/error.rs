// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use thiserror::Error;

/// Errors that can occur while establishing or using an accessory session
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("Permission request failed: {0}")]
    PermissionRequestFailed(String),

    #[error("Failed to open accessory: {0}")]
    OpenFailed(String),

    #[error("Failed to read from accessory: {0}")]
    ReadFailed(String),

    #[error("Failed to write to accessory: {0}")]
    WriteFailed(String),

    #[error("Accessory channel is closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
