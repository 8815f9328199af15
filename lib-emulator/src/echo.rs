// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::channel::AccessoryPeer;
use log::debug;
use tokio::task::JoinHandle;

/// Turn a peer into a loopback accessory: every outbound chunk comes
/// straight back as inbound. Runs until the application side closes.
pub fn spawn_echo(mut peer: AccessoryPeer) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = peer.received().await {
            debug!("Echoing {} bytes", chunk.len());
            peer.send(chunk);
        }
        debug!("Echo accessory stopped");
    })
}
