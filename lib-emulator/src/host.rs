// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::channel::{AccessoryPeer, EmulatedChannel};
use aoa_session::{
    AccessoryChannel, AccessoryHandle, AccessoryHost, PermissionResponder, Result, SessionError,
};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How the emulated host answers permission prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionPolicy {
    /// Every prompt is granted immediately
    GrantAll,
    /// Every prompt is denied immediately
    DenyAll,
    /// Prompts queue up until the test answers them via `take_prompts`
    Manual,
}

/// Emulated platform accessory subsystem.
///
/// Accessories are plugged in with `plug`, which hands back the peer side
/// of the channel so the caller can play the device.
pub struct EmulatedHost {
    policy: PermissionPolicy,
    accessories: Mutex<HashMap<AccessoryHandle, Arc<EmulatedChannel>>>,
    granted: Mutex<HashSet<AccessoryHandle>>,
    prompts: Mutex<Vec<PermissionResponder>>,
    prompt_count: AtomicUsize,
    fail_open: AtomicBool,
    broker_down: AtomicBool,
}

impl EmulatedHost {
    pub fn new(policy: PermissionPolicy) -> Self {
        Self {
            policy,
            accessories: Mutex::new(HashMap::new()),
            granted: Mutex::new(HashSet::new()),
            prompts: Mutex::new(Vec::new()),
            prompt_count: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            broker_down: AtomicBool::new(false),
        }
    }

    /// Register an accessory and return its peer side
    pub fn plug(&self, handle: &AccessoryHandle) -> AccessoryPeer {
        let (channel, peer) = EmulatedChannel::pair();
        info!("Emulated accessory plugged in: {}", handle);
        self.accessories
            .lock()
            .unwrap()
            .insert(handle.clone(), channel);
        peer
    }

    /// Mark an accessory as granted before any prompt happens
    pub fn grant_upfront(&self, handle: &AccessoryHandle) {
        self.granted.lock().unwrap().insert(handle.clone());
    }

    /// Make subsequent opens fail, emulating a device that detached
    /// between grant and open
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent permission requests fail outright
    pub fn set_broker_down(&self, down: bool) {
        self.broker_down.store(down, Ordering::SeqCst);
    }

    /// Number of user-facing prompts triggered so far
    pub fn prompt_count(&self) -> usize {
        self.prompt_count.load(Ordering::SeqCst)
    }

    /// Drain queued prompts (Manual policy) for the caller to answer
    pub fn take_prompts(&self) -> Vec<PermissionResponder> {
        std::mem::take(&mut *self.prompts.lock().unwrap())
    }
}

impl AccessoryHost for EmulatedHost {
    fn has_permission(&self, handle: &AccessoryHandle) -> bool {
        self.granted.lock().unwrap().contains(handle)
    }

    fn request_permission(
        &self,
        handle: &AccessoryHandle,
        responder: PermissionResponder,
    ) -> Result<()> {
        if self.broker_down.load(Ordering::SeqCst) {
            return Err(SessionError::PermissionRequestFailed(
                "permission service not available".to_string(),
            ));
        }

        self.prompt_count.fetch_add(1, Ordering::SeqCst);
        debug!("Permission prompt for {}: {:?}", handle, self.policy);

        match self.policy {
            PermissionPolicy::GrantAll => {
                self.granted.lock().unwrap().insert(handle.clone());
                responder.grant();
            }
            PermissionPolicy::DenyAll => responder.deny(),
            PermissionPolicy::Manual => self.prompts.lock().unwrap().push(responder),
        }
        Ok(())
    }

    fn open_accessory(&self, handle: &AccessoryHandle) -> Result<Arc<dyn AccessoryChannel>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(SessionError::OpenFailed(
                "no file descriptor for accessory".to_string(),
            ));
        }

        self.accessories
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .map(|channel| channel as Arc<dyn AccessoryChannel>)
            .ok_or_else(|| SessionError::OpenFailed(format!("accessory {} is not attached", handle)))
    }
}
