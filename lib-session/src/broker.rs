// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Permission broker adapter.
//!
//! Wraps the host's asynchronous prompt/response pattern into a single-shot
//! future-like result and keeps the per-handle permission table. The table
//! is only ever touched from the context that owns the broker, so there is
//! no locking here; decisions arriving from the host are funneled back to
//! that context through the decision channel handed to `new`.

use crate::error::Result;
use crate::host::{AccessoryHost, PermissionDecision, PermissionResponder};
use crate::types::{AccessoryHandle, PermissionState};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Terminal result of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied,
}

/// Single-shot subscription to the outcome of a permission request
pub struct PermissionTicket {
    rx: oneshot::Receiver<PermissionOutcome>,
}

impl PermissionTicket {
    /// Wait for the outcome. A broker dropped mid-flight counts as denial.
    pub async fn outcome(self) -> PermissionOutcome {
        self.rx.await.unwrap_or(PermissionOutcome::Denied)
    }
}

#[derive(Default)]
struct Entry {
    state: PermissionState,
    waiters: Vec<oneshot::Sender<PermissionOutcome>>,
}

/// Tracks permission state per accessory and deduplicates prompts
pub struct PermissionBroker {
    host: Arc<dyn AccessoryHost>,
    decision_tx: mpsc::UnboundedSender<PermissionDecision>,
    table: HashMap<AccessoryHandle, Entry>,
}

impl PermissionBroker {
    /// Create a broker. Host decisions are forwarded to `decision_tx`; the
    /// owning context must feed them back through `resolve`.
    pub fn new(
        host: Arc<dyn AccessoryHost>,
        decision_tx: mpsc::UnboundedSender<PermissionDecision>,
    ) -> Self {
        Self {
            host,
            decision_tx,
            table: HashMap::new(),
        }
    }

    /// Current permission state for a handle
    pub fn state(&self, handle: &AccessoryHandle) -> PermissionState {
        self.table
            .get(handle)
            .map(|e| e.state)
            .unwrap_or(PermissionState::Unrequested)
    }

    /// Request permission for an accessory.
    ///
    /// Prompts the host at most once: while a request is pending, further
    /// calls subscribe to the in-flight outcome instead of prompting again.
    /// An already granted handle resolves immediately.
    pub fn request(&mut self, handle: &AccessoryHandle) -> Result<PermissionTicket> {
        let entry = self.table.entry(handle.clone()).or_default();
        let (waiter_tx, waiter_rx) = oneshot::channel();

        match entry.state {
            PermissionState::Granted => {
                let _ = waiter_tx.send(PermissionOutcome::Granted);
                return Ok(PermissionTicket { rx: waiter_rx });
            }
            PermissionState::Pending => {
                debug!("Permission already pending for {}, not prompting again", handle);
                entry.waiters.push(waiter_tx);
                return Ok(PermissionTicket { rx: waiter_rx });
            }
            PermissionState::Unrequested | PermissionState::Denied => {}
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.host
            .request_permission(handle, PermissionResponder::new(handle.clone(), reply_tx))?;

        entry.state = PermissionState::Pending;
        entry.waiters.push(waiter_tx);
        debug!("Permission prompt issued for {}", handle);

        // Forward the host's decision back to the owning context. A prompt
        // that goes away without an answer is a denial.
        let decision_tx = self.decision_tx.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            let decision = match reply_rx.await {
                Ok(decision) => decision,
                Err(_) => {
                    warn!("Permission prompt for {} dropped without an answer", handle);
                    PermissionDecision {
                        handle,
                        granted: false,
                    }
                }
            };
            let _ = decision_tx.send(decision);
        });

        Ok(PermissionTicket { rx: waiter_rx })
    }

    /// Record a decision delivered by the host and wake all subscribers
    pub fn resolve(&mut self, decision: &PermissionDecision) -> PermissionOutcome {
        let outcome = if decision.granted {
            PermissionOutcome::Granted
        } else {
            PermissionOutcome::Denied
        };

        let entry = self.table.entry(decision.handle.clone()).or_default();
        if entry.state != PermissionState::Pending {
            warn!(
                "Permission decision for {} arrived in state {:?}",
                decision.handle, entry.state
            );
        }
        entry.state = if decision.granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };

        for waiter in entry.waiters.drain(..) {
            let _ = waiter.send(outcome);
        }

        debug!("Permission for {} resolved: {:?}", decision.handle, outcome);
        outcome
    }
}
