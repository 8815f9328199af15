// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Lifecycle coordinator.
//!
//! Single actor that reacts to attach/detach notifications, drives the
//! permission handshake, owns the one live session, and tears everything
//! down on shutdown. All state, including the broker's permission table,
//! is touched from this task only.
//!
//! State machine per accessory instance:
//! `Idle -> PermissionPending -> SessionOpen -> Closed`, where `Closed` is
//! terminal and a later attach starts a fresh instance from `Idle`. Open
//! and I/O failures jump straight to `Closed`; nothing is retried.

use crate::broker::{PermissionBroker, PermissionOutcome};
use crate::context::MainContext;
use crate::dispatcher::InboundDispatcher;
use crate::error::{Result, SessionError};
use crate::host::{AccessoryHost, PermissionDecision};
use crate::session::AccessorySession;
use crate::types::{AccessoryHandle, ObserverCallback, SessionEvent};
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    PermissionPending,
    SessionOpen,
    Closed,
}

enum Command {
    Attach(AccessoryHandle),
    Detach(AccessoryHandle),
    Send(String),
    Fault(SessionError),
    Shutdown,
}

/// Cloneable control surface for a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<CoordinatorState>>,
}

impl CoordinatorHandle {
    /// Deliver a host attach notification
    pub fn attach(&self, handle: AccessoryHandle) -> Result<()> {
        self.send(Command::Attach(handle))
    }

    /// Deliver a host detach notification
    pub fn detach(&self, handle: AccessoryHandle) -> Result<()> {
        self.send(Command::Detach(handle))
    }

    /// User-triggered send; the text goes out as one unframed write
    pub fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::Send(text.into()))
    }

    /// Close the session if open and stop the coordinator
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    pub async fn state(&self) -> CoordinatorState {
        *self.state.read().await
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).map_err(|_| SessionError::ChannelClosed)
    }
}

/// Owns the accessory lifecycle end to end
pub struct LifecycleCoordinator {
    host: Arc<dyn AccessoryHost>,
    broker: PermissionBroker,
    dispatcher: InboundDispatcher,
    session: Option<Arc<AccessorySession>>,
    attached: Option<AccessoryHandle>,
    state: Arc<RwLock<CoordinatorState>>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    decision_rx: mpsc::UnboundedReceiver<PermissionDecision>,
}

impl LifecycleCoordinator {
    /// Create a coordinator and its control handle.
    ///
    /// Observer events are marshaled through `ctx`; someone has to drive
    /// the matching `MainDriver` for them to be delivered.
    pub fn new(
        host: Arc<dyn AccessoryHost>,
        ctx: MainContext,
        observer: ObserverCallback,
    ) -> (Self, CoordinatorHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (decision_tx, decision_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(CoordinatorState::Idle));

        let coordinator = Self {
            broker: PermissionBroker::new(host.clone(), decision_tx),
            host,
            dispatcher: InboundDispatcher::new(ctx, observer),
            session: None,
            attached: None,
            state: state.clone(),
            cmd_tx: cmd_tx.clone(),
            cmd_rx,
            decision_rx,
        };
        (coordinator, CoordinatorHandle { tx: cmd_tx, state })
    }

    /// Main processing loop; runs until shutdown or until every control
    /// handle is gone
    pub async fn process(mut self) {
        loop {
            tokio::select! {
                command = self.cmd_rx.recv() => {
                    match command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                Some(decision) = self.decision_rx.recv() => {
                    self.handle_decision(decision).await;
                }
            }
        }

        // Never leave a channel open behind us
        self.close_session(false).await;
        debug!("Coordinator stopped");
    }

    /// Returns true when the loop should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Attach(handle) => self.handle_attach(handle).await,
            Command::Detach(handle) => self.handle_detach(handle).await,
            Command::Send(text) => self.handle_send(text).await,
            Command::Fault(err) => self.handle_fault(err).await,
            Command::Shutdown => {
                info!("Shutting down coordinator");
                self.set_state(CoordinatorState::Closed).await;
                self.close_session(true).await;
                return true;
            }
        }
        false
    }

    async fn handle_attach(&mut self, handle: AccessoryHandle) {
        match self.current_state().await {
            // Closed is terminal for the previous instance only; a new
            // attach starts over from Idle
            CoordinatorState::Idle | CoordinatorState::Closed => {}
            state => {
                warn!("Ignoring attach of {} in state {:?}", handle, state);
                return;
            }
        }

        info!("Accessory attached: {}", handle);
        self.attached = Some(handle.clone());

        if self.host.has_permission(&handle) {
            debug!("Permission already granted for {}", handle);
            self.open_session(handle).await;
            return;
        }

        match self.broker.request(&handle) {
            Ok(_ticket) => {
                // The decision comes back through decision_rx
                self.set_state(CoordinatorState::PermissionPending).await;
            }
            Err(e) => {
                error!("Permission request for {} failed: {}", handle, e);
                self.attached = None;
                self.set_state(CoordinatorState::Idle).await;
                self.dispatcher.dispatch(SessionEvent::Fault {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn handle_decision(&mut self, decision: PermissionDecision) {
        let outcome = self.broker.resolve(&decision);

        if self.current_state().await != CoordinatorState::PermissionPending
            || self.attached.as_ref() != Some(&decision.handle)
        {
            warn!("Stale permission decision for {}", decision.handle);
            return;
        }

        match outcome {
            PermissionOutcome::Granted => self.open_session(decision.handle).await,
            PermissionOutcome::Denied => {
                info!("Permission denied for {}", decision.handle);
                self.attached = None;
                self.set_state(CoordinatorState::Idle).await;
                self.dispatcher.dispatch(SessionEvent::PermissionDenied {
                    handle: decision.handle,
                });
            }
        }
    }

    async fn handle_detach(&mut self, handle: AccessoryHandle) {
        if self.attached.as_ref() != Some(&handle) {
            warn!("Ignoring detach of unknown accessory {}", handle);
            return;
        }

        info!("Accessory detached: {}", handle);
        self.set_state(CoordinatorState::Closed).await;
        self.close_session(true).await;
    }

    async fn handle_send(&mut self, text: String) {
        let open = self.current_state().await == CoordinatorState::SessionOpen;
        let session = match &self.session {
            Some(session) if open => session.clone(),
            _ => {
                warn!(
                    "Dropping outbound message, no open session: {}",
                    SessionError::ChannelClosed
                );
                return;
            }
        };

        // Queue here so messages keep their order, await completion off
        // this task since the transport write can block. Failures come
        // back as a fault command.
        let receipt = match session.queue_write(Bytes::from(text.into_bytes())) {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!("Dropping outbound message: {}", e);
                return;
            }
        };
        let fault_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = receipt.done().await {
                error!("Failed to send message: {}", e);
                let _ = fault_tx.send(Command::Fault(e));
            }
        });
    }

    async fn handle_fault(&mut self, err: SessionError) {
        if self.current_state().await != CoordinatorState::SessionOpen {
            debug!("Ignoring fault outside open session: {}", err);
            return;
        }

        error!("Session fault: {}", err);
        self.close_session(false).await;
        self.set_state(CoordinatorState::Closed).await;
        self.dispatcher.dispatch(SessionEvent::Fault {
            reason: err.to_string(),
        });
    }

    async fn open_session(&mut self, handle: AccessoryHandle) {
        match AccessorySession::open(self.host.as_ref(), &handle) {
            Ok(session) => {
                let session = Arc::new(session);
                self.set_state(CoordinatorState::SessionOpen).await;
                self.dispatcher.dispatch(SessionEvent::Opened {
                    handle: handle.clone(),
                });

                let chunks = self.dispatcher.clone();
                let fault_tx = self.cmd_tx.clone();
                session.start_read_loop(
                    move |chunk| chunks.dispatch_chunk(chunk),
                    move || info!("Accessory stream ended: {}", handle),
                    move |err| {
                        let _ = fault_tx.send(Command::Fault(err));
                    },
                );

                self.session = Some(session);
            }
            Err(e) => {
                error!("Failed to open session for {}: {}", handle, e);
                self.attached = None;
                self.set_state(CoordinatorState::Closed).await;
                self.dispatcher.dispatch(SessionEvent::Fault {
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn close_session(&mut self, announce: bool) {
        if let Some(session) = self.session.take() {
            session.close().await;
            if announce {
                self.dispatcher.dispatch(SessionEvent::Closed);
            }
        }
        self.attached = None;
    }

    async fn current_state(&self) -> CoordinatorState {
        *self.state.read().await
    }

    async fn set_state(&self, state: CoordinatorState) {
        debug!("Coordinator state -> {:?}", state);
        *self.state.write().await = state;
    }
}
