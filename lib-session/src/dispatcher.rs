// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::context::MainContext;
use crate::types::{ObserverCallback, SessionEvent};
use bytes::Bytes;
use log::debug;

/// Marshals raw chunks from the read-loop thread to the observer on the
/// main context.
///
/// Each chunk is decoded as one text message (lossy UTF-8) at its chunk
/// boundary. Delivery order matches read order; the observer never runs on
/// the I/O worker.
#[derive(Clone)]
pub struct InboundDispatcher {
    ctx: MainContext,
    observer: ObserverCallback,
}

impl InboundDispatcher {
    pub fn new(ctx: MainContext, observer: ObserverCallback) -> Self {
        Self { ctx, observer }
    }

    /// Decode one inbound chunk and deliver it as a message event
    pub fn dispatch_chunk(&self, chunk: Bytes) {
        debug!("Dispatching {} byte chunk to observer", chunk.len());
        let text = String::from_utf8_lossy(&chunk).into_owned();
        self.dispatch(SessionEvent::Message { text });
    }

    /// Deliver a status event to the observer on the main context
    pub fn dispatch(&self, event: SessionEvent) {
        let observer = self.observer.clone();
        self.ctx.post(move || observer(event));
    }
}
