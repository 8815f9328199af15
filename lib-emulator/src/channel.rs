// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Emulated duplex byte channel.
//!
//! The application side gets an `EmulatedChannel` (blocking reads backed by
//! a condvar'd inbox); the test or demo keeps the [`AccessoryPeer`] and
//! plays the accessory: inject inbound chunks, observe outbound writes,
//! end the stream, or break the transport.

use aoa_session::AccessoryChannel;
use bytes::Bytes;
use log::debug;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use tokio::sync::mpsc;

struct State {
    inbox: VecDeque<Bytes>,
    eof: bool,
    broken: bool,
    shut: bool,
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
}

impl Shared {
    fn check_transport(state: &State) -> io::Result<()> {
        if state.shut {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel shut down",
            ));
        }
        if state.broken {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "transport failure",
            ));
        }
        Ok(())
    }
}

/// Application side of the emulated channel
pub struct EmulatedChannel {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

impl EmulatedChannel {
    /// Create a connected channel/peer pair
    pub fn pair() -> (Arc<EmulatedChannel>, AccessoryPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                inbox: VecDeque::new(),
                eof: false,
                broken: false,
                shut: false,
            }),
            readable: Condvar::new(),
        });

        let channel = Arc::new(EmulatedChannel {
            shared: shared.clone(),
            outbound: outbound_tx,
        });
        let peer = AccessoryPeer {
            shared,
            outbound_rx,
        };
        (channel, peer)
    }
}

impl AccessoryChannel for EmulatedChannel {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            Shared::check_transport(&state)?;

            if let Some(mut chunk) = state.inbox.pop_front() {
                // A chunk larger than the caller's buffer is delivered
                // across multiple reads, like any unframed byte stream
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    let rest = chunk.split_off(n);
                    state.inbox.push_front(rest);
                }
                return Ok(n);
            }

            if state.eof {
                return Ok(0);
            }

            state = self.shared.readable.wait(state).unwrap();
        }
    }

    fn write(&self, data: &[u8]) -> io::Result<()> {
        let state = self.shared.state.lock().unwrap();
        Shared::check_transport(&state)?;
        drop(state);

        debug!("Emulated channel accepting {} byte write", data.len());
        self.outbound
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "accessory side gone"))
    }

    fn shutdown(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.shut = true;
        self.shared.readable.notify_all();
    }
}

/// Accessory side of the emulated channel
pub struct AccessoryPeer {
    shared: Arc<Shared>,
    outbound_rx: mpsc::UnboundedReceiver<Bytes>,
}

impl AccessoryPeer {
    /// Inject one inbound chunk for the application to read
    pub fn send(&self, data: impl Into<Bytes>) {
        let data = data.into();
        debug!("Peer injecting {} byte chunk", data.len());
        let mut state = self.shared.state.lock().unwrap();
        state.inbox.push_back(data);
        self.shared.readable.notify_all();
    }

    /// End the stream in an orderly way: pending chunks are still
    /// delivered, then reads return zero
    pub fn finish(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.eof = true;
        self.shared.readable.notify_all();
    }

    /// Break the transport: further reads and writes fail
    pub fn fail(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.broken = true;
        self.shared.readable.notify_all();
    }

    /// Next chunk written by the application, or `None` once the
    /// application side is gone
    pub async fn received(&mut self) -> Option<Bytes> {
        self.outbound_rx.recv().await
    }

    /// Next chunk written by the application without waiting
    pub fn try_received(&mut self) -> Option<Bytes> {
        self.outbound_rx.try_recv().ok()
    }
}
