// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Accessory session: exclusive owner of one open duplex byte channel.
//!
//! Reads happen on a single dedicated blocking worker, so chunks reach the
//! consumer strictly in channel order. Writes from any task are serialized
//! through one writer worker. `close` releases the channel exactly once and
//! joins both workers; the blocking read is unblocked by shutting the
//! channel down, never by killing the thread.

use crate::error::{Result, SessionError};
use crate::host::{AccessoryChannel, AccessoryHost};
use crate::types::AccessoryHandle;
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Read buffer size in bytes. A chunk larger than this arrives as several
/// messages; there is no framing to reassemble it.
const READ_BUFFER_SIZE: usize = 1024;

type WriteRequest = (Bytes, oneshot::Sender<Result<()>>);

/// Completion of one queued write
pub struct WriteReceipt {
    rx: oneshot::Receiver<Result<()>>,
}

impl WriteReceipt {
    /// Wait until the transport write finished
    pub async fn done(self) -> Result<()> {
        self.rx.await.map_err(|_| SessionError::ChannelClosed)?
    }
}

/// An open session with one granted accessory
pub struct AccessorySession {
    handle: AccessoryHandle,
    channel: Arc<dyn AccessoryChannel>,
    send_tx: Mutex<Option<mpsc::UnboundedSender<WriteRequest>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    reading: AtomicBool,
    closed: Arc<AtomicBool>,
}

impl AccessorySession {
    /// Open the duplex channel for a granted accessory.
    ///
    /// Must be called from within a tokio runtime; the writer worker is
    /// spawned immediately.
    pub fn open(host: &dyn AccessoryHost, handle: &AccessoryHandle) -> Result<Self> {
        let channel = host.open_accessory(handle)?;
        info!("Accessory opened: {}", handle);

        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let writer = Self::spawn_writer(channel.clone(), send_rx);

        Ok(Self {
            handle: handle.clone(),
            channel,
            send_tx: Mutex::new(Some(send_tx)),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(None),
            reading: AtomicBool::new(false),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The accessory this session belongs to
    pub fn handle(&self) -> &AccessoryHandle {
        &self.handle
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write a chunk to the accessory.
    ///
    /// Writes are queued to a single worker, so concurrent callers never
    /// interleave on the transport. Completes once the transport write
    /// finished; fails with `WriteFailed` on transport failure and
    /// `ChannelClosed` after `close`. No retries.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        self.queue_write(data)?.done().await
    }

    /// Queue a write without waiting for it.
    ///
    /// Queueing is synchronous, so calls from one task keep their order on
    /// the transport even when completion is awaited elsewhere.
    pub fn queue_write(&self, data: impl Into<Bytes>) -> Result<WriteReceipt> {
        let tx = self
            .send_tx
            .lock()
            .unwrap()
            .as_ref()
            .cloned()
            .ok_or(SessionError::ChannelClosed)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((data.into(), reply_tx))
            .map_err(|_| SessionError::ChannelClosed)?;
        Ok(WriteReceipt { rx: reply_rx })
    }

    /// Start the blocking read loop on a dedicated worker.
    ///
    /// `on_chunk` fires for every nonzero-length chunk, in channel order.
    /// A zero-length read is an orderly stream end: the loop stops and
    /// `on_end` fires, `on_error` does not. A transport failure stops the
    /// loop and fires `on_error` exactly once, unless `close` already began
    /// (then it is the cancellation path and the loop just exits).
    pub fn start_read_loop<M, C, E>(&self, on_chunk: M, on_end: C, on_error: E)
    where
        M: Fn(Bytes) + Send + 'static,
        C: FnOnce() + Send + 'static,
        E: FnOnce(SessionError) + Send + 'static,
    {
        if self.reading.swap(true, Ordering::SeqCst) {
            warn!("Read loop already running for {}", self.handle);
            return;
        }

        let channel = self.channel.clone();
        let closed = self.closed.clone();
        let handle = self.handle.clone();

        let reader = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; READ_BUFFER_SIZE];
            loop {
                match channel.read(&mut buf) {
                    Ok(0) => {
                        debug!("Accessory stream ended: {}", handle);
                        on_end();
                        break;
                    }
                    Ok(n) => {
                        debug!("RX {} bytes", n);
                        on_chunk(Bytes::copy_from_slice(&buf[..n]));
                    }
                    Err(_) if closed.load(Ordering::SeqCst) => {
                        // close() shut the channel under us, orderly exit
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read from accessory: {}", e);
                        on_error(SessionError::ReadFailed(e.to_string()));
                        break;
                    }
                }
            }
        });

        *self.reader.lock().unwrap() = Some(reader);
    }

    /// Close the session and release the channel.
    ///
    /// Idempotent: only the first call shuts the channel down and joins the
    /// workers; later or concurrent calls return immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Session for {} already closed", self.handle);
            return;
        }

        self.channel.shutdown();

        // Dropping the sender lets the writer drain its queue and exit
        let _ = self.send_tx.lock().unwrap().take();
        let writer = self.writer.lock().unwrap().take();
        let reader = self.reader.lock().unwrap().take();

        if let Some(writer) = writer {
            if writer.await.is_err() {
                warn!("Writer worker for {} panicked", self.handle);
            }
        }
        if let Some(reader) = reader {
            if reader.await.is_err() {
                warn!("Reader worker for {} panicked", self.handle);
            }
        }

        info!("Accessory session closed: {}", self.handle);
    }

    fn spawn_writer(
        channel: Arc<dyn AccessoryChannel>,
        mut send_rx: mpsc::UnboundedReceiver<WriteRequest>,
    ) -> JoinHandle<()> {
        tokio::task::spawn_blocking(move || {
            while let Some((data, reply)) = send_rx.blocking_recv() {
                debug!("TX {} bytes", data.len());
                let result = channel
                    .write(&data)
                    .map_err(|e| SessionError::WriteFailed(e.to_string()));
                if let Err(e) = &result {
                    error!("Failed to write to accessory: {}", e);
                }
                let _ = reply.send(result);
            }
        })
    }
}

impl Drop for AccessorySession {
    fn drop(&mut self) {
        // Last-resort release: the workers still exit through the
        // channel-closed path, they are just not joined
        if !self.closed.swap(true, Ordering::SeqCst) {
            warn!("Session for {} dropped without close", self.handle);
            self.channel.shutdown();
            let _ = self.send_tx.lock().unwrap().take();
        }
    }
}
