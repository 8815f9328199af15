// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Explicit dispatch-to-main-context capability.
//!
//! The host is assumed to provide a single cooperative scheduling context
//! (the UI/main loop). Instead of reaching for an ambient scheduler, code
//! that must run there posts jobs through a [`MainContext`], and whoever
//! owns the main loop drives the matching [`MainDriver`]. Jobs run strictly
//! in submission order on the driver, never on the submitting thread.

use log::warn;
use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

/// Cloneable submitter side of the main scheduling context
#[derive(Clone)]
pub struct MainContext {
    tx: mpsc::UnboundedSender<Job>,
}

impl MainContext {
    /// Create a context together with the driver that executes its jobs
    pub fn new() -> (MainContext, MainDriver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MainContext { tx }, MainDriver { rx })
    }

    /// Queue a job for execution on the main context.
    ///
    /// Jobs posted after the driver is gone are dropped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            warn!("Main context driver is gone, dropping job");
        }
    }
}

/// Consumer side: executes posted jobs in order
pub struct MainDriver {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl MainDriver {
    /// Run jobs until every `MainContext` clone has been dropped
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }

    /// Run every job queued so far and return how many ran.
    ///
    /// Lets tests and cooperative loops pump the context by hand.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}
