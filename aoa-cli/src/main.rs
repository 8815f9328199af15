// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Console chat with an emulated echo accessory.
//!
//! Plays the role a UI would: attaches the accessory, sends one message
//! per stdin line, prints everything the observer receives. EOF (Ctrl-D)
//! shuts the stack down.

use anyhow::{Context, Result};
use aoa_emulator::{spawn_echo, EmulatedHost, PermissionPolicy};
use aoa_session::{
    AccessoryHandle, LifecycleCoordinator, MainContext, ObserverCallback, SessionEvent,
};
use clap::Parser;
use log::error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "aoa-cli", about = "Chat with an emulated accessory over a duplex byte channel")]
struct Args {
    /// Deny the permission prompt instead of granting it
    #[arg(long)]
    deny: bool,

    /// Make the host fail to hand out a channel after the grant
    #[arg(long)]
    fail_open: bool,

    /// Print observer events as JSON lines
    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "Acme")]
    manufacturer: String,

    #[arg(long, default_value = "EchoBox")]
    model: String,
}

fn print_event(event: &SessionEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to encode event: {}", e),
        }
        return;
    }

    match event {
        SessionEvent::Opened { handle } => println!("* accessory opened: {}", handle),
        SessionEvent::Message { text } => println!("< {}", text),
        SessionEvent::PermissionDenied { handle } => {
            println!("* permission denied for {}", handle)
        }
        SessionEvent::Fault { reason } => println!("* session fault: {}", reason),
        SessionEvent::Closed => println!("* session closed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let policy = if args.deny {
        PermissionPolicy::DenyAll
    } else {
        PermissionPolicy::GrantAll
    };
    let host = Arc::new(EmulatedHost::new(policy));
    host.set_fail_open(args.fail_open);

    let accessory = AccessoryHandle::new(&args.manufacturer, &args.model).with_serial("EMU001");
    let peer = host.plug(&accessory);
    spawn_echo(peer);

    let (ctx, driver) = MainContext::new();
    let json = args.json;
    let observer: ObserverCallback = Arc::new(move |event| print_event(&event, json));

    let (coordinator, control) = LifecycleCoordinator::new(host, ctx, observer);
    let coordinator = tokio::spawn(coordinator.process());
    let driver = tokio::spawn(driver.run());

    control
        .attach(accessory)
        .context("coordinator is not running")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        control
            .send_message(line)
            .context("coordinator is not running")?;
    }

    control.shutdown().ok();
    drop(control);
    coordinator.await.context("coordinator task failed")?;
    driver.await.context("main context driver failed")?;
    Ok(())
}
