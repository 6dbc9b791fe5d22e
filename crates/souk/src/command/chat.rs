// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `souk chat`: interactive conversation on a terminal.

use std::collections::HashSet;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use souk::conversation::{ConversationKey, ConversationSyncEngine, Message, TimelineEvent};
use souk::Souk;

use super::report;

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// Your user id
    #[arg(long)]
    pub me: String,

    /// The other participant's user id
    #[arg(long = "with")]
    pub counterpart: String,

    /// Product the conversation is about
    #[arg(long)]
    pub product: String,
}

pub async fn run(souk: &Souk, args: &ChatArgs) -> i32 {
    let key = ConversationKey::new(&args.me, &args.counterpart);
    let engine = match souk.conversations().open(key, &args.product) {
        Ok(e) => e,
        Err(e) => return report(&e),
    };
    let mut events = engine.subscribe();
    let mut printed = HashSet::new();
    print_new(&engine, &mut printed);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let code = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(text)) if text.trim().is_empty() => {}
                Ok(Some(text)) => send(&engine, &text, &mut printed),
                Ok(None) => break 0,
                Err(e) => {
                    eprintln!("error: reading stdin: {e}");
                    break 1;
                }
            },
            event = events.recv() => match event {
                Ok(TimelineEvent::RolledBack { error, .. }) => {
                    eprintln!("! not sent: {error}");
                }
                // Echoed as provisional when typed.
                Ok(TimelineEvent::Confirmed { id, .. }) => {
                    printed.insert(id);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => print_new(&engine, &mut printed),
                Err(RecvError::Closed) => break 0,
            },
            _ = tokio::signal::ctrl_c() => break 0,
        }
    };
    engine.close();
    code
}

fn send(engine: &ConversationSyncEngine, text: &str, printed: &mut HashSet<String>) {
    match engine.send(text) {
        Ok(pending) => {
            printed.insert(pending.message().id.clone());
            print_message(engine, pending.message());
        }
        Err(e) => {
            report(&e);
        }
    }
}

fn print_new(engine: &ConversationSyncEngine, printed: &mut HashSet<String>) {
    for msg in engine.timeline() {
        if msg.is_provisional || !printed.insert(msg.id.clone()) {
            continue;
        }
        print_message(engine, &msg);
    }
}

fn print_message(engine: &ConversationSyncEngine, msg: &Message) {
    let who = if msg.sender_id == engine.key().user_id { "me" } else { msg.sender_id.as_str() };
    let marker = if msg.is_provisional { " (sending)" } else { "" };
    println!("[{who}]{marker} {}", msg.content);
}
