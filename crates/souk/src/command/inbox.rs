// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use souk::conversation::ConversationSummary;
use souk::Souk;

use super::report;

#[derive(Debug, clap::Args)]
pub struct InboxArgs {
    /// Show the cached list without contacting the server.
    #[arg(long)]
    pub offline: bool,
}

pub async fn unread(souk: &Souk) -> i32 {
    match souk.messages().unread_count().await {
        Ok(n) => {
            println!("{n}");
            0
        }
        Err(e) => report(&e),
    }
}

pub async fn run(souk: &Souk, args: &InboxArgs) -> i32 {
    let hub = souk.conversations();
    let result = if args.offline { hub.summaries() } else { hub.refresh_summaries().await };
    match result {
        Ok(summaries) if summaries.is_empty() => {
            println!("no conversations");
            0
        }
        Ok(summaries) => {
            print_table(&summaries);
            0
        }
        Err(e) => report(&e),
    }
}

fn print_table(summaries: &[ConversationSummary]) {
    let name_w = summaries.iter().map(|s| display_name(s).len()).max().unwrap_or(0).max(4);

    println!("{:<name_w$}  {:<8}  {:>6}  {}", "WITH", "PRODUCT", "UNREAD", "LAST MESSAGE");
    for s in summaries {
        println!(
            "{:<name_w$}  {:<8}  {:>6}  {}",
            display_name(s),
            s.product_id.as_deref().unwrap_or("-"),
            s.unread_count,
            preview(s.last_message.as_deref().unwrap_or(""), 60),
        );
    }
}

fn display_name(s: &ConversationSummary) -> String {
    match s.username {
        Some(ref name) => format!("{name} ({})", s.counterpart_id),
        None => s.counterpart_id.clone(),
    }
}

fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_owned();
    }
    let cut: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
