// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod command;

use clap::{Parser, Subcommand};
use tracing::error;

use souk::config::ClientConfig;
use souk::Souk;

#[derive(Parser)]
#[command(name = "souk", version, about = "Classifieds messaging client")]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    /// Log format (text or json).
    #[arg(long, env = "SOUK_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SOUK_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the credential
    Login(command::auth::LoginArgs),
    /// Forget the stored credential
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Show the number of unread messages
    Unread,
    /// List conversations, most recent first
    Inbox(command::inbox::InboxArgs),
    /// Authenticated GET of an API path, printing the JSON body
    Get {
        /// Path relative to the API base URL (e.g. /api/messages/unread/count)
        path: String,
    },
    /// Open a conversation: print new messages and send lines read from stdin
    Chat(command::chat::ChatArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format);

    let souk = match Souk::connect(&cli.client) {
        Ok(s) => s,
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Command::Login(ref args) => command::auth::login(&souk, args).await,
        Command::Logout => command::auth::logout(&souk),
        Command::Whoami => command::auth::whoami(&souk).await,
        Command::Unread => command::inbox::unread(&souk).await,
        Command::Inbox(ref args) => command::inbox::run(&souk, args).await,
        Command::Get { ref path } => command::auth::get(&souk, path).await,
        Command::Chat(ref args) => command::chat::run(&souk, args).await,
    };
    std::process::exit(code);
}

fn init_tracing(level: &str, format: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match format {
        "json" => fmt::fmt().with_env_filter(filter).json().with_writer(std::io::stderr).init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init(),
    }
}
