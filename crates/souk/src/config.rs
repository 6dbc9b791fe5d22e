// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the client runtime.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the classifieds API.
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "SOUK_API_URL")]
    pub api_url: String,

    /// Timeout applied to every HTTP request, in milliseconds.
    #[arg(
        long,
        default_value_t = 20_000,
        env = "SOUK_REQUEST_TIMEOUT_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout_ms: u64,

    /// Conversation poll interval in milliseconds.
    #[arg(
        long,
        default_value_t = 3_000,
        env = "SOUK_POLL_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_ms: u64,

    /// Number of messages fetched per history page.
    #[arg(
        long,
        default_value_t = 50,
        env = "SOUK_HISTORY_PAGE_SIZE",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub history_page_size: u32,

    /// Directory for persisted credentials and conversation caches.
    #[arg(long, env = "SOUK_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    /// Resolve the state directory.
    ///
    /// Uses `--state-dir` when set, then `$XDG_STATE_HOME/souk`,
    /// then `$HOME/.local/state/souk`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("souk");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/souk");
        }
        PathBuf::from(".souk")
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::ClientConfig;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: ClientConfig,
    }

    #[yare::parameterized(
        zero_poll = { "--poll-ms" },
        zero_timeout = { "--request-timeout-ms" },
        zero_page = { "--history-page-size" },
    )]
    fn zero_is_rejected(flag: &str) {
        assert!(Cli::try_parse_from(["souk", flag, "0"]).is_err());
    }

    #[test]
    fn durations_from_millis() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["souk", "--poll-ms", "250", "--request-timeout-ms", "900"])?;
        assert_eq!(cli.config.poll_interval().as_millis(), 250);
        assert_eq!(cli.config.request_timeout().as_millis(), 900);
        Ok(())
    }
}
