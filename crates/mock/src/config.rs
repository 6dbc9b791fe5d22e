// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the mock marketplace server.
#[derive(Debug, Clone, clap::Args)]
pub struct MockConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "SOUK_MOCK_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "SOUK_MOCK_PORT")]
    pub port: u16,

    /// Seed accounts as `username:password`, comma separated.
    #[arg(
        long = "user",
        env = "SOUK_MOCK_USERS",
        value_delimiter = ',',
        default_value = "alice:alice,bob:bob"
    )]
    pub users: Vec<String>,

    /// Artificial latency of the refresh endpoint in milliseconds.
    #[arg(long, default_value_t = 0, env = "SOUK_MOCK_REFRESH_DELAY_MS")]
    pub refresh_delay_ms: u64,
}

impl MockConfig {
    pub fn refresh_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.refresh_delay_ms)
    }

    /// Parsed seed accounts. Entries without a `:` are skipped.
    pub fn seed_users(&self) -> Vec<(&str, &str)> {
        self.users.iter().filter_map(|u| u.split_once(':')).collect()
    }
}
