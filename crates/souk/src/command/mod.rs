// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shell subcommands: `login`, `logout`, `whoami`, `get`, `unread`, `inbox`, `chat`.
//!
//! Each returns a process exit code: 0 on success, 1 on a failed request,
//! 2 on bad input.

pub mod auth;
pub mod chat;
pub mod inbox;

use souk::error::{ApiError, ErrorCode};

/// Print an API failure and map it to an exit code.
pub fn report(err: &ApiError) -> i32 {
    eprintln!("error: {err}");
    if err.code == ErrorCode::SessionExpired {
        eprintln!("hint: run `souk login` to sign in again");
    }
    match err.code {
        ErrorCode::Validation => 2,
        _ => 1,
    }
}
