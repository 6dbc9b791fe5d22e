// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderMap;

use crate::error::{Failure, MockError};
use crate::state::MockState;

/// Resolve the user behind a `Bearer` access token.
pub fn authenticate(state: &MockState, headers: &HeaderMap) -> Result<u64, Failure> {
    let rejected = || MockError::Unauthorized.detail("Could not validate credentials");

    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or_else(rejected)?;
    let (scheme, token) = header.split_once(' ').ok_or_else(rejected)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(rejected());
    }
    state.user_for_access(token.trim()).ok_or_else(rejected)
}
