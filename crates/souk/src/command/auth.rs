// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use souk::http::ApiRequest;
use souk::Souk;

use super::report;

#[derive(Debug, clap::Args)]
pub struct LoginArgs {
    /// Account username
    #[arg(long, short)]
    pub username: String,

    /// Account password
    #[arg(long, env = "SOUK_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn login(souk: &Souk, args: &LoginArgs) -> i32 {
    match souk.client().login(&args.username, &args.password).await {
        Ok(()) => {
            println!("signed in as {}", args.username);
            0
        }
        Err(e) => report(&e),
    }
}

pub fn logout(souk: &Souk) -> i32 {
    match souk.client().logout() {
        Ok(()) => {
            println!("signed out");
            0
        }
        Err(e) => report(&e),
    }
}

pub async fn whoami(souk: &Souk) -> i32 {
    match souk.client().me().await {
        Ok(profile) => {
            println!("{} (id {})", profile.username, profile.id);
            0
        }
        Err(e) => report(&e),
    }
}

pub async fn get(souk: &Souk, path: &str) -> i32 {
    if !path.starts_with('/') {
        eprintln!("error: path must start with '/'");
        return 2;
    }
    let (path, query) = path.split_once('?').unwrap_or((path, ""));
    let mut req = ApiRequest::get(path);
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        req = req.with_query(k, v);
    }

    let resp = match souk.client().request(req).await {
        Ok(r) => r,
        Err(e) => return report(&e),
    };
    match serde_json::from_str::<serde_json::Value>(&resp.body) {
        Ok(v) => println!("{}", serde_json::to_string_pretty(&v).unwrap_or(resp.body)),
        Err(_) => println!("{}", resp.body),
    }
    0
}
