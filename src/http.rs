use crate::config::env_parse;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("digicurva-ad-studio/", env!("CARGO_PKG_VERSION"));

/// Shared transport defaults for every outbound call.
pub fn build_client() -> Client {
    let timeout = env_parse::<u64>("HTTP_TIMEOUT_SECS").unwrap_or(30);
    let connect = env_parse::<u64>("HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(5);
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}
