//! HTTP client construction for the authenticated session.
//!
//! Every request of a run (login, pages, files) goes through one client that
//! carries the session cookie jar.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use super::AuthError;
use crate::user_agent;

/// Optional client timeouts. `None` means no timeout is enforced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HttpTimeouts {
    /// Connection establishment timeout.
    pub connect: Option<Duration>,
    /// Whole-request timeout.
    pub read: Option<Duration>,
}

/// Builds the session client around `jar`.
///
/// # Errors
///
/// Returns [`AuthError::ClientBuild`] when the client cannot be constructed.
pub(crate) fn build_session_client(
    jar: Arc<Jar>,
    timeouts: HttpTimeouts,
) -> Result<Client, AuthError> {
    match try_build_client(&jar, timeouts, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; retry with env-only proxy lookup.
            warn!("session client hit system proxy panic; using env-proxy fallback builder");
            match try_build_client(&jar, timeouts, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(AuthError::client_build(
                    "client construction panicked while initializing networking",
                )),
                Err(BuildClientFailure::Build(error)) => {
                    Err(AuthError::client_build(error.to_string()))
                }
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(AuthError::client_build(error.to_string())),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    jar: &Arc<Jar>,
    timeouts: HttpTimeouts,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let jar = Arc::clone(jar);
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = base_builder(jar, timeouts);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn base_builder(jar: Arc<Jar>, timeouts: HttpTimeouts) -> ClientBuilder {
    let mut builder = Client::builder()
        .user_agent(user_agent::default_user_agent())
        .cookie_provider(jar)
        .gzip(true);

    if let Some(connect) = timeouts.connect {
        builder = builder.connect_timeout(connect);
    }
    if let Some(read) = timeouts.read {
        builder = builder.timeout(read);
    }

    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = find_first_proxy_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = find_first_proxy_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn find_first_proxy_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
