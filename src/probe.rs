//! HTTP reachability probe
//!
//! One probe is a GET against a monitor's URL with manual redirect
//! following and a hard deadline covering the whole hop chain. Failures
//! that never produce an HTTP response map onto a closed set of negative
//! status codes, so history rows carry either a real HTTP status or one
//! of these codes.
//!
//! Transient failures (timeout, DNS, refused connection, TLS, generic
//! network, abort, unknown) are retried exactly once after a fixed
//! backoff; permanent probe outcomes (redirect errors, unsupported
//! protocol, any HTTP status) are recorded as-is.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::Client;
use tracing::{trace, warn};
use url::Url;

use crate::config::CheckerConfig;

/// Redirect statuses that are followed manually
const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// User agents rotated across probes; rotation avoids naive bot-blocking.
const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.10 Safari/605.1.1 UptimeMonitor",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.3 UptimeMonitor",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.3 UptimeMonitor",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Closed set of negative status codes for probes that failed before
/// producing an HTTP response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ProbeError {
    Unknown = -1,
    Timeout = -2,
    Dns = -3,
    ConnectionRefused = -4,
    Tls = -5,
    Network = -6,
    Abort = -7,
    TooManyRedirects = -8,
    InvalidRedirectLocation = -9,
    UnsupportedProtocol = -10,
}

impl ProbeError {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(ProbeError::Unknown),
            -2 => Some(ProbeError::Timeout),
            -3 => Some(ProbeError::Dns),
            -4 => Some(ProbeError::ConnectionRefused),
            -5 => Some(ProbeError::Tls),
            -6 => Some(ProbeError::Network),
            -7 => Some(ProbeError::Abort),
            -8 => Some(ProbeError::TooManyRedirects),
            -9 => Some(ProbeError::InvalidRedirectLocation),
            -10 => Some(ProbeError::UnsupportedProtocol),
            _ => None,
        }
    }

    /// Whether a failure of this kind warrants the single retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ProbeError::Unknown
                | ProbeError::Timeout
                | ProbeError::Dns
                | ProbeError::ConnectionRefused
                | ProbeError::Tls
                | ProbeError::Network
                | ProbeError::Abort
        )
    }
}

/// Whether a recorded status code is a transient probe failure.
pub fn is_transient_code(status: i32) -> bool {
    ProbeError::from_code(status).is_some_and(ProbeError::is_transient)
}

/// Map a client error onto the closed code set by inspecting its nature
/// and the messages along its source chain.
fn classify(err: &reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        return ProbeError::Timeout;
    }
    if err.is_builder() {
        return ProbeError::UnsupportedProtocol;
    }

    let mut messages = Vec::new();
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(inner) = source {
        messages.push(inner.to_string().to_lowercase());
        source = inner.source();
    }
    let text = messages.join(" ");

    if text.contains("dns") || text.contains("failed to lookup") {
        ProbeError::Dns
    } else if text.contains("connection refused") {
        ProbeError::ConnectionRefused
    } else if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
        ProbeError::Tls
    } else if text.contains("canceled") || text.contains("aborted") {
        ProbeError::Abort
    } else if err.is_connect() || text.contains("network") {
        ProbeError::Network
    } else {
        ProbeError::Unknown
    }
}

/// Reusable HTTP prober
///
/// The client is built once and shared across probes (connection reuse);
/// redirects are followed manually so hop count and `Location` handling
/// stay under our control.
pub struct Prober {
    client: Client,
    timeout: Duration,
    retry_backoff: Duration,
    max_redirects: usize,
}

impl Prober {
    pub fn new(config: &CheckerConfig) -> Self {
        let timeout = Duration::from_secs(config.probe_timeout_secs);

        Self {
            client: Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            timeout,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
            max_redirects: config.max_redirects,
        }
    }

    /// Probe `url`, retrying once on a transient failure.
    ///
    /// Returns the final HTTP status code or a negative probe code. The
    /// caller measures latency around this call so the retry (including
    /// its backoff) is part of the recorded duration.
    pub async fn check(&self, url: &str) -> i32 {
        let status = self.attempt(url).await;

        if status != 200 && is_transient_code(status) {
            trace!("{url}: transient failure ({status}), retrying once");
            tokio::time::sleep(self.retry_backoff).await;
            return self.attempt(url).await;
        }

        status
    }

    /// One attempt: the deadline spans the entire redirect chain.
    async fn attempt(&self, url: &str) -> i32 {
        match tokio::time::timeout(self.timeout, self.follow(url)).await {
            Ok(status) => status,
            Err(_) => ProbeError::Timeout.code(),
        }
    }

    async fn follow(&self, url: &str) -> i32 {
        let Ok(mut current) = Url::parse(url) else {
            warn!("{url}: not a parsable URL");
            return ProbeError::Unknown.code();
        };

        let mut redirects = 0;
        while redirects < self.max_redirects {
            let response = match self
                .client
                .get(current.clone())
                .header("User-Agent", random_user_agent())
                .header("Accept", "*/*")
                .header("Accept-Encoding", "gzip, deflate, br")
                .header("Accept-Language", "en-US,en;q=0.9")
                .header("Sec-Fetch-Dest", "document")
                .header("Sec-Fetch-Mode", "navigate")
                .header("Sec-Fetch-Site", "none")
                .header("Sec-Fetch-User", "?1")
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => return classify(&e).code(),
            };

            let code = response.status().as_u16();
            if !REDIRECT_CODES.contains(&code) {
                return code as i32;
            }

            let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                return ProbeError::InvalidRedirectLocation.code();
            };

            // Resolve the target against the URL that issued the redirect
            current = match current.join(location) {
                Ok(next) => next,
                Err(_) => return ProbeError::InvalidRedirectLocation.code(),
            };

            redirects += 1;
        }

        ProbeError::TooManyRedirects.code()
    }
}
