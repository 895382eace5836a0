use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::redirect;
use tracing::{debug, warn};

const USER_AGENT: &str = "zapscan/0.1";
const MAX_REDIRECTS: usize = 10;
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8000;

/// Terminal outcome of one domain's fetch cycle, retries included.
/// `status_code == 0` means every attempt failed; the orchestrator still
/// persists it so the domain is not refetched on resume.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub domain: String,
    pub final_url: String,
    pub status_code: u16,
    pub body: Option<String>,
    pub elapsed_ms: u64,
    pub attempts: u32,
}

/// Exponential backoff schedule: base * 2^attempt, capped.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(BASE_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_retries
    }
}

enum AttemptOutcome {
    /// Got an HTTP response that is not worth retrying (2xx/3xx/4xx).
    Done {
        final_url: String,
        status: u16,
        body: Option<String>,
    },
    /// Timeout, refused/reset connection, 5xx.
    Transient { reason: String, connect: bool },
    /// DNS failure, redirect loop, malformed URL.
    Permanent { reason: String },
}

pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, policy })
    }

    /// Fetch one domain. Never errors: permanent failures and exhausted
    /// retries come back as a normal result with status 0 and no body.
    pub async fn fetch(&self, domain: &str) -> FetchResult {
        let start = Instant::now();
        let mut attempts = 0u32;

        for attempt in 0..=self.policy.max_retries {
            attempts = attempt + 1;
            match self.attempt(domain).await {
                AttemptOutcome::Done {
                    final_url,
                    status,
                    body,
                } => {
                    return FetchResult {
                        domain: domain.to_string(),
                        final_url,
                        status_code: status,
                        body,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                        attempts,
                    };
                }
                AttemptOutcome::Permanent { reason } => {
                    debug!("Permanent fetch failure for {}: {}", domain, reason);
                    break;
                }
                AttemptOutcome::Transient { reason, .. } => {
                    if self.policy.exhausted(attempt) {
                        debug!("Retries exhausted for {}: {}", domain, reason);
                        break;
                    }
                    let backoff = self.policy.delay(attempt);
                    warn!(
                        "Transient failure on {} (attempt {}/{}), backing off {:.1}s: {}",
                        domain,
                        attempt + 1,
                        self.policy.max_retries + 1,
                        backoff.as_secs_f64(),
                        reason
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        // Failure row: empty final_url so downstream classification fails closed
        FetchResult {
            domain: domain.to_string(),
            final_url: String::new(),
            status_code: 0,
            body: None,
            elapsed_ms: start.elapsed().as_millis() as u64,
            attempts,
        }
    }

    /// One attempt: https first, plain http when https is unreachable at
    /// the connection level (some sites never grew a certificate).
    async fn attempt(&self, domain: &str) -> AttemptOutcome {
        match self.request(&format!("https://{}", domain)).await {
            AttemptOutcome::Transient { connect: true, .. } => {
                self.request(&format!("http://{}", domain)).await
            }
            outcome => outcome,
        }
    }

    async fn request(&self, url: &str) -> AttemptOutcome {
        match self.client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_server_error() {
                    return AttemptOutcome::Transient {
                        reason: format!("HTTP {}", status.as_u16()),
                        connect: false,
                    };
                }
                let final_url = resp.url().to_string();
                let body = resp.text().await.ok();
                AttemptOutcome::Done {
                    final_url,
                    status: status.as_u16(),
                    body,
                }
            }
            Err(e) => classify_error(&e),
        }
    }
}

fn classify_error(e: &reqwest::Error) -> AttemptOutcome {
    let reason = error_chain(e);
    if e.is_redirect() || e.is_builder() {
        return AttemptOutcome::Permanent { reason };
    }
    // reqwest folds DNS resolution into connect errors; the chain names it
    if reason.to_ascii_lowercase().contains("dns") {
        return AttemptOutcome::Permanent { reason };
    }
    AttemptOutcome::Transient {
        connect: e.is_connect(),
        reason,
    }
}

/// Flatten an error and its sources into one line for logging/matching.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut cur = e.source();
    while let Some(src) = cur {
        out.push_str(": ");
        out.push_str(&src.to_string());
        cur = src.source();
    }
    out
}
