// ── Edge Engine: HTTP Plumbing, Timeouts & Circuit Breaker ─────────────────
//
// Shared network utilities used by the HTTP backend and by every component
// that awaits a collaborator.
//
// Features:
//   • `bounded()` — every suspension point carries a deadline
//   • Circuit breaker: N consecutive failures → fail fast for a cooldown
//   • Certificate-pinned reqwest::Client (Mozilla roots only)

use crate::atoms::error::{EdgeError, EdgeResult};
use log::warn;
use reqwest::Client;
use rustls::ClientConfig;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

// ── Bounded calls ──────────────────────────────────────────────────────────

/// Await `fut` for at most `limit`; a timeout becomes `EdgeError::Timeout`.
pub async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> EdgeResult<T>
where
    F: Future<Output = EdgeResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EdgeError::Timeout(format!("{} after {}ms", what, limit.as_millis()))),
    }
}

// ── Circuit Breaker ────────────────────────────────────────────────────────

/// Trips after N consecutive failures, then rejects calls for a cooldown
/// period before letting a single trial request through.
///
/// States:
///   Closed   — normal operation, requests pass through
///   Open     — rejecting requests (cooldown active)
///   HalfOpen — cooldown expired; the first caller claims the trial by
///              restarting the cooldown, everyone else is still rejected
///
/// A trial that never reports back (dropped future) only blocks until the
/// restarted cooldown runs out.
pub struct CircuitBreaker {
    consecutive_failures: AtomicU32,
    /// Epoch secs when the circuit was tripped open or the last trial began.
    tripped_at: AtomicU64,
    threshold: u32,
    cooldown_secs: u64,
}

impl CircuitBreaker {
    pub const fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            tripped_at: AtomicU64::new(0),
            threshold,
            cooldown_secs,
        }
    }

    /// `Ok(())` if a request may go out, `Err(CircuitOpen)` otherwise.
    pub fn check(&self) -> EdgeResult<()> {
        let failures = self.consecutive_failures.load(Ordering::SeqCst);
        if self.threshold == 0 || failures < self.threshold {
            return Ok(());
        }

        let tripped = self.tripped_at.load(Ordering::SeqCst);
        let now = epoch_secs();
        let elapsed = now.saturating_sub(tripped);
        if elapsed < self.cooldown_secs {
            return Err(EdgeError::CircuitOpen(format!(
                "{} consecutive failures, cooling down for {}s",
                failures,
                self.cooldown_secs - elapsed
            )));
        }
        match self
            .tripped_at
            .compare_exchange(tripped, now, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Ok(()),
            Err(_) => Err(EdgeError::CircuitOpen("trial request already in flight".into())),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.tripped_at.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        let prev = self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        if self.threshold > 0 && prev + 1 >= self.threshold {
            self.tripped_at.store(epoch_secs(), Ordering::SeqCst);
            if prev + 1 == self.threshold {
                warn!(
                    "[http] Circuit tripped after {} consecutive failures — cooling down {}s",
                    prev + 1,
                    self.cooldown_secs
                );
            }
        }
    }

    /// True while requests are being rejected. Does not claim the trial.
    pub fn is_open(&self) -> bool {
        if self.threshold == 0 || self.consecutive_failures.load(Ordering::SeqCst) < self.threshold {
            return false;
        }
        epoch_secs().saturating_sub(self.tripped_at.load(Ordering::SeqCst)) < self.cooldown_secs
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Certificate-Pinned Client Factory ──────────────────────────────────────
//
// Builds a `reqwest::Client` on a rustls config that trusts only the Mozilla
// root store, so a CA installed on the device cannot intercept edge traffic.
// Uses an explicit `ring` provider so it works in test binaries where no
// process-level provider was installed.

fn pinned_tls_config() -> EdgeResult<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| EdgeError::Config(format!("TLS protocol versions: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(config)
}

/// Build the shared edge API client. The per-request timeout is the
/// backstop; components still wrap calls in `bounded()`.
pub fn pinned_client(connect_timeout: Duration, request_timeout: Duration) -> EdgeResult<Client> {
    let client = Client::builder()
        .use_preconfigured_tls(pinned_tls_config()?)
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_trips_at_threshold_and_resets() {
        let breaker = CircuitBreaker::new(3, 60);
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.record_success();
        assert!(breaker.check().is_ok());
    }

    /// Pretend the breaker tripped `secs` ago.
    fn backdate(breaker: &CircuitBreaker, secs: u64) {
        breaker.tripped_at.store(epoch_secs() - secs, Ordering::SeqCst);
    }

    #[test]
    fn breaker_half_opens_for_one_trial() {
        let breaker = CircuitBreaker::new(1, 30);
        breaker.record_failure();
        assert!(breaker.is_open());
        backdate(&breaker, 31);
        assert!(!breaker.is_open());

        assert!(breaker.check().is_ok());
        assert!(matches!(breaker.check(), Err(EdgeError::CircuitOpen(_))));

        // Failed trial: a fresh cooldown.
        breaker.record_failure();
        assert!(breaker.is_open());
        backdate(&breaker, 31);
        assert!(breaker.check().is_ok());
        breaker.record_success();
        assert!(breaker.check().is_ok());
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn concurrent_callers_get_a_single_trial() {
        let breaker = CircuitBreaker::new(2, 30);
        breaker.record_failure();
        breaker.record_failure();
        backdate(&breaker, 60);

        let admitted = AtomicU32::new(0);
        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    if breaker.check().is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bounded_times_out() {
        let result: EdgeResult<()> = bounded("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(EdgeError::Timeout(_))));
    }
}
