use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::cache::TtlCache;
use crate::constants::{
    BITCOIN_PROXY_CACHE_TTL_SECS, BITCOIN_RATE_LIMIT_MAX_REQUESTS, BITCOIN_RATE_LIMIT_WINDOW_SECS,
    UPSTREAM_RETRY_BASE_MILLIS, UPSTREAM_RETRY_MAX_ATTEMPTS,
};
use crate::error::WalletError;
use crate::integrations::{BtcIndexer, UpstreamError};
use crate::models::wallet::{format_base_units, zero_amount};
use crate::utils::short_address;

const BTC_DECIMALS: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// Fetched from an indexer on this call.
    Fresh(String),
    Cached(String),
    /// Rate limited: last known value (possibly expired) or zero.
    Degraded(String),
}

impl ProxyOutcome {
    pub fn balance(&self) -> &str {
        match self {
            ProxyOutcome::Fresh(b) | ProxyOutcome::Cached(b) | ProxyOutcome::Degraded(b) => b,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, ProxyOutcome::Degraded(_))
    }
}

/// Fixed-window counter per key.
struct RateLimiter {
    window: Duration,
    max_requests: u32,
    hits: Mutex<HashMap<String, (Instant, u32)>>,
}

impl RateLimiter {
    fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn try_acquire(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.retain(|_, (started, _)| now.duration_since(*started) < self.window);

        let (_, count) = hits.entry(key.to_string()).or_insert((now, 0));
        if *count >= self.max_requests {
            return false;
        }
        *count += 1;
        true
    }
}

/// Bitcoin balance lookups over public indexers with caching, a per-address
/// rate limit and 429 backoff.
pub struct BitcoinBalanceProxy {
    indexers: Vec<Arc<dyn BtcIndexer>>,
    cache: TtlCache<String, String>,
    limiter: RateLimiter,
    retry_base: Duration,
}

impl BitcoinBalanceProxy {
    pub fn new(indexers: Vec<Arc<dyn BtcIndexer>>) -> Self {
        Self {
            indexers,
            cache: TtlCache::new(Duration::from_secs(BITCOIN_PROXY_CACHE_TTL_SECS)),
            limiter: RateLimiter::new(
                Duration::from_secs(BITCOIN_RATE_LIMIT_WINDOW_SECS),
                BITCOIN_RATE_LIMIT_MAX_REQUESTS,
            ),
            retry_base: Duration::from_millis(UPSTREAM_RETRY_BASE_MILLIS),
        }
    }

    pub async fn balance(&self, address: &str) -> Result<ProxyOutcome, WalletError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(WalletError::InvalidAddress(
                "Bitcoin address is required".to_string(),
            ));
        }
        let key = address.to_string();

        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Returning cached balance for {}", short_address(address));
            return Ok(ProxyOutcome::Cached(hit));
        }

        let fetched = self
            .cache
            .get_or_fetch(key.clone(), || async {
                if !self.limiter.try_acquire(address) {
                    return Err(WalletError::RateLimited);
                }
                self.fetch_upstream(address).await
            })
            .await;

        match fetched {
            Ok(balance) => Ok(ProxyOutcome::Fresh(balance)),
            Err(WalletError::RateLimited) => {
                tracing::warn!("Rate limit hit for {}", short_address(address));
                let balance = self
                    .cache
                    .get_stale(&key)
                    .await
                    .unwrap_or_else(|| zero_amount(BTC_DECIMALS));
                Ok(ProxyOutcome::Degraded(balance))
            }
            Err(err) => Err(err),
        }
    }

    // Internal helper that walks the indexer chain.
    async fn fetch_upstream(&self, address: &str) -> Result<String, WalletError> {
        for indexer in &self.indexers {
            match self.fetch_with_retry(indexer.as_ref(), address).await {
                Ok(sats) => {
                    tracing::info!(
                        "Fetched balance for {} from {}",
                        short_address(address),
                        indexer.name()
                    );
                    return format_base_units(u128::from(sats), BTC_DECIMALS, BTC_DECIMALS)
                        .ok_or_else(|| {
                            WalletError::SourceUnavailable("balance out of range".to_string())
                        });
                }
                Err(err) => tracing::warn!("{} failed: {}", indexer.name(), err),
            }
        }
        Err(WalletError::SourceUnavailable(
            "All Bitcoin balance APIs failed".to_string(),
        ))
    }

    // Retries only on 429, doubling the delay each time.
    async fn fetch_with_retry(
        &self,
        indexer: &dyn BtcIndexer,
        address: &str,
    ) -> Result<u64, UpstreamError> {
        let mut delay = self.retry_base;
        let mut attempt = 1;
        loop {
            match indexer.fetch_balance_sats(address).await {
                Err(UpstreamError::RateLimited) if attempt < UPSTREAM_RETRY_MAX_ATTEMPTS => {
                    tracing::debug!(
                        "{} rate limited, retry {} in {:?}",
                        indexer.name(),
                        attempt,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
