use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::cache::TtlCache;
use crate::constants::TOKEN_CACHE_TTL_SECS;
use crate::error::WalletError;
use crate::models::TokenMap;

/// Where the token list comes from.
#[async_trait]
pub trait TokenListSource: Send + Sync {
    async fn fetch_tokens(&self) -> Result<TokenMap, WalletError>;
}

/// Token list with a 5 minute TTL. Never fails: callers get the last good
/// list, or an empty one.
pub struct TokenMetadataCache {
    source: Arc<dyn TokenListSource>,
    cache: TtlCache<(), Arc<TokenMap>>,
}

impl TokenMetadataCache {
    pub fn new(source: Arc<dyn TokenListSource>) -> Self {
        Self::with_ttl(source, Duration::from_secs(TOKEN_CACHE_TTL_SECS))
    }

    pub fn with_ttl(source: Arc<dyn TokenListSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: TtlCache::new(ttl),
        }
    }

    pub async fn get_tokens(&self) -> Arc<TokenMap> {
        let fetched = self
            .cache
            .get_or_fetch((), || async {
                let tokens = self.source.fetch_tokens().await?;
                tracing::debug!("Loaded {} tokens from token list", tokens.len());
                Ok::<_, WalletError>(Arc::new(tokens))
            })
            .await;

        match fetched {
            Ok(tokens) => tokens,
            Err(err) => {
                tracing::warn!("Error fetching tokens: {}", err);
                match self.cache.get_stale(&()).await {
                    Some(stale) => stale,
                    None => Arc::new(TokenMap::new()),
                }
            }
        }
    }
}
