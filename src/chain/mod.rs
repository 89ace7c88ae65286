//! Bitcoin chain tip lookup via an Esplora-compatible HTTP API

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Current head of the Bitcoin chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub hash: String,
}

#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("chain network error: {0}")]
    Network(String),

    #[error("chain service error: {0}")]
    ServiceError(String),

    #[error("invalid chain response: {0}")]
    InvalidResponse(String),

    #[error("chain request timed out after {0} seconds")]
    Timeout(u64),
}

/// Source of the current chain tip. A maturation cycle needs both the
/// height and the hash, so a failure of either lookup fails the whole call.
#[async_trait]
pub trait ChainTipOracle: Send + Sync {
    async fn tip(&self) -> Result<ChainTip, ChainError>;
}

/// [`ChainTipOracle`] backed by an Esplora REST endpoint
pub struct EsploraOracle {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl EsploraOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn fetch_text(&self, path: &str) -> Result<String, ChainError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::ServiceError(format!(
                "{url} returned {status}"
            )));
        }
        response.text().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> ChainError {
        if err.is_timeout() {
            ChainError::Timeout(self.timeout.as_secs())
        } else {
            ChainError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ChainTipOracle for EsploraOracle {
    async fn tip(&self) -> Result<ChainTip, ChainError> {
        let height_text = self.fetch_text("/blocks/tip/height").await?;
        let height: u64 = height_text
            .trim()
            .parse()
            .map_err(|_| ChainError::InvalidResponse(format!("bad tip height: {height_text:?}")))?;

        let hash = self.fetch_text("/blocks/tip/hash").await?;
        let hash = hash.trim().to_string();
        if hash.is_empty() {
            return Err(ChainError::InvalidResponse("empty tip hash".into()));
        }

        Ok(ChainTip { height, hash })
    }
}

/// In-memory oracle for tests
pub struct MockChainTipOracle {
    pub should_fail: AtomicBool,
    pub calls: AtomicUsize,
    tip: ChainTip,
}

impl MockChainTipOracle {
    pub fn new(height: u64, hash: &str) -> Self {
        Self {
            should_fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            tip: ChainTip {
                height,
                hash: hash.to_string(),
            },
        }
    }

    pub fn failing() -> Self {
        let mock = Self::new(0, "");
        mock.should_fail.store(true, Ordering::SeqCst);
        mock
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainTipOracle for MockChainTipOracle {
    async fn tip(&self) -> Result<ChainTip, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ChainError::ServiceError("mock chain failure".into()));
        }
        Ok(self.tip.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    const TIMEOUT: Duration = Duration::from_secs(5);
    const TIP_HASH: &str = "00000000000000000002c0cc73626b56fb3ee1ce605b0ce125cc4fb58775a0a9";

    #[tokio::test]
    async fn test_tip_success() {
        let mut server = Server::new_async().await;

        let height_mock = server
            .mock("GET", "/blocks/tip/height")
            .with_status(200)
            .with_body("812345\n")
            .create_async()
            .await;
        let hash_mock = server
            .mock("GET", "/blocks/tip/hash")
            .with_status(200)
            .with_body(format!("{TIP_HASH}\n"))
            .create_async()
            .await;

        let oracle = EsploraOracle::new(&server.url(), TIMEOUT).unwrap();
        let tip = oracle.tip().await.unwrap();

        height_mock.assert_async().await;
        hash_mock.assert_async().await;
        assert_eq!(tip.height, 812_345);
        assert_eq!(tip.hash, TIP_HASH);
    }

    #[tokio::test]
    async fn test_tip_trailing_slash_in_base_url() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/blocks/tip/height")
            .with_status(200)
            .with_body("1")
            .create_async()
            .await;
        server
            .mock("GET", "/blocks/tip/hash")
            .with_status(200)
            .with_body(TIP_HASH)
            .create_async()
            .await;

        let base = format!("{}/", server.url());
        let oracle = EsploraOracle::new(&base, TIMEOUT).unwrap();
        assert!(oracle.tip().await.is_ok());
    }

    #[tokio::test]
    async fn test_tip_fails_on_bad_height() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/blocks/tip/height")
            .with_status(200)
            .with_body("not-a-number")
            .create_async()
            .await;

        let oracle = EsploraOracle::new(&server.url(), TIMEOUT).unwrap();
        assert!(matches!(
            oracle.tip().await,
            Err(ChainError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_tip_fails_when_hash_lookup_fails() {
        // height succeeds, hash 500s: the whole fetch must fail
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/blocks/tip/height")
            .with_status(200)
            .with_body("812345")
            .create_async()
            .await;
        server
            .mock("GET", "/blocks/tip/hash")
            .with_status(500)
            .create_async()
            .await;

        let oracle = EsploraOracle::new(&server.url(), TIMEOUT).unwrap();
        assert!(matches!(
            oracle.tip().await,
            Err(ChainError::ServiceError(_))
        ));
    }

    #[tokio::test]
    async fn test_tip_fails_on_empty_hash() {
        let mut server = Server::new_async().await;

        server
            .mock("GET", "/blocks/tip/height")
            .with_status(200)
            .with_body("812345")
            .create_async()
            .await;
        server
            .mock("GET", "/blocks/tip/hash")
            .with_status(200)
            .with_body("  \n")
            .create_async()
            .await;

        let oracle = EsploraOracle::new(&server.url(), TIMEOUT).unwrap();
        assert!(matches!(
            oracle.tip().await,
            Err(ChainError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_oracle_counts_and_fails() {
        let oracle = MockChainTipOracle::new(10, "abc");
        assert_eq!(oracle.tip().await.unwrap().height, 10);
        assert_eq!(oracle.call_count(), 1);

        let failing = MockChainTipOracle::failing();
        assert!(failing.tip().await.is_err());
    }
}
