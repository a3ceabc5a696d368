//! Outbound side of the market: where recommended bids go.

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::domain::Envelope;
use crate::optimizer::Bid;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Market link unavailable: {0}")]
    Unavailable(String),
    #[error("Bid encoding failed: {0}")]
    Encoding(String),
}

/// Receives one bid per planning cycle
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BidSink: Send + Sync {
    async fn submit(&self, bid: Bid) -> Result<(), MarketError>;
}

/// Writes each bid envelope to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBidSink;

#[async_trait]
impl BidSink for LogBidSink {
    async fn submit(&self, bid: Bid) -> Result<(), MarketError> {
        let bid_id = bid.bid_id;
        let pairs = bid.pq_pairs.len();
        let json = Envelope::seal(bid)
            .to_json()
            .map_err(|e| MarketError::Encoding(e.to_string()))?;
        info!(%bid_id, pairs, bid = %json, "bid submitted");
        Ok(())
    }
}
