//! Block ticker.
//!
//! Polls the best block on a fixed interval and yields whenever the block
//! number moves forward.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::GatewayError;
use crate::thor::{BlockRevision, BlockSummary, NodeClient};

pub struct BlockTicker {
    node: Arc<dyn NodeClient>,
    interval: Duration,
    last: u64,
}

impl BlockTicker {
    /// Start ticking from the current best block.
    pub async fn start(node: Arc<dyn NodeClient>, interval: Duration) -> Result<Self, GatewayError> {
        let best = node.block(BlockRevision::Best).await?;
        Ok(Self {
            node,
            interval,
            last: best.number,
        })
    }

    /// Wait for the next block.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<BlockSummary, GatewayError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }

            let best = self.node.block(BlockRevision::Best).await?;
            if best.number > self.last {
                trace!(number = best.number, "New block");
                self.last = best.number;
                return Ok(best);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNode;

    #[tokio::test(start_paused = true)]
    async fn test_yields_increasing_blocks() {
        let node = Arc::new(MemoryNode::new());
        let mut ticker = BlockTicker::start(node.clone(), Duration::from_secs(2))
            .await
            .unwrap();
        let first = node.best_number();

        let cancel = CancellationToken::new();
        let a = ticker.next(&cancel).await.unwrap();
        let b = ticker.next(&cancel).await.unwrap();
        assert!(a.number > first);
        assert!(b.number > a.number);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled() {
        let node = Arc::new(MemoryNode::new());
        let mut ticker = BlockTicker::start(node, Duration::from_secs(2)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(ticker.next(&cancel).await, Err(GatewayError::Cancelled)));
    }
}
