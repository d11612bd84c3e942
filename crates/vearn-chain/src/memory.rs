//! In-memory Thor node.
//!
//! Serves canned contract returns keyed by `(contract, selector)`, keeps
//! account balances, and mines submitted transactions one block after they
//! were sent. The best block advances by one every time it is queried, so a
//! `BlockTicker` always sees progress.
//!
//! Transaction ids are blake2b-256 of the raw bytes, not the signer-bound id
//! a real node derives.

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::contracts::Clause;
use crate::error::GatewayError;
use crate::thor::{
    AccountInfo, BlockRevision, BlockSummary, CallOutput, NodeClient, Receipt, ReceiptMeta,
};
use crate::tx::blake2b256;

const GENESIS_TIMESTAMP: u64 = 1_530_316_800;
const BLOCK_INTERVAL_SECS: u64 = 10;
const DEFAULT_CALL_GAS: u64 = 30_000;

/// What happens to the next submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiptOutcome {
    /// Mined successfully; queued call effects are applied.
    #[default]
    Mine,
    /// Mined with `reverted = true`.
    Revert,
    /// Never mined; the receipt stays `null`.
    Drop,
}

#[derive(Debug, Clone)]
enum CallResult {
    Data(Bytes),
    Revert(String),
}

type CallKey = (Address, [u8; 4]);

struct PendingTx {
    id: B256,
    submitted_at: u64,
    outcome: ReceiptOutcome,
    effects: Vec<(CallKey, Bytes)>,
}

#[derive(Default)]
struct State {
    best: u64,
    accounts: HashMap<Address, AccountInfo>,
    returns: HashMap<CallKey, CallResult>,
    pending: Vec<PendingTx>,
    receipts: HashMap<B256, Receipt>,
    next_outcome: ReceiptOutcome,
    queued: Vec<(CallKey, Bytes)>,
    sent: Vec<Vec<u8>>,
    call_count: usize,
}

pub struct MemoryNode {
    chain_tag: u8,
    call_gas: u64,
    state: Mutex<State>,
}

impl Default for MemoryNode {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNode {
    /// A testnet-tagged chain at block 1.
    pub fn new() -> Self {
        Self::with_chain_tag(0x27)
    }

    pub fn with_chain_tag(chain_tag: u8) -> Self {
        Self {
            chain_tag,
            call_gas: DEFAULT_CALL_GAS,
            state: Mutex::new(State {
                best: 1,
                ..State::default()
            }),
        }
    }

    pub fn set_account(&self, address: Address, vet: U256, vtho: U256) {
        self.state.lock().accounts.insert(
            address,
            AccountInfo {
                balance: vet,
                energy: vtho,
                has_code: false,
            },
        );
    }

    /// Serve `data` for every call of `C` on `to`.
    pub fn set_call_return<C: SolCall>(&self, to: Address, data: impl Into<Bytes>) {
        self.state
            .lock()
            .returns
            .insert((to, C::SELECTOR), CallResult::Data(data.into()));
    }

    /// Make calls of `C` on `to` revert.
    pub fn set_call_revert<C: SolCall>(&self, to: Address, reason: &str) {
        self.state
            .lock()
            .returns
            .insert((to, C::SELECTOR), CallResult::Revert(reason.to_string()));
    }

    /// Serve `data` for `C` on `to` once the next submitted transaction is mined.
    pub fn queue_call_return<C: SolCall>(&self, to: Address, data: impl Into<Bytes>) {
        self.state.lock().queued.push(((to, C::SELECTOR), data.into()));
    }

    pub fn set_next_outcome(&self, outcome: ReceiptOutcome) {
        self.state.lock().next_outcome = outcome;
    }

    pub fn best_number(&self) -> u64 {
        self.state.lock().best
    }

    /// Raw transactions submitted so far.
    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Number of `/accounts/*` simulations served.
    pub fn call_count(&self) -> usize {
        self.state.lock().call_count
    }

    /// Move the chain forward by `blocks`.
    pub fn advance(&self, blocks: u64) {
        let mut state = self.state.lock();
        for _ in 0..blocks {
            self.step(&mut state);
        }
    }

    fn step(&self, state: &mut State) {
        state.best += 1;
        let best = state.best;

        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
            .into_iter()
            .partition(|tx| tx.submitted_at < best);
        state.pending = waiting;

        for tx in ready {
            let reverted = match tx.outcome {
                ReceiptOutcome::Drop => continue,
                ReceiptOutcome::Revert => true,
                ReceiptOutcome::Mine => {
                    for (key, data) in tx.effects {
                        state.returns.insert(key, CallResult::Data(data));
                    }
                    false
                }
            };
            debug!(tx_id = %tx.id, block = best, reverted, "Mined transaction");
            let receipt = self.receipt_for(tx.id, best, reverted);
            state.receipts.insert(tx.id, receipt);
        }
    }

    fn block_id(&self, number: u64) -> B256 {
        let mut id = [0u8; 32];
        id[..8].copy_from_slice(&number.to_be_bytes());
        id[31] = self.chain_tag;
        B256::from(id)
    }

    fn summary(&self, number: u64) -> BlockSummary {
        BlockSummary {
            number,
            id: self.block_id(number),
            timestamp: GENESIS_TIMESTAMP + number * BLOCK_INTERVAL_SECS,
        }
    }

    fn receipt_for(&self, tx_id: B256, block: u64, reverted: bool) -> Receipt {
        Receipt {
            gas_used: self.call_gas,
            gas_payer: String::new(),
            paid: U256::ZERO,
            reward: U256::ZERO,
            reverted,
            meta: ReceiptMeta {
                block_id: self.block_id(block),
                block_number: block,
                block_timestamp: GENESIS_TIMESTAMP + block * BLOCK_INTERVAL_SECS,
                tx_id,
                tx_origin: String::new(),
            },
            outputs: Vec::new(),
        }
    }
}

#[async_trait]
impl NodeClient for MemoryNode {
    async fn account(&self, address: Address) -> Result<AccountInfo, GatewayError> {
        Ok(self
            .state
            .lock()
            .accounts
            .get(&address)
            .cloned()
            .unwrap_or(AccountInfo {
                balance: U256::ZERO,
                energy: U256::ZERO,
                has_code: false,
            }))
    }

    async fn call(
        &self,
        clauses: &[Clause],
        _caller: Option<Address>,
    ) -> Result<Vec<CallOutput>, GatewayError> {
        let mut state = self.state.lock();
        state.call_count += 1;

        let outputs = clauses
            .iter()
            .map(|clause| {
                let result = match (clause.to, clause.data.get(..4)) {
                    (Some(to), Some(selector)) => {
                        let mut key = [0u8; 4];
                        key.copy_from_slice(selector);
                        state.returns.get(&(to, key)).cloned()
                    }
                    _ => None,
                };
                let (data, reverted, vm_error) = match result {
                    Some(CallResult::Data(data)) => (data, false, String::new()),
                    Some(CallResult::Revert(reason)) => (Bytes::new(), true, reason),
                    None => (Bytes::new(), false, String::new()),
                };
                CallOutput {
                    data,
                    events: Vec::new(),
                    transfers: Vec::new(),
                    gas_used: self.call_gas,
                    reverted,
                    vm_error,
                }
            })
            .collect();
        Ok(outputs)
    }

    async fn receipt(&self, tx_id: B256) -> Result<Option<Receipt>, GatewayError> {
        Ok(self.state.lock().receipts.get(&tx_id).cloned())
    }

    async fn block(&self, revision: BlockRevision) -> Result<BlockSummary, GatewayError> {
        match revision {
            BlockRevision::Best => {
                let mut state = self.state.lock();
                self.step(&mut state);
                Ok(self.summary(state.best))
            }
            BlockRevision::Number(n) => {
                if n > self.state.lock().best {
                    return Err(GatewayError::Network(format!("block {n} not found")));
                }
                Ok(self.summary(n))
            }
        }
    }

    async fn send_raw(&self, raw: &[u8]) -> Result<B256, GatewayError> {
        let id = blake2b256(&[raw]);
        let mut state = self.state.lock();
        let outcome = std::mem::take(&mut state.next_outcome);
        let effects = std::mem::take(&mut state.queued);
        let submitted_at = state.best;
        state.pending.push(PendingTx {
            id,
            submitted_at,
            outcome,
            effects,
        });
        state.sent.push(raw.to_vec());
        debug!(tx_id = %id, block = submitted_at, ?outcome, "Accepted transaction");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{build_clause, IEnergy, ENERGY_ADDRESS};
    use alloy::primitives::address;
    use alloy::sol_types::SolValue;

    const OWNER: Address = address!("7567d83b7b8d80addcb281a71d54fc7b3364ffed");

    #[tokio::test]
    async fn test_genesis_carries_chain_tag() {
        let node = MemoryNode::with_chain_tag(0x4a);
        let genesis = node.block(BlockRevision::Number(0)).await.unwrap();
        assert_eq!(genesis.id[31], 0x4a);
    }

    #[tokio::test]
    async fn test_best_advances_per_query() {
        let node = MemoryNode::new();
        let a = node.block(BlockRevision::Best).await.unwrap();
        let b = node.block(BlockRevision::Best).await.unwrap();
        assert_eq!(b.number, a.number + 1);
    }

    #[tokio::test]
    async fn test_canned_call_return() {
        let node = MemoryNode::new();
        node.set_call_return::<IEnergy::balanceOfCall>(ENERGY_ADDRESS, U256::from(9u64).abi_encode());

        let clause = build_clause(ENERGY_ADDRESS, &IEnergy::balanceOfCall { owner: OWNER });
        let outputs = node.call(&[clause], None).await.unwrap();
        assert_eq!(U256::abi_decode(&outputs[0].data).unwrap(), U256::from(9u64));
        assert_eq!(node.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mined_after_next_block_with_effects() {
        let node = MemoryNode::new();
        node.queue_call_return::<IEnergy::allowanceCall>(ENERGY_ADDRESS, U256::MAX.abi_encode());

        let id = node.send_raw(&[1, 2, 3]).await.unwrap();
        assert!(node.receipt(id).await.unwrap().is_none());

        node.advance(1);
        let receipt = node.receipt(id).await.unwrap().unwrap();
        assert!(!receipt.reverted);

        let clause = build_clause(
            ENERGY_ADDRESS,
            &IEnergy::allowanceCall {
                owner: OWNER,
                spender: OWNER,
            },
        );
        let outputs = node.call(&[clause], None).await.unwrap();
        assert_eq!(U256::abi_decode(&outputs[0].data).unwrap(), U256::MAX);
    }

    #[tokio::test]
    async fn test_revert_and_drop() {
        let node = MemoryNode::new();
        node.set_next_outcome(ReceiptOutcome::Revert);
        let reverted = node.send_raw(&[1]).await.unwrap();
        node.set_next_outcome(ReceiptOutcome::Drop);
        let dropped = node.send_raw(&[2]).await.unwrap();

        node.advance(3);
        assert!(node.receipt(reverted).await.unwrap().unwrap().reverted);
        assert!(node.receipt(dropped).await.unwrap().is_none());
        assert_eq!(node.sent_transactions().len(), 2);
    }
}
