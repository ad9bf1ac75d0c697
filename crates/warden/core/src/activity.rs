//! Per-chain log of on-chain actions taken by the wallet.

use crate::chain::ChainId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a logged transaction did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ActivityKind {
    /// Native currency transfer.
    Transfer,
    /// A call with calldata.
    ContractCall,
    /// ERC-20 style token transfer.
    TokenTransfer,
    /// Any other chain-native transaction.
    Transaction,
}

/// Status of a logged transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TxStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

/// An append-only log entry describing a completed state-changing call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub hash: String,
    pub kind: ActivityKind,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Amount in the chain's smallest unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    pub status: TxStatus,
    pub timestamp: DateTime<Utc>,
}

impl ActivityRecord {
    /// Creates a pending record stamped with the current time.
    pub fn pending(hash: impl Into<String>, kind: ActivityKind, from: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            kind,
            from: from.into(),
            to: None,
            amount: None,
            status: TxStatus::Pending,
            timestamp: Utc::now(),
        }
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }
}

/// Activity records grouped by chain, in append order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLog {
    chains: HashMap<ChainId, Vec<ActivityRecord>>,
}

impl ActivityLog {
    pub fn append(&mut self, chain_id: ChainId, record: ActivityRecord) {
        self.chains.entry(chain_id).or_default().push(record);
    }

    /// All records of the chain, oldest first.
    pub fn records(&self, chain_id: &ChainId) -> &[ActivityRecord] {
        self.chains.get(chain_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Hashes of the chain's records still waiting for a receipt.
    pub fn pending(&self, chain_id: &ChainId) -> Vec<String> {
        self.records(chain_id)
            .iter()
            .filter(|record| record.status == TxStatus::Pending)
            .map(|record| record.hash.clone())
            .collect()
    }

    /// Settles a pending record.
    ///
    /// Only `Pending` records transition; returns `false` if the record is unknown or already
    /// settled.
    pub fn resolve(&mut self, chain_id: &ChainId, hash: &str, success: bool) -> bool {
        let Some(record) = self
            .chains
            .get_mut(chain_id)
            .and_then(|records| records.iter_mut().find(|record| record.hash == hash))
        else {
            return false;
        };
        if record.status != TxStatus::Pending {
            return false;
        }
        record.status = if success { TxStatus::Success } else { TxStatus::Failed };
        true
    }

    pub fn len(&self) -> usize {
        self.chains.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
