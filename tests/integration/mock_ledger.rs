//! Mock ledger for integration testing.
//!
//! Provides a deterministic `LedgerService` implementation that replays
//! scripted status sequences and records every submitted transfer —
//! all in-memory with no external dependencies. Unlike the in-process
//! ledger it tracks no balances: it exists to exercise the settlement
//! adapter's polling behavior.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tycoon::ledger::{LedgerService, LedgerStatus, StatusReport, TransferMetadata};
use tycoon::types::Cash;

/// A transfer as the mock saw it submitted.
#[derive(Debug, Clone)]
pub struct SubmittedTransfer {
    pub from: String,
    pub to: String,
    pub amount: Cash,
    pub reason: String,
}

struct TransferRecord {
    sequence: Vec<LedgerStatus>,
    cursor: usize,
}

/// Scripted-status ledger. Each submitted transfer consumes the next
/// queued sequence (falling back to the default), and every poll
/// advances through it, repeating the final status forever.
pub struct MockLedger {
    default_sequence: Vec<LedgerStatus>,
    queued_sequences: Mutex<VecDeque<Vec<LedgerStatus>>>,
    transfers: Mutex<HashMap<String, TransferRecord>>,
    submitted: Mutex<Vec<SubmittedTransfer>>,
    force_error: Mutex<Option<String>>,
    next_id: Mutex<u64>,
}

impl MockLedger {
    /// Transfers settle on the second poll by default.
    pub fn new() -> Self {
        Self::with_default_sequence(vec![LedgerStatus::Submitted, LedgerStatus::Success])
    }

    pub fn with_default_sequence(sequence: Vec<LedgerStatus>) -> Self {
        Self {
            default_sequence: sequence,
            queued_sequences: Mutex::new(VecDeque::new()),
            transfers: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            force_error: Mutex::new(None),
            next_id: Mutex::new(1),
        }
    }

    /// Script the status sequence for the next submitted transfer.
    pub fn queue_sequence(&self, sequence: Vec<LedgerStatus>) {
        self.queued_sequences.lock().unwrap().push_back(sequence);
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// All transfers submitted so far.
    pub fn submitted(&self) -> Vec<SubmittedTransfer> {
        self.submitted.lock().unwrap().clone()
    }

    /// How many times a transaction has been polled.
    pub fn poll_count(&self, transaction_id: &str) -> usize {
        self.transfers
            .lock()
            .unwrap()
            .get(transaction_id)
            .map(|t| t.cursor)
            .unwrap_or(0)
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerService for MockLedger {
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Cash,
        metadata: &TransferMetadata,
    ) -> Result<String> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }

        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = format!("mock-{}", *next);
            *next += 1;
            id
        };

        let sequence = self
            .queued_sequences
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_sequence.clone());

        self.transfers.lock().unwrap().insert(
            id.clone(),
            TransferRecord {
                sequence,
                cursor: 0,
            },
        );
        self.submitted.lock().unwrap().push(SubmittedTransfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
            reason: metadata.reason.clone(),
        });

        Ok(id)
    }

    async fn poll_status(&self, transaction_id: &str) -> Result<StatusReport> {
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }

        let mut transfers = self.transfers.lock().unwrap();
        let record = transfers
            .get_mut(transaction_id)
            .ok_or_else(|| anyhow!("unknown transaction: {transaction_id}"))?;

        let index = record.cursor.min(record.sequence.len() - 1);
        let status = record.sequence[index].clone();
        record.cursor += 1;

        Ok(StatusReport {
            status,
            reason: None,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metadata() -> TransferMetadata {
        TransferMetadata::new("game-test", 1, "mock test")
    }

    #[tokio::test]
    async fn test_default_sequence_settles_on_second_poll() {
        let ledger = MockLedger::new();
        let tx = ledger
            .submit("a", "b", dec!(10), &metadata())
            .await
            .unwrap();

        let first = ledger.poll_status(&tx).await.unwrap();
        assert_eq!(first.status, LedgerStatus::Submitted);
        let second = ledger.poll_status(&tx).await.unwrap();
        assert_eq!(second.status, LedgerStatus::Success);
        // Terminal status repeats forever.
        let third = ledger.poll_status(&tx).await.unwrap();
        assert_eq!(third.status, LedgerStatus::Success);
    }

    #[tokio::test]
    async fn test_queued_sequence_consumed_in_order() {
        let ledger = MockLedger::new();
        ledger.queue_sequence(vec![LedgerStatus::Pending, LedgerStatus::Failed]);

        let scripted = ledger.submit("a", "b", dec!(1), &metadata()).await.unwrap();
        let default = ledger.submit("a", "b", dec!(2), &metadata()).await.unwrap();

        assert_eq!(
            ledger.poll_status(&scripted).await.unwrap().status,
            LedgerStatus::Pending
        );
        assert_eq!(
            ledger.poll_status(&scripted).await.unwrap().status,
            LedgerStatus::Failed
        );
        assert_eq!(
            ledger.poll_status(&default).await.unwrap().status,
            LedgerStatus::Submitted
        );
    }

    #[tokio::test]
    async fn test_records_submissions() {
        let ledger = MockLedger::new();
        ledger.submit("a", "b", dec!(42), &metadata()).await.unwrap();
        let submitted = ledger.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].from, "a");
        assert_eq!(submitted[0].amount, dec!(42));
    }

    #[tokio::test]
    async fn test_forced_error() {
        let ledger = MockLedger::new();
        ledger.set_error("simulated outage");
        assert!(ledger.submit("a", "b", dec!(1), &metadata()).await.is_err());
        ledger.clear_error();
        assert!(ledger.submit("a", "b", dec!(1), &metadata()).await.is_ok());
    }
}
