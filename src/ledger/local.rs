//! In-process ledger with instant settlement.
//!
//! Keeps real account balances and enforces sufficient funds, but every
//! transfer reaches a terminal state on the first poll. Used for
//! dry-run games and deterministic tests — the production path is the
//! REST service behind the same trait.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::Cash;

use super::{LedgerService, LedgerStatus, StatusReport, TransferMetadata};

const SERVICE_NAME: &str = "local";

struct LocalTransfer {
    settled: bool,
    reason: Option<String>,
}

/// All state lives in-memory behind one mutex; the game loop is the
/// only caller, so contention is not a concern.
pub struct LocalLedger {
    accounts: Mutex<HashMap<String, Cash>>,
    transfers: Mutex<HashMap<String, LocalTransfer>>,
    next_id: Mutex<u64>,
}

impl LocalLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            transfers: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Open an account with a starting balance, replacing any existing
    /// balance for the same id.
    pub fn register_account(&self, account: &str, balance: Cash) {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.to_string(), balance);
    }

    /// Current balance, if the account exists.
    pub fn balance(&self, account: &str) -> Option<Cash> {
        self.accounts.lock().unwrap().get(account).copied()
    }
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerService for LocalLedger {
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Cash,
        _metadata: &TransferMetadata,
    ) -> Result<String> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = format!("local-{}", *next);
            *next += 1;
            id
        };

        let mut accounts = self.accounts.lock().unwrap();
        let from_balance = *accounts
            .get(from)
            .ok_or_else(|| anyhow!("unknown account: {from}"))?;
        if !accounts.contains_key(to) {
            return Err(anyhow!("unknown account: {to}"));
        }

        // Settle or fail immediately; the poll just reads the verdict.
        let transfer = if from_balance < amount {
            LocalTransfer {
                settled: false,
                reason: Some(format!(
                    "insufficient funds: need {amount}, have {from_balance}"
                )),
            }
        } else {
            *accounts.entry(from.to_string()).or_insert(Cash::ZERO) -= amount;
            *accounts.entry(to.to_string()).or_insert(Cash::ZERO) += amount;
            LocalTransfer {
                settled: true,
                reason: None,
            }
        };

        self.transfers.lock().unwrap().insert(id.clone(), transfer);
        Ok(id)
    }

    async fn poll_status(&self, transaction_id: &str) -> Result<StatusReport> {
        let transfers = self.transfers.lock().unwrap();
        let transfer = transfers
            .get(transaction_id)
            .ok_or_else(|| anyhow!("unknown transaction: {transaction_id}"))?;

        Ok(StatusReport {
            status: if transfer.settled {
                LedgerStatus::Success
            } else {
                LedgerStatus::Failed
            },
            reason: transfer.reason.clone(),
        })
    }

    fn name(&self) -> &str {
        SERVICE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
