//! Ledger integrations.
//!
//! Defines the `LedgerService` trait over the external asynchronous
//! payment service and provides implementations for:
//! - REST (HTTP payment service) — production settlement
//! - Local (in-process, instant settlement) — dry-run and tests
//!
//! The settlement adapter in [`adapter`] hides the service's
//! intermediate states behind a single terminal outcome.

pub mod adapter;
pub mod local;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Cash;

// ---------------------------------------------------------------------------
// Status vocabulary
// ---------------------------------------------------------------------------

/// Payment status as reported by the external service.
///
/// The vocabulary is open: unknown strings arrive as `Other` and are
/// treated as non-terminal, so a service adding intermediate states
/// cannot break settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Submitted,
    Initiated,
    Pending,
    Processing,
    Approved,
    PendingConfirmation,
    Success,
    Settled,
    Failed,
    Rejected,
    Cancelled,
    Other(String),
}

/// The three classes every wire status maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    NonTerminal,
    TerminalSuccess,
    TerminalFailure,
}

impl LedgerStatus {
    /// Parse a wire status string (case-insensitive).
    pub fn from_wire(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "submitted" => LedgerStatus::Submitted,
            "initiated" => LedgerStatus::Initiated,
            "pending" => LedgerStatus::Pending,
            "processing" => LedgerStatus::Processing,
            "approved" => LedgerStatus::Approved,
            "pending_confirmation" => LedgerStatus::PendingConfirmation,
            "success" => LedgerStatus::Success,
            "settled" => LedgerStatus::Settled,
            "failed" => LedgerStatus::Failed,
            "rejected" => LedgerStatus::Rejected,
            "cancelled" | "canceled" => LedgerStatus::Cancelled,
            other => LedgerStatus::Other(other.to_string()),
        }
    }

    /// Map into exactly three classes. Anything unrecognized keeps
    /// polling rather than guessing a terminal outcome.
    pub fn classify(&self) -> StatusClass {
        match self {
            LedgerStatus::Success | LedgerStatus::Settled => StatusClass::TerminalSuccess,
            LedgerStatus::Failed | LedgerStatus::Rejected | LedgerStatus::Cancelled => {
                StatusClass::TerminalFailure
            }
            _ => StatusClass::NonTerminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.classify() != StatusClass::NonTerminal
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerStatus::Other(s) => write!(f, "{s}"),
            other => {
                let s = match other {
                    LedgerStatus::Submitted => "submitted",
                    LedgerStatus::Initiated => "initiated",
                    LedgerStatus::Pending => "pending",
                    LedgerStatus::Processing => "processing",
                    LedgerStatus::Approved => "approved",
                    LedgerStatus::PendingConfirmation => "pending_confirmation",
                    LedgerStatus::Success => "success",
                    LedgerStatus::Settled => "settled",
                    LedgerStatus::Failed => "failed",
                    LedgerStatus::Rejected => "rejected",
                    LedgerStatus::Cancelled => "cancelled",
                    LedgerStatus::Other(_) => unreachable!(),
                };
                write!(f, "{s}")
            }
        }
    }
}

/// One poll result: status plus the upstream reason, when given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: LedgerStatus,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Transfer metadata
// ---------------------------------------------------------------------------

/// Structured context attached to every transfer, for audit and for
/// the payment service's own tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Correlation id, echoed back by the service on status reports.
    pub trace_id: String,
    pub game_id: String,
    pub turn: u64,
    /// Human-readable reason ("rent - Boardwalk", "jail bail", ...).
    pub reason: String,
    /// Decision kind that triggered the transfer, if any.
    pub decision: Option<String>,
}

impl TransferMetadata {
    pub fn new(game_id: &str, turn: u64, reason: &str) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            game_id: game_id.to_string(),
            turn,
            reason: reason.to_string(),
            decision: None,
        }
    }

    pub fn with_decision(mut self, decision: &str) -> Self {
        self.decision = Some(decision.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Service trait
// ---------------------------------------------------------------------------

/// Abstraction over the external payment service.
///
/// Implementors move money between accounts asynchronously; callers
/// never see balances change until the adapter observes a terminal
/// status.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Submit a transfer. Returns the service-side transaction id.
    async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Cash,
        metadata: &TransferMetadata,
    ) -> Result<String>;

    /// Poll the current status of a transaction.
    async fn poll_status(&self, transaction_id: &str) -> Result<StatusReport>;

    /// Service name for logging and identification.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
