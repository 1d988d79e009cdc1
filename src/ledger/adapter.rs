//! Settlement adapter.
//!
//! Submits a money movement and surfaces only a terminal result to the
//! caller, hiding the external service's intermediate states behind a
//! fixed-interval poll loop with a hard timeout. A timeout means the
//! outcome is UNKNOWN — the transfer may still settle — so callers must
//! halt the dependent game step instead of retrying or assuming failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::types::{Cash, GameError, PlayerId, SquareId, TradeId};

use super::{LedgerService, LedgerStatus, StatusClass, TransferMetadata};

// ---------------------------------------------------------------------------
// Pending payments
// ---------------------------------------------------------------------------

/// The game-level effect to apply once a payment settles.
///
/// Recorded on the pending payment so settlement and its consequence
/// stay correlated, and so the consequence can be consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "consequence", rename_all = "snake_case")]
pub enum PaymentConsequence {
    None,
    /// Property changes hands (purchase or auction win).
    TransferDeed { property: SquareId, to: PlayerId },
    /// Bail settled; the payer walks free.
    ReleaseFromJail { player: PlayerId },
    /// The non-cash legs of an accepted trade may now execute.
    ExecuteTrade { offer_id: TradeId },
}

/// A transfer in flight, exclusively owned by the adapter until a
/// terminal status is observed, then consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPayment {
    pub transaction_id: String,
    pub from: String,
    pub to: String,
    pub amount: Cash,
    pub reason: String,
    pub submitted_at: DateTime<Utc>,
    pub last_status: LedgerStatus,
    pub consequence: PaymentConsequence,
    consequence_taken: bool,
}

impl PendingPayment {
    /// Consume the settlement consequence. Returns `None` on every call
    /// after the first, so re-polling a terminal payment can never
    /// re-apply its game-level effect.
    pub fn take_consequence(&mut self) -> Option<PaymentConsequence> {
        if self.consequence_taken {
            return None;
        }
        self.consequence_taken = true;
        Some(self.consequence.clone())
    }

    pub fn is_terminal(&self) -> bool {
        self.last_status.is_terminal()
    }
}

/// Terminal result of one transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Settled,
    Failed { reason: String },
}

impl PaymentOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentOutcome::Settled)
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Polls the external service until each payment reaches a terminal
/// state or the timeout expires.
pub struct LedgerAdapter {
    service: Arc<dyn LedgerService>,
    poll_interval: Duration,
    timeout: Duration,
    treasury_account: String,
}

impl LedgerAdapter {
    pub fn new(service: Arc<dyn LedgerService>, config: &LedgerConfig) -> Self {
        Self {
            service,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            treasury_account: config.treasury_account.clone(),
        }
    }

    /// Override intervals directly (tests use millisecond polling).
    pub fn with_intervals(
        service: Arc<dyn LedgerService>,
        poll_interval: Duration,
        timeout: Duration,
        treasury_account: &str,
    ) -> Self {
        Self {
            service,
            poll_interval,
            timeout,
            treasury_account: treasury_account.to_string(),
        }
    }

    /// The bank side of system payments.
    pub fn treasury(&self) -> &str {
        &self.treasury_account
    }

    /// Submit a transfer and return its in-flight handle.
    pub async fn submit(
        &self,
        from: &str,
        to: &str,
        amount: Cash,
        metadata: TransferMetadata,
        consequence: PaymentConsequence,
    ) -> Result<PendingPayment, GameError> {
        if amount <= Cash::ZERO {
            return Err(GameError::Validation(format!(
                "transfer amount must be positive, got {amount}"
            )));
        }

        debug!(
            from,
            to,
            amount = %amount,
            reason = %metadata.reason,
            "Submitting ledger transfer"
        );

        let transaction_id = self
            .service
            .submit(from, to, amount, &metadata)
            .await
            .map_err(|e| GameError::Ledger(format!("submit failed: {e:#}")))?;

        Ok(PendingPayment {
            transaction_id,
            from: from.to_string(),
            to: to.to_string(),
            amount,
            reason: metadata.reason,
            submitted_at: Utc::now(),
            last_status: LedgerStatus::Submitted,
            consequence,
            consequence_taken: false,
        })
    }

    /// Poll until the payment reaches a terminal state.
    ///
    /// A payment already observed terminal returns immediately without
    /// touching the service again. On timeout the outcome is unknown:
    /// the error is `PaymentTimeout` and the caller must not assume the
    /// transfer failed.
    pub async fn await_terminal(
        &self,
        payment: &mut PendingPayment,
    ) -> Result<PaymentOutcome, GameError> {
        if payment.is_terminal() {
            return Ok(Self::outcome_for(&payment.last_status, None));
        }

        let started = tokio::time::Instant::now();

        loop {
            match self.service.poll_status(&payment.transaction_id).await {
                Ok(report) => {
                    debug!(
                        transaction_id = %payment.transaction_id,
                        status = %report.status,
                        "Payment status"
                    );
                    payment.last_status = report.status.clone();

                    match report.status.classify() {
                        StatusClass::TerminalSuccess => {
                            info!(
                                transaction_id = %payment.transaction_id,
                                amount = %payment.amount,
                                reason = %payment.reason,
                                "Payment settled"
                            );
                            return Ok(PaymentOutcome::Settled);
                        }
                        StatusClass::TerminalFailure => {
                            warn!(
                                transaction_id = %payment.transaction_id,
                                status = %report.status,
                                reason = ?report.reason,
                                "Payment failed"
                            );
                            return Ok(Self::outcome_for(&report.status, report.reason));
                        }
                        StatusClass::NonTerminal => {}
                    }
                }
                Err(e) => {
                    // Transient poll failures keep polling until timeout.
                    warn!(
                        transaction_id = %payment.transaction_id,
                        error = %e,
                        "Status poll failed"
                    );
                }
            }

            if started.elapsed() >= self.timeout {
                warn!(
                    transaction_id = %payment.transaction_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Payment timed out — outcome unknown"
                );
                return Err(GameError::PaymentTimeout {
                    transaction_id: payment.transaction_id.clone(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Submit and wait for the terminal outcome in one call.
    pub async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Cash,
        metadata: TransferMetadata,
        consequence: PaymentConsequence,
    ) -> Result<(PendingPayment, PaymentOutcome), GameError> {
        let mut payment = self.submit(from, to, amount, metadata, consequence).await?;
        let outcome = self.await_terminal(&mut payment).await?;
        Ok((payment, outcome))
    }

    fn outcome_for(status: &LedgerStatus, reason: Option<String>) -> PaymentOutcome {
        match status.classify() {
            StatusClass::TerminalSuccess => PaymentOutcome::Settled,
            _ => PaymentOutcome::Failed {
                reason: reason.unwrap_or_else(|| status.to_string()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
