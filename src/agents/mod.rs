//! Decision agents.
//!
//! Defines the `DecisionAgent` trait and provides implementations:
//! - LLM-backed agent (Messages API) — autonomous play
//! - Scripted agent — deterministic replay for tests and dry runs
//!
//! Agents are stateless per call: everything they may consider is in
//! the snapshot, and they must answer from the legal-action list.

pub mod llm;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;

use crate::snapshot::GameSnapshot;
use crate::types::{Action, ActionKind, PendingDecision, TradeResponse};

/// Abstraction over decision-makers.
///
/// Implementors receive a state snapshot plus the bounded legal-action
/// list and return one action. Responses are validated downstream; a
/// bad answer costs the agent its preferred move, never the game state.
#[async_trait]
pub trait DecisionAgent: Send + Sync {
    /// Choose one action for the pending decision in `snapshot`.
    async fn decide(
        &self,
        snapshot: &GameSnapshot,
        legal_actions: &[ActionKind],
    ) -> Result<Action>;

    /// Agent name for logging and identification.
    fn name(&self) -> &str;
}

/// The conservative forced action for a decision: never spends money
/// it doesn't have to, always makes progress. Used when an agent times
/// out, errors, or keeps answering outside the legal list.
pub fn default_action(snapshot: &GameSnapshot, legal_actions: &[ActionKind]) -> Action {
    let has = |kind: ActionKind| legal_actions.contains(&kind);

    match &snapshot.pending_decision {
        PendingDecision::RollDice { .. } => Action::RollDice,
        PendingDecision::JailOptions { .. } => {
            if has(ActionKind::RollForDoubles) {
                Action::RollForDoubles
            } else if has(ActionKind::UsePardonCard) {
                Action::UsePardonCard
            } else if has(ActionKind::PayBail) {
                Action::PayBail
            } else {
                Action::EndTurn
            }
        }
        PendingDecision::BuyOrAuction { .. } => Action::DeclineProperty,
        PendingDecision::AuctionBid { .. } => Action::PassBid,
        PendingDecision::RespondToTrade { offer_id, .. } => Action::RespondTrade {
            offer_id: *offer_id,
            response: TradeResponse::Reject,
        },
        PendingDecision::ProposeAfterRejection { .. } => Action::EndNegotiation,
        PendingDecision::LiquidateAssets { .. } => Action::ConfirmLiquidationDone,
        PendingDecision::ManageAssets { .. } => Action::EndTurn,
    }
}
