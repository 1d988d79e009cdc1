//! Core engine — the turn orchestrator and its collaborators.
//!
//! `controller` owns one game's state machine; `dispatcher` mediates
//! between the controller and decision agents; `trade`, `auction`, and
//! `liquidation` implement the negotiation, bidding, and insolvency
//! protocols the controller drives.

pub mod auction;
pub mod controller;
pub mod dispatcher;
pub mod liquidation;
pub mod trade;

pub use controller::GameController;
pub use dispatcher::DecisionDispatcher;

use std::sync::Arc;

use tracing::{error, warn};

use crate::agents::DecisionAgent;
use crate::types::GameOutcome;

/// Drive one game to a terminal state.
///
/// This loop is the game's single serialization point: every agent
/// response and payment confirmation is applied here, in order. Other
/// games run their own loops independently.
pub async fn run_game(
    controller: &mut GameController,
    agents: &[Arc<dyn DecisionAgent>],
    dispatcher: &DecisionDispatcher,
) -> GameOutcome {
    loop {
        if let Some(outcome) = controller.outcome() {
            return outcome.clone();
        }

        let snapshot = controller.snapshot();
        let legal = controller.legal_actions();
        let player = controller.pending_decision().player();

        let Some(agent) = agents.get(player) else {
            controller.abort(&format!("no agent attached for P{player}"));
            continue;
        };

        let action = dispatcher.request(agent.as_ref(), &snapshot, &legal).await;

        match controller.apply(player, action).await {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                // Same decision stays pending; the action budget bounds
                // how long an agent can keep failing.
                warn!(player, error = %e, "Action rejected — re-prompting");
            }
            Err(e) => {
                error!(player, error = %e, "Fatal engine error");
                controller.abort(&e.to_string());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
