//! Decision dispatcher.
//!
//! Converts the orchestrator's pending decision into a legal-action
//! list, asks the decision agent under a bounded timeout, and validates
//! the answer against that list. An out-of-list or malformed response
//! re-prompts; a timeout or persistent misbehavior forces the
//! decision's default action so the game always progresses.

use std::time::Duration;

use tracing::warn;

use crate::agents::DecisionAgent;
use crate::board::Board;
use crate::snapshot::GameSnapshot;
use crate::types::{Action, ActionKind, Participant, PendingDecision, TradeResponse};

/// Re-prompts allowed before the default action is forced.
const DEFAULT_MAX_INVALID_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Legal actions
// ---------------------------------------------------------------------------

/// The bounded action list for a pending decision, derived from the
/// same state the agent sees.
pub fn legal_actions(
    decision: &PendingDecision,
    participants: &[Participant],
    board: &Board,
) -> Vec<ActionKind> {
    let mut actions = Vec::new();

    match decision {
        PendingDecision::RollDice { .. } => actions.push(ActionKind::RollDice),

        PendingDecision::JailOptions {
            can_pay_bail,
            has_pardon_card,
            roll_attempts_left,
            ..
        } => {
            if *has_pardon_card {
                actions.push(ActionKind::UsePardonCard);
            }
            if *can_pay_bail {
                actions.push(ActionKind::PayBail);
            }
            if *roll_attempts_left > 0 {
                actions.push(ActionKind::RollForDoubles);
            }
            if actions.is_empty() {
                actions.push(ActionKind::EndTurn);
            }
        }

        PendingDecision::BuyOrAuction { player, price, .. } => {
            if participants
                .get(*player)
                .map(|p| p.can_pay(*price))
                .unwrap_or(false)
            {
                actions.push(ActionKind::BuyProperty);
            }
            actions.push(ActionKind::DeclineProperty);
        }

        PendingDecision::AuctionBid {
            player,
            highest_bid,
            reserve,
            ..
        } => {
            let floor = (*highest_bid).max(*reserve);
            if participants
                .get(*player)
                .map(|p| p.cash > floor)
                .unwrap_or(false)
            {
                actions.push(ActionKind::Bid);
            }
            actions.push(ActionKind::PassBid);
        }

        PendingDecision::RespondToTrade { .. } => actions.push(ActionKind::RespondTrade),

        PendingDecision::ProposeAfterRejection { .. } => {
            actions.push(ActionKind::ProposeTrade);
            actions.push(ActionKind::EndNegotiation);
        }

        PendingDecision::LiquidateAssets { player, .. } => {
            push_divestment_kinds(&mut actions, *player, participants, board);
            actions.push(ActionKind::ConfirmLiquidationDone);
        }

        PendingDecision::ManageAssets { player } => {
            let other_active = participants
                .iter()
                .any(|p| p.id != *player && p.is_active());
            if other_active {
                actions.push(ActionKind::ProposeTrade);
            }
            if let Some(participant) = participants.get(*player) {
                push_divestment_kinds(&mut actions, *player, participants, board);
                let can_unmortgage = participant.properties.iter().any(|&id| {
                    board
                        .deed(id)
                        .map(|d| d.mortgaged && participant.cash >= d.unmortgage_cost())
                        .unwrap_or(false)
                });
                if can_unmortgage {
                    actions.push(ActionKind::UnmortgageProperty);
                }
                let can_build = participant.properties.iter().any(|&id| {
                    board.can_build(*player, id).is_ok()
                        && board
                            .deed(id)
                            .and_then(|d| d.house_price())
                            .map(|price| participant.cash >= rust_decimal::Decimal::from(price))
                            .unwrap_or(false)
                });
                if can_build {
                    actions.push(ActionKind::BuildHouse);
                }
            }
            actions.push(ActionKind::EndTurn);
        }
    }

    actions
}

/// Add mortgage/sell-house kinds when the participant has anything
/// left to divest.
fn push_divestment_kinds(
    actions: &mut Vec<ActionKind>,
    player: usize,
    participants: &[Participant],
    board: &Board,
) {
    let Some(participant) = participants.get(player) else {
        return;
    };
    let can_sell = participant
        .properties
        .iter()
        .any(|&id| board.can_sell_house(player, id).is_ok());
    if can_sell {
        actions.push(ActionKind::SellHouse);
    }
    let can_mortgage = participant
        .properties
        .iter()
        .any(|&id| board.can_mortgage(player, id).is_ok());
    if can_mortgage {
        actions.push(ActionKind::MortgageProperty);
    }
}

/// The forced action for a decision: what the engine plays on the
/// agent's behalf after a timeout or an exhausted action budget.
pub fn forced_action(decision: &PendingDecision) -> Action {
    match decision {
        PendingDecision::RollDice { .. } => Action::RollDice,
        PendingDecision::JailOptions {
            can_pay_bail,
            has_pardon_card,
            roll_attempts_left,
            ..
        } => {
            if *roll_attempts_left > 0 {
                Action::RollForDoubles
            } else if *has_pardon_card {
                Action::UsePardonCard
            } else if *can_pay_bail {
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

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Mediates between the orchestrator and one decision agent.
pub struct DecisionDispatcher {
    timeout: Duration,
    max_invalid_attempts: u32,
}

impl DecisionDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_invalid_attempts: DEFAULT_MAX_INVALID_ATTEMPTS,
        }
    }

    /// Ask the agent for an action. Always returns something legal to
    /// hand to the orchestrator: the agent's choice when it is in the
    /// legal list, the forced default otherwise.
    pub async fn request(
        &self,
        agent: &dyn DecisionAgent,
        snapshot: &GameSnapshot,
        legal: &[ActionKind],
    ) -> Action {
        for attempt in 0..self.max_invalid_attempts {
            let decision = tokio::time::timeout(self.timeout, agent.decide(snapshot, legal)).await;
            match decision {
                Err(_) => {
                    warn!(
                        agent = agent.name(),
                        decision = snapshot.pending_decision.kind_name(),
                        timeout_secs = self.timeout.as_secs(),
                        "Agent timed out — forcing default action"
                    );
                    return forced_action(&snapshot.pending_decision);
                }
                Ok(Err(e)) => {
                    warn!(
                        agent = agent.name(),
                        error = %e,
                        "Agent errored — forcing default action"
                    );
                    return forced_action(&snapshot.pending_decision);
                }
                Ok(Ok(action)) => {
                    if legal.contains(&action.kind()) {
                        return action;
                    }
                    warn!(
                        agent = agent.name(),
                        action = %action,
                        attempt,
                        "Agent chose an action outside the legal list"
                    );
                }
            }
        }
        forced_action(&snapshot.pending_decision)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TurnState;
    use anyhow::Result;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn participants() -> Vec<Participant> {
        vec![
            Participant::new(0, "Ada", "acct-0", dec!(1500)),
            Participant::new(1, "Bob", "acct-1", dec!(1500)),
        ]
    }

    #[test]
    fn test_legal_roll_dice() {
        let board = Board::standard();
        let legal = legal_actions(
            &PendingDecision::RollDice { player: 0 },
            &participants(),
            &board,
        );
        assert_eq!(legal, vec![ActionKind::RollDice]);
    }

    #[test]
    fn test_legal_buy_requires_cash() {
        let board = Board::standard();
        let mut players = participants();
        let decision = PendingDecision::BuyOrAuction {
            player: 0,
            property: 39,
            price: dec!(400),
        };
        let legal = legal_actions(&decision, &players, &board);
        assert!(legal.contains(&ActionKind::BuyProperty));

        players[0].cash = dec!(300);
        let legal = legal_actions(&decision, &players, &board);
        assert!(!legal.contains(&ActionKind::BuyProperty));
        assert!(legal.contains(&ActionKind::DeclineProperty));
    }

    #[test]
    fn test_legal_bid_requires_cash_above_floor() {
        let board = Board::standard();
        let mut players = participants();
        players[0].cash = dec!(100);
        let decision = PendingDecision::AuctionBid {
            player: 0,
            property: 12,
            highest_bid: dec!(100),
            reserve: dec!(0),
        };
        let legal = legal_actions(&decision, &players, &board);
        assert_eq!(legal, vec![ActionKind::PassBid]);

        players[0].cash = dec!(101);
        let legal = legal_actions(&decision, &players, &board);
        assert!(legal.contains(&ActionKind::Bid));
    }

    #[test]
    fn test_legal_jail_options_from_context() {
        let board = Board::standard();
        let decision = PendingDecision::JailOptions {
            player: 0,
            can_pay_bail: true,
            has_pardon_card: false,
            roll_attempts_left: 2,
        };
        let legal = legal_actions(&decision, &participants(), &board);
        assert!(legal.contains(&ActionKind::PayBail));
        assert!(legal.contains(&ActionKind::RollForDoubles));
        assert!(!legal.contains(&ActionKind::UsePardonCard));
    }

    #[test]
    fn test_legal_manage_assets_offers_trade_and_end() {
        let board = Board::standard();
        let legal = legal_actions(
            &PendingDecision::ManageAssets { player: 0 },
            &participants(),
            &board,
        );
        assert!(legal.contains(&ActionKind::ProposeTrade));
        assert!(legal.contains(&ActionKind::EndTurn));
        assert!(!legal.contains(&ActionKind::MortgageProperty)); // owns nothing
    }

    #[test]
    fn test_legal_manage_assets_with_holdings() {
        let mut board = Board::standard();
        let mut players = participants();
        board.deed_mut(1).unwrap().owner = Some(0);
        board.deed_mut(3).unwrap().owner = Some(0);
        players[0].properties.insert(1);
        players[0].properties.insert(3);

        let legal = legal_actions(&PendingDecision::ManageAssets { player: 0 }, &players, &board);
        assert!(legal.contains(&ActionKind::MortgageProperty));
        assert!(legal.contains(&ActionKind::BuildHouse)); // full brown group, cash ok

        board.deed_mut(1).unwrap().mortgaged = true;
        let legal = legal_actions(&PendingDecision::ManageAssets { player: 0 }, &players, &board);
        assert!(legal.contains(&ActionKind::UnmortgageProperty));
        assert!(!legal.contains(&ActionKind::BuildHouse)); // group mortgaged
    }

    #[test]
    fn test_legal_liquidation_always_allows_confirm() {
        let board = Board::standard();
        let legal = legal_actions(
            &PendingDecision::LiquidateAssets {
                player: 0,
                debt: dec!(100),
                creditor: None,
            },
            &participants(),
            &board,
        );
        assert_eq!(legal, vec![ActionKind::ConfirmLiquidationDone]);
    }

    #[test]
    fn test_forced_actions_progress() {
        assert_eq!(
            forced_action(&PendingDecision::RollDice { player: 0 }),
            Action::RollDice
        );
        assert_eq!(
            forced_action(&PendingDecision::ManageAssets { player: 0 }),
            Action::EndTurn
        );
        assert_eq!(
            forced_action(&PendingDecision::AuctionBid {
                player: 0,
                property: 5,
                highest_bid: dec!(0),
                reserve: dec!(0),
            }),
            Action::PassBid
        );
        assert_eq!(
            forced_action(&PendingDecision::JailOptions {
                player: 0,
                can_pay_bail: true,
                has_pardon_card: false,
                roll_attempts_left: 0,
            }),
            Action::PayBail
        );
    }

    // -- request() behavior --

    struct FixedAgent {
        action: Action,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DecisionAgent for FixedAgent {
        async fn decide(&self, _: &GameSnapshot, _: &[ActionKind]) -> Result<Action> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.action.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct SlowAgent;

    #[async_trait]
    impl DecisionAgent for SlowAgent {
        async fn decide(&self, _: &GameSnapshot, _: &[ActionKind]) -> Result<Action> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Action::RollDice)
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn snapshot() -> GameSnapshot {
        GameSnapshot::assemble(
            "game-test",
            &TurnState::new(0),
            &participants(),
            &Board::standard(),
            &PendingDecision::ManageAssets { player: 0 },
            Vec::new(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_request_returns_legal_choice() {
        let dispatcher = DecisionDispatcher::new(Duration::from_secs(5));
        let agent = FixedAgent {
            action: Action::EndTurn,
            calls: AtomicU32::new(0),
        };
        let action = dispatcher
            .request(&agent, &snapshot(), &[ActionKind::EndTurn])
            .await;
        assert_eq!(action, Action::EndTurn);
    }

    #[tokio::test]
    async fn test_request_forces_default_after_repeated_illegal() {
        let dispatcher = DecisionDispatcher::new(Duration::from_secs(5));
        let agent = FixedAgent {
            action: Action::RollDice, // never legal here
            calls: AtomicU32::new(0),
        };
        let action = dispatcher
            .request(&agent, &snapshot(), &[ActionKind::EndTurn])
            .await;
        assert_eq!(action, Action::EndTurn);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3); // re-prompted then forced
    }

    #[tokio::test]
    async fn test_request_times_out_to_default() {
        let dispatcher = DecisionDispatcher::new(Duration::from_millis(10));
        let action = dispatcher
            .request(&SlowAgent, &snapshot(), &[ActionKind::EndTurn])
            .await;
        assert_eq!(action, Action::EndTurn);
    }
}
