//! Serializable game-state snapshot.
//!
//! The transport/persistence boundary: after every applied action the
//! controller can emit one of these for a presentation layer to render,
//! and the same snapshot is what decision agents see. Everything an
//! agent needs must be in here — agents are stateless per call.

use serde::{Deserialize, Serialize};

use crate::board::{Board, Group, Square};
use crate::types::{
    Cash, GameOutcome, Participant, PendingDecision, PlayerId, SquareId, TradeOffer, TurnPhase,
    TurnState,
};

/// Public view of one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub id: PlayerId,
    pub name: String,
    pub cash: Cash,
    pub position: SquareId,
    pub in_jail: bool,
    pub pardon_cards: u8,
    pub properties: Vec<SquareId>,
    pub bankrupt: bool,
}

impl From<&Participant> for ParticipantView {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            cash: p.cash,
            position: p.position,
            in_jail: p.in_jail,
            pardon_cards: p.pardon_cards,
            properties: p.properties.iter().copied().collect(),
            bankrupt: p.bankrupt,
        }
    }
}

/// Public view of one purchasable square.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeedView {
    pub id: SquareId,
    pub name: String,
    pub price: u32,
    pub group: Group,
    pub owner: Option<PlayerId>,
    pub mortgaged: bool,
    pub houses: u8,
}

/// Public view of a live auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionView {
    pub property: SquareId,
    pub highest_bid: Cash,
    pub highest_bidder: Option<PlayerId>,
    pub eligible: Vec<PlayerId>,
}

/// Full state snapshot emitted after every applied action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: String,
    pub turn: u64,
    pub phase: TurnPhase,
    pub active_player: PlayerId,
    pub dice: Option<(u8, u8)>,
    pub doubles_streak: u8,
    pub participants: Vec<ParticipantView>,
    pub deeds: Vec<DeedView>,
    pub pending_decision: PendingDecision,
    pub open_trades: Vec<TradeOffer>,
    pub auction: Option<AuctionView>,
    pub game_over: Option<GameOutcome>,
}

impl GameSnapshot {
    /// Assemble a snapshot from engine state.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        game_id: &str,
        turn: &TurnState,
        participants: &[Participant],
        board: &Board,
        pending_decision: &PendingDecision,
        open_trades: Vec<TradeOffer>,
        auction: Option<AuctionView>,
        game_over: Option<&GameOutcome>,
    ) -> Self {
        let deeds = board
            .squares()
            .filter_map(|(id, square)| match square {
                Square::Deed(deed) => Some(DeedView {
                    id,
                    name: deed.name.clone(),
                    price: deed.price,
                    group: deed.group,
                    owner: deed.owner,
                    mortgaged: deed.mortgaged,
                    houses: deed.houses,
                }),
                _ => None,
            })
            .collect();

        Self {
            game_id: game_id.to_string(),
            turn: turn.turn_count,
            phase: turn.phase,
            active_player: turn.active,
            dice: turn.dice,
            doubles_streak: turn.doubles_streak,
            participants: participants.iter().map(ParticipantView::from).collect(),
            deeds,
            pending_decision: pending_decision.clone(),
            open_trades,
            auction,
            game_over: game_over.cloned(),
        }
    }

    /// Participant view lookup.
    pub fn participant(&self, id: PlayerId) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Deed view lookup.
    pub fn deed(&self, id: SquareId) -> Option<&DeedView> {
        self.deeds.iter().find(|d| d.id == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_snapshot() -> GameSnapshot {
        let mut board = Board::standard();
        board.deed_mut(1).unwrap().owner = Some(0);
        let participants = vec![
            Participant::new(0, "Ada", "acct-ada", dec!(1500)),
            Participant::new(1, "Bob", "acct-bob", dec!(1500)),
        ];
        GameSnapshot::assemble(
            "game-1",
            &TurnState::new(0),
            &participants,
            &board,
            &PendingDecision::RollDice { player: 0 },
            Vec::new(),
            None,
            None,
        )
    }

    #[test]
    fn test_assemble_counts() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.participants.len(), 2);
        assert_eq!(snapshot.deeds.len(), 28); // purchasable squares on the track
        assert_eq!(snapshot.turn, 1);
        assert_eq!(snapshot.phase, TurnPhase::PreRoll);
        assert!(snapshot.game_over.is_none());
    }

    #[test]
    fn test_lookups() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot.participant(1).unwrap().name, "Bob");
        assert!(snapshot.participant(9).is_none());
        let deed = snapshot.deed(1).unwrap();
        assert_eq!(deed.owner, Some(0));
        assert!(snapshot.deed(0).is_none()); // GO has no deed
    }

    #[test]
    fn test_serialization_roundtrip() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: GameSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.game_id, "game-1");
        assert_eq!(parsed.deeds.len(), snapshot.deeds.len());
        assert_eq!(
            parsed.pending_decision,
            PendingDecision::RollDice { player: 0 }
        );
    }
}
