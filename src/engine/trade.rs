//! Trade negotiation engine.
//!
//! Manages multi-item offers between two participants, counter-offers,
//! and rejection-count-based termination. A lineage (the original offer
//! plus all counters descending from it) shares one rejection counter
//! and closes permanently when the counter reaches the configured
//! maximum. Trade-initiating actions are rate limited per turn.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::board::Board;
use crate::types::{
    GameError, Participant, PlayerId, TradeId, TradeItem, TradeItemError, TradeOffer, TradeStatus,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TradeConfig {
    /// Rejections that permanently close a lineage.
    pub max_rejections: u32,
    /// Proposals + counters allowed per participant per turn.
    pub max_initiations_per_turn: u32,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            max_rejections: 3,
            max_initiations_per_turn: 5,
        }
    }
}

/// Result of one rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectionOutcome {
    pub rejections: u32,
    pub lineage_closed: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns every offer in one game. All mutation happens through the
/// game's single execution context; no cross-game sharing.
pub struct TradeEngine {
    config: TradeConfig,
    offers: HashMap<TradeId, TradeOffer>,
    next_id: TradeId,
    lineage_rejections: HashMap<TradeId, u32>,
    closed_lineages: HashSet<TradeId>,
    initiations_this_turn: HashMap<PlayerId, u32>,
}

impl TradeEngine {
    pub fn new(config: TradeConfig) -> Self {
        Self {
            config,
            offers: HashMap::new(),
            next_id: 1,
            lineage_rejections: HashMap::new(),
            closed_lineages: HashSet::new(),
            initiations_this_turn: HashMap::new(),
        }
    }

    pub fn offer(&self, id: TradeId) -> Option<&TradeOffer> {
        self.offers.get(&id)
    }

    /// Offers still awaiting a response, for snapshots.
    pub fn open_offers(&self) -> Vec<TradeOffer> {
        let mut open: Vec<TradeOffer> = self
            .offers
            .values()
            .filter(|o| o.status == TradeStatus::Pending)
            .cloned()
            .collect();
        open.sort_by_key(|o| o.id);
        open
    }

    pub fn rejections(&self, lineage: TradeId) -> u32 {
        self.lineage_rejections.get(&lineage).copied().unwrap_or(0)
    }

    pub fn is_lineage_closed(&self, lineage: TradeId) -> bool {
        self.closed_lineages.contains(&lineage)
    }

    pub fn max_rejections(&self) -> u32 {
        self.config.max_rejections
    }

    /// Clear per-turn rate-limit counters. Called on turn advance.
    pub fn reset_turn(&mut self) {
        self.initiations_this_turn.clear();
    }

    /// Propose a new offer, opening a fresh lineage.
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        &mut self,
        participants: &[Participant],
        board: &Board,
        proposer: PlayerId,
        recipient: PlayerId,
        offered: Vec<TradeItem>,
        requested: Vec<TradeItem>,
        message: Option<String>,
        turn: u64,
    ) -> Result<TradeId, GameError> {
        self.create_offer(
            participants,
            board,
            proposer,
            recipient,
            offered,
            requested,
            message,
            turn,
            None,
        )
    }

    /// Counter a pending offer: roles swap, the lineage continues.
    #[allow(clippy::too_many_arguments)]
    pub fn counter(
        &mut self,
        participants: &[Participant],
        board: &Board,
        countered_id: TradeId,
        offered: Vec<TradeItem>,
        requested: Vec<TradeItem>,
        message: Option<String>,
        turn: u64,
    ) -> Result<TradeId, GameError> {
        let (proposer, recipient, lineage) = {
            let original = self.offers.get(&countered_id).ok_or_else(|| {
                GameError::Validation(format!("trade {countered_id} not found"))
            })?;
            if original.status != TradeStatus::Pending {
                return Err(GameError::Validation(format!(
                    "trade {countered_id} is not pending ({})",
                    original.status
                )));
            }
            (original.recipient, original.proposer, original.lineage)
        };

        let counter_id = self.create_offer(
            participants,
            board,
            proposer,
            recipient,
            offered,
            requested,
            message,
            turn,
            Some(lineage),
        )?;

        if let Some(original) = self.offers.get_mut(&countered_id) {
            original.status = TradeStatus::Countered;
        }
        info!(countered = countered_id, counter = counter_id, "Trade countered");
        Ok(counter_id)
    }

    /// Continue a rejected lineage with a fresh offer from the original
    /// proposer. Same recipient, same rejection counter.
    #[allow(clippy::too_many_arguments)]
    pub fn propose_in_lineage(
        &mut self,
        participants: &[Participant],
        board: &Board,
        lineage: TradeId,
        proposer: PlayerId,
        recipient: PlayerId,
        offered: Vec<TradeItem>,
        requested: Vec<TradeItem>,
        message: Option<String>,
        turn: u64,
    ) -> Result<TradeId, GameError> {
        let root = self.offers.get(&lineage).ok_or_else(|| {
            GameError::Validation(format!("trade lineage {lineage} not found"))
        })?;
        if recipient != root.proposer && recipient != root.recipient {
            return Err(GameError::Validation(format!(
                "negotiation must continue with the original party, not P{recipient}"
            )));
        }
        self.create_offer(
            participants,
            board,
            proposer,
            recipient,
            offered,
            requested,
            message,
            turn,
            Some(lineage),
        )
    }

    /// Re-validate ownership of every item on both sides at this
    /// instant and return the offer ready for execution. State may
    /// have drifted since the proposal.
    pub fn validate_for_accept(
        &self,
        participants: &[Participant],
        board: &Board,
        offer_id: TradeId,
    ) -> Result<TradeOffer, GameError> {
        let offer = self
            .offers
            .get(&offer_id)
            .ok_or_else(|| GameError::Validation(format!("trade {offer_id} not found")))?;
        if offer.status != TradeStatus::Pending {
            return Err(GameError::Validation(format!(
                "trade {offer_id} is not pending ({})",
                offer.status
            )));
        }

        let mut errors = validate_side(participants, board, offer.proposer, &offer.offered);
        errors.extend(validate_side(
            participants,
            board,
            offer.recipient,
            &offer.requested,
        ));
        if !errors.is_empty() {
            return Err(GameError::TradeInvalid(errors));
        }
        Ok(offer.clone())
    }

    /// Mark an offer accepted after its transfers executed.
    pub fn mark_accepted(&mut self, offer_id: TradeId) {
        if let Some(offer) = self.offers.get_mut(&offer_id) {
            offer.status = TradeStatus::Accepted;
        }
    }

    /// Reject a pending offer. The lineage counter increases by exactly
    /// one; reaching the maximum closes the lineage permanently.
    pub fn reject(&mut self, offer_id: TradeId) -> Result<RejectionOutcome, GameError> {
        let lineage = {
            let offer = self
                .offers
                .get_mut(&offer_id)
                .ok_or_else(|| GameError::Validation(format!("trade {offer_id} not found")))?;
            if offer.status != TradeStatus::Pending {
                return Err(GameError::Validation(format!(
                    "trade {offer_id} is not pending ({})",
                    offer.status
                )));
            }
            offer.status = TradeStatus::Rejected;
            offer.lineage
        };

        let rejections = self.lineage_rejections.entry(lineage).or_insert(0);
        *rejections += 1;
        let rejections = *rejections;

        let lineage_closed = rejections >= self.config.max_rejections;
        if lineage_closed {
            self.closed_lineages.insert(lineage);
            info!(lineage, rejections, "Trade lineage closed");
        } else {
            debug!(lineage, rejections, "Trade rejected");
        }

        Ok(RejectionOutcome {
            rejections,
            lineage_closed,
        })
    }

    /// Walk away from a lineage: withdraw anything still pending in it.
    pub fn close_negotiation(&mut self, lineage: TradeId) {
        for offer in self.offers.values_mut() {
            if offer.lineage == lineage && offer.status == TradeStatus::Pending {
                offer.status = TradeStatus::Withdrawn;
            }
        }
        self.closed_lineages.insert(lineage);
    }

    // -- Internals -------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn create_offer(
        &mut self,
        participants: &[Participant],
        board: &Board,
        proposer: PlayerId,
        recipient: PlayerId,
        offered: Vec<TradeItem>,
        requested: Vec<TradeItem>,
        message: Option<String>,
        turn: u64,
        lineage: Option<TradeId>,
    ) -> Result<TradeId, GameError> {
        let initiations = self.initiations_this_turn.get(&proposer).copied().unwrap_or(0);
        if initiations >= self.config.max_initiations_per_turn {
            return Err(GameError::RateLimit(format!(
                "P{proposer} reached {} trade initiations this turn",
                self.config.max_initiations_per_turn
            )));
        }

        if proposer == recipient {
            return Err(GameError::Validation(
                "cannot trade with yourself".to_string(),
            ));
        }
        let recipient_p = participants.get(recipient).ok_or_else(|| {
            GameError::Validation(format!("unknown participant P{recipient}"))
        })?;
        let proposer_p = participants.get(proposer).ok_or_else(|| {
            GameError::Validation(format!("unknown participant P{proposer}"))
        })?;
        if proposer_p.bankrupt || recipient_p.bankrupt {
            return Err(GameError::Validation(
                "bankrupt participants cannot trade".to_string(),
            ));
        }
        if offered.is_empty() && requested.is_empty() {
            return Err(GameError::Validation(
                "at least one side of the trade must contain items".to_string(),
            ));
        }
        if let Some(lineage) = lineage {
            if self.is_lineage_closed(lineage) {
                return Err(GameError::Validation(format!(
                    "negotiation {lineage} is closed after {} rejections",
                    self.rejections(lineage)
                )));
            }
        }

        let mut errors = validate_side(participants, board, proposer, &offered);
        errors.extend(validate_side(participants, board, recipient, &requested));
        if !errors.is_empty() {
            return Err(GameError::TradeInvalid(errors));
        }

        let id = self.next_id;
        self.next_id += 1;
        let offer = TradeOffer {
            id,
            lineage: lineage.unwrap_or(id),
            proposer,
            recipient,
            offered,
            requested,
            status: TradeStatus::Pending,
            message,
            turn_proposed: turn,
        };
        debug!(offer = %offer, "Trade proposed");
        self.offers.insert(id, offer);
        *self.initiations_this_turn.entry(proposer).or_insert(0) += 1;
        Ok(id)
    }
}

/// Check that `party` currently holds every item in `items`.
/// Every failing item is reported, not just the first.
fn validate_side(
    participants: &[Participant],
    board: &Board,
    party: PlayerId,
    items: &[TradeItem],
) -> Vec<TradeItemError> {
    let mut errors = Vec::new();
    let Some(participant) = participants.get(party) else {
        return vec![TradeItemError {
            party,
            item: TradeItem::Cash {
                amount: rust_decimal::Decimal::ZERO,
            },
            reason: "unknown participant".to_string(),
        }];
    };

    for item in items {
        match item {
            TradeItem::Property { id } => match board.deed(*id) {
                None => errors.push(TradeItemError {
                    party,
                    item: item.clone(),
                    reason: "not a purchasable square".to_string(),
                }),
                Some(deed) if deed.owner != Some(party) => errors.push(TradeItemError {
                    party,
                    item: item.clone(),
                    reason: format!("{} is not owned by P{party}", deed.name),
                }),
                Some(_) => {}
            },
            TradeItem::Cash { amount } => {
                if *amount <= rust_decimal::Decimal::ZERO {
                    errors.push(TradeItemError {
                        party,
                        item: item.clone(),
                        reason: "cash amount must be positive".to_string(),
                    });
                } else if participant.cash < *amount {
                    errors.push(TradeItemError {
                        party,
                        item: item.clone(),
                        reason: format!("insufficient cash (has ${:.2})", participant.cash),
                    });
                }
            }
            TradeItem::PardonCard { count } => {
                if *count == 0 {
                    errors.push(TradeItemError {
                        party,
                        item: item.clone(),
                        reason: "pardon card count must be positive".to_string(),
                    });
                } else if participant.pardon_cards < *count {
                    errors.push(TradeItemError {
                        party,
                        item: item.clone(),
                        reason: format!("holds only {} pardon card(s)", participant.pardon_cards),
                    });
                }
            }
        }
    }
    errors
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
