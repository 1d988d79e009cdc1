//! Auction engine.
//!
//! One live auction for one property among an ordered set of eligible
//! bidders. Bidding is strictly sequential; a bid must strictly exceed
//! both the current highest bid and the reserve, and a pass removes the
//! bidder from this auction only. The auction closes when the last
//! eligible bidder holds the highest bid, or when every bidder has
//! passed (property stays unowned).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{Cash, GameError, PlayerId, SquareId};

/// Auction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    NotRunning,
    Running,
    Closed,
}

/// Live auction state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionState {
    pub property: SquareId,
    pub reserve: Cash,
    pub highest_bid: Cash,
    pub highest_bidder: Option<PlayerId>,
    /// Remaining eligible bidders in polling order.
    pub eligible: Vec<PlayerId>,
    /// Index into `eligible` of the bidder being polled.
    cursor: usize,
    pub status: AuctionStatus,
}

/// Outcome of a closed auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionResult {
    pub property: SquareId,
    /// Winner and price, or `None` when all bidders passed.
    pub winner: Option<(PlayerId, Cash)>,
}

/// Runs at most one auction at a time for its game.
pub struct AuctionEngine {
    state: Option<AuctionState>,
}

impl AuctionEngine {
    pub fn new() -> Self {
        Self { state: None }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            Some(AuctionState {
                status: AuctionStatus::Running,
                ..
            })
        )
    }

    pub fn state(&self) -> Option<&AuctionState> {
        self.state.as_ref()
    }

    /// Lifecycle status, `NotRunning` between auctions.
    pub fn status(&self) -> AuctionStatus {
        self.state
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(AuctionStatus::NotRunning)
    }

    /// Start an auction. `bidders` is the eligibility order; empty
    /// bidder lists are the caller's responsibility to avoid.
    pub fn open(
        &mut self,
        property: SquareId,
        reserve: Cash,
        bidders: Vec<PlayerId>,
    ) -> Result<(), GameError> {
        if self.state.is_some() {
            return Err(GameError::Invariant(
                "an auction is already in progress".to_string(),
            ));
        }
        if bidders.is_empty() {
            return Err(GameError::Validation(
                "cannot auction with no eligible bidders".to_string(),
            ));
        }
        info!(property, reserve = %reserve, bidders = bidders.len(), "Auction opened");
        self.state = Some(AuctionState {
            property,
            reserve,
            highest_bid: Decimal::ZERO,
            highest_bidder: None,
            eligible: bidders,
            cursor: 0,
            status: AuctionStatus::Running,
        });
        Ok(())
    }

    /// The bidder currently being polled.
    pub fn current_bidder(&self) -> Option<PlayerId> {
        let state = self.state.as_ref()?;
        if state.status != AuctionStatus::Running {
            return None;
        }
        state.eligible.get(state.cursor).copied()
    }

    /// Accept a bid from the current bidder. Must strictly exceed both
    /// the highest bid and the reserve, and fit the bidder's cash.
    pub fn bid(
        &mut self,
        player: PlayerId,
        amount: Cash,
        bidder_cash: Cash,
    ) -> Result<(), GameError> {
        let current = self.current_bidder();
        let state = self.running_state_mut()?;
        if current != Some(player) {
            return Err(GameError::Validation(format!(
                "it is not P{player}'s turn to bid"
            )));
        }
        if amount <= state.highest_bid {
            return Err(GameError::Validation(format!(
                "bid ${amount:.2} does not exceed current bid ${:.2}",
                state.highest_bid
            )));
        }
        if amount <= state.reserve && state.reserve > Decimal::ZERO {
            return Err(GameError::Validation(format!(
                "bid ${amount:.2} does not exceed the reserve ${:.2}",
                state.reserve
            )));
        }
        if bidder_cash < amount {
            return Err(GameError::Validation(format!(
                "P{player} cannot afford a ${amount:.2} bid (cash ${bidder_cash:.2})"
            )));
        }

        state.highest_bid = amount;
        state.highest_bidder = Some(player);
        state.cursor = (state.cursor + 1) % state.eligible.len();
        debug!(player, amount = %amount, "Bid accepted");

        self.check_close();
        Ok(())
    }

    /// The current bidder passes, leaving this auction for good.
    pub fn pass(&mut self, player: PlayerId) -> Result<(), GameError> {
        let current = self.current_bidder();
        let state = self.running_state_mut()?;
        if current != Some(player) {
            return Err(GameError::Validation(format!(
                "it is not P{player}'s turn to bid"
            )));
        }

        state.eligible.retain(|&p| p != player);
        if !state.eligible.is_empty() {
            state.cursor %= state.eligible.len();
        }
        debug!(player, remaining = state.eligible.len(), "Bidder passed");

        self.check_close();
        Ok(())
    }

    /// When the auction has closed, consume it and return the result.
    pub fn take_result(&mut self) -> Option<AuctionResult> {
        if matches!(
            self.state,
            Some(AuctionState {
                status: AuctionStatus::Closed,
                ..
            })
        ) {
            let state = self.state.take()?;
            let winner = state
                .highest_bidder
                .map(|player| (player, state.highest_bid));
            info!(property = state.property, winner = ?winner, "Auction closed");
            Some(AuctionResult {
                property: state.property,
                winner,
            })
        } else {
            None
        }
    }

    // -- Internals -------------------------------------------------------

    fn running_state_mut(&mut self) -> Result<&mut AuctionState, GameError> {
        match &mut self.state {
            Some(state) if state.status == AuctionStatus::Running => Ok(state),
            _ => Err(GameError::Validation("no auction in progress".to_string())),
        }
    }

    fn check_close(&mut self) {
        let Some(state) = &mut self.state else {
            return;
        };
        // Everyone passed: unsold unless a standing bid exists.
        if state.eligible.is_empty() {
            state.status = AuctionStatus::Closed;
            return;
        }
        // One bidder left holding the highest bid: awarded at that bid.
        if state.eligible.len() == 1 && state.highest_bidder == Some(state.eligible[0]) {
            state.status = AuctionStatus::Closed;
        }
    }
}

impl Default for AuctionEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
