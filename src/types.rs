//! Shared types for the TYCOON engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that board, ledger, agent,
//! and engine modules can depend on them without circular references.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Dense participant index, assigned at game start.
pub type PlayerId = usize;

/// Board square index (0..40).
pub type SquareId = usize;

/// Trade offer identifier, monotonic and process-wide unique.
pub type TradeId = u64;

/// All cash amounts. The authoritative balance lives in the external
/// ledger; `Cash` values inside the engine are caches and deltas.
pub type Cash = Decimal;

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One seat at the table, controlled by an external decision agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: PlayerId,
    pub name: String,
    /// Account identifier on the external ledger.
    pub ledger_account: String,
    /// Cached cash balance. Updated on every settled transfer.
    pub cash: Cash,
    pub position: SquareId,
    pub in_jail: bool,
    /// Failed doubles attempts while jailed this stay.
    pub jail_rolls_used: u8,
    pub properties: BTreeSet<SquareId>,
    /// Get-out-of-jail tokens held.
    pub pardon_cards: u8,
    pub bankrupt: bool,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let jail = if self.in_jail { ", in jail" } else { "" };
        let bust = if self.bankrupt { ", BANKRUPT" } else { "" };
        write!(
            f,
            "P{} {} (${:.2}, pos {}, {} properties, {} pardons{jail}{bust})",
            self.id,
            self.name,
            self.cash,
            self.position,
            self.properties.len(),
            self.pardon_cards,
        )
    }
}

impl Participant {
    /// Create a participant with the seeded starting stake.
    pub fn new(id: PlayerId, name: &str, ledger_account: &str, starting_cash: Cash) -> Self {
        Self {
            id,
            name: name.to_string(),
            ledger_account: ledger_account.to_string(),
            cash: starting_cash,
            position: 0,
            in_jail: false,
            jail_rolls_used: 0,
            properties: BTreeSet::new(),
            pardon_cards: 0,
            bankrupt: false,
        }
    }

    /// Whether the cached balance covers `amount`.
    pub fn can_pay(&self, amount: Cash) -> bool {
        self.cash >= amount
    }

    /// Adjust the cached balance upward after a settled inbound transfer.
    pub fn credit(&mut self, amount: Cash) {
        self.cash += amount;
    }

    /// Adjust the cached balance downward after a settled outbound transfer.
    pub fn debit(&mut self, amount: Cash) {
        self.cash -= amount;
    }

    /// Move directly to the jail square and start a jail stay.
    pub fn send_to_jail(&mut self, jail_position: SquareId) {
        self.position = jail_position;
        self.in_jail = true;
        self.jail_rolls_used = 0;
    }

    /// End a jail stay (bail paid, pardon used, or doubles rolled).
    pub fn release_from_jail(&mut self) {
        self.in_jail = false;
        self.jail_rolls_used = 0;
    }

    /// Spend one pardon card. Returns false if none are held.
    pub fn use_pardon_card(&mut self) -> bool {
        if self.pardon_cards == 0 {
            return false;
        }
        self.pardon_cards -= 1;
        true
    }

    /// Whether this participant still takes turns.
    pub fn is_active(&self) -> bool {
        !self.bankrupt
    }
}

// ---------------------------------------------------------------------------
// Trade types
// ---------------------------------------------------------------------------

/// One item inside a trade offer side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradeItem {
    Property { id: SquareId },
    Cash { amount: Cash },
    PardonCard { count: u8 },
}

impl fmt::Display for TradeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeItem::Property { id } => write!(f, "property #{id}"),
            TradeItem::Cash { amount } => write!(f, "${amount:.2}"),
            TradeItem::PardonCard { count } => write!(f, "{count} pardon card(s)"),
        }
    }
}

/// Lifecycle of one trade offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Rejected,
    Countered,
    Withdrawn,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "pending"),
            TradeStatus::Accepted => write!(f, "accepted"),
            TradeStatus::Rejected => write!(f, "rejected"),
            TradeStatus::Countered => write!(f, "countered"),
            TradeStatus::Withdrawn => write!(f, "withdrawn"),
        }
    }
}

/// A two-sided offer between two participants.
///
/// Counter-offers share the `lineage` of the offer they counter, and the
/// lineage carries the shared rejection counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOffer {
    pub id: TradeId,
    /// Root offer id of the negotiation thread.
    pub lineage: TradeId,
    pub proposer: PlayerId,
    pub recipient: PlayerId,
    pub offered: Vec<TradeItem>,
    pub requested: Vec<TradeItem>,
    pub status: TradeStatus,
    /// Free text, opaque to the engine.
    pub message: Option<String>,
    pub turn_proposed: u64,
}

impl fmt::Display for TradeOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offered: Vec<String> = self.offered.iter().map(|i| i.to_string()).collect();
        let requested: Vec<String> = self.requested.iter().map(|i| i.to_string()).collect();
        write!(
            f,
            "trade #{} (lineage #{}): P{} gives [{}] for [{}] — {}",
            self.id,
            self.lineage,
            self.proposer,
            offered.join(", "),
            requested.join(", "),
            self.status,
        )
    }
}

impl TradeOffer {
    /// Net cash flow from proposer to recipient: offered cash minus
    /// requested cash. Negative means the recipient pays on balance.
    pub fn net_cash_from_proposer(&self) -> Cash {
        let offered: Cash = self
            .offered
            .iter()
            .filter_map(|i| match i {
                TradeItem::Cash { amount } => Some(*amount),
                _ => None,
            })
            .sum();
        let requested: Cash = self
            .requested
            .iter()
            .filter_map(|i| match i {
                TradeItem::Cash { amount } => Some(*amount),
                _ => None,
            })
            .sum();
        offered - requested
    }
}

/// Why a specific trade item failed validation. Returned in batches so
/// the proposer can correct the offer without replaying all of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeItemError {
    pub party: PlayerId,
    pub item: TradeItem,
    pub reason: String,
}

impl fmt::Display for TradeItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}: {} — {}", self.party, self.item, self.reason)
    }
}

/// Recipient's answer to a pending trade offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum TradeResponse {
    Accept,
    Reject,
    Counter {
        offered: Vec<TradeItem>,
        requested: Vec<TradeItem>,
        message: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Turn state
// ---------------------------------------------------------------------------

/// Where the active participant is inside their turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Dice not yet rolled this segment. Rolling is mandatory.
    PreRoll,
    /// Moved and landing resolved; free asset-management actions.
    PostRoll,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnPhase::PreRoll => write!(f, "pre_roll"),
            TurnPhase::PostRoll => write!(f, "post_roll"),
        }
    }
}

/// Per-game turn bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnState {
    pub active: PlayerId,
    pub turn_count: u64,
    pub dice: Option<(u8, u8)>,
    pub doubles_streak: u8,
    pub phase: TurnPhase,
    /// Actions applied in the current turn segment. Bounds runaway
    /// loops from a misbehaving agent.
    pub actions_this_segment: u32,
}

impl TurnState {
    pub fn new(first_player: PlayerId) -> Self {
        Self {
            active: first_player,
            turn_count: 1,
            dice: None,
            doubles_streak: 0,
            phase: TurnPhase::PreRoll,
            actions_this_segment: 0,
        }
    }

    /// Total of the last dice pair, or 0 if not yet rolled.
    pub fn dice_total(&self) -> u8 {
        self.dice.map(|(a, b)| a + b).unwrap_or(0)
    }

    /// Whether the last roll was a double.
    pub fn last_roll_was_double(&self) -> bool {
        matches!(self.dice, Some((a, b)) if a == b)
    }
}

// ---------------------------------------------------------------------------
// Pending decisions
// ---------------------------------------------------------------------------

/// The engine's request for the next action, one variant per decision
/// kind with a typed context payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PendingDecision {
    /// Start-of-segment mandatory roll.
    RollDice { player: PlayerId },
    /// Jailed participant picks an escape route.
    JailOptions {
        player: PlayerId,
        can_pay_bail: bool,
        has_pardon_card: bool,
        roll_attempts_left: u8,
    },
    /// Landed on an unowned purchasable square.
    BuyOrAuction {
        player: PlayerId,
        property: SquareId,
        price: Cash,
    },
    /// It is this bidder's turn in a live auction.
    AuctionBid {
        player: PlayerId,
        property: SquareId,
        highest_bid: Cash,
        reserve: Cash,
    },
    /// A trade offer awaits this recipient's answer.
    RespondToTrade { player: PlayerId, offer_id: TradeId },
    /// The proposer may retry within a rejected lineage or walk away.
    ProposeAfterRejection {
        player: PlayerId,
        lineage: TradeId,
        rejections: u32,
    },
    /// Debt exceeds cash; raise funds or go bankrupt.
    LiquidateAssets {
        player: PlayerId,
        debt: Cash,
        creditor: Option<PlayerId>,
    },
    /// Post-roll free actions until end of turn.
    ManageAssets { player: PlayerId },
}

impl PendingDecision {
    /// The participant this decision is addressed to.
    pub fn player(&self) -> PlayerId {
        match self {
            PendingDecision::RollDice { player }
            | PendingDecision::JailOptions { player, .. }
            | PendingDecision::BuyOrAuction { player, .. }
            | PendingDecision::AuctionBid { player, .. }
            | PendingDecision::RespondToTrade { player, .. }
            | PendingDecision::ProposeAfterRejection { player, .. }
            | PendingDecision::LiquidateAssets { player, .. }
            | PendingDecision::ManageAssets { player } => *player,
        }
    }

    /// Stable name for logging and trace contexts.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PendingDecision::RollDice { .. } => "roll_dice",
            PendingDecision::JailOptions { .. } => "jail_options",
            PendingDecision::BuyOrAuction { .. } => "buy_or_auction_property",
            PendingDecision::AuctionBid { .. } => "auction_bid",
            PendingDecision::RespondToTrade { .. } => "respond_to_trade_offer",
            PendingDecision::ProposeAfterRejection { .. } => "propose_after_rejection",
            PendingDecision::LiquidateAssets { .. } => "asset_liquidation_for_debt",
            PendingDecision::ManageAssets { .. } => "manage_assets",
        }
    }
}

impl fmt::Display for PendingDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (P{})", self.kind_name(), self.player())
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// A fully parameterized action chosen by a decision agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    RollDice,
    PayBail,
    UsePardonCard,
    RollForDoubles,
    BuyProperty { property: SquareId },
    DeclineProperty,
    Bid { amount: Cash },
    PassBid,
    ProposeTrade {
        recipient: PlayerId,
        offered: Vec<TradeItem>,
        requested: Vec<TradeItem>,
        message: Option<String>,
    },
    RespondTrade {
        offer_id: TradeId,
        response: TradeResponse,
    },
    EndNegotiation,
    MortgageProperty { property: SquareId },
    UnmortgageProperty { property: SquareId },
    BuildHouse { property: SquareId },
    SellHouse { property: SquareId },
    ConfirmLiquidationDone,
    EndTurn,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::RollDice => ActionKind::RollDice,
            Action::PayBail => ActionKind::PayBail,
            Action::UsePardonCard => ActionKind::UsePardonCard,
            Action::RollForDoubles => ActionKind::RollForDoubles,
            Action::BuyProperty { .. } => ActionKind::BuyProperty,
            Action::DeclineProperty => ActionKind::DeclineProperty,
            Action::Bid { .. } => ActionKind::Bid,
            Action::PassBid => ActionKind::PassBid,
            Action::ProposeTrade { .. } => ActionKind::ProposeTrade,
            Action::RespondTrade { .. } => ActionKind::RespondTrade,
            Action::EndNegotiation => ActionKind::EndNegotiation,
            Action::MortgageProperty { .. } => ActionKind::MortgageProperty,
            Action::UnmortgageProperty { .. } => ActionKind::UnmortgageProperty,
            Action::BuildHouse { .. } => ActionKind::BuildHouse,
            Action::SellHouse { .. } => ActionKind::SellHouse,
            Action::ConfirmLiquidationDone => ActionKind::ConfirmLiquidationDone,
            Action::EndTurn => ActionKind::EndTurn,
        }
    }

    /// Build an action from a wire-format name and parameter object,
    /// as produced by an LLM agent or an external transport client.
    pub fn from_wire(name: &str, params: &serde_json::Value) -> anyhow::Result<Self> {
        let mut value = serde_json::Map::new();
        value.insert(
            "action".to_string(),
            serde_json::Value::String(name.to_string()),
        );
        if let serde_json::Value::Object(map) = params {
            for (k, v) in map {
                value.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(serde_json::Value::Object(value))
            .map_err(|e| anyhow::anyhow!("malformed action '{name}': {e}"))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind().as_str())
    }
}

/// Fieldless action discriminant used for legal-action lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RollDice,
    PayBail,
    UsePardonCard,
    RollForDoubles,
    BuyProperty,
    DeclineProperty,
    Bid,
    PassBid,
    ProposeTrade,
    RespondTrade,
    EndNegotiation,
    MortgageProperty,
    UnmortgageProperty,
    BuildHouse,
    SellHouse,
    ConfirmLiquidationDone,
    EndTurn,
}

impl ActionKind {
    /// Wire/prompt name for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RollDice => "roll_dice",
            ActionKind::PayBail => "pay_bail",
            ActionKind::UsePardonCard => "use_pardon_card",
            ActionKind::RollForDoubles => "roll_for_doubles",
            ActionKind::BuyProperty => "buy_property",
            ActionKind::DeclineProperty => "decline_property",
            ActionKind::Bid => "bid",
            ActionKind::PassBid => "pass_bid",
            ActionKind::ProposeTrade => "propose_trade",
            ActionKind::RespondTrade => "respond_trade",
            ActionKind::EndNegotiation => "end_negotiation",
            ActionKind::MortgageProperty => "mortgage_property",
            ActionKind::UnmortgageProperty => "unmortgage_property",
            ActionKind::BuildHouse => "build_house",
            ActionKind::SellHouse => "sell_house",
            ActionKind::ConfirmLiquidationDone => "confirm_liquidation_done",
            ActionKind::EndTurn => "end_turn",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Game outcome
// ---------------------------------------------------------------------------

/// How a game instance ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GameOutcome {
    /// One solvent participant left standing.
    Winner { player: PlayerId },
    /// Turn budget exhausted. Not a win.
    MaxTurnsReached,
    /// Fatal condition (invariant violation or ambiguous payment).
    Aborted { reason: String },
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameOutcome::Winner { player } => write!(f, "winner: P{player}"),
            GameOutcome::MaxTurnsReached => write!(f, "max turns reached"),
            GameOutcome::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error taxonomy for TYCOON.
///
/// Everything except `Invariant` is recoverable: validation and rate
/// limits re-prompt the same decision, insolvency drives liquidation,
/// and payment timeouts halt only the dependent game step.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("invalid action: {0}")]
    Validation(String),

    #[error("trade validation failed on {} item(s)", .0.len())]
    TradeInvalid(Vec<TradeItemError>),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("{participant} cannot cover ${debt:.2} debt (cash ${cash:.2})")]
    Insolvency {
        participant: String,
        debt: Cash,
        cash: Cash,
    },

    #[error(
        "payment {transaction_id} did not reach a terminal state within {timeout_secs}s — outcome unknown"
    )]
    PaymentTimeout {
        transaction_id: String,
        timeout_secs: u64,
    },

    #[error("engine invariant violated: {0}")]
    Invariant(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("agent error: {0}")]
    Agent(String),
}

impl GameError {
    /// Whether the decision loop may re-prompt the same decision after
    /// this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            GameError::Invariant(_) | GameError::PaymentTimeout { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
