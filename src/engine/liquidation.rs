//! Forced liquidation and bankruptcy.
//!
//! When a debt exceeds cash, assets are divested in a fixed priority
//! order: improvements are sold back first (always from the most
//! developed street, which keeps development even), then deeds are
//! mortgaged in track order. A participant still short after full
//! divestment is declared bankrupt and their remaining assets move to
//! the creditor, or back to the bank for treasury debt.

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::board::Board;
use crate::ledger::adapter::{LedgerAdapter, PaymentConsequence, PaymentOutcome};
use crate::ledger::TransferMetadata;
use crate::types::{Cash, GameError, Participant, PlayerId, SquareId};

/// One divestment step, for logs and reports.
#[derive(Debug, Clone)]
pub struct LiquidationStep {
    pub description: String,
    pub amount: Cash,
}

/// What a forced liquidation raised.
#[derive(Debug, Clone, Default)]
pub struct LiquidationReport {
    pub raised: Cash,
    pub steps: Vec<LiquidationStep>,
}

/// Everything `participant` could raise by full divestment, on top of
/// cash in hand: house sale values plus mortgage values of unmortgaged
/// deeds. Mortgaged deeds contribute nothing further.
pub fn liquidation_value(participant: &Participant, board: &Board) -> Cash {
    let mut total = participant.cash;
    for &id in &participant.properties {
        if let Some(deed) = board.deed(id) {
            if let Some(sale) = deed.house_sale_value() {
                total += sale * Decimal::from(deed.houses);
            }
            if !deed.mortgaged {
                total += deed.mortgage_value();
            }
        }
    }
    total
}

/// Divest until `participant.cash` covers `target` or nothing is left
/// to sell. Every step settles through the ledger (treasury pays the
/// participant) before the next one starts.
pub async fn force_liquidate(
    board: &mut Board,
    participant: &mut Participant,
    target: Cash,
    ledger: &LedgerAdapter,
    game_id: &str,
    turn: u64,
) -> Result<LiquidationReport, GameError> {
    let mut report = LiquidationReport::default();

    while participant.cash < target {
        let step = next_divestment(board, participant);
        let Some(step) = step else {
            break; // fully divested
        };

        let (outcome_amount, description) = match step {
            Divestment::SellHouse { property, value } => {
                (value, format!("sold improvement on #{property}"))
            }
            Divestment::Mortgage { property, value } => {
                (value, format!("mortgaged #{property}"))
            }
        };

        let metadata = TransferMetadata::new(game_id, turn, &description);
        let (_, outcome) = ledger
            .transfer(
                ledger.treasury(),
                &participant.ledger_account,
                outcome_amount,
                metadata,
                PaymentConsequence::None,
            )
            .await?;

        match outcome {
            PaymentOutcome::Settled => {
                apply_divestment(board, &step);
                participant.credit(outcome_amount);
                info!(
                    participant = %participant.name,
                    step = %description,
                    raised = %outcome_amount,
                    "Forced liquidation step"
                );
                report.raised += outcome_amount;
                report.steps.push(LiquidationStep {
                    description,
                    amount: outcome_amount,
                });
            }
            PaymentOutcome::Failed { reason } => {
                return Err(GameError::Ledger(format!(
                    "liquidation payout failed: {reason}"
                )));
            }
        }
    }

    Ok(report)
}

/// Declare `debtor` bankrupt over an unpayable `debt`: remaining cash
/// and deeds go to the creditor, or back to the bank (cleared of
/// improvements and mortgages) when the debt was treasury-owed.
#[allow(clippy::too_many_arguments)]
pub async fn declare_bankrupt(
    board: &mut Board,
    participants: &mut [Participant],
    debtor: PlayerId,
    creditor: Option<PlayerId>,
    debt: Cash,
    ledger: &LedgerAdapter,
    game_id: &str,
    turn: u64,
) -> Result<(), GameError> {
    let (debtor_name, debtor_account, remaining_cash) = {
        let p = &participants[debtor];
        (p.name.clone(), p.ledger_account.clone(), p.cash)
    };

    error!(
        participant = %debtor_name,
        creditor = ?creditor,
        "{}",
        GameError::Insolvency {
            participant: debtor_name.clone(),
            debt,
            cash: remaining_cash,
        }
    );

    // Remaining cash goes to the creditor through the ledger.
    if remaining_cash > Decimal::ZERO {
        if let Some(creditor_id) = creditor {
            let creditor_account = participants[creditor_id].ledger_account.clone();
            let metadata =
                TransferMetadata::new(game_id, turn, "bankruptcy settlement");
            let (_, outcome) = ledger
                .transfer(
                    &debtor_account,
                    &creditor_account,
                    remaining_cash,
                    metadata,
                    PaymentConsequence::None,
                )
                .await?;
            match outcome {
                PaymentOutcome::Settled => {
                    participants[creditor_id].credit(remaining_cash);
                }
                PaymentOutcome::Failed { reason } => {
                    warn!(reason = %reason, "Bankruptcy cash settlement failed");
                }
            }
        }
    }
    participants[debtor].cash = Decimal::ZERO;

    // Deeds move wholesale.
    let owned: Vec<SquareId> = participants[debtor].properties.iter().copied().collect();
    for id in owned {
        let Some(deed) = board.deed_mut(id) else {
            continue;
        };
        if deed.owner != Some(debtor) {
            return Err(GameError::Invariant(format!(
                "{} is in P{debtor}'s portfolio but owned by {:?}",
                deed.name, deed.owner
            )));
        }
        match creditor {
            Some(creditor_id) => {
                deed.owner = Some(creditor_id);
                participants[creditor_id].properties.insert(id);
            }
            None => {
                deed.owner = None;
                deed.houses = 0;
                deed.mortgaged = false;
            }
        }
        participants[debtor].properties.remove(&id);
    }

    // Pardon cards follow the assets to a creditor player.
    if let Some(creditor_id) = creditor {
        participants[creditor_id].pardon_cards += participants[debtor].pardon_cards;
    }
    participants[debtor].pardon_cards = 0;

    participants[debtor].bankrupt = true;
    participants[debtor].release_from_jail();
    info!(participant = %debtor_name, "Bankruptcy finalized");
    Ok(())
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

enum Divestment {
    SellHouse { property: SquareId, value: Cash },
    Mortgage { property: SquareId, value: Cash },
}

/// Pick the next asset to divest: the most improved street first,
/// then the lowest-numbered unmortgaged deed.
fn next_divestment(board: &Board, participant: &Participant) -> Option<Divestment> {
    let mut best_street: Option<(SquareId, u8, Cash)> = None;
    for &id in &participant.properties {
        if let Some(deed) = board.deed(id) {
            if deed.houses > 0 {
                if let Some(value) = deed.house_sale_value() {
                    if best_street.map(|(_, houses, _)| deed.houses > houses).unwrap_or(true) {
                        best_street = Some((id, deed.houses, value));
                    }
                }
            }
        }
    }
    if let Some((property, _, value)) = best_street {
        return Some(Divestment::SellHouse { property, value });
    }

    for &id in &participant.properties {
        if let Some(deed) = board.deed(id) {
            if !deed.mortgaged {
                return Some(Divestment::Mortgage {
                    property: id,
                    value: deed.mortgage_value(),
                });
            }
        }
    }
    None
}

fn apply_divestment(board: &mut Board, step: &Divestment) {
    match step {
        Divestment::SellHouse { property, .. } => {
            if let Some(deed) = board.deed_mut(*property) {
                deed.houses = deed.houses.saturating_sub(1);
            }
        }
        Divestment::Mortgage { property, .. } => {
            if let Some(deed) = board.deed_mut(*property) {
                deed.mortgaged = true;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
