//! Full-game scenario tests.
//!
//! Drives the orchestrator end to end with scripted agents, the
//! in-process ledger for settlement, and the scripted-status mock for
//! payment-lifecycle scenarios.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use tycoon::agents::scripted::ScriptedAgent;
use tycoon::agents::DecisionAgent;
use tycoon::config::GameConfig;
use tycoon::engine::{run_game, DecisionDispatcher, GameController};
use tycoon::ledger::adapter::LedgerAdapter;
use tycoon::ledger::local::LocalLedger;
use tycoon::ledger::LedgerStatus;
use tycoon::types::{
    Action, ActionKind, GameOutcome, PendingDecision, TradeItem, TradeResponse, TurnPhase,
};

use super::mock_ledger::MockLedger;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn local_game(game_id: &str, players: &[&str]) -> (GameController, Arc<LocalLedger>) {
    let ledger = Arc::new(LocalLedger::new());
    ledger.register_account("treasury", dec!(1000000));
    for (i, _) in players.iter().enumerate() {
        ledger.register_account(&GameController::account_name(game_id, i), dec!(1500));
    }
    let adapter = LedgerAdapter::with_intervals(
        ledger.clone(),
        Duration::from_millis(1),
        Duration::from_millis(500),
        "treasury",
    );
    let config = GameConfig {
        players: players.iter().map(|s| s.to_string()).collect(),
        dice_seed: Some(11),
        ..GameConfig::default()
    };
    let controller = GameController::new(game_id, config, adapter).unwrap();
    (controller, ledger)
}

/// Walk a pending-trade exchange: the current offer id, whoever it is
/// addressed to.
fn pending_offer(controller: &GameController) -> (usize, u64) {
    match controller.pending_decision() {
        PendingDecision::RespondToTrade { player, offer_id } => (*player, *offer_id),
        other => panic!("expected a trade response decision, got {other}"),
    }
}

// ---------------------------------------------------------------------------
// Scenario A — negotiation closes after three rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_three_rejections_close_the_lineage() {
    let (mut game, _) = local_game("scenario-a", &["P1", "P2"]);
    game.with_state_mut(|board, participants| {
        board.deed_mut(1).unwrap().owner = Some(0);
        participants[0].properties.insert(1);
        board.deed_mut(3).unwrap().owner = Some(1);
        participants[1].properties.insert(3);
    });

    // A quiet landing (Just Visiting) opens the asset-management phase.
    game.queue_dice(&[(4, 6)]);
    game.apply(0, Action::RollDice).await.unwrap();
    assert_eq!(
        game.pending_decision(),
        &PendingDecision::ManageAssets { player: 0 }
    );

    let offer = || Action::ProposeTrade {
        recipient: 1,
        offered: vec![
            TradeItem::Property { id: 1 },
            TradeItem::Cash { amount: dec!(100) },
        ],
        requested: vec![TradeItem::Property { id: 3 }],
        message: None,
    };

    // Original proposal plus two retries, each rejected.
    game.apply(0, offer()).await.unwrap();
    let lineage = pending_offer(&game).1;
    for round in 1..=3u32 {
        let (recipient, offer_id) = pending_offer(&game);
        assert_eq!(recipient, 1);
        game.apply(
            1,
            Action::RespondTrade {
                offer_id,
                response: TradeResponse::Reject,
            },
        )
        .await
        .unwrap();

        if round < 3 {
            match game.pending_decision() {
                PendingDecision::ProposeAfterRejection { rejections, .. } => {
                    assert_eq!(*rejections, round);
                }
                other => panic!("expected proposer follow-up, got {other}"),
            }
            game.apply(0, offer()).await.unwrap();
        }
    }

    // Lineage is closed exactly at three; the floor returns to P1.
    assert!(game.trade_engine().is_lineage_closed(lineage));
    assert_eq!(game.trade_engine().rejections(lineage), 3);
    assert_eq!(
        game.pending_decision(),
        &PendingDecision::ManageAssets { player: 0 }
    );

    // Nothing moved: properties and balances are untouched.
    assert_eq!(game.board().deed(1).unwrap().owner, Some(0));
    assert_eq!(game.board().deed(3).unwrap().owner, Some(1));
    assert_eq!(game.participants()[0].cash, dec!(1500));
    assert_eq!(game.participants()[1].cash, dec!(1500));
}

// ---------------------------------------------------------------------------
// Scenario B — declined purchase goes to auction; winner pays on settlement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_b_auction_after_declined_purchase() {
    let (mut game, ledger) = local_game("scenario-b", &["P1", "P2", "P3"]);
    game.with_state_mut(|_, participants| {
        participants[0].cash = dec!(150);
        participants[0].position = 10;
    });

    game.queue_dice(&[(4, 5)]); // 10 -> 19, New York Avenue, price $200
    game.apply(0, Action::RollDice).await.unwrap();

    // P1 cannot afford the face price; buying is not even offered.
    let legal = game.legal_actions();
    assert!(!legal.contains(&ActionKind::BuyProperty));
    game.apply(0, Action::DeclineProperty).await.unwrap();

    // Auction among the remaining solvent participants, decliner out.
    let snapshot = game.snapshot();
    assert_eq!(snapshot.auction.unwrap().eligible, vec![1, 2]);

    game.apply(1, Action::Bid { amount: dec!(100) }).await.unwrap();
    game.apply(2, Action::Bid { amount: dec!(180) }).await.unwrap();
    game.apply(1, Action::PassBid).await.unwrap();

    // Highest bid wins; cash moves only after settlement confirmation.
    assert_eq!(game.board().deed(19).unwrap().owner, Some(2));
    assert_eq!(game.participants()[2].cash, dec!(1320));
    assert_eq!(
        ledger.balance(&GameController::account_name("scenario-b", 2)),
        Some(dec!(1320))
    );

    // Documented policy: the excluded decliner may still acquire the
    // property later via trade.
    assert_eq!(
        game.pending_decision(),
        &PendingDecision::ManageAssets { player: 0 }
    );
    game.apply(
        0,
        Action::ProposeTrade {
            recipient: 2,
            offered: vec![TradeItem::Cash { amount: dec!(140) }],
            requested: vec![TradeItem::Property { id: 19 }],
            message: Some("sell it to me after all".to_string()),
        },
    )
    .await
    .unwrap();
    let (_, offer_id) = pending_offer(&game);
    game.apply(
        2,
        Action::RespondTrade {
            offer_id,
            response: TradeResponse::Accept,
        },
    )
    .await
    .unwrap();

    assert_eq!(game.board().deed(19).unwrap().owner, Some(0));
    assert_eq!(game.participants()[0].cash, dec!(10));
    assert_eq!(game.participants()[2].cash, dec!(1460));
}

// ---------------------------------------------------------------------------
// Scenario C — liquidation falls short; bankruptcy pays the creditor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_c_bankruptcy_after_forced_liquidation() {
    let (mut game, _) = local_game("scenario-c", &["P1", "P2"]);
    game.with_state_mut(|board, participants| {
        // P1: $100 cash and one deed worth $100 in mortgage value.
        participants[0].cash = dec!(100);
        board.deed_mut(19).unwrap().owner = Some(0);
        participants[0].properties.insert(19);
        participants[0].position = 16;
        // P2 holds the red group with two houses on Kentucky: rent $250.
        for id in [21usize, 23, 24] {
            board.deed_mut(id).unwrap().owner = Some(1);
            participants[1].properties.insert(id);
        }
        board.deed_mut(21).unwrap().houses = 2;
    });

    game.queue_dice(&[(2, 3)]); // 16 -> 21, Kentucky Avenue
    game.apply(0, Action::RollDice).await.unwrap();

    // Liquidation raised exactly the $100 mortgage value, the
    // remaining $50 was unpayable, and everything went to the creditor.
    assert!(game.participants()[0].bankrupt);
    assert_eq!(game.participants()[0].cash, dec!(0));
    assert!(game.participants()[0].properties.is_empty());

    assert_eq!(game.participants()[1].cash, dec!(1700)); // 1500 + 100 + 100
    assert_eq!(game.board().deed(19).unwrap().owner, Some(1));
    assert!(game.board().deed(19).unwrap().mortgaged); // taken as mortgaged

    // Two-player game: the creditor is the last solvent participant.
    assert_eq!(game.outcome(), Some(&GameOutcome::Winner { player: 1 }));
}

// ---------------------------------------------------------------------------
// Scenario D — long non-terminal poll run settles exactly once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_d_slow_settlement_applies_consequence_once() {
    let mock = Arc::new(MockLedger::new());
    mock.queue_sequence(vec![
        LedgerStatus::Submitted,
        LedgerStatus::Pending,
        LedgerStatus::Processing,
        LedgerStatus::Approved,
        LedgerStatus::Submitted,
        LedgerStatus::PendingConfirmation,
        LedgerStatus::Success,
    ]);
    let adapter = LedgerAdapter::with_intervals(
        mock.clone(),
        Duration::from_millis(1),
        Duration::from_millis(500),
        "treasury",
    );
    let config = GameConfig {
        players: vec!["P1".to_string(), "P2".to_string()],
        dice_seed: Some(5),
        ..GameConfig::default()
    };
    let mut game = GameController::new("scenario-d", config, adapter).unwrap();

    game.queue_dice(&[(1, 2)]); // Baltic Avenue, price $60
    game.apply(0, Action::RollDice).await.unwrap();
    game.apply(0, Action::BuyProperty { property: 3 }).await.unwrap();

    // One submitted transfer, settled after the full status run, with
    // the purchase applied exactly once.
    let submitted = mock.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].amount, dec!(60));
    assert_eq!(game.board().deed(3).unwrap().owner, Some(0));
    assert_eq!(game.participants()[0].cash, dec!(1440));
    assert_eq!(
        game.participants()[0].properties.iter().copied().collect::<Vec<_>>(),
        vec![3]
    );
    assert_eq!(game.turn().phase, TurnPhase::PostRoll);
}

// ---------------------------------------------------------------------------
// End to end — scripted agents through the public game loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_scripted_game() {
    let ledger = Arc::new(LocalLedger::new());
    ledger.register_account("treasury", dec!(1000000));
    for i in 0..2 {
        ledger.register_account(&GameController::account_name("e2e", i), dec!(1500));
    }
    let adapter = LedgerAdapter::with_intervals(
        ledger.clone(),
        Duration::from_millis(1),
        Duration::from_millis(500),
        "treasury",
    );
    let config = GameConfig {
        players: vec!["Ada".to_string(), "Bob".to_string()],
        max_turns: 2,
        dice_seed: Some(23),
        ..GameConfig::default()
    };
    let mut controller = GameController::new("e2e", config, adapter).unwrap();
    controller.queue_dice(&[(1, 2), (1, 2)]); // both land on Baltic Avenue

    let agents: Vec<Arc<dyn DecisionAgent>> = vec![
        Arc::new(ScriptedAgent::with_script(
            "ada",
            vec![
                Action::RollDice,
                Action::BuyProperty { property: 3 },
                Action::EndTurn,
            ],
        )),
        Arc::new(ScriptedAgent::with_script(
            "bob",
            vec![Action::RollDice, Action::EndTurn],
        )),
    ];
    let dispatcher = DecisionDispatcher::new(Duration::from_secs(1));

    let outcome = run_game(&mut controller, &agents, &dispatcher).await;

    assert_eq!(outcome, GameOutcome::MaxTurnsReached);
    // Ada bought Baltic for $60, Bob paid $4 rent on it.
    assert_eq!(controller.board().deed(3).unwrap().owner, Some(0));
    assert_eq!(controller.participants()[0].cash, dec!(1444));
    assert_eq!(controller.participants()[1].cash, dec!(1496));
    assert_eq!(
        ledger.balance(&GameController::account_name("e2e", 0)),
        Some(dec!(1444))
    );
}
