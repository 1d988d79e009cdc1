//! TYCOON — turn-based property-trading game engine for autonomous agents.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the ledger and decision agents, and drives one game from the
//! first roll to a terminal state.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use tycoon::agents::llm::LlmAgent;
use tycoon::agents::scripted::ScriptedAgent;
use tycoon::agents::DecisionAgent;
use tycoon::config::AppConfig;
use tycoon::engine::{run_game, DecisionDispatcher, GameController};
use tycoon::ledger::adapter::LedgerAdapter;
use tycoon::ledger::local::LocalLedger;
use tycoon::ledger::rest::RestLedgerClient;
use tycoon::ledger::LedgerService;

const BANNER: &str = r#"
 _____ _   _  ____ ___   ___  _   _
|_   _| | | |/ ___/ _ \ / _ \| \ | |
  | | | |_| | |  | | | | | | |  \| |
  | | |  _  | |__| |_| | |_| | |\  |
  |_| |_| |_|\____\___/ \___/|_| \_|

  Turn-Based Property Arena for Autonomous Agents
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    println!("{BANNER}");
    info!(
        participants = cfg.game.players.len(),
        starting_cash = cfg.game.starting_cash,
        max_turns = cfg.game.max_turns,
        "TYCOON starting up"
    );

    let game_id = format!("game-{}", uuid::Uuid::new_v4());

    // -- Ledger -----------------------------------------------------------

    let service: Arc<dyn LedgerService> = if cfg.ledger.base_url.is_empty() {
        info!("No ledger endpoint configured — using the in-process ledger (dry run)");
        let local = LocalLedger::new();
        local.register_account(
            &cfg.ledger.treasury_account,
            rust_decimal::Decimal::from(1_000_000_000u64),
        );
        for (i, _) in cfg.game.players.iter().enumerate() {
            local.register_account(
                &GameController::account_name(&game_id, i),
                cfg.game.starting_cash_amount(),
            );
        }
        Arc::new(local)
    } else {
        let api_key = cfg
            .ledger
            .api_key_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok());
        info!(base_url = %cfg.ledger.base_url, "Using REST ledger");
        Arc::new(RestLedgerClient::new(&cfg.ledger.base_url, api_key)?)
    };
    let ledger = LedgerAdapter::new(service, &cfg.ledger);

    // -- Agents -----------------------------------------------------------

    let llm_api_key = std::env::var(&cfg.agent.api_key_env).unwrap_or_default();
    let agents: Vec<Arc<dyn DecisionAgent>> = cfg
        .game
        .players
        .iter()
        .map(|name| -> Result<Arc<dyn DecisionAgent>> {
            if cfg.agent.provider == "llm" && !llm_api_key.is_empty() {
                Ok(Arc::new(LlmAgent::new(
                    name,
                    llm_api_key.clone(),
                    Some(cfg.agent.model.clone()),
                    Some(cfg.agent.max_tokens),
                )?))
            } else {
                if cfg.agent.provider == "llm" {
                    warn!(name, "LLM provider selected but no API key — using passive agent");
                }
                Ok(Arc::new(ScriptedAgent::passive(name)))
            }
        })
        .collect::<Result<_>>()?;

    // -- Run --------------------------------------------------------------

    let mut controller = GameController::new(&game_id, cfg.game.clone(), ledger)
        .map_err(|e| anyhow::anyhow!("failed to create game: {e}"))?;
    let dispatcher = DecisionDispatcher::new(Duration::from_secs(cfg.agent.decision_timeout_secs));

    let outcome = run_game(&mut controller, &agents, &dispatcher).await;

    info!(game_id = %game_id, outcome = %outcome, "Game finished");
    for participant in controller.participants() {
        info!(standing = %participant, "Final standing");
    }

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tycoon=info"));

    let json_logging = std::env::var("TYCOON_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
