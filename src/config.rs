//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::types::Cash;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub game: GameConfig,
    pub ledger: LedgerConfig,
    pub agent: AgentConfig,
}

/// Rules and budgets for one game instance.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    /// Participant display names; one agent per entry.
    pub players: Vec<String>,
    /// Seeded stake per participant.
    pub starting_cash: u32,
    /// Salary collected when passing GO.
    pub go_salary: u32,
    /// Cost of leaving jail by payment.
    pub bail_amount: u32,
    /// Failed doubles attempts allowed before bail is forced.
    pub jail_max_roll_attempts: u8,
    /// Hard turn budget; reaching it ends the game without a winner.
    pub max_turns: u64,
    /// Actions allowed per turn segment before defaults are forced.
    pub max_actions_per_segment: u32,
    /// Rejections that permanently close a trade lineage.
    pub max_trade_rejections: u32,
    /// Trade-initiating actions (propose or counter) per participant per turn.
    pub max_trade_initiations_per_turn: u32,
    /// Auction reserve as a fraction of face price (0 disables).
    pub auction_reserve_fraction: f64,
    /// Whether the participant who declined to buy sits the auction out.
    pub auction_excludes_decliner: bool,
    /// Fixed dice/deck seed for reproducible games.
    pub dice_seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            players: vec!["Alpha".to_string(), "Beta".to_string()],
            starting_cash: 1500,
            go_salary: 200,
            bail_amount: 50,
            jail_max_roll_attempts: 3,
            max_turns: 350,
            max_actions_per_segment: 15,
            max_trade_rejections: 3,
            max_trade_initiations_per_turn: 5,
            auction_reserve_fraction: 0.0,
            auction_excludes_decliner: true,
            dice_seed: None,
        }
    }
}

impl GameConfig {
    pub fn starting_cash_amount(&self) -> Cash {
        Decimal::from(self.starting_cash)
    }

    pub fn bail(&self) -> Cash {
        Decimal::from(self.bail_amount)
    }

    pub fn go_salary_amount(&self) -> Cash {
        Decimal::from(self.go_salary)
    }
}

/// External payment service endpoint and polling policy.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base URL of the payment service. Empty selects the in-process
    /// ledger (dry-run mode).
    pub base_url: String,
    /// Env-var name holding the service API key.
    pub api_key_env: Option<String>,
    /// Treasury account on the ledger (bank side of system payments).
    pub treasury_account: String,
    /// Seconds between status polls.
    pub poll_interval_secs: u64,
    /// Seconds before a payment is declared ambiguous.
    pub timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key_env: None,
            treasury_account: "treasury".to_string(),
            poll_interval_secs: 2,
            timeout_secs: 60,
        }
    }
}

/// Decision agent backend.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// "llm" or "scripted".
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    /// Seconds an agent may take before the default action is forced.
    pub decision_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "scripted".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "TYCOON_LLM_API_KEY".to_string(),
            max_tokens: 1024,
            decision_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            ledger: LedgerConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}
