//! Deterministic scripted agent.
//!
//! Replays a fixed action queue, falling back to the conservative
//! default once the script runs dry. The whole engine is testable with
//! these in place of the LLM collaborator.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use crate::snapshot::GameSnapshot;
use crate::types::{Action, ActionKind};

use super::{default_action, DecisionAgent};

/// Replays scripted actions in order; answers with the default action
/// once exhausted (or from the start, for an empty script).
pub struct ScriptedAgent {
    name: String,
    script: Mutex<VecDeque<Action>>,
}

impl ScriptedAgent {
    /// An agent that always plays the conservative default.
    pub fn passive(name: &str) -> Self {
        Self::with_script(name, Vec::new())
    }

    /// An agent that plays `script` front to back, then defaults.
    pub fn with_script(name: &str, script: Vec<Action>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
        }
    }

    /// Append actions to the end of the script mid-game.
    pub fn push_actions(&self, actions: Vec<Action>) {
        self.script.lock().unwrap().extend(actions);
    }

    /// Actions not yet played.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionAgent for ScriptedAgent {
    async fn decide(
        &self,
        snapshot: &GameSnapshot,
        legal_actions: &[ActionKind],
    ) -> Result<Action> {
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(action) => {
                debug!(agent = %self.name, action = %action, "Scripted action");
                Ok(action)
            }
            None => Ok(default_action(snapshot, legal_actions)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
