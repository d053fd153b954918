// File: testing-framework/src/emulator/sequencer.rs
//
// Action Sequencer
//
// Hands scripted actions to inbound calls. The cursor is shared by every
// call of one method and guarded by a mutex, so claims are atomic and
// ordered by arrival even under concurrent calls.

use crate::emulator::model::ScriptedAction;
use crate::error::{HarnessError, Method};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use streamkv_common::CallContext;

/// How inbound calls map onto the action list
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SequencePolicy {
    /// One cursor for initial calls and retries alike; a call keeps playing
    /// actions until a terminal one or the end of the list
    #[default]
    Linear,
    /// The i-th call by arrival plays action i and nothing else
    RoundRobinDistinct,
}

/// An action together with its position in the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedAction {
    pub index: usize,
    pub action: ScriptedAction,
}

#[derive(Debug)]
pub struct ActionSequencer {
    method: Method,
    policy: SequencePolicy,
    actions: Vec<ScriptedAction>,
    cursor: Mutex<usize>,
}

impl ActionSequencer {
    pub fn new(method: Method, policy: SequencePolicy, actions: Vec<ScriptedAction>) -> Self {
        Self {
            method,
            policy,
            actions,
            cursor: Mutex::new(0),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn policy(&self) -> SequencePolicy {
        self.policy
    }

    pub fn actions(&self) -> &[ScriptedAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions handed out so far
    pub fn consumed(&self) -> usize {
        *self.cursor.lock()
    }

    pub fn remaining(&self) -> usize {
        self.len() - self.consumed()
    }

    /// Next unconsumed action, `None` once the list is exhausted.
    /// Each action is handed out at most once.
    pub fn next_action(&self, _ctx: &CallContext) -> Option<ClaimedAction> {
        let mut cursor = self.cursor.lock();
        let index = *cursor;
        let action = self.actions.get(index)?.clone();
        *cursor += 1;
        Some(ClaimedAction { index, action })
    }

    /// Bind an inbound call to the policy
    pub fn open_call(self: &Arc<Self>, ctx: &CallContext) -> Result<CallScript, HarnessError> {
        match self.policy {
            SequencePolicy::Linear => Ok(CallScript {
                source: ScriptSource::Shared(Arc::clone(self)),
            }),
            SequencePolicy::RoundRobinDistinct => {
                let claimed = self
                    .next_action(ctx)
                    .ok_or_else(|| HarnessError::SequenceExhausted {
                        method: self.method,
                        policy: self.policy.to_string(),
                        len: self.len(),
                    })?;
                Ok(CallScript {
                    source: ScriptSource::Single(Some(claimed)),
                })
            }
        }
    }
}

#[derive(Debug)]
enum ScriptSource {
    Shared(Arc<ActionSequencer>),
    Single(Option<ClaimedAction>),
}

/// Actions one call will play, pulled lazily
#[derive(Debug)]
pub struct CallScript {
    source: ScriptSource,
}

impl CallScript {
    pub fn next(&mut self, ctx: &CallContext) -> Option<ClaimedAction> {
        match &mut self.source {
            ScriptSource::Shared(sequencer) => sequencer.next_action(ctx),
            ScriptSource::Single(claimed) => claimed.take(),
        }
    }
}
