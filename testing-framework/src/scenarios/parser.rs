// File: testing-framework/src/scenarios/parser.rs
//
// YAML script parser. The on-disk shape is deliberately flat for authors
// (`delay_ms`, `key`, `succeeded`...) and is resolved here into the typed
// emulator model; the section an action sits in decides its payload kind.

use crate::emulator::{
    ChunkStatus, EmulatorConfig, EntryOutcomes, RowChunk, ScriptedAction, ScriptedServer,
    ScriptedServerBuilder, SequencePolicy,
};
use crate::error::{HarnessError, HarnessResult, Method};
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use streamkv_common::Code;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScript {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    emulator: Option<EmulatorConfig>,
    #[serde(default)]
    read_rows: Option<RawSection>,
    #[serde(default)]
    mutate_rows: Option<RawSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSection {
    #[serde(default)]
    policy: SequencePolicy,
    #[serde(default)]
    actions: Vec<RawAction>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAction {
    #[serde(default)]
    emit: Option<RawEmit>,
    #[serde(default)]
    fail: Option<RawFail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEmit {
    #[serde(default)]
    delay_ms: Option<u64>,
    #[serde(default)]
    chunks: Option<Vec<RawChunk>>,
    #[serde(default)]
    succeeded: Option<Vec<usize>>,
    #[serde(default)]
    failed: Option<BTreeMap<Code, Vec<usize>>>,
    #[serde(default)]
    end_of_stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawChunk {
    key: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    status: ChunkStatus,
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    qualifier: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFail {
    code: Code,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routing_cookie: Option<String>,
    #[serde(default)]
    retry_delay_ms: Option<u64>,
    #[serde(default)]
    delay_ms: Option<u64>,
}

/// Actions of one method together with their policy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptSection {
    pub policy: SequencePolicy,
    pub actions: Vec<ScriptedAction>,
}

/// A parsed script file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub name: String,
    pub description: Option<String>,
    pub emulator: Option<EmulatorConfig>,
    pub read_rows: ScriptSection,
    pub mutate_rows: ScriptSection,
}

impl ScriptFile {
    /// Wire the script into `builder`, keeping any settings it already has
    /// unless the script names an emulator section
    pub fn apply(&self, builder: ScriptedServerBuilder) -> ScriptedServerBuilder {
        let builder = match &self.emulator {
            Some(config) => builder.with_config(config.clone()),
            None => builder,
        };
        builder
            .read_rows(self.read_rows.policy, self.read_rows.actions.clone())
            .mutate_rows(self.mutate_rows.policy, self.mutate_rows.actions.clone())
    }

    /// Server running this script on the default clock
    pub fn build_server(&self) -> ScriptedServer {
        self.apply(ScriptedServer::builder()).build()
    }
}

/// Parse a YAML script
pub fn parse_script(yaml: &str) -> HarnessResult<ScriptFile> {
    let raw: RawScript =
        serde_yaml::from_str(yaml).map_err(|e| HarnessError::Script(e.to_string()))?;
    if raw.name.trim().is_empty() {
        return Err(HarnessError::Script("script name must not be empty".to_string()));
    }

    let read_rows = resolve_section(Method::ReadRows, raw.read_rows)?;
    let mutate_rows = resolve_section(Method::MutateRows, raw.mutate_rows)?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "Parsed script '{}': {} read actions, {} write actions",
            raw.name,
            read_rows.actions.len(),
            mutate_rows.actions.len()
        );
    }

    Ok(ScriptFile {
        name: raw.name,
        description: raw.description,
        emulator: raw.emulator,
        read_rows,
        mutate_rows,
    })
}

/// Read and parse a script from disk
pub async fn load_script(path: impl AsRef<Path>) -> anyhow::Result<ScriptFile> {
    let path = path.as_ref();
    let yaml = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&yaml).with_context(|| format!("Failed to parse script {}", path.display()))
}

fn resolve_section(method: Method, raw: Option<RawSection>) -> HarnessResult<ScriptSection> {
    let Some(raw) = raw else {
        return Ok(ScriptSection::default());
    };
    let actions = raw
        .actions
        .into_iter()
        .enumerate()
        .map(|(index, action)| {
            resolve_action(method, action).map_err(|reason| {
                HarnessError::Script(format!("{} action #{}: {}", method, index, reason))
            })
        })
        .collect::<HarnessResult<Vec<_>>>()?;
    Ok(ScriptSection {
        policy: raw.policy,
        actions,
    })
}

fn resolve_action(method: Method, raw: RawAction) -> Result<ScriptedAction, String> {
    match (raw.emit, raw.fail) {
        (Some(emit), None) => resolve_emit(method, emit),
        (None, Some(fail)) => Ok(resolve_fail(fail)),
        (Some(_), Some(_)) => Err("an action is either emit or fail, not both".to_string()),
        (None, None) => Err("an action needs an emit or a fail entry".to_string()),
    }
}

fn resolve_emit(method: Method, raw: RawEmit) -> Result<ScriptedAction, String> {
    let action = match method {
        Method::ReadRows => {
            if raw.succeeded.is_some() || raw.failed.is_some() {
                return Err("read emissions carry chunks, not entry outcomes".to_string());
            }
            let chunks = raw
                .chunks
                .unwrap_or_default()
                .into_iter()
                .map(resolve_chunk)
                .collect();
            ScriptedAction::chunks(chunks)
        }
        Method::MutateRows => {
            if raw.chunks.is_some() {
                return Err("write emissions carry entry outcomes, not chunks".to_string());
            }
            let mut outcomes = EntryOutcomes::new().succeeded(raw.succeeded.unwrap_or_default());
            for (code, indices) in raw.failed.unwrap_or_default() {
                if code == Code::Ok {
                    return Err("failed entries cannot use code ok".to_string());
                }
                outcomes = outcomes.failed(code, indices);
            }
            ScriptedAction::entries(outcomes)
        }
    };

    let action = if raw.end_of_stream {
        action.end_of_stream()
    } else {
        action
    };
    Ok(match raw.delay_ms {
        Some(ms) => action.with_delay(Duration::from_millis(ms)),
        None => action,
    })
}

fn resolve_chunk(raw: RawChunk) -> RowChunk {
    let chunk = RowChunk::new(raw.key, raw.value, raw.status);
    match (raw.family, raw.qualifier) {
        (None, None) => chunk,
        (family, qualifier) => {
            let family = family.unwrap_or_else(|| chunk.family_name.clone());
            let qualifier = qualifier
                .map(String::into_bytes)
                .unwrap_or_else(|| chunk.qualifier.clone());
            chunk.with_column(&family, qualifier)
        }
    }
}

fn resolve_fail(raw: RawFail) -> ScriptedAction {
    let mut action = ScriptedAction::fail(raw.code);
    if let Some(message) = raw.message {
        action = action.with_message(message);
    }
    if let Some(cookie) = raw.routing_cookie {
        action = action.with_routing_cookie(cookie);
    }
    if let Some(ms) = raw.retry_delay_ms {
        action = action.with_retry_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = raw.delay_ms {
        action = action.with_delay(Duration::from_millis(ms));
    }
    action
}
