// File: testing-framework/src/emulator/mod.rs
//
// Scripted Streaming Engine
//
// The server side of the harness: what a script looks like (`model`), how
// calls draw actions from it (`sequencer`), how they are logged (`recorder`)
// and how actions become a response stream (`server`, `stream`).

pub mod model;
pub mod recorder;
pub mod sequencer;
pub mod server;
pub mod stream;

pub use model::{
    materialize, ChunkStatus, EmitAction, EmitPayload, EntryOutcomes, FailAction, RowChunk,
    ScriptedAction,
};
pub use recorder::{MutateRowsRecord, ReadRowsRecord, RequestRecord, RequestRecorder};
pub use sequencer::{ActionSequencer, CallScript, ClaimedAction, SequencePolicy};
pub use server::{is_authoring_error, EmulatorConfig, ScriptedServer, ScriptedServerBuilder};
pub use stream::ChunkBuffer;
