// File: testing-framework/src/emulator/server.rs
//
// Scripted Stream Emulator
//
// A fake data service that replays scripted actions per inbound call. Every
// call is recorded synchronously, bound to the sequencer, then played by its
// own tokio task writing into a bounded response stream. Delays run on the
// injected clock and stop early when the caller hangs up.

use crate::emulator::model::{EmitAction, EmitPayload, FailAction, ScriptedAction};
use crate::emulator::recorder::RequestRecorder;
use crate::emulator::sequencer::{ActionSequencer, CallScript, SequencePolicy};
use crate::emulator::stream::ChunkBuffer;
use crate::error::{HarnessError, Method};
use crate::orchestrator::{default_clock, Clock};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use streamkv_common::metadata::{
    attach_retry_info, encode_routing_cookie, DEFAULT_ROUTING_COOKIE_HEADER,
};
use streamkv_common::serializer::{duration_ms, opt_duration_ms};
use streamkv_common::{
    CallContext, DataService, MutateRowsRequest, MutateRowsResponse, ReadRowsRequest,
    ErrorDetail, ReadRowsResponse, ResponseStream, Status,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// `ErrorInfo` stamped on calls failed because the script was misused
pub const AUTHORING_ERROR_REASON: &str = "SCRIPT_AUTHORING_ERROR";
pub const AUTHORING_ERROR_DOMAIN: &str = "streamkv-testing-framework";

/// Whether `status` came from a misused script rather than the protocol
pub fn is_authoring_error(status: &Status) -> bool {
    status.details.iter().any(|detail| {
        matches!(detail, ErrorDetail::ErrorInfo { reason, domain }
            if reason == AUTHORING_ERROR_REASON && domain == AUTHORING_ERROR_DOMAIN)
    })
}

/// Emulator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Records kept per method before further calls count as overflow
    pub recorder_capacity: usize,
    /// Responses buffered per call before the server waits on the client
    pub response_buffer: usize,
    /// Trailer key under which routing cookies are sent
    pub routing_cookie_header: String,
    /// Calls older than this (plus grace) are reset with `Unavailable`
    #[serde(with = "opt_duration_ms")]
    pub max_call_age: Option<Duration>,
    #[serde(with = "duration_ms")]
    pub max_call_age_grace: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            recorder_capacity: 16,
            response_buffer: 16,
            routing_cookie_header: DEFAULT_ROUTING_COOKIE_HEADER.to_string(),
            max_call_age: None,
            max_call_age_grace: Duration::ZERO,
        }
    }
}

enum Pause {
    Elapsed,
    HungUp,
    Reset,
}

struct ServerInner {
    config: EmulatorConfig,
    clock: Arc<dyn Clock>,
    reads: Arc<ActionSequencer>,
    writes: Arc<ActionSequencer>,
    read_log: RequestRecorder<ReadRowsRequest>,
    write_log: RequestRecorder<MutateRowsRequest>,
    authoring_errors: Mutex<Vec<HarnessError>>,
    calls: Mutex<Vec<JoinHandle<()>>>,
}

/// Scripted fake of the data service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ScriptedServer {
    inner: Arc<ServerInner>,
}

impl ScriptedServer {
    pub fn builder() -> ScriptedServerBuilder {
        ScriptedServerBuilder::new()
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    pub fn read_rows_recorder(&self) -> &RequestRecorder<ReadRowsRequest> {
        &self.inner.read_log
    }

    pub fn mutate_rows_recorder(&self) -> &RequestRecorder<MutateRowsRequest> {
        &self.inner.write_log
    }

    pub fn read_rows_sequencer(&self) -> &ActionSequencer {
        &self.inner.reads
    }

    pub fn mutate_rows_sequencer(&self) -> &ActionSequencer {
        &self.inner.writes
    }

    /// Authoring errors latched so far, oldest first
    pub fn authoring_errors(&self) -> Vec<HarnessError> {
        self.inner.authoring_errors.lock().clone()
    }

    /// Take the latched authoring errors, leaving none behind
    pub fn take_authoring_errors(&self) -> Vec<HarnessError> {
        std::mem::take(&mut *self.inner.authoring_errors.lock())
    }

    /// Panic if the script was misused during the run
    pub fn assert_script_sound(&self) {
        let errors = self.authoring_errors();
        if !errors.is_empty() {
            let listing: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
            panic!(
                "test script is broken ({} authoring errors):\n{}",
                errors.len(),
                listing.join("\n")
            );
        }
    }

    /// Wait for every call task spawned so far to finish
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.calls.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    log::warn!("Scripted call task ended abnormally: {}", e);
                }
            }
        }
    }

    fn spawn_call<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut calls = self.inner.calls.lock();
        calls.retain(|h| !h.is_finished());
        calls.push(handle);
    }
}

impl std::fmt::Debug for ScriptedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedServer")
            .field("config", &self.inner.config)
            .field("reads", &self.inner.reads)
            .field("writes", &self.inner.writes)
            .finish()
    }
}

impl ServerInner {
    fn latch(&self, error: HarnessError) -> Status {
        log::error!("Harness authoring error: {}", error);
        let status = Status::internal(error.to_string()).with_detail(ErrorDetail::ErrorInfo {
            reason: AUTHORING_ERROR_REASON.to_string(),
            domain: AUTHORING_ERROR_DOMAIN.to_string(),
        });
        self.authoring_errors.lock().push(error);
        status
    }

    fn fail_status(&self, fail: &FailAction) -> Status {
        let message = fail
            .message
            .clone()
            .unwrap_or_else(|| format!("scripted {} error", fail.code));
        let mut status = Status::new(fail.code, message);
        if let Some(cookie) = &fail.routing_cookie {
            encode_routing_cookie(
                &mut status.metadata,
                &self.config.routing_cookie_header,
                cookie,
            );
        }
        if let Some(retry_delay) = fail.retry_delay {
            attach_retry_info(&mut status, retry_delay);
        }
        status
    }

    /// Sleep for `delay`, cut short by a hang-up or by the call age limit
    async fn pause<T>(
        &self,
        delay: Duration,
        tx: &mpsc::Sender<Result<T, Status>>,
        started: Instant,
    ) -> Pause {
        let reset_in = self.config.max_call_age.map(|age| {
            (age + self.config.max_call_age_grace)
                .saturating_sub(self.clock.elapsed_since(started))
        });
        let reset_first = reset_in.is_some_and(|r| r < delay);

        tokio::select! {
            _ = self.clock.sleep(delay), if !reset_first => Pause::Elapsed,
            _ = self.clock.sleep(reset_in.unwrap_or(delay)), if reset_first => Pause::Reset,
            _ = tx.closed() => Pause::HungUp,
        }
    }

    /// Wait out an action's delay; `false` means the call is over
    async fn before_action<T>(
        &self,
        action: &ScriptedAction,
        method: Method,
        tx: &mpsc::Sender<Result<T, Status>>,
        started: Instant,
    ) -> bool {
        let Some(delay) = action.delay() else {
            return true;
        };
        match self.pause(delay, tx, started).await {
            Pause::Elapsed => true,
            Pause::HungUp => {
                log::debug!("{} caller hung up during a scripted delay", method);
                false
            }
            Pause::Reset => {
                log::debug!("{} call exceeded its maximum age, resetting", method);
                let _ = tx.send(Err(Status::unavailable("stream reset"))).await;
                false
            }
        }
    }

    fn check_payload(&self, method: Method, index: usize, action: &ScriptedAction) -> Result<(), Status> {
        match action.payload_method() {
            Some(m) if m != method => Err(self.latch(HarnessError::ScriptMismatch { method, index })),
            _ => Ok(()),
        }
    }

    async fn play_read(
        self: Arc<Self>,
        ctx: CallContext,
        mut script: CallScript,
        tx: mpsc::Sender<Result<ReadRowsResponse, Status>>,
    ) {
        let started = self.clock.now();
        let mut buffer = ChunkBuffer::new();
        let mut played = 0usize;

        loop {
            if played > 0 && !drained(&tx).await {
                return;
            }
            let Some(claimed) = script.next(&ctx) else {
                break;
            };
            played += 1;
            if let Err(status) = self.check_payload(Method::ReadRows, claimed.index, &claimed.action) {
                let _ = tx.send(Err(status)).await;
                return;
            }
            if !self.before_action(&claimed.action, Method::ReadRows, &tx, started).await {
                return;
            }
            if log::log_enabled!(log::Level::Debug) {
                log::debug!("read_rows playing action #{}", claimed.index);
            }
            match claimed.action {
                ScriptedAction::Emit(EmitAction {
                    payload: EmitPayload::Chunks(chunks),
                    ..
                }) => {
                    for chunk in &chunks {
                        if let Some(response) = buffer.push(chunk) {
                            if tx.send(Ok(response)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                ScriptedAction::Emit(_) => return,
                ScriptedAction::Fail(fail) => {
                    let _ = tx.send(Err(self.fail_status(&fail))).await;
                    return;
                }
            }
        }
        if buffer.pending() > 0 {
            log::debug!(
                "read_rows call ended with {} uncommitted chunks discarded",
                buffer.pending()
            );
        }
    }

    async fn play_write(
        self: Arc<Self>,
        ctx: CallContext,
        mut script: CallScript,
        tx: mpsc::Sender<Result<MutateRowsResponse, Status>>,
    ) {
        let started = self.clock.now();
        let mut played = 0usize;

        loop {
            if played > 0 && !drained(&tx).await {
                return;
            }
            let Some(claimed) = script.next(&ctx) else {
                return;
            };
            played += 1;
            if let Err(status) = self.check_payload(Method::MutateRows, claimed.index, &claimed.action) {
                let _ = tx.send(Err(status)).await;
                return;
            }
            if !self.before_action(&claimed.action, Method::MutateRows, &tx, started).await {
                return;
            }
            if log::log_enabled!(log::Level::Debug) {
                log::debug!("mutate_rows playing action #{}", claimed.index);
            }
            match claimed.action {
                ScriptedAction::Emit(EmitAction {
                    payload: EmitPayload::Entries(outcomes),
                    end_of_stream,
                    ..
                }) => {
                    if !outcomes.is_empty() {
                        let response = MutateRowsResponse {
                            entries: outcomes.response_entries(),
                        };
                        if tx.send(Ok(response)).await.is_err() {
                            return;
                        }
                    }
                    if end_of_stream {
                        return;
                    }
                }
                ScriptedAction::Emit(_) => return,
                ScriptedAction::Fail(fail) => {
                    let _ = tx.send(Err(self.fail_status(&fail))).await;
                    return;
                }
            }
        }
    }
}

/// Wait until the caller has taken every response sent so far, so the next
/// action is only claimed once it is wanted. `false` once the caller hung up.
async fn drained<T>(tx: &mpsc::Sender<Result<T, Status>>) -> bool {
    tx.reserve_many(tx.max_capacity()).await.is_ok()
}

#[async_trait]
impl DataService for ScriptedServer {
    async fn read_rows(
        &self,
        ctx: CallContext,
        request: ReadRowsRequest,
    ) -> Result<ResponseStream<ReadRowsResponse>, Status> {
        let inner = &self.inner;
        inner
            .read_log
            .record(request, ctx.metadata.clone())
            .map_err(|e| inner.latch(e))?;
        let script = inner.reads.open_call(&ctx).map_err(|e| inner.latch(e))?;

        let (tx, stream) = ResponseStream::channel(inner.config.response_buffer);
        self.spawn_call(Arc::clone(inner).play_read(ctx, script, tx));
        Ok(stream)
    }

    async fn mutate_rows(
        &self,
        ctx: CallContext,
        request: MutateRowsRequest,
    ) -> Result<ResponseStream<MutateRowsResponse>, Status> {
        let inner = &self.inner;
        inner
            .write_log
            .record(request, ctx.metadata.clone())
            .map_err(|e| inner.latch(e))?;
        let script = inner.writes.open_call(&ctx).map_err(|e| inner.latch(e))?;

        let (tx, stream) = ResponseStream::channel(inner.config.response_buffer);
        self.spawn_call(Arc::clone(inner).play_write(ctx, script, tx));
        Ok(stream)
    }
}

/// Builder for [`ScriptedServer`]
///
/// # Examples
///
/// ```rust
/// use streamkv_testing_framework::emulator::{RowChunk, ScriptedAction, ScriptedServer, SequencePolicy};
///
/// let server = ScriptedServer::builder()
///     .read_rows(
///         SequencePolicy::Linear,
///         vec![ScriptedAction::chunks(vec![RowChunk::commit("row-01", "v1")])],
///     )
///     .with_recorder_capacity(2)
///     .build();
/// assert_eq!(server.read_rows_sequencer().len(), 1);
/// ```
pub struct ScriptedServerBuilder {
    config: EmulatorConfig,
    clock: Option<Arc<dyn Clock>>,
    read_policy: SequencePolicy,
    read_actions: Vec<ScriptedAction>,
    write_policy: SequencePolicy,
    write_actions: Vec<ScriptedAction>,
}

impl ScriptedServerBuilder {
    pub fn new() -> Self {
        Self {
            config: EmulatorConfig::default(),
            clock: None,
            read_policy: SequencePolicy::Linear,
            read_actions: Vec::new(),
            write_policy: SequencePolicy::Linear,
            write_actions: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EmulatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_recorder_capacity(mut self, capacity: usize) -> Self {
        self.config.recorder_capacity = capacity;
        self
    }

    pub fn with_routing_cookie_header(mut self, header: impl Into<String>) -> Self {
        self.config.routing_cookie_header = header.into();
        self
    }

    pub fn with_max_call_age(mut self, age: Duration, grace: Duration) -> Self {
        self.config.max_call_age = Some(age);
        self.config.max_call_age_grace = grace;
        self
    }

    pub fn read_rows(mut self, policy: SequencePolicy, actions: Vec<ScriptedAction>) -> Self {
        self.read_policy = policy;
        self.read_actions = actions;
        self
    }

    pub fn mutate_rows(mut self, policy: SequencePolicy, actions: Vec<ScriptedAction>) -> Self {
        self.write_policy = policy;
        self.write_actions = actions;
        self
    }

    pub fn build(self) -> ScriptedServer {
        let clock = self.clock.unwrap_or_else(default_clock);
        let capacity = self.config.recorder_capacity;
        let inner = ServerInner {
            reads: Arc::new(ActionSequencer::new(
                Method::ReadRows,
                self.read_policy,
                self.read_actions,
            )),
            writes: Arc::new(ActionSequencer::new(
                Method::MutateRows,
                self.write_policy,
                self.write_actions,
            )),
            read_log: RequestRecorder::new(Method::ReadRows, capacity, Arc::clone(&clock)),
            write_log: RequestRecorder::new(Method::MutateRows, capacity, Arc::clone(&clock)),
            authoring_errors: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            config: self.config,
            clock,
        };
        ScriptedServer {
            inner: Arc::new(inner),
        }
    }
}

impl Default for ScriptedServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::model::{EntryOutcomes, RowChunk};
    use streamkv_common::metadata::{retry_delay_of, routing_cookies_of};
    use streamkv_common::{Code, MutationEntry};

    fn read() -> ReadRowsRequest {
        ReadRowsRequest::new("t")
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_emits_then_fails_with_hints() {
        let server = ScriptedServer::builder()
            .read_rows(
                SequencePolicy::Linear,
                vec![
                    ScriptedAction::chunks(vec![RowChunk::commit("row-01", "v1")]),
                    ScriptedAction::fail(Code::Unavailable)
                        .with_routing_cookie("test-cookie")
                        .with_retry_delay(Duration::from_secs(2)),
                ],
            )
            .build();

        let mut stream = server.read_rows(CallContext::default(), read()).await.unwrap();
        let first = stream.message().await.unwrap().unwrap();
        assert_eq!(first.chunks.len(), 1);
        assert!(first.chunks[0].commit_row);

        let err = stream.message().await.unwrap_err();
        assert_eq!(err.code, Code::Unavailable);
        assert_eq!(
            routing_cookies_of(&err.metadata).get(DEFAULT_ROUTING_COOKIE_HEADER),
            Some("test-cookie")
        );
        assert_eq!(retry_delay_of(&err), Some(Duration::from_secs(2)));
        assert_eq!(server.read_rows_recorder().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_linear_script_closes_cleanly() {
        let server = ScriptedServer::builder().build();
        let mut stream = server.read_rows(CallContext::default(), read()).await.unwrap();
        assert_eq!(stream.message().await.unwrap(), None);
        server.assert_script_sound();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_end_of_stream_stops_the_call() {
        let server = ScriptedServer::builder()
            .mutate_rows(
                SequencePolicy::Linear,
                vec![
                    ScriptedAction::entries(EntryOutcomes::new().succeeded([0])).end_of_stream(),
                    ScriptedAction::entries(EntryOutcomes::new().succeeded([0])),
                ],
            )
            .build();
        let request = MutateRowsRequest::new("t", vec![MutationEntry::set_cell("row-0", "v")]);

        let mut stream = server
            .mutate_rows(CallContext::default(), request)
            .await
            .unwrap();
        assert_eq!(stream.message().await.unwrap().unwrap().entries.len(), 1);
        assert_eq!(stream.message().await.unwrap(), None);
        assert_eq!(server.mutate_rows_sequencer().remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_without_outcomes_closes_cleanly() {
        for end_of_stream in [false, true] {
            let action = ScriptedAction::entries(EntryOutcomes::new());
            let action = if end_of_stream {
                action.end_of_stream()
            } else {
                action
            };
            let server = ScriptedServer::builder()
                .mutate_rows(SequencePolicy::Linear, vec![action])
                .build();
            let request = MutateRowsRequest::new("t", vec![MutationEntry::set_cell("row-0", "v")]);

            let mut stream = server
                .mutate_rows(CallContext::default(), request)
                .await
                .unwrap();
            assert_eq!(stream.message().await.unwrap(), None);
            assert_eq!(server.mutate_rows_sequencer().remaining(), 0);
            server.assert_script_sound();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_payload_is_latched() {
        let server = ScriptedServer::builder()
            .read_rows(
                SequencePolicy::Linear,
                vec![ScriptedAction::entries(EntryOutcomes::new().succeeded([0]))],
            )
            .build();
        let mut stream = server.read_rows(CallContext::default(), read()).await.unwrap();
        let err = stream.message().await.unwrap_err();
        assert_eq!(err.code, Code::Internal);
        assert!(is_authoring_error(&err));
        assert!(!is_authoring_error(&Status::internal("out of order")));
        assert_eq!(
            server.authoring_errors(),
            vec![HarnessError::ScriptMismatch {
                method: Method::ReadRows,
                index: 0
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "test script is broken")]
    async fn test_overflow_fails_call_and_script() {
        let server = ScriptedServer::builder().with_recorder_capacity(1).build();
        server.read_rows(CallContext::default(), read()).await.unwrap();
        let err = server
            .read_rows(CallContext::default(), read())
            .await
            .unwrap_err();
        assert_eq!(err.code, Code::Internal);
        server.assert_script_sound();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_cut_short_by_call_age() {
        let server = ScriptedServer::builder()
            .read_rows(
                SequencePolicy::Linear,
                vec![ScriptedAction::chunks(vec![RowChunk::commit("qbar", "v")])
                    .with_delay(Duration::from_secs(10))],
            )
            .with_max_call_age(Duration::from_secs(4), Duration::from_secs(1))
            .build();

        let start = Instant::now();
        let mut stream = server.read_rows(CallContext::default(), read()).await.unwrap();
        let err = stream.message().await.unwrap_err();
        assert_eq!(err.code, Code::Unavailable);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_up_ends_the_call_task() {
        let server = ScriptedServer::builder()
            .read_rows(
                SequencePolicy::Linear,
                vec![ScriptedAction::chunks(vec![RowChunk::commit("a", "v")])
                    .with_delay(Duration::from_secs(60))],
            )
            .build();
        let stream = server.read_rows(CallContext::default(), read()).await.unwrap();
        drop(stream);

        let start = Instant::now();
        server.wait_idle().await;
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
