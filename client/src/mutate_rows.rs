use crate::client::DataClient;
use crate::retry::{is_transient, Backoff, RoutingState};
use streamkv_common::proxy::{EntryResult, MutateRowsResult};
use streamkv_common::{CallContext, Code, MutateRowsRequest, Status};
use tokio::time::{self, Instant};

struct WriteState {
    original: MutateRowsRequest,
    /// Latest status per original entry, `None` until one is known
    statuses: Vec<Option<Status>>,
    /// Original indices still to be sent
    pending: Vec<usize>,
    backoff: Backoff,
    routing: RoutingState,
}

impl WriteState {
    fn failed_entries(&self) -> Vec<EntryResult> {
        self.statuses
            .iter()
            .enumerate()
            .filter_map(|(index, status)| match status {
                Some(status) if status.is_ok() => None,
                Some(status) => Some(EntryResult {
                    index,
                    status: status.clone(),
                }),
                None => Some(EntryResult {
                    index,
                    status: Status::internal("no status received for entry"),
                }),
            })
            .collect()
    }
}

pub(crate) async fn run(client: &DataClient, request: MutateRowsRequest) -> MutateRowsResult {
    let entry_count = request.entries.len();
    let mut state = WriteState {
        original: request,
        statuses: vec![None; entry_count],
        pending: (0..entry_count).collect(),
        backoff: Backoff::new(client.config().retry.clone()),
        routing: RoutingState::new(),
    };
    let deadline = client.config().timeout.map(|t| Instant::now() + t);

    let status = match deadline {
        Some(deadline) => {
            let attempts = mutate_with_retries(client, &mut state, Some(deadline));
            match time::timeout_at(deadline, attempts).await {
                Ok(status) => status,
                Err(_) => {
                    return MutateRowsResult {
                        status: Status::deadline_exceeded("mutate rows deadline exceeded"),
                        entries: Vec::new(),
                    }
                }
            }
        }
        None => mutate_with_retries(client, &mut state, None).await,
    };

    if status.code == Code::DeadlineExceeded && !state.pending.is_empty() {
        return MutateRowsResult {
            status,
            entries: Vec::new(),
        };
    }
    MutateRowsResult {
        status,
        entries: state.failed_entries(),
    }
}

/// Returns the overall status; per-entry outcomes land in `state.statuses`
async fn mutate_with_retries(
    client: &DataClient,
    state: &mut WriteState,
    deadline: Option<Instant>,
) -> Status {
    loop {
        if state.pending.is_empty() {
            return Status::ok();
        }
        let request = MutateRowsRequest {
            table_name: state.original.table_name.clone(),
            app_profile_id: state.original.app_profile_id.clone(),
            entries: state
                .pending
                .iter()
                .map(|&i| state.original.entries[i].clone())
                .collect(),
        };
        let mut metadata = client.call_metadata(&request.table_name, &request.app_profile_id);
        state.routing.apply(&mut metadata);
        state.backoff.record_attempt();

        let rpc_error = mutate_attempt(client, state, CallContext::new(metadata), request).await;

        let retry: Vec<usize> = state
            .pending
            .iter()
            .copied()
            .filter(|&i| {
                state.statuses[i]
                    .as_ref()
                    .is_some_and(|s| is_transient(s.code))
            })
            .collect();

        if let Some(status) = &rpc_error {
            state.routing.observe(status);
            if !is_transient(status.code) {
                state.pending.clear();
                return status.clone();
            }
        }
        state.pending = retry;
        if state.pending.is_empty() {
            return Status::ok();
        }
        if state.backoff.exhausted() {
            state.pending.clear();
            return rpc_error.unwrap_or_else(Status::ok);
        }

        let delay = state.backoff.next_delay(state.routing.retry_delay());
        if let Some(deadline) = deadline {
            if Instant::now() + delay > deadline {
                return Status::deadline_exceeded(format!(
                    "retry delay of {:?} exceeds the operation deadline",
                    delay
                ));
            }
        }
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "mutate attempt {} left {} entries to retry, next attempt in {:?}",
                state.backoff.attempts(),
                state.pending.len(),
                delay
            );
        }
        time::sleep(delay).await;
    }
}

/// One call. Entry statuses are stored against original indices; an RPC
/// level failure is returned and applied to every entry left without one.
async fn mutate_attempt(
    client: &DataClient,
    state: &mut WriteState,
    ctx: CallContext,
    request: MutateRowsRequest,
) -> Option<Status> {
    let sent = state.pending.clone();
    let mut answered = vec![false; sent.len()];

    let outcome = async {
        let mut stream = client.service().mutate_rows(ctx, request).await?;
        while let Some(response) = stream.message().await? {
            for entry in response.entries {
                let position = usize::try_from(entry.index)
                    .ok()
                    .filter(|&i| i < sent.len());
                let Some(position) = position else {
                    log::warn!("mutate response names unknown entry {}", entry.index);
                    continue;
                };
                answered[position] = true;
                state.statuses[sent[position]] = Some(entry.status);
            }
        }
        Ok::<(), Status>(())
    }
    .await;

    let fallback = match &outcome {
        Ok(()) => Status::internal("stream closed without a status for entry"),
        Err(status) => status.clone(),
    };
    for (position, &original) in sent.iter().enumerate() {
        if !answered[position] {
            state.statuses[original] = Some(fallback.clone());
        }
    }
    outcome.err()
}
