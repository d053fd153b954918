use crate::client::DataClient;
use crate::merger::RowMerger;
use crate::resume::resume_request;
use crate::retry::{is_transient, Backoff, RoutingState};
use streamkv_common::proxy::RowsResult;
use streamkv_common::{CallContext, ReadRowsRequest, Row, Status};
use tokio::time::{self, Instant};

struct ReadState {
    original: ReadRowsRequest,
    merger: RowMerger,
    rows: Vec<Row>,
    backoff: Backoff,
    routing: RoutingState,
}

impl ReadState {
    fn limit_reached(&self) -> bool {
        self.original.rows_limit > 0 && self.rows.len() as i64 >= self.original.rows_limit
    }
}

pub(crate) async fn run(client: &DataClient, request: ReadRowsRequest) -> RowsResult {
    let mut state = ReadState {
        merger: RowMerger::new(request.reversed),
        original: request,
        rows: Vec::new(),
        backoff: Backoff::new(client.config().retry.clone()),
        routing: RoutingState::new(),
    };
    let deadline = client.config().timeout.map(|t| Instant::now() + t);

    let status = match deadline {
        Some(deadline) => {
            let attempts = read_with_retries(client, &mut state, Some(deadline));
            match time::timeout_at(deadline, attempts).await {
                Ok(status) => status,
                Err(_) => Status::deadline_exceeded("read rows deadline exceeded"),
            }
        }
        None => read_with_retries(client, &mut state, None).await,
    };

    RowsResult {
        status,
        rows: state.rows,
    }
}

async fn read_with_retries(
    client: &DataClient,
    state: &mut ReadState,
    deadline: Option<Instant>,
) -> Status {
    loop {
        let Some(request) = resume_request(
            &state.original,
            state.merger.last_key(),
            state.rows.len() as i64,
        ) else {
            return Status::ok();
        };

        let mut metadata = client.call_metadata(&request.table_name, &request.app_profile_id);
        state.routing.apply(&mut metadata);
        state.backoff.record_attempt();

        let status = match read_attempt(client, state, CallContext::new(metadata), request).await {
            Ok(()) => return Status::ok(),
            Err(status) => status,
        };
        state.merger.discard_partial();

        if !is_transient(status.code) || state.backoff.exhausted() {
            return status;
        }
        state.routing.observe(&status);

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
                "read attempt {} failed with {}, retrying in {:?}",
                state.backoff.attempts(),
                status,
                delay
            );
        }
        time::sleep(delay).await;
    }
}

/// One call. Ends `Ok` on a clean close or once the row limit is met.
async fn read_attempt(
    client: &DataClient,
    state: &mut ReadState,
    ctx: CallContext,
    request: ReadRowsRequest,
) -> Result<(), Status> {
    let mut stream = client.service().read_rows(ctx, request).await?;
    while let Some(response) = stream.message().await? {
        for row in state.merger.push(response)? {
            state.rows.push(row);
            if state.limit_reached() {
                return Ok(());
            }
        }
    }
    state.merger.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;
    use streamkv_common::metadata::attach_retry_info;
    use streamkv_common::{
        CellChunk, Code, DataService, MutateRowsRequest, MutateRowsResponse, ReadRowsResponse,
        ResponseStream,
    };

    type Attempt = (Vec<ReadRowsResponse>, Option<Status>);

    /// Replays one canned attempt per call and keeps the requests it saw
    struct CannedService {
        attempts: Mutex<VecDeque<Attempt>>,
        seen: Mutex<Vec<(ReadRowsRequest, Instant)>>,
    }

    impl CannedService {
        fn new(attempts: Vec<Attempt>) -> Arc<Self> {
            Arc::new(Self {
                attempts: Mutex::new(attempts.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DataService for CannedService {
        async fn read_rows(
            &self,
            _ctx: CallContext,
            request: ReadRowsRequest,
        ) -> Result<ResponseStream<ReadRowsResponse>, Status> {
            self.seen.lock().push((request, Instant::now()));
            let (responses, error) = self.attempts.lock().pop_front().unwrap_or_default();
            let (tx, stream) = ResponseStream::channel(responses.len() + 1);
            for response in responses {
                tx.try_send(Ok(response)).unwrap();
            }
            if let Some(status) = error {
                tx.try_send(Err(status)).unwrap();
            }
            Ok(stream)
        }

        async fn mutate_rows(
            &self,
            _ctx: CallContext,
            _request: MutateRowsRequest,
        ) -> Result<ResponseStream<MutateRowsResponse>, Status> {
            Err(Status::new(Code::Unimplemented, "reads only"))
        }
    }

    fn committed(key: &str) -> ReadRowsResponse {
        ReadRowsResponse {
            chunks: vec![CellChunk {
                row_key: key.as_bytes().to_vec(),
                family_name: Some("f".to_string()),
                qualifier: Some(b"col".to_vec()),
                value: b"v".to_vec(),
                commit_row: true,
                ..Default::default()
            }],
            last_scanned_row_key: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_after_transient_error() {
        let service = CannedService::new(vec![
            (vec![committed("row-01")], Some(Status::aborted("paused"))),
            (vec![committed("row-05")], None),
        ]);
        let client = DataClient::new(service.clone(), ClientConfig::default());

        let result = client.read_rows(ReadRowsRequest::new("t")).await;
        assert!(result.status.is_ok(), "{}", result.status);
        let keys: Vec<_> = result.rows.iter().map(Row::key_str).collect();
        assert_eq!(keys, vec!["row-01", "row-05"]);
        assert_eq!(service.seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_returned() {
        let service = CannedService::new(vec![(
            vec![committed("a")],
            Some(Status::permission_denied("no")),
        )]);
        let client = DataClient::new(service.clone(), ClientConfig::default());

        let result = client.read_rows(ReadRowsRequest::new("t")).await;
        assert_eq!(result.status.code, Code::PermissionDenied);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(service.seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_delay_beyond_deadline_gives_up() {
        let mut slow_down = Status::unavailable("busy");
        attach_retry_info(&mut slow_down, Duration::from_secs(6));
        let service = CannedService::new(vec![(vec![], Some(slow_down))]);
        let config = ClientConfig::default().with_timeout(Duration::from_secs(3));
        let client = DataClient::new(service.clone(), config);

        let started = Instant::now();
        let result = client.read_rows(ReadRowsRequest::new("t")).await;
        assert_eq!(result.status.code, Code::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(service.seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_client_rejects_without_calling() {
        let service = CannedService::new(vec![]);
        let client = DataClient::new(service.clone(), ClientConfig::default());
        client.close();

        let result = client.read_rows(ReadRowsRequest::new("t")).await;
        assert_eq!(result.status.code, Code::Unavailable);
        assert!(result.status.message.contains("client closed"));
        assert!(service.seen.lock().is_empty());
    }
}
