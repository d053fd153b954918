use crate::data::{MutateRowsRequest, MutateRowsResponse, ReadRowsRequest, ReadRowsResponse};
use crate::metadata::MetadataMap;
use crate::status::Status;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Per-call request metadata
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub metadata: MetadataMap,
}

impl CallContext {
    pub fn new(metadata: MetadataMap) -> Self {
        Self { metadata }
    }
}

/// Server-streamed responses of one call.
///
/// The stream ends cleanly when the sender is dropped, or with an `Err`
/// item carrying the terminal status (and its trailers in `Status::metadata`).
/// Dropping the receiver cancels the call on the server side.
#[derive(Debug)]
pub struct ResponseStream<T> {
    rx: mpsc::Receiver<Result<T, Status>>,
}

impl<T> ResponseStream<T> {
    /// Bounded channel; the sender half belongs to the server
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<T, Status>>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Stream that fails immediately with `status`
    pub fn failed(status: Status) -> Self {
        let (tx, stream) = Self::channel(1);
        // Capacity 1 and nothing queued yet
        let _ = tx.try_send(Err(status));
        stream
    }

    /// Next message, `Ok(None)` on clean end of stream
    pub async fn message(&mut self) -> Result<Option<T>, Status> {
        match self.rx.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(status)) => Err(status),
            None => Ok(None),
        }
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = Result<T, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The two streaming data-plane calls
#[async_trait]
pub trait DataService: Send + Sync {
    async fn read_rows(
        &self,
        ctx: CallContext,
        request: ReadRowsRequest,
    ) -> Result<ResponseStream<ReadRowsResponse>, Status>;

    async fn mutate_rows(
        &self,
        ctx: CallContext,
        request: MutateRowsRequest,
    ) -> Result<ResponseStream<MutateRowsResponse>, Status>;
}
