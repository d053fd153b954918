// File: testing-framework/src/emulator/recorder.rs
//
// Request Recorder
//
// Bounded, arrival-ordered log of inbound calls. Recording never blocks the
// call path: a full queue is reported as an authoring error instead.

use crate::error::{HarnessError, Method};
use crate::orchestrator::Clock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamkv_common::{MetadataMap, MutateRowsRequest, ReadRowsRequest};
use tokio::sync::Notify;
use tokio::time::Instant;

/// One inbound call as the server saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord<R> {
    pub request: R,
    /// Taken from the injected clock when the call arrived
    pub received_at: Instant,
    pub metadata: MetadataMap,
}

pub type ReadRowsRecord = RequestRecord<ReadRowsRequest>;
pub type MutateRowsRecord = RequestRecord<MutateRowsRequest>;

pub struct RequestRecorder<R> {
    method: Method,
    capacity: usize,
    clock: Arc<dyn Clock>,
    queue: Mutex<VecDeque<RequestRecord<R>>>,
    total: AtomicUsize,
    arrivals: Notify,
}

impl<R: Clone> RequestRecorder<R> {
    pub fn new(method: Method, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            method,
            capacity,
            clock,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            total: AtomicUsize::new(0),
            arrivals: Notify::new(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a call. Fails when `capacity` records are already queued.
    pub fn record(&self, request: R, metadata: MetadataMap) -> Result<(), HarnessError> {
        let received_at = self.clock.now();
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                return Err(HarnessError::RecorderOverflow {
                    method: self.method,
                    capacity: self.capacity,
                });
            }
            queue.push_back(RequestRecord {
                request,
                received_at,
                metadata,
            });
        }
        self.total.fetch_add(1, Ordering::SeqCst);
        self.arrivals.notify_waiters();
        Ok(())
    }

    /// Records currently queued
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Calls recorded since creation, including ones already popped
    pub fn total_recorded(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Oldest queued record
    pub fn pop(&self) -> Option<RequestRecord<R>> {
        self.queue.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<RequestRecord<R>> {
        self.queue.lock().drain(..).collect()
    }

    /// Copy of the queue, leaving it untouched
    pub fn snapshot(&self) -> Vec<RequestRecord<R>> {
        self.queue.lock().iter().cloned().collect()
    }

    /// Pop the oldest record, waiting up to `timeout` for one to arrive
    pub async fn next_within(&self, timeout: Duration) -> Option<RequestRecord<R>> {
        let expiry = self.clock.sleep(timeout);
        tokio::pin!(expiry);
        loop {
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(record) = self.pop() {
                return Some(record);
            }
            tokio::select! {
                _ = &mut arrival => {}
                _ = &mut expiry => return self.pop(),
            }
        }
    }
}

impl<R> std::fmt::Debug for RequestRecorder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRecorder")
            .field("method", &self.method)
            .field("capacity", &self.capacity)
            .field("queued", &self.queue.lock().len())
            .finish()
    }
}
