//! Concurrent fan-out of produce and consume requests.
//!
//! Every request of a batch runs as its own task on tokio's blocking pool.
//! The batch returns once all of them finished, with one outcome per request in
//! request order. A failing request never cancels its siblings.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::{Broker, Produced};
use crate::error::{Error, Result};
use crate::record::Event;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceRequest {
    pub producer: String,
    pub topic: String,
    pub event_key: String,
}

impl ProduceRequest {
    pub fn new(
        producer: impl Into<String>,
        topic: impl Into<String>,
        event_key: impl Into<String>,
    ) -> Self {
        Self {
            producer: producer.into(),
            topic: topic.into(),
            event_key: event_key.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub consumer: String,
    pub partition: String,
}

impl ConsumeRequest {
    pub fn new(consumer: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            partition: partition.into(),
        }
    }
}

/// Per-request outcomes of a parallel batch, in request order.
#[derive(Debug)]
pub struct BatchReport<T> {
    pub outcomes: Vec<Result<T>>,
}

impl<T> BatchReport<T> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }

    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().ok().map(|v| (i, v)))
    }

    /// Failed requests with their position in the batch.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &Error)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }
}

impl Broker {
    /// Runs one produce per request concurrently and waits for all of them.
    pub async fn parallel_produce(&self, requests: Vec<ProduceRequest>) -> BatchReport<Produced> {
        let report = self
            .dispatch(requests, |broker, req| {
                broker.produce(&req.producer, &req.topic, &req.event_key, None)
            })
            .await;
        info!(
            requests = report.len(),
            failures = report.failures().count(),
            "parallel produce finished",
        );

        report
    }

    /// Runs one single-event consume per request concurrently and waits for
    /// all of them.
    pub async fn parallel_consume(&self, requests: Vec<ConsumeRequest>) -> BatchReport<Event> {
        let report = self
            .dispatch(requests, |broker, req| {
                broker
                    .consume(&req.consumer, &req.partition, 1)
                    .and_then(|events| {
                        events
                            .into_iter()
                            .next()
                            .ok_or_else(|| Error::Task("consume returned no event".to_string()))
                    })
            })
            .await;
        info!(
            requests = report.len(),
            failures = report.failures().count(),
            "parallel consume finished",
        );

        report
    }

    async fn dispatch<R, T, F>(&self, requests: Vec<R>, f: F) -> BatchReport<T>
    where
        R: Send + 'static,
        T: Send + 'static,
        F: Fn(&Broker, R) -> Result<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let permit = match &self.inner.parallelism {
                Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        handles.push(Err(Error::Task(e.to_string())));
                        continue;
                    }
                },
                None => None,
            };

            let broker = self.clone();
            let f = Arc::clone(&f);
            handles.push(Ok(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                (*f)(&broker, request)
            })));
        }

        let outcomes = join_all(handles.into_iter().map(|handle| async move {
            match handle {
                Ok(handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(%e, "batch task failed");
                        Err(Error::Task(e.to_string()))
                    }
                },
                Err(e) => Err(e),
            }
        }))
        .await;

        BatchReport { outcomes }
    }
}
