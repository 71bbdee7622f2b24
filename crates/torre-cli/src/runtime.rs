// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use torre_app::{
    BulkOutcome, BulkRequest, FetchTicket, Trip, TripBackend, TripId, TripQuery, TripUpdate,
};
use torre_tui::{InternalEvent, TripRuntime};
use tracing::debug;

/// Runtime backed by a shared [`TripBackend`]. Fetches and bulk batches run
/// on worker threads and report back over the UI channel.
pub struct LiveRuntime<B> {
    backend: Arc<B>,
    projects: Vec<String>,
    settle_delay: Duration,
}

impl<B> LiveRuntime<B>
where
    B: TripBackend + Send + Sync + 'static,
{
    pub fn new(backend: B, projects: Vec<String>, settle_delay: Duration) -> Self {
        Self {
            backend: Arc::new(backend),
            projects,
            settle_delay,
        }
    }
}

/// Local wall clock, or UTC when the local offset cannot be determined.
fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

impl<B> TripRuntime for LiveRuntime<B>
where
    B: TripBackend + Send + Sync + 'static,
{
    fn now(&self) -> OffsetDateTime {
        local_now()
    }

    fn project_query(&self) -> Vec<String> {
        self.projects.clone()
    }

    fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    fn load_trips(&mut self, query: &TripQuery) -> Result<Vec<Trip>> {
        self.backend.list_trips(query)
    }

    fn load_trip_updates(&mut self, trip_id: TripId) -> Result<Vec<TripUpdate>> {
        self.backend.list_trip_updates(trip_id)
    }

    fn run_bulk(
        &mut self,
        request: &BulkRequest,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> BulkOutcome {
        torre_app::run_bulk(self.backend.as_ref(), request, on_progress)
    }

    fn spawn_load_trips(
        &mut self,
        ticket: FetchTicket,
        query: TripQuery,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        thread::Builder::new()
            .name("torre-fetch".to_owned())
            .spawn(move || {
                let result = backend
                    .list_trips(&query)
                    .map_err(|error| format!("{error:#}"));
                if tx.send(InternalEvent::TripsLoaded { ticket, result }).is_err() {
                    debug!(request = ticket.request_id, "view closed before fetch finished");
                }
            })
            .map_err(|error| anyhow!("spawn fetch worker: {error}"))?;
        Ok(())
    }

    fn spawn_bulk(&mut self, request: BulkRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        thread::Builder::new()
            .name("torre-bulk".to_owned())
            .spawn(move || {
                let token = request.token;
                let progress_tx = tx.clone();
                let outcome = torre_app::run_bulk(backend.as_ref(), &request, |completed, total| {
                    let _ = progress_tx.send(InternalEvent::BulkProgress {
                        token,
                        completed,
                        total,
                    });
                });
                if tx.send(InternalEvent::BulkFinished(outcome)).is_err() {
                    debug!(token, "view closed before bulk action finished");
                }
            })
            .map_err(|error| anyhow!("spawn bulk worker: {error}"))?;
        Ok(())
    }
}
