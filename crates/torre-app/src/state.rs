// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::BTreeSet;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    AppliedItem, Bucket, BulkKind, BulkOutcome, BulkRequest, BulkState, DashboardCounts,
    DeleteConfirmation, FilterConfig, FilterScope, RankedRow, SelectionState, StatusFilter, Trip,
    TripId, TripScope, TripUpdate, UpdateCategory, filter_trip_indices, rank_trips,
    resolve_targets,
};

/// Identifies one trips-list request so late responses can be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub request_id: u64,
    pub scope: TripScope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripListState {
    pub scope: TripScope,
    pub filter_scope: FilterScope,
    pub filter: FilterConfig,
    pub selection: SelectionState,
    pub bulk: BulkState,
    pub opened: Option<TripId>,
    pub status_line: Option<String>,
    trips: Vec<Trip>,
    visible: Vec<usize>,
    rows: Vec<RankedRow>,
    now: OffsetDateTime,
    next_request_id: u64,
    pending_request: Option<u64>,
    fetch_cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListCommand {
    SetQuery(String),
    SetStatusFilter(StatusFilter),
    CycleStatusFilter,
    ToggleProject(String),
    ClearProjects,
    ClearFilter,
    SetScope(TripScope),
    Tick(OffsetDateTime),
    ToggleRow { index: usize, shift: bool },
    SelectAll(bool),
    ClearSelection,
    OpenTrip(TripId),
    CloseTrip,
    Navigate,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    RowsChanged(usize),
    SelectionChanged(usize),
    ScopeChanged(TripScope),
    FilterReset,
    TripOpened(TripId),
    TripClosed,
    StatusUpdated(String),
    StatusCleared,
}

impl TripListState {
    pub fn new(scope: TripScope, filter_scope: FilterScope, now: OffsetDateTime) -> Self {
        Self {
            scope,
            filter_scope,
            filter: FilterConfig::default(),
            selection: SelectionState::default(),
            bulk: BulkState::default(),
            opened: None,
            status_line: None,
            trips: Vec::new(),
            visible: Vec::new(),
            rows: Vec::new(),
            now,
            next_request_id: 0,
            pending_request: None,
            fetch_cancelled: false,
        }
    }

    pub fn dispatch(&mut self, command: ListCommand) -> Vec<ListEvent> {
        match command {
            ListCommand::SetQuery(query) => {
                self.filter.query = query;
                self.refilter()
            }
            ListCommand::SetStatusFilter(status) => {
                self.filter.status = status;
                self.refilter()
            }
            ListCommand::CycleStatusFilter => {
                self.filter.status = self.filter.status.next();
                let label = format!("status: {}", self.filter.status.label());
                let mut events = self.refilter();
                events.push(self.set_status(label));
                events
            }
            ListCommand::ToggleProject(project) => {
                self.filter.toggle_project(&project);
                self.refilter()
            }
            ListCommand::ClearProjects => {
                self.filter.projects.clear();
                self.refilter()
            }
            ListCommand::ClearFilter => {
                self.filter = FilterConfig::default();
                let mut events = self.refilter();
                events.push(ListEvent::FilterReset);
                events
            }
            ListCommand::SetScope(scope) => {
                if scope == self.scope {
                    return Vec::new();
                }
                self.scope = scope;
                self.pending_request = None;
                self.selection.clear();
                let label = format!("showing {}", scope.label());
                vec![ListEvent::ScopeChanged(scope), self.set_status(label)]
            }
            ListCommand::Tick(now) => {
                self.now = now;
                self.rerank();
                Vec::new()
            }
            ListCommand::ToggleRow { index, shift } => {
                let rows = self.row_ids();
                let Some(trip_id) = rows.get(index).copied() else {
                    return Vec::new();
                };
                let checked = !self.selection.is_selected(trip_id);
                self.selection.toggle(&rows, index, checked, shift);
                vec![ListEvent::SelectionChanged(self.selection.len())]
            }
            ListCommand::SelectAll(checked) => {
                let rows = self.row_ids();
                self.selection.select_all(&rows, checked);
                vec![ListEvent::SelectionChanged(self.selection.len())]
            }
            ListCommand::ClearSelection => {
                self.selection.clear();
                vec![ListEvent::SelectionChanged(0)]
            }
            ListCommand::OpenTrip(trip_id) => {
                if self.trip(trip_id).is_none() {
                    return Vec::new();
                }
                self.opened = Some(trip_id);
                vec![ListEvent::TripOpened(trip_id)]
            }
            ListCommand::CloseTrip => {
                if self.opened.take().is_none() {
                    return Vec::new();
                }
                vec![ListEvent::TripClosed]
            }
            ListCommand::Navigate => self.navigate(),
            ListCommand::SetStatus(message) => vec![self.set_status(message)],
            ListCommand::ClearStatus => {
                self.status_line = None;
                vec![ListEvent::StatusCleared]
            }
        }
    }

    /// Starts a trips-list request; only the newest ticket is applied.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.next_request_id = self.next_request_id.saturating_add(1);
        self.pending_request = Some(self.next_request_id);
        self.fetch_cancelled = false;
        FetchTicket {
            request_id: self.next_request_id,
            scope: self.scope,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.pending_request.is_some()
    }

    /// True when navigation dropped an in-flight trips request that no newer
    /// request has replaced. The list must be reloaded on return.
    pub fn fetch_cancelled(&self) -> bool {
        self.fetch_cancelled
    }

    /// Applies a trips-list response. Returns false when the response was
    /// superseded by a newer request, a scope change, or navigation.
    pub fn apply_fetch(&mut self, ticket: FetchTicket, result: Result<Vec<Trip>>) -> bool {
        if self.pending_request != Some(ticket.request_id) || ticket.scope != self.scope {
            debug!(request_id = ticket.request_id, "discarding superseded trips response");
            return false;
        }
        self.pending_request = None;

        match result {
            Ok(mut trips) => {
                for trip in &mut trips {
                    trip.sort_updates();
                }
                debug!(request_id = ticket.request_id, count = trips.len(), "trips loaded");
                self.trips = trips;
                self.selection.clear();
                if self.opened.is_some_and(|opened| self.trip(opened).is_none()) {
                    self.opened = None;
                }
                self.refilter();
            }
            Err(error) => {
                warn!(request_id = ticket.request_id, "trips fetch failed: {error:#}");
                self.set_status(format!("load failed: {error:#}"));
            }
        }
        true
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    pub fn trip(&self, trip_id: TripId) -> Option<&Trip> {
        self.trips.iter().find(|trip| trip.id == trip_id)
    }

    pub fn rows(&self) -> &[RankedRow] {
        &self.rows
    }

    pub fn row_ids(&self) -> Vec<TripId> {
        self.rows.iter().map(|row| row.trip_id).collect()
    }

    pub fn row(&self, index: usize) -> Option<(&RankedRow, &Trip)> {
        let row = self.rows.get(index)?;
        let trip = self.trip(row.trip_id)?;
        Some((row, trip))
    }

    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    /// Distinct non-empty projects across the loaded trips.
    pub fn known_projects(&self) -> Vec<String> {
        self.trips
            .iter()
            .map(|trip| trip.project.trim())
            .filter(|project| !project.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    pub fn dashboard_counts(&self) -> DashboardCounts {
        let mut counts = DashboardCounts {
            total: self.rows.len(),
            ..DashboardCounts::default()
        };
        let mut by_category: Vec<(UpdateCategory, usize)> =
            UpdateCategory::ALL.into_iter().map(|c| (c, 0)).collect();

        for row in &self.rows {
            match row.bucket {
                Bucket::Overdue => counts.overdue += 1,
                Bucket::Recent => counts.recent += 1,
            }
            if row.staleness.is_never() {
                counts.never_updated += 1;
            }
            match self.trip(row.trip_id).and_then(Trip::latest_category) {
                Some(category) => {
                    if let Some(entry) = by_category.iter_mut().find(|(c, _)| *c == category) {
                        entry.1 += 1;
                    }
                }
                None => counts.without_updates += 1,
            }
        }
        counts.by_category = by_category;
        counts
    }

    /// Optimistically prepends an update the backend just created.
    pub fn apply_created_update(&mut self, update: TripUpdate) -> bool {
        let Some(trip) = self.trips.iter_mut().find(|trip| trip.id == update.trip_id) else {
            return false;
        };
        if !trip.insert_update(update) {
            return false;
        }
        self.refilter();
        true
    }

    /// Swaps in a freshly fetched update history for one trip.
    pub fn replace_updates(&mut self, trip_id: TripId, updates: Vec<TripUpdate>) -> bool {
        let Some(trip) = self.trips.iter_mut().find(|trip| trip.id == trip_id) else {
            return false;
        };
        trip.updates = updates;
        trip.sort_updates();
        self.refilter();
        true
    }

    /// Drops trips locally after the backend confirmed their deletion.
    pub fn remove_trips(&mut self, trip_ids: &[TripId]) -> usize {
        let before = self.trips.len();
        self.trips.retain(|trip| !trip_ids.contains(&trip.id));
        self.selection.retain(|trip_id| !trip_ids.contains(&trip_id));
        if self.opened.is_some_and(|opened| trip_ids.contains(&opened)) {
            self.opened = None;
        }
        self.refilter();
        before - self.trips.len()
    }

    pub fn bulk_targets(&self) -> Vec<TripId> {
        resolve_targets(&self.selection, self.opened)
    }

    pub fn delete_confirmation(&self) -> Option<DeleteConfirmation> {
        let targets = self.bulk_targets();
        (!targets.is_empty()).then_some(DeleteConfirmation { targets })
    }

    pub fn begin_bulk(
        &mut self,
        kind: BulkKind,
        notes: String,
        image_url: Option<String>,
    ) -> Result<BulkRequest> {
        let targets = self.bulk_targets();
        let token = self.bulk.begin(kind, targets.len())?;
        debug!(token, count = targets.len(), kind = kind.verb(), "bulk action started");
        Ok(BulkRequest {
            token,
            kind,
            targets,
            notes,
            image_url,
        })
    }

    pub fn bulk_progress(&mut self, token: u64, completed: usize) -> bool {
        self.bulk.record_progress(token, completed)
    }

    /// Folds a finished batch into the store. Applied items are kept even
    /// when the batch stopped early.
    pub fn finish_bulk(&mut self, outcome: BulkOutcome) -> Vec<ListEvent> {
        if !self.bulk.finish(&outcome) {
            return Vec::new();
        }

        let mut deleted = Vec::new();
        for item in outcome.applied {
            match item {
                AppliedItem::Updated(update) => {
                    if let Some(trip) = self.trips.iter_mut().find(|t| t.id == update.trip_id) {
                        trip.insert_update(update);
                    }
                }
                AppliedItem::Deleted(trip_id) => deleted.push(trip_id),
            }
        }
        if !deleted.is_empty() {
            self.remove_trips(&deleted);
        }

        let message = match &outcome.failure {
            None => {
                self.selection.clear();
                match (outcome.kind, outcome.total) {
                    (BulkKind::Delete, 1) => "deleted 1 trip".to_owned(),
                    (BulkKind::Delete, total) => format!("deleted {total} trips"),
                    (BulkKind::StatusUpdate(category), 1) => {
                        format!("recorded {} on 1 trip", category.label())
                    }
                    (BulkKind::StatusUpdate(category), total) => {
                        format!("recorded {} on {total} trips", category.label())
                    }
                }
            }
            Some(failure) => failure.summary(),
        };
        self.refilter();
        vec![
            ListEvent::RowsChanged(self.rows.len()),
            self.set_status(message),
        ]
    }

    fn navigate(&mut self) -> Vec<ListEvent> {
        if self.pending_request.take().is_some() {
            self.fetch_cancelled = true;
        }
        self.selection.clear();
        self.opened = None;
        let mut events = vec![ListEvent::SelectionChanged(0)];
        if self.filter_scope == FilterScope::View && self.filter.is_active() {
            self.filter = FilterConfig::default();
            events.extend(self.refilter());
            events.push(ListEvent::FilterReset);
        }
        events
    }

    fn refilter(&mut self) -> Vec<ListEvent> {
        self.visible = filter_trip_indices(&self.trips, &self.filter);
        self.rerank();
        vec![ListEvent::RowsChanged(self.rows.len())]
    }

    fn rerank(&mut self) {
        let trips = &self.trips;
        self.rows = rank_trips(self.visible.iter().filter_map(|index| trips.get(*index)), self.now);
    }

    fn set_status(&mut self, message: impl Into<String>) -> ListEvent {
        let message = message.into();
        self.status_line = Some(message.clone());
        ListEvent::StatusUpdated(message)
    }
}
