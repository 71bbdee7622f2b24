// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{NewTripUpdate, TripBackend, TripId, TripUpdate, UpdateCategory};

/// How long a completed bulk action stays on screen before returning to idle.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkKind {
    StatusUpdate(UpdateCategory),
    Delete,
}

impl BulkKind {
    pub const fn verb(self) -> &'static str {
        match self {
            Self::StatusUpdate(_) => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRequest {
    pub token: u64,
    pub kind: BulkKind,
    pub targets: Vec<TripId>,
    pub notes: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedItem {
    Updated(TripUpdate),
    Deleted(TripId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub kind: BulkKind,
    pub completed: usize,
    pub total: usize,
    /// 1-based position of the item that failed.
    pub failed_at: usize,
    pub trip_id: TripId,
    pub message: String,
}

impl BulkFailure {
    pub fn summary(&self) -> String {
        format!(
            "{} {}/{} failed for trip {}: {}; {} already applied, {} not attempted",
            self.kind.verb(),
            self.failed_at,
            self.total,
            self.trip_id,
            self.message,
            self.completed,
            self.total - self.failed_at,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub token: u64,
    pub kind: BulkKind,
    pub total: usize,
    pub applied: Vec<AppliedItem>,
    pub failure: Option<BulkFailure>,
}

/// Submits one item at a time in target order. The first failure stops the
/// batch; items already applied stay applied.
pub fn run_bulk<B: TripBackend + ?Sized>(
    backend: &B,
    request: &BulkRequest,
    mut on_progress: impl FnMut(usize, usize),
) -> BulkOutcome {
    let total = request.targets.len();
    let mut applied = Vec::with_capacity(total);

    for (index, trip_id) in request.targets.iter().copied().enumerate() {
        let result = match request.kind {
            BulkKind::StatusUpdate(category) => backend
                .create_trip_update(&NewTripUpdate {
                    trip_id,
                    category,
                    notes: request.notes.clone(),
                    image_url: request.image_url.clone(),
                })
                .map(AppliedItem::Updated),
            BulkKind::Delete => backend
                .delete_trip(trip_id)
                .map(|()| AppliedItem::Deleted(trip_id)),
        };

        match result {
            Ok(item) => {
                applied.push(item);
                debug!(token = request.token, done = applied.len(), total, "bulk item applied");
                on_progress(applied.len(), total);
            }
            Err(error) => {
                let failure = BulkFailure {
                    kind: request.kind,
                    completed: applied.len(),
                    total,
                    failed_at: index + 1,
                    trip_id,
                    message: format!("{error:#}"),
                };
                warn!(token = request.token, trip = %trip_id, "{}", failure.summary());
                return BulkOutcome {
                    token: request.token,
                    kind: request.kind,
                    total,
                    applied,
                    failure: Some(failure),
                };
            }
        }
    }

    info!(token = request.token, total, kind = request.kind.verb(), "bulk action completed");
    BulkOutcome {
        token: request.token,
        kind: request.kind,
        total,
        applied,
        failure: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BulkPhase {
    #[default]
    Idle,
    Submitting {
        kind: BulkKind,
        completed: usize,
        total: usize,
    },
    Completed {
        kind: BulkKind,
        total: usize,
    },
    Failed(BulkFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkState {
    phase: BulkPhase,
    token: u64,
}

impl BulkState {
    pub fn phase(&self) -> &BulkPhase {
        &self.phase
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.phase, BulkPhase::Submitting { .. })
    }

    pub fn begin(&mut self, kind: BulkKind, total: usize) -> Result<u64> {
        match self.phase {
            BulkPhase::Submitting { .. } => {
                bail!("a bulk {} is still running -- wait for it to finish", kind.verb())
            }
            BulkPhase::Failed(_) => {
                bail!("previous bulk action failed -- dismiss the error before starting another")
            }
            BulkPhase::Idle | BulkPhase::Completed { .. } => {}
        }
        if total == 0 {
            bail!("no trips selected -- select rows or open a trip and retry");
        }

        self.token = self.token.saturating_add(1);
        self.phase = BulkPhase::Submitting {
            kind,
            completed: 0,
            total,
        };
        Ok(self.token)
    }

    pub fn record_progress(&mut self, token: u64, completed: usize) -> bool {
        if token != self.token {
            return false;
        }
        match &mut self.phase {
            BulkPhase::Submitting {
                completed: current, ..
            } => {
                *current = completed;
                true
            }
            _ => false,
        }
    }

    pub fn finish(&mut self, outcome: &BulkOutcome) -> bool {
        if outcome.token != self.token || !self.is_submitting() {
            return false;
        }
        self.phase = match &outcome.failure {
            Some(failure) => BulkPhase::Failed(failure.clone()),
            None => BulkPhase::Completed {
                kind: outcome.kind,
                total: outcome.total,
            },
        };
        true
    }

    /// Returns a completed action to idle; failures stay until dismissed.
    pub fn settle(&mut self, token: u64) -> bool {
        if token != self.token || !matches!(self.phase, BulkPhase::Completed { .. }) {
            return false;
        }
        self.phase = BulkPhase::Idle;
        true
    }

    pub fn dismiss(&mut self) -> bool {
        if !matches!(self.phase, BulkPhase::Failed(_)) {
            return false;
        }
        self.phase = BulkPhase::Idle;
        true
    }

    pub fn progress_label(&self) -> Option<String> {
        match &self.phase {
            BulkPhase::Idle => None,
            BulkPhase::Submitting {
                kind,
                completed,
                total,
            } => Some(format!("{} {completed}/{total}", kind.verb())),
            BulkPhase::Completed { kind, total } => Some(format!("{} {total}/{total} done", kind.verb())),
            BulkPhase::Failed(failure) => Some(failure.summary()),
        }
    }
}
