// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::OffsetDateTime;

use crate::{EMPTY_DISPLAY, Trip, TripId};

/// Trips untouched for at least this long are overdue.
pub const OVERDUE_THRESHOLD_MINUTES: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Overdue,
    Recent,
}

impl Bucket {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::Recent => "recent",
        }
    }
}

/// Elapsed time since a trip's last activity. `None` means the trip carries
/// no usable timestamp and is ranked as the most stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staleness {
    pub elapsed_seconds: Option<i64>,
}

impl Staleness {
    pub fn measure(trip: &Trip, now: OffsetDateTime) -> Self {
        Self {
            elapsed_seconds: trip.last_activity_at().map(|at| elapsed_seconds(at, now)),
        }
    }

    pub fn elapsed_minutes(self) -> Option<f64> {
        self.elapsed_seconds.map(|seconds| seconds as f64 / 60.0)
    }

    pub fn bucket(self) -> Bucket {
        match self.elapsed_minutes() {
            Some(minutes) if minutes < OVERDUE_THRESHOLD_MINUTES => Bucket::Recent,
            _ => Bucket::Overdue,
        }
    }

    pub fn is_never(self) -> bool {
        self.elapsed_seconds.is_none()
    }

    /// `H:MM` counter; future timestamps show as `0:00`.
    pub fn display(self) -> String {
        let Some(seconds) = self.elapsed_seconds else {
            return EMPTY_DISPLAY.to_owned();
        };
        let seconds = seconds.max(0);
        format!("{}:{:02}", seconds / 3600, (seconds % 3600) / 60)
    }

    fn rank_key(self) -> i64 {
        self.elapsed_seconds.unwrap_or(i64::MAX)
    }
}

/// Whole seconds from `at` to `now`, floored.
pub fn elapsed_seconds(at: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let millis = (now - at).whole_milliseconds();
    i64::try_from(millis.div_euclid(1000)).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedRow {
    pub trip_id: TripId,
    pub staleness: Staleness,
    pub bucket: Bucket,
}

/// Overdue trips first, then recent ones; each bucket most stale first.
/// Ties keep input order.
pub fn rank_trips<'a, I>(trips: I, now: OffsetDateTime) -> Vec<RankedRow>
where
    I: IntoIterator<Item = &'a Trip>,
{
    let mut overdue = Vec::new();
    let mut recent = Vec::new();
    for trip in trips {
        let staleness = Staleness::measure(trip, now);
        let bucket = staleness.bucket();
        let row = RankedRow {
            trip_id: trip.id,
            staleness,
            bucket,
        };
        match bucket {
            Bucket::Overdue => overdue.push(row),
            Bucket::Recent => recent.push(row),
        }
    }

    overdue.sort_by_key(|row| std::cmp::Reverse(row.staleness.rank_key()));
    recent.sort_by_key(|row| std::cmp::Reverse(row.staleness.rank_key()));
    overdue.extend(recent);
    overdue
}
