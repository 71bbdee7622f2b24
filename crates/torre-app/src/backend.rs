// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use time::Date;

use crate::{NewTrip, NewTripUpdate, Trip, TripId, TripScope, TripUpdate};

/// Parameters of the trips-list request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TripQuery {
    pub date: Option<Date>,
    pub projects: Vec<String>,
}

impl TripQuery {
    pub fn for_scope(scope: TripScope, today: Date, projects: &[String]) -> Self {
        Self {
            date: match scope {
                TripScope::Today => Some(today),
                TripScope::All => None,
            },
            projects: projects.to_vec(),
        }
    }
}

/// Remote system that persists trips and their updates.
pub trait TripBackend {
    fn list_trips(&self, query: &TripQuery) -> Result<Vec<Trip>>;
    fn list_trip_updates(&self, trip_id: TripId) -> Result<Vec<TripUpdate>>;
    fn create_trip_update(&self, update: &NewTripUpdate) -> Result<TripUpdate>;
    fn create_trips(&self, trips: &[NewTrip]) -> Result<Vec<Trip>>;
    fn delete_trip(&self, trip_id: TripId) -> Result<()>;
}

impl<T: TripBackend + ?Sized> TripBackend for &T {
    fn list_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        (**self).list_trips(query)
    }

    fn list_trip_updates(&self, trip_id: TripId) -> Result<Vec<TripUpdate>> {
        (**self).list_trip_updates(trip_id)
    }

    fn create_trip_update(&self, update: &NewTripUpdate) -> Result<TripUpdate> {
        (**self).create_trip_update(update)
    }

    fn create_trips(&self, trips: &[NewTrip]) -> Result<Vec<Trip>> {
        (**self).create_trips(trips)
    }

    fn delete_trip(&self, trip_id: TripId) -> Result<()> {
        (**self).delete_trip(trip_id)
    }
}
