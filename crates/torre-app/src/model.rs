// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Date, OffsetDateTime};

use crate::ids::*;

/// Placeholder shown for absent optional values.
pub const EMPTY_DISPLAY: &str = "—";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    InTransit,
    Delayed,
    Delivered,
    Cancelled,
}

impl TripStatus {
    pub const ALL: [Self; 5] = [
        Self::Scheduled,
        Self::InTransit,
        Self::Delayed,
        Self::Delivered,
        Self::Cancelled,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::InTransit => "IN_TRANSIT",
            Self::Delayed => "DELAYED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SCHEDULED" => Some(Self::Scheduled),
            "IN_TRANSIT" => Some(Self::InTransit),
            "DELAYED" => Some(Self::Delayed),
            "DELIVERED" => Some(Self::Delivered),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InTransit => "in transit",
            Self::Delayed => "delayed",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Operational event recorded against a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCategory {
    RouteStart,
    TrackingCheckpoint,
    Loaded,
    Accident,
    Breakdown,
    Theft,
    LostContact,
    TripFinished,
}

impl UpdateCategory {
    pub const ALL: [Self; 8] = [
        Self::RouteStart,
        Self::TrackingCheckpoint,
        Self::Loaded,
        Self::Accident,
        Self::Breakdown,
        Self::Theft,
        Self::LostContact,
        Self::TripFinished,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RouteStart => "route_start",
            Self::TrackingCheckpoint => "tracking_checkpoint",
            Self::Loaded => "loaded",
            Self::Accident => "accident",
            Self::Breakdown => "breakdown",
            Self::Theft => "theft",
            Self::LostContact => "lost_contact",
            Self::TripFinished => "trip_finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "route_start" => Some(Self::RouteStart),
            "tracking_checkpoint" => Some(Self::TrackingCheckpoint),
            "loaded" => Some(Self::Loaded),
            "accident" => Some(Self::Accident),
            "breakdown" => Some(Self::Breakdown),
            "theft" => Some(Self::Theft),
            "lost_contact" => Some(Self::LostContact),
            "trip_finished" => Some(Self::TripFinished),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::RouteStart => "Route start",
            Self::TrackingCheckpoint => "Tracking checkpoint",
            Self::Loaded => "Loaded",
            Self::Accident => "Accident",
            Self::Breakdown => "Breakdown",
            Self::Theft => "Theft",
            Self::LostContact => "Lost contact",
            Self::TripFinished => "Trip finished",
        }
    }

    /// Incident categories are highlighted in the console.
    pub const fn is_incident(self) -> bool {
        matches!(
            self,
            Self::Accident | Self::Breakdown | Self::Theft | Self::LostContact
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Owned,
    Rented,
}

impl PropertyType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Owned => "owned",
            Self::Rented => "rented",
        }
    }

    /// Accepts the stored values plus the spellings used in fleet spreadsheets.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "owned" | "propio" | "propia" | "propios" => Some(Self::Owned),
            "rented" | "alquilado" | "alquilada" | "tercero" | "terceros" => Some(Self::Rented),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripScope {
    #[default]
    Today,
    All,
}

impl TripScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(Self::Today),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Today => Self::All,
            Self::All => Self::Today,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Today => "today's trips",
            Self::All => "all trips",
        }
    }
}

/// Whether the list filter survives navigation away from the trip list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterScope {
    #[default]
    View,
    Global,
}

impl FilterScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Global => "global",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view" => Some(Self::View),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpsDevice {
    pub provider: String,
    pub uri: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for GpsDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpsDevice")
            .field("provider", &self.provider)
            .field("uri", &self.uri)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripUpdate {
    pub id: TripUpdateId,
    pub trip_id: TripId,
    pub category: UpdateCategory,
    pub notes: String,
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub system_trip_id: String,
    pub external_trip_id: String,
    pub delivery_date: String,
    pub driver_name: String,
    pub driver_document: String,
    pub driver_phone: String,
    pub origin: String,
    pub destination: String,
    pub project: String,
    pub plate_number: String,
    pub property_type: Option<PropertyType>,
    pub shift: String,
    pub gps_provider: String,
    pub status: TripStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub updates: Vec<TripUpdate>,
    #[serde(default)]
    pub gps_devices: Vec<GpsDevice>,
}

impl Trip {
    /// Orders updates newest first; equal timestamps fall back to the higher id.
    pub fn sort_updates(&mut self) {
        self.updates.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });
    }

    /// Most recent update by creation time, independent of the stored order.
    pub fn latest_update(&self) -> Option<&TripUpdate> {
        self.updates
            .iter()
            .max_by(|left, right| {
                left.created_at
                    .cmp(&right.created_at)
                    .then_with(|| left.id.cmp(&right.id))
            })
    }

    pub fn latest_category(&self) -> Option<UpdateCategory> {
        self.latest_update().map(|update| update.category)
    }

    /// Timestamp the staleness clock runs from.
    pub fn last_activity_at(&self) -> Option<OffsetDateTime> {
        match self.latest_update() {
            Some(update) => Some(update.created_at),
            None => self.updated_at.or(self.created_at),
        }
    }

    /// Prepends a freshly created update unless one with the same id is present.
    pub fn insert_update(&mut self, update: TripUpdate) -> bool {
        if self.updates.iter().any(|existing| existing.id == update.id) {
            return false;
        }
        self.updates.insert(0, update);
        self.sort_updates();
        true
    }

    /// Label used for row headings: the external code when present.
    pub fn display_code(&self) -> &str {
        if !self.external_trip_id.trim().is_empty() {
            &self.external_trip_id
        } else if !self.system_trip_id.trim().is_empty() {
            &self.system_trip_id
        } else {
            EMPTY_DISPLAY
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrip {
    pub external_trip_id: String,
    pub delivery_date: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub origin: String,
    pub destination: String,
    pub project: String,
    pub plate_number: String,
    pub property_type: Option<PropertyType>,
    pub shift: String,
    pub gps_provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTripUpdate {
    pub trip_id: TripId,
    pub category: UpdateCategory,
    pub notes: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DashboardCounts {
    pub total: usize,
    pub overdue: usize,
    pub recent: usize,
    pub never_updated: usize,
    pub without_updates: usize,
    pub by_category: Vec<(UpdateCategory, usize)>,
}

impl DashboardCounts {
    pub fn count_for(&self, category: UpdateCategory) -> usize {
        self.by_category
            .iter()
            .find(|(candidate, _)| *candidate == category)
            .map_or(0, |(_, count)| *count)
    }
}

/// Returns `value` or the shared placeholder when it is blank.
pub fn display_or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        EMPTY_DISPLAY
    } else {
        value
    }
}

pub fn format_iso_date(date: Date) -> String {
    date.format(&time::macros::format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}
