// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use torre_app::{
    GpsDevice, NewTrip, NewTripUpdate, PropertyType, Trip, TripBackend, TripId, TripQuery,
    TripStatus, TripUpdate, TripUpdateId, UpdateCategory, format_iso_date,
};
use tracing::{debug, warn};
use url::Url;

/// Blocking client for the trips REST backend.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        let base_url = Url::parse(&format!("{trimmed}/"))
            .with_context(|| format!("api.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "api.base_url must use http or https, got {:?}",
                base_url.scheme()
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Cheap reachability probe used by `--check`.
    pub fn ping(&self) -> Result<()> {
        let url = self.endpoint("trips")?;
        let response = self.send(self.http.head(url))?;
        let status = response.status();
        // Some backends do not route HEAD; any answer proves the server is up.
        if status.is_server_error() {
            return Err(clean_error_response(status, ""));
        }
        Ok(())
    }

    pub fn trips_url(&self, query: &TripQuery) -> Result<Url> {
        let mut url = self.endpoint("trips")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(date) = query.date {
                pairs.append_pair("date", &format_iso_date(date));
            }
            if !query.projects.is_empty() {
                pairs.append_pair("projects", &query.projects.join(","));
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("build URL for {path}"))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        request
            .send()
            .map_err(|error| connection_error(self.base_url(), error))
    }

    fn expect_json<T: DeserializeOwned>(&self, response: Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), what, "backend rejected request");
            return Err(clean_error_response(status, &body));
        }
        response.json().with_context(|| format!("decode {what}"))
    }
}

impl TripBackend for Client {
    fn list_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let url = self.trips_url(query)?;
        debug!(%url, "fetching trips");
        let response = self.send(self.http.get(url))?;
        let records: Vec<TripRecord> = self.expect_json(response, "trip list")?;
        Ok(records.into_iter().map(TripRecord::into_trip).collect())
    }

    fn list_trip_updates(&self, trip_id: TripId) -> Result<Vec<TripUpdate>> {
        let mut url = self.endpoint("trip-updates")?;
        url.query_pairs_mut()
            .append_pair("trip_id", &trip_id.to_string());
        let response = self.send(self.http.get(url))?;
        let records: Vec<TripUpdateRecord> = self.expect_json(response, "trip updates")?;
        let mut updates: Vec<TripUpdate> = records
            .into_iter()
            .filter_map(|record| record.into_update(trip_id))
            .collect();
        sort_newest_first(&mut updates);
        Ok(updates)
    }

    fn create_trip_update(&self, update: &NewTripUpdate) -> Result<TripUpdate> {
        let url = self.endpoint("trip-updates")?;
        debug!(trip = %update.trip_id, category = update.category.as_str(), "posting trip update");
        let response = self.send(self.http.post(url).json(update))?;
        let record: TripUpdateRecord = self.expect_json(response, "created trip update")?;
        record
            .into_update(update.trip_id)
            .ok_or_else(|| anyhow!("backend returned an unreadable trip update"))
    }

    fn create_trips(&self, trips: &[NewTrip]) -> Result<Vec<Trip>> {
        let url = self.endpoint("trips")?;
        debug!(count = trips.len(), "posting trips");
        let response = self.send(self.http.post(url).json(&CreateTripsRequest { trips }))?;
        let records: Vec<TripRecord> = self.expect_json(response, "created trips")?;
        Ok(records.into_iter().map(TripRecord::into_trip).collect())
    }

    fn delete_trip(&self, trip_id: TripId) -> Result<()> {
        let url = self.endpoint(&format!("trips/{trip_id}"))?;
        debug!(trip = %trip_id, "deleting trip");
        let response = self.send(self.http.delete(url))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }
        Ok(())
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check [api].base_url or TORRE_API_URL ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body) {
        let message = parsed
            .error
            .or(parsed.message)
            .unwrap_or_default();
        if !message.is_empty() {
            return anyhow!("server error ({}): {}", status.as_u16(), message);
        }
    }

    if !body.is_empty() && body.len() < 100 && !body.contains('{') {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

fn parse_timestamp(raw: Option<&str>) -> Option<OffsetDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}

fn sort_newest_first(updates: &mut [TripUpdate]) {
    updates.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| right.id.cmp(&left.id))
    });
}

#[derive(Debug, Serialize)]
struct CreateTripsRequest<'a> {
    trips: &'a [NewTrip],
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
    message: Option<String>,
}

/// Trip as sent by the backend; everything but the id may be absent.
#[derive(Debug, Deserialize)]
struct TripRecord {
    id: i64,
    system_trip_id: Option<String>,
    external_trip_id: Option<String>,
    delivery_date: Option<String>,
    driver_name: Option<String>,
    driver_document: Option<String>,
    driver_phone: Option<String>,
    origin: Option<String>,
    destination: Option<String>,
    project: Option<String>,
    plate_number: Option<String>,
    property_type: Option<String>,
    shift: Option<String>,
    gps_provider: Option<String>,
    status: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    updates: Option<Vec<TripUpdateRecord>>,
    gps_devices: Option<Vec<GpsDeviceRecord>>,
}

impl TripRecord {
    fn into_trip(self) -> Trip {
        let trip_id = TripId::new(self.id);
        let status = match self.status.as_deref() {
            None => TripStatus::Scheduled,
            Some(raw) => TripStatus::parse(raw).unwrap_or_else(|| {
                warn!(trip = %trip_id, status = raw, "unknown trip status; treating as scheduled");
                TripStatus::Scheduled
            }),
        };
        let mut updates: Vec<TripUpdate> = self
            .updates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|record| record.into_update(trip_id))
            .collect();
        sort_newest_first(&mut updates);

        Trip {
            id: trip_id,
            system_trip_id: self.system_trip_id.unwrap_or_default(),
            external_trip_id: self.external_trip_id.unwrap_or_default(),
            delivery_date: self.delivery_date.unwrap_or_default(),
            driver_name: self.driver_name.unwrap_or_default(),
            driver_document: self.driver_document.unwrap_or_default(),
            driver_phone: self.driver_phone.unwrap_or_default(),
            origin: self.origin.unwrap_or_default(),
            destination: self.destination.unwrap_or_default(),
            project: self.project.unwrap_or_default(),
            plate_number: self.plate_number.unwrap_or_default(),
            property_type: self.property_type.as_deref().and_then(PropertyType::parse),
            shift: self.shift.unwrap_or_default(),
            gps_provider: self.gps_provider.unwrap_or_default(),
            status,
            created_at: parse_timestamp(self.created_at.as_deref()),
            updated_at: parse_timestamp(self.updated_at.as_deref()),
            updates,
            gps_devices: self
                .gps_devices
                .unwrap_or_default()
                .into_iter()
                .map(GpsDeviceRecord::into_device)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TripUpdateRecord {
    id: i64,
    trip_id: Option<i64>,
    category: Option<String>,
    notes: Option<String>,
    image_url: Option<String>,
    created_at: Option<String>,
    author: Option<String>,
}

impl TripUpdateRecord {
    /// Updates without a known category or a readable timestamp cannot be
    /// ranked and are skipped.
    fn into_update(self, parent: TripId) -> Option<TripUpdate> {
        let category = match self.category.as_deref().and_then(UpdateCategory::parse) {
            Some(category) => category,
            None => {
                warn!(update = self.id, category = ?self.category, "skipping update with unknown category");
                return None;
            }
        };
        let Some(created_at) = parse_timestamp(self.created_at.as_deref()) else {
            warn!(update = self.id, "skipping update without a valid created_at");
            return None;
        };
        Some(TripUpdate {
            id: TripUpdateId::new(self.id),
            trip_id: self.trip_id.map_or(parent, TripId::new),
            category,
            notes: self.notes.unwrap_or_default(),
            image_url: self.image_url.filter(|url| !url.trim().is_empty()),
            created_at,
            author: self.author.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GpsDeviceRecord {
    provider: Option<String>,
    uri: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

impl GpsDeviceRecord {
    fn into_device(self) -> GpsDevice {
        GpsDevice {
            provider: self.provider.unwrap_or_default(),
            uri: self.uri.unwrap_or_default(),
            username: self.username.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
        }
    }
}
