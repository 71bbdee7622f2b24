// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use time::{Date, Duration, OffsetDateTime};
use torre_app::{
    GpsDevice, NewTrip, NewTripUpdate, PropertyType, Trip, TripBackend, TripId, TripQuery,
    TripStatus, TripUpdate, TripUpdateId, UpdateCategory, format_iso_date,
};
use tracing::debug;

const FIRST_NAMES: [&str; 16] = [
    "Rosa", "Luis", "Carmen", "Jorge", "Ana", "Miguel", "Lucia", "Carlos", "Elena", "Victor",
    "Diana", "Raul", "Silvia", "Hector", "Paola", "Julio",
];
const LAST_NAMES: [&str; 16] = [
    "Quispe", "Mamani", "Flores", "Rojas", "Huaman", "Torres", "Castillo", "Vargas", "Paredes",
    "Chavez", "Ramos", "Mendoza", "Salazar", "Gutierrez", "Cruz", "Espinoza",
];
const CITIES: [&str; 14] = [
    "Lima",
    "Callao",
    "Arequipa",
    "Trujillo",
    "Chiclayo",
    "Piura",
    "Ica",
    "Cusco",
    "Huancayo",
    "Tacna",
    "Puno",
    "Cajamarca",
    "Chimbote",
    "Ayacucho",
];
const PROJECTS: [&str; 5] = ["Retail", "Mineria", "Agro Norte", "Cemento", "Farma"];
const SHIFTS: [&str; 2] = ["Dia", "Noche"];
const GPS_PROVIDERS: [&str; 4] = ["Wialon", "Hunter", "Comsatel", "Tracklink"];
const PLATE_LETTERS: &[u8] = b"ABCDFGHJKLMNPRSTUVWXYZ";
const NOTE_WORDS: [&str; 18] = [
    "unidad",
    "en",
    "ruta",
    "sin",
    "novedad",
    "carga",
    "completa",
    "control",
    "peaje",
    "km",
    "retraso",
    "trafico",
    "cliente",
    "confirma",
    "descarga",
    "almacen",
    "senal",
    "estable",
];

/// Fixed instant used by fixtures so elapsed-time assertions are stable.
pub const FIXTURE_NOW: OffsetDateTime = time::macros::datetime!(2026-03-05 12:00 UTC);

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator of plausible fleet trips.
#[derive(Debug, Clone)]
pub struct TripFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl TripFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn new_trip(&mut self, delivery: Date) -> NewTrip {
        let origin_index = self.rng.int_n(CITIES.len());
        let destination_index =
            (origin_index + 1 + self.rng.int_n(CITIES.len() - 1)) % CITIES.len();
        let (origin, destination) = (CITIES[origin_index], CITIES[destination_index]);
        NewTrip {
            external_trip_id: format!("V-{:05}", self.int_range(1_000, 99_999)),
            delivery_date: format!("{}T00:00:00.000Z", format_iso_date(delivery)),
            driver_name: self.driver_name(),
            driver_phone: format!("9{:08}", self.int_range(0, 99_999_999)),
            origin: origin.to_owned(),
            destination: destination.to_owned(),
            project: self.pick(&PROJECTS).to_owned(),
            plate_number: self.plate(),
            property_type: Some(if self.rng.bool() {
                PropertyType::Owned
            } else {
                PropertyType::Rented
            }),
            shift: self.pick(&SHIFTS).to_owned(),
            gps_provider: self.pick(&GPS_PROVIDERS).to_owned(),
        }
    }

    /// A stored trip with up to four updates within the last three hours;
    /// roughly one in six has none.
    pub fn trip(&mut self, id: i64, now: OffsetDateTime) -> Trip {
        let new = self.new_trip(now.date());
        let trip_id = TripId::new(id);
        let created_at = now - Duration::minutes(self.int_range(120, 480));
        let mut trip = trip_from_new(trip_id, &new, created_at);
        trip.status = TripStatus::InTransit;
        trip.driver_document = format!("{:08}", self.int_range(10_000_000, 79_999_999));

        let count = if self.rng.int_n(6) == 0 {
            0
        } else {
            1 + self.rng.int_n(4)
        };
        for index in 0..count {
            let minutes_ago = self.int_range(0, 180);
            let category = if index == 0 && count > 1 {
                UpdateCategory::RouteStart
            } else {
                UpdateCategory::ALL[self.rng.int_n(UpdateCategory::ALL.len())]
            };
            trip.updates.push(TripUpdate {
                id: TripUpdateId::new(id * 100 + index as i64),
                trip_id,
                category,
                notes: self.sentence(3, 7),
                image_url: None,
                created_at: now - Duration::minutes(minutes_ago),
                author: "torre".to_owned(),
            });
        }
        trip.sort_updates();
        trip.updated_at = trip
            .latest_update()
            .map(|latest| latest.created_at)
            .or(trip.updated_at);

        trip.gps_devices.push(GpsDevice {
            provider: trip.gps_provider.clone(),
            uri: format!("https://{}.gps.example", trip.gps_provider.to_lowercase()),
            username: format!("flota{}", self.int_range(10, 99)),
            password: format!("pw-{:06}", self.int_range(0, 999_999)),
        });
        trip
    }

    fn driver_name(&mut self) -> String {
        format!("{} {}", self.pick(&FIRST_NAMES), self.pick(&LAST_NAMES))
    }

    fn plate(&mut self) -> String {
        let mut letters = String::with_capacity(3);
        for _ in 0..3 {
            letters.push(char::from(PLATE_LETTERS[self.rng.int_n(PLATE_LETTERS.len())]));
        }
        format!("{letters}-{:03}", self.int_range(100, 999))
    }

    fn sentence(&mut self, min_words: usize, max_words: usize) -> String {
        let count = self.int_range(min_words as i64, max_words as i64) as usize;
        let mut parts = Vec::with_capacity(count);
        for _ in 0..count {
            parts.push(self.pick(&NOTE_WORDS));
        }
        let mut sentence = parts.join(" ");
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }
}

/// Deterministic demo fleet anchored at `now`.
pub fn demo_trips(seed: u64, count: usize, now: OffsetDateTime) -> Vec<Trip> {
    let mut faker = TripFaker::new(seed);
    (1..=count as i64).map(|id| faker.trip(id, now)).collect()
}

/// Bare trip with every text field empty, for tests that set only what they need.
pub fn blank_trip(id: i64) -> Trip {
    Trip {
        id: TripId::new(id),
        system_trip_id: String::new(),
        external_trip_id: String::new(),
        delivery_date: String::new(),
        driver_name: String::new(),
        driver_document: String::new(),
        driver_phone: String::new(),
        origin: String::new(),
        destination: String::new(),
        project: String::new(),
        plate_number: String::new(),
        property_type: None,
        shift: String::new(),
        gps_provider: String::new(),
        status: TripStatus::Scheduled,
        created_at: None,
        updated_at: None,
        updates: Vec::new(),
        gps_devices: Vec::new(),
    }
}

/// Trip whose most recent update is `minutes_ago` before [`FIXTURE_NOW`].
pub fn trip_updated_minutes_ago(id: i64, minutes_ago: i64, category: UpdateCategory) -> Trip {
    let mut trip = blank_trip(id);
    trip.external_trip_id = format!("V-{id}");
    trip.created_at = Some(FIXTURE_NOW - Duration::hours(6));
    trip.updated_at = trip.created_at;
    trip.updates.push(TripUpdate {
        id: TripUpdateId::new(id * 100),
        trip_id: trip.id,
        category,
        notes: String::new(),
        image_url: None,
        created_at: FIXTURE_NOW - Duration::minutes(minutes_ago),
        author: "ops".to_owned(),
    });
    trip
}

pub fn sample_csv() -> &'static str {
    concat!(
        "ID_Viaje,FECHA DE ENTREGA,NOMBRE CONDUCTOR,CELULAR,ORIGEN,DESTINO,PROYECTO,PLACA,PROPIEDAD,JORNADA,GPS_Prov\n",
        "V-2001,05/03/2026,Rosa Quispe,987111222,Callao,Ica,Retail,BQK-441,Propio,Dia,Wialon\n",
        "V-2002,05/03/2026,Luis Mamani,987333444,Lima,Huancayo,Mineria,CTR-902,Alquilado,Noche,Hunter\n",
    )
}

pub fn write_temp_csv(contents: &str) -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join("viajes.csv");
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok((dir, path))
}

fn trip_from_new(id: TripId, new: &NewTrip, at: OffsetDateTime) -> Trip {
    Trip {
        id,
        system_trip_id: format!("TRP-{:05}", id.get()),
        external_trip_id: new.external_trip_id.clone(),
        delivery_date: new.delivery_date.clone(),
        driver_name: new.driver_name.clone(),
        driver_document: String::new(),
        driver_phone: new.driver_phone.clone(),
        origin: new.origin.clone(),
        destination: new.destination.clone(),
        project: new.project.clone(),
        plate_number: new.plate_number.clone(),
        property_type: new.property_type,
        shift: new.shift.clone(),
        gps_provider: new.gps_provider.clone(),
        status: TripStatus::Scheduled,
        created_at: Some(at),
        updated_at: Some(at),
        updates: Vec::new(),
        gps_devices: Vec::new(),
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    trips: Vec<Trip>,
    next_trip_id: i64,
    next_update_id: i64,
    failing: BTreeSet<TripId>,
    list_error: Option<String>,
    clock: Option<OffsetDateTime>,
    calls: Vec<String>,
}

/// In-process [`TripBackend`] used for demo mode and tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
}

impl MemoryBackend {
    pub fn new(trips: Vec<Trip>) -> Self {
        let next_trip_id = trips.iter().map(|trip| trip.id.get()).max().unwrap_or(0);
        let next_update_id = trips
            .iter()
            .flat_map(|trip| trip.updates.iter().map(|update| update.id.get()))
            .max()
            .unwrap_or(0);
        Self {
            inner: Mutex::new(MemoryInner {
                trips,
                next_trip_id,
                next_update_id,
                ..MemoryInner::default()
            }),
        }
    }

    pub fn demo(seed: u64, count: usize, now: OffsetDateTime) -> Self {
        Self::new(demo_trips(seed, count, now))
    }

    /// Pins the timestamp given to created trips and updates.
    pub fn with_clock(self, now: OffsetDateTime) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.clock = Some(now);
        }
        self
    }

    /// Makes every write that targets `trip_id` fail.
    pub fn fail_writes_for(&self, trip_id: TripId) -> Result<()> {
        self.lock()?.failing.insert(trip_id);
        Ok(())
    }

    pub fn fail_listing(&self, message: &str) -> Result<()> {
        self.lock()?.list_error = Some(message.to_owned());
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Vec<Trip>> {
        Ok(self.lock()?.trips.clone())
    }

    /// Operations seen so far, e.g. `update:3` or `delete:5`.
    pub fn calls(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.calls.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory backend lock poisoned"))
    }
}

impl MemoryInner {
    fn now(&self) -> OffsetDateTime {
        self.clock.unwrap_or_else(OffsetDateTime::now_utc)
    }

    fn check_write(&mut self, op: &str, trip_id: TripId) -> Result<()> {
        self.calls.push(format!("{op}:{trip_id}"));
        if self.failing.contains(&trip_id) {
            bail!("server error (500): injected failure for trip {trip_id}");
        }
        Ok(())
    }
}

impl TripBackend for MemoryBackend {
    fn list_trips(&self, query: &TripQuery) -> Result<Vec<Trip>> {
        let mut inner = self.lock()?;
        inner.calls.push("list".to_owned());
        if let Some(message) = &inner.list_error {
            bail!("{message}");
        }
        let date_prefix = query.date.map(format_iso_date);
        let trips: Vec<Trip> = inner
            .trips
            .iter()
            .filter(|trip| {
                date_prefix
                    .as_deref()
                    .is_none_or(|prefix| trip.delivery_date.starts_with(prefix))
            })
            .filter(|trip| query.projects.is_empty() || query.projects.contains(&trip.project))
            .cloned()
            .collect();
        debug!(count = trips.len(), "memory backend listed trips");
        Ok(trips)
    }

    fn list_trip_updates(&self, trip_id: TripId) -> Result<Vec<TripUpdate>> {
        let inner = self.lock()?;
        let trip = inner
            .trips
            .iter()
            .find(|trip| trip.id == trip_id)
            .ok_or_else(|| anyhow!("server error (404): trip {trip_id} not found"))?;
        let mut trip = trip.clone();
        trip.sort_updates();
        Ok(trip.updates)
    }

    fn create_trip_update(&self, update: &NewTripUpdate) -> Result<TripUpdate> {
        let mut inner = self.lock()?;
        inner.check_write("update", update.trip_id)?;
        let now = inner.now();
        inner.next_update_id += 1;
        let created = TripUpdate {
            id: TripUpdateId::new(inner.next_update_id),
            trip_id: update.trip_id,
            category: update.category,
            notes: update.notes.clone(),
            image_url: update.image_url.clone(),
            created_at: now,
            author: "torre".to_owned(),
        };
        let trip = inner
            .trips
            .iter_mut()
            .find(|trip| trip.id == update.trip_id)
            .ok_or_else(|| anyhow!("server error (404): trip {} not found", update.trip_id))?;
        trip.updated_at = Some(now);
        trip.insert_update(created.clone());
        Ok(created)
    }

    fn create_trips(&self, trips: &[NewTrip]) -> Result<Vec<Trip>> {
        let mut inner = self.lock()?;
        let now = inner.now();
        let mut created = Vec::with_capacity(trips.len());
        for new in trips {
            inner.next_trip_id += 1;
            let trip = trip_from_new(TripId::new(inner.next_trip_id), new, now);
            inner.calls.push(format!("create:{}", trip.id));
            created.push(trip.clone());
            inner.trips.push(trip);
        }
        Ok(created)
    }

    fn delete_trip(&self, trip_id: TripId) -> Result<()> {
        let mut inner = self.lock()?;
        inner.check_write("delete", trip_id)?;
        let before = inner.trips.len();
        inner.trips.retain(|trip| trip.id != trip_id);
        if inner.trips.len() == before {
            bail!("server error (404): trip {trip_id} not found");
        }
        Ok(())
    }
}
