// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use proptest::prelude::*;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use torre_app::{
    Bucket, FilterConfig, StatusFilter, Trip, TripId, TripStatus, TripUpdate, TripUpdateId,
    UpdateCategory, filter_trip_indices, rank_trips,
};

const NOW: OffsetDateTime = datetime!(2026-03-05 12:00 UTC);
const PROJECTS: [&str; 3] = ["Retail", "Mineria", "Agro"];
const DESTINATIONS: [&str; 4] = ["Piura", "Arequipa", "Cusco", "Trujillo"];

#[derive(Debug, Clone)]
struct TripSeed {
    project: usize,
    minutes_ago: Option<i64>,
    updates: Vec<(usize, i64)>,
    driver_name: String,
    driver_document: String,
    driver_phone: String,
    destination: usize,
    plate_number: String,
    delivery_day: u8,
}

fn build_trip(id: i64, seed: TripSeed) -> Trip {
    Trip {
        id: TripId::new(id),
        system_trip_id: format!("SYS-{id}"),
        external_trip_id: format!("V-{id}"),
        delivery_date: format!("2026-03-{:02}T00:00:00.000Z", seed.delivery_day),
        driver_name: seed.driver_name,
        driver_document: seed.driver_document,
        driver_phone: seed.driver_phone,
        origin: "Lima".to_owned(),
        destination: DESTINATIONS[seed.destination].to_owned(),
        project: PROJECTS[seed.project].to_owned(),
        plate_number: seed.plate_number,
        property_type: None,
        shift: String::new(),
        gps_provider: String::new(),
        status: TripStatus::InTransit,
        created_at: None,
        updated_at: seed.minutes_ago.map(|m| NOW - Duration::minutes(m)),
        updates: seed
            .updates
            .into_iter()
            .enumerate()
            .map(|(offset, (category, minutes))| TripUpdate {
                id: TripUpdateId::new(id * 100 + offset as i64),
                trip_id: TripId::new(id),
                category: UpdateCategory::ALL[category],
                notes: String::new(),
                image_url: None,
                created_at: NOW - Duration::minutes(minutes),
                author: "ops".to_owned(),
            })
            .collect(),
        gps_devices: Vec::new(),
    }
}

fn arb_seed() -> impl Strategy<Value = TripSeed> {
    (
        0..PROJECTS.len(),
        prop::option::weighted(0.9, 0i64..600),
        prop::collection::vec((0..UpdateCategory::ALL.len(), 0i64..600), 0..3),
        "[A-Z][a-z]{2,8} [A-Z][a-z]{2,8}",
        "[0-9]{8}",
        "9[0-9]{8}",
        0..DESTINATIONS.len(),
        "[A-Z]{3}-[0-9]{3}",
        1u8..=28,
    )
        .prop_map(
            |(
                project,
                minutes_ago,
                updates,
                driver_name,
                driver_document,
                driver_phone,
                destination,
                plate_number,
                delivery_day,
            )| TripSeed {
                project,
                minutes_ago,
                updates,
                driver_name,
                driver_document,
                driver_phone,
                destination,
                plate_number,
                delivery_day,
            },
        )
}

fn arb_trips() -> impl Strategy<Value = Vec<Trip>> {
    prop::collection::vec(arb_seed(), 0..24).prop_map(|seeds| {
        seeds
            .into_iter()
            .enumerate()
            .map(|(index, seed)| build_trip(index as i64 + 1, seed))
            .collect()
    })
}

fn arb_filter() -> impl Strategy<Value = FilterConfig> {
    let query = prop_oneof![
        prop::sample::select(vec!["", "v-1", "sys-2", "piura", "retail", "98", "-0", "zzz"])
            .prop_map(str::to_owned),
        "[a-zA-Z0-9 -]{1,3}",
    ];
    (
        query,
        prop::option::of(0..UpdateCategory::ALL.len()),
        prop::collection::btree_set(prop::sample::select(PROJECTS.to_vec()), 0..3),
    )
        .prop_map(|(query, category, projects)| FilterConfig {
            query,
            status: category.map_or(StatusFilter::All, |index| {
                StatusFilter::Category(UpdateCategory::ALL[index])
            }),
            projects: projects.into_iter().map(str::to_owned).collect(),
        })
}

/// The ten fields an operator can search by.
fn searchable_fields(trip: &Trip) -> [String; 10] {
    let category = newest_category(trip).map_or(String::new(), |c| c.label().to_owned());
    [
        trip.system_trip_id.clone(),
        trip.external_trip_id.clone(),
        trip.driver_name.clone(),
        trip.driver_document.clone(),
        trip.destination.clone(),
        trip.delivery_date.clone(),
        trip.driver_phone.clone(),
        trip.plate_number.clone(),
        category,
        trip.project.clone(),
    ]
}

fn newest_category(trip: &Trip) -> Option<UpdateCategory> {
    let mut newest: Option<&TripUpdate> = None;
    for update in &trip.updates {
        let newer = match newest {
            None => true,
            Some(best) => (update.created_at, update.id.get()) > (best.created_at, best.id.get()),
        };
        if newer {
            newest = Some(update);
        }
    }
    newest.map(|update| update.category)
}

fn contains_ignoring_case(haystack: &str, needle: &str) -> bool {
    let needle = needle.as_bytes();
    needle.is_empty()
        || haystack
            .as_bytes()
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle))
}

fn expected_match(trip: &Trip, filter: &FilterConfig) -> bool {
    let text = searchable_fields(trip)
        .iter()
        .any(|field| contains_ignoring_case(field, &filter.query));
    let status = match filter.status {
        StatusFilter::All => true,
        StatusFilter::Category(category) => newest_category(trip) == Some(category),
    };
    let project = filter.projects.is_empty()
        || filter.projects.iter().any(|project| *project == trip.project);
    text && status && project
}

proptest! {
    #[test]
    fn ranking_is_a_permutation_with_overdue_first(trips in arb_trips()) {
        let rows = rank_trips(&trips, NOW);
        prop_assert_eq!(rows.len(), trips.len());

        let mut ids: Vec<i64> = rows.iter().map(|row| row.trip_id.get()).collect();
        ids.sort_unstable();
        let expected: Vec<i64> = trips.iter().map(|trip| trip.id.get()).collect();
        prop_assert_eq!(ids, expected);

        let first_recent = rows.iter().position(|row| row.bucket == Bucket::Recent);
        if let Some(boundary) = first_recent {
            prop_assert!(rows[boundary..].iter().all(|row| row.bucket == Bucket::Recent));
        }
    }

    #[test]
    fn each_bucket_is_ordered_most_stale_first(trips in arb_trips()) {
        let rows = rank_trips(&trips, NOW);
        for pair in rows.windows(2) {
            if pair[0].bucket != pair[1].bucket {
                continue;
            }
            let left = pair[0].staleness.elapsed_seconds.unwrap_or(i64::MAX);
            let right = pair[1].staleness.elapsed_seconds.unwrap_or(i64::MAX);
            prop_assert!(left >= right);
        }
    }

    #[test]
    fn filter_agrees_with_field_by_field_check(trips in arb_trips(), filter in arb_filter()) {
        let kept = filter_trip_indices(&trips, &filter);
        for (index, trip) in trips.iter().enumerate() {
            prop_assert_eq!(
                kept.contains(&index),
                expected_match(trip, &filter),
                "trip {} query {:?}",
                trip.id.get(),
                &filter.query
            );
        }
        prop_assert!(kept.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn any_substring_of_a_searchable_field_matches(
        seed in arb_seed(),
        field in 0usize..10,
        start in any::<prop::sample::Index>(),
        length in any::<prop::sample::Index>(),
        upper in prop::collection::vec(any::<bool>(), 40),
    ) {
        let trip = build_trip(7, seed);
        let value = searchable_fields(&trip)[field].clone();
        prop_assume!(!value.is_empty());

        let from = start.index(value.len());
        let to = from + 1 + length.index(value.len() - from);
        let query: String = value[from..to]
            .chars()
            .zip(upper.iter().cycle())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
            .collect();

        let filter = FilterConfig {
            query: query.clone(),
            ..FilterConfig::default()
        };
        prop_assert!(filter.matches(&trip), "field {} value {:?} query {:?}", field, value, query);
    }

    #[test]
    fn narrowing_projects_never_adds_rows(trips in arb_trips(), filter in arb_filter()) {
        let broad = filter_trip_indices(&trips, &FilterConfig {
            projects: Default::default(),
            ..filter.clone()
        });
        let narrow = filter_trip_indices(&trips, &filter);
        prop_assert!(narrow.iter().all(|index| broad.contains(index)));
    }
}
