// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::{Trip, UpdateCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Category(UpdateCategory),
}

impl StatusFilter {
    pub fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Category(category) => category.label(),
        }
    }

    /// Cycles all -> each category in declaration order -> all.
    pub fn next(self) -> Self {
        let categories = UpdateCategory::ALL;
        match self {
            Self::All => Self::Category(categories[0]),
            Self::Category(current) => {
                let position = categories
                    .iter()
                    .position(|category| *category == current)
                    .unwrap_or(0);
                categories
                    .get(position + 1)
                    .copied()
                    .map_or(Self::All, Self::Category)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterConfig {
    pub query: String,
    pub status: StatusFilter,
    pub projects: BTreeSet<String>,
}

impl FilterConfig {
    pub fn is_active(&self) -> bool {
        !self.query.is_empty() || self.status != StatusFilter::All || !self.projects.is_empty()
    }

    /// Adds or removes a project from the filter; returns whether it is now selected.
    pub fn toggle_project(&mut self, project: &str) -> bool {
        if self.projects.remove(project) {
            return false;
        }
        self.projects.insert(project.to_owned());
        true
    }

    pub fn matches(&self, trip: &Trip) -> bool {
        self.matches_text(trip) && self.matches_status(trip) && self.matches_project(trip)
    }

    pub fn matches_text(&self, trip: &Trip) -> bool {
        if self.query.is_empty() {
            return true;
        }
        let needle = self.query.to_lowercase();
        let category = trip
            .latest_category()
            .map(UpdateCategory::label)
            .unwrap_or("");

        [
            trip.system_trip_id.as_str(),
            trip.external_trip_id.as_str(),
            trip.driver_name.as_str(),
            trip.driver_document.as_str(),
            trip.destination.as_str(),
            trip.delivery_date.as_str(),
            trip.driver_phone.as_str(),
            trip.plate_number.as_str(),
            category,
            trip.project.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }

    pub fn matches_status(&self, trip: &Trip) -> bool {
        match self.status {
            StatusFilter::All => true,
            StatusFilter::Category(category) => trip.latest_category() == Some(category),
        }
    }

    pub fn matches_project(&self, trip: &Trip) -> bool {
        self.projects.is_empty() || self.projects.contains(&trip.project)
    }
}

/// Indices of the trips that pass `filter`, in store order.
pub fn filter_trip_indices(trips: &[Trip], filter: &FilterConfig) -> Vec<usize> {
    trips
        .iter()
        .enumerate()
        .filter(|(_, trip)| filter.matches(trip))
        .map(|(index, _)| index)
        .collect()
}
