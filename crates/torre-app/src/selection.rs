// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::TripId;

/// Checked rows over the currently rendered order. Ids are kept in the order
/// they were selected so bulk actions run in selection order.
///
/// The shift-range anchor is a row position, not a trip. A re-rank that moves
/// trips between rows changes which trip the anchor points at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionState {
    selected: Vec<TripId>,
    last_selected_index: Option<usize>,
}

impl SelectionState {
    pub fn is_selected(&self, trip_id: TripId) -> bool {
        self.selected.contains(&trip_id)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn ids(&self) -> &[TripId] {
        &self.selected
    }

    pub fn last_selected_index(&self) -> Option<usize> {
        self.last_selected_index
    }

    /// Applies `checked` to the row at `index`, or to the whole range back to
    /// the previously clicked row when `shift` is held. Returns how many rows
    /// changed membership.
    pub fn toggle(&mut self, rows: &[TripId], index: usize, checked: bool, shift: bool) -> usize {
        let Some(&clicked) = rows.get(index) else {
            return 0;
        };

        let changed = match (self.last_selected_index, shift) {
            (Some(anchor), true) => {
                let start = anchor.min(index);
                let end = anchor.max(index).min(rows.len() - 1);
                rows[start..=end]
                    .iter()
                    .filter(|trip_id| self.set(**trip_id, checked))
                    .count()
            }
            _ => usize::from(self.set(clicked, checked)),
        };

        self.last_selected_index = Some(index);
        changed
    }

    /// Sets membership of every rendered row; hidden rows keep their state.
    pub fn select_all(&mut self, rows: &[TripId], checked: bool) -> usize {
        rows.iter()
            .filter(|trip_id| self.set(**trip_id, checked))
            .count()
    }

    pub fn all_selected(&self, rows: &[TripId]) -> bool {
        !rows.is_empty() && rows.iter().all(|trip_id| self.is_selected(*trip_id))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(TripId) -> bool) {
        self.selected.retain(|trip_id| keep(*trip_id));
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.last_selected_index = None;
    }

    fn set(&mut self, trip_id: TripId, checked: bool) -> bool {
        let position = self.selected.iter().position(|id| *id == trip_id);
        match (checked, position) {
            (true, None) => {
                self.selected.push(trip_id);
                true
            }
            (false, Some(position)) => {
                self.selected.remove(position);
                true
            }
            _ => false,
        }
    }
}

/// Trips a bulk action applies to: the selection, else the opened trip.
pub fn resolve_targets(selection: &SelectionState, opened: Option<TripId>) -> Vec<TripId> {
    if !selection.is_empty() {
        return selection.ids().to_vec();
    }
    opened.into_iter().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    pub targets: Vec<TripId>,
}

impl DeleteConfirmation {
    pub fn prompt(&self) -> String {
        match self.targets.len() {
            1 => "delete this trip and all of its updates? (y/n)".to_owned(),
            count => format!("delete {count} trips and all of their updates? (y/n)"),
        }
    }
}
