// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use csv::{ReaderBuilder, StringRecord};
use std::fmt;
use std::io::Read;
use tracing::debug;

use crate::{NewTrip, TripField, TripFormError, TripFormInput};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    MissingField {
        row: usize,
        trip_id: String,
        field: TripField,
    },
    InvalidDate {
        row: usize,
        trip_id: String,
        value: String,
    },
    InvalidPropertyType {
        row: usize,
        trip_id: String,
        value: String,
    },
    Unreadable {
        row: usize,
        message: String,
    },
}

impl ImportError {
    fn from_form(row: usize, trip_id: &str, error: TripFormError) -> Self {
        let trip_id = trip_id.trim().to_owned();
        match error {
            TripFormError::MissingField(field) => Self::MissingField {
                row,
                trip_id,
                field,
            },
            TripFormError::InvalidDate(value) => Self::InvalidDate {
                row,
                trip_id,
                value,
            },
            TripFormError::InvalidPropertyType(value) => Self::InvalidPropertyType {
                row,
                trip_id,
                value,
            },
        }
    }

    pub fn row(&self) -> usize {
        match self {
            Self::MissingField { row, .. }
            | Self::InvalidDate { row, .. }
            | Self::InvalidPropertyType { row, .. }
            | Self::Unreadable { row, .. } => *row,
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField {
                row,
                trip_id,
                field,
            } if trip_id.is_empty() => {
                write!(f, "row {row}: missing required field \"{}\"", field.label())
            }
            Self::MissingField {
                row,
                trip_id,
                field,
            } => write!(
                f,
                "row {row}: missing required field \"{}\" for trip {trip_id}",
                field.label()
            ),
            Self::InvalidDate {
                row,
                trip_id,
                value,
            } => write!(
                f,
                "row {row}: invalid delivery date {value:?} for trip {trip_id}; expected DD/MM/YYYY"
            ),
            Self::InvalidPropertyType {
                row,
                trip_id,
                value,
            } => write!(
                f,
                "row {row}: invalid property type {value:?} for trip {trip_id}"
            ),
            Self::Unreadable { row, message } => write!(f, "row {row}: {message}"),
        }
    }
}

impl std::error::Error for ImportError {}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub trips: Vec<NewTrip>,
    pub errors: Vec<ImportError>,
    /// Rows skipped because their field count did not match the header.
    pub dropped_rows: usize,
}

impl ImportReport {
    /// Accepts the batch only when every kept row parsed.
    pub fn into_trips(self) -> Result<Vec<NewTrip>> {
        if let Some(first) = self.errors.first() {
            let extra = self.errors.len() - 1;
            if extra == 0 {
                bail!("{first}; fix the row and import again");
            }
            bail!("{first} (and {extra} more row errors); fix the rows and import again");
        }
        if self.trips.is_empty() {
            bail!("CSV contains no trip rows");
        }
        Ok(self.trips)
    }
}

/// Maps a trips spreadsheet export onto new trips. Column names must match
/// exactly; rows whose field count differs from the header are dropped.
pub fn parse_trips_csv<R: Read>(input: R) -> Result<ImportReport> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers().context("read CSV header row")?.clone();
    let columns = column_positions(&headers)?;

    let mut report = ImportReport::default();
    for (index, record) in reader.records().enumerate() {
        // Header is line 1.
        let row = index + 2;
        let record = match record {
            Ok(record) => record,
            Err(error) => {
                report.errors.push(ImportError::Unreadable {
                    row,
                    message: error.to_string(),
                });
                continue;
            }
        };

        if record.len() != headers.len() {
            debug!(row, fields = record.len(), expected = headers.len(), "dropping CSV row");
            report.dropped_rows += 1;
            continue;
        }

        let form = form_from_record(&record, &columns);
        match form.to_new_trip() {
            Ok(trip) => report.trips.push(trip),
            Err(error) => report
                .errors
                .push(ImportError::from_form(row, &form.external_trip_id, error)),
        }
    }

    debug!(
        parsed = report.trips.len(),
        errors = report.errors.len(),
        dropped = report.dropped_rows,
        "CSV import parsed"
    );
    Ok(report)
}

fn column_positions(headers: &StringRecord) -> Result<Vec<(TripField, usize)>> {
    let mut positions = Vec::with_capacity(TripField::ALL.len());
    let mut missing = Vec::new();
    for field in TripField::ALL {
        match headers
            .iter()
            .position(|header| header.trim() == field.csv_column())
        {
            Some(position) => positions.push((field, position)),
            None => missing.push(field.csv_column()),
        }
    }
    if !missing.is_empty() {
        bail!(
            "CSV header is missing columns {}; expected exactly: {}",
            missing.join(", "),
            TripField::ALL.map(TripField::csv_column).join(", ")
        );
    }
    Ok(positions)
}

fn form_from_record(record: &StringRecord, columns: &[(TripField, usize)]) -> TripFormInput {
    let mut form = TripFormInput::default();
    for (field, position) in columns {
        *form.field_mut(*field) = record.get(*position).unwrap_or("").trim().to_owned();
    }
    form
}

#[cfg(test)]
mod tests {
    use super::{ImportError, parse_trips_csv};
    use crate::TripField;

    const HEADER: &str = "ID_Viaje,FECHA DE ENTREGA,NOMBRE CONDUCTOR,CELULAR,ORIGEN,DESTINO,PROYECTO,PLACA,PROPIEDAD,JORNADA,GPS_Prov\n";

    #[test]
    fn well_formed_row_maps_every_column() -> anyhow::Result<()> {
        let csv = format!(
            "{HEADER}V-1001,05/03/2024,Juan Perez,999888777,Lima,Piura,Retail,ABC-123,Propio,Noche,Wialon\n"
        );
        let report = parse_trips_csv(csv.as_bytes())?;
        assert!(report.errors.is_empty());
        let trips = report.into_trips()?;
        assert_eq!(trips.len(), 1);
        let trip = &trips[0];
        assert_eq!(trip.external_trip_id, "V-1001");
        assert_eq!(trip.delivery_date, "2024-03-05T00:00:00.000Z");
        assert_eq!(trip.plate_number, "ABC-123");
        assert_eq!(trip.shift, "Noche");
        assert_eq!(trip.gps_provider, "Wialon");
        Ok(())
    }

    #[test]
    fn missing_plate_names_field_and_trip() -> anyhow::Result<()> {
        let csv = format!(
            "{HEADER}V-1002,06/03/2024,Ana Diaz,999000111,Lima,Cusco,Retail,,Alquilado,Dia,\n"
        );
        let report = parse_trips_csv(csv.as_bytes())?;
        assert_eq!(
            report.errors,
            vec![ImportError::MissingField {
                row: 2,
                trip_id: "V-1002".to_owned(),
                field: TripField::PlateNumber,
            }]
        );
        let message = report.errors[0].to_string();
        assert!(message.contains("Plate Number"));
        assert!(message.contains("V-1002"));

        let error = report.into_trips().expect_err("row errors block the import");
        assert!(error.to_string().contains("V-1002"));
        Ok(())
    }

    #[test]
    fn rows_with_wrong_field_count_are_dropped() -> anyhow::Result<()> {
        let csv = format!(
            "{HEADER}V-1,05/03/2024,A,1,Lima,Ica,Retail,P-1,Propio,Dia,\nV-2,too,short\nV-3,07/03/2024,C,3,Lima,Ica,Retail,P-3,,Dia,,extra\n"
        );
        let report = parse_trips_csv(csv.as_bytes())?;
        assert_eq!(report.trips.len(), 1);
        assert_eq!(report.dropped_rows, 2);
        assert!(report.errors.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_date_is_reported_per_row() -> anyhow::Result<()> {
        let csv = format!(
            "{HEADER}V-7,2024-03-05,A,1,Lima,Ica,Retail,P-7,,Dia,\nV-8,08/03/2024,B,2,Lima,Ica,Retail,P-8,,Dia,\n"
        );
        let report = parse_trips_csv(csv.as_bytes())?;
        assert_eq!(report.trips.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].row(), 2);
        assert!(report.errors[0].to_string().contains("V-7"));
        Ok(())
    }

    #[test]
    fn missing_header_column_fails_whole_file() {
        let csv = "ID_Viaje,PLACA\nV-1,P-1\n";
        let error = parse_trips_csv(csv.as_bytes()).expect_err("header should be rejected");
        let message = error.to_string();
        assert!(message.contains("FECHA DE ENTREGA"));
        assert!(message.contains("GPS_Prov"));
    }
}
