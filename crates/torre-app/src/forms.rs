// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::fmt;
use time::{Date, Month};
use url::Url;

use crate::{NewTrip, NewTripUpdate, PropertyType, TripId, UpdateCategory, format_iso_date};

/// Trip attributes captured by the add-trip form and the CSV import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripField {
    ExternalTripId,
    DeliveryDate,
    DriverName,
    DriverPhone,
    Origin,
    Destination,
    Project,
    PlateNumber,
    PropertyType,
    Shift,
    GpsProvider,
}

impl TripField {
    pub const ALL: [Self; 11] = [
        Self::ExternalTripId,
        Self::DeliveryDate,
        Self::DriverName,
        Self::DriverPhone,
        Self::Origin,
        Self::Destination,
        Self::Project,
        Self::PlateNumber,
        Self::PropertyType,
        Self::Shift,
        Self::GpsProvider,
    ];

    pub const REQUIRED: [Self; 8] = [
        Self::ExternalTripId,
        Self::DeliveryDate,
        Self::DriverName,
        Self::DriverPhone,
        Self::Origin,
        Self::Destination,
        Self::Project,
        Self::PlateNumber,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::ExternalTripId => "Trip ID",
            Self::DeliveryDate => "Delivery Date",
            Self::DriverName => "Driver Name",
            Self::DriverPhone => "Driver Phone",
            Self::Origin => "Origin",
            Self::Destination => "Destination",
            Self::Project => "Project",
            Self::PlateNumber => "Plate Number",
            Self::PropertyType => "Property Type",
            Self::Shift => "Shift",
            Self::GpsProvider => "GPS Provider",
        }
    }

    pub const fn csv_column(self) -> &'static str {
        match self {
            Self::ExternalTripId => "ID_Viaje",
            Self::DeliveryDate => "FECHA DE ENTREGA",
            Self::DriverName => "NOMBRE CONDUCTOR",
            Self::DriverPhone => "CELULAR",
            Self::Origin => "ORIGEN",
            Self::Destination => "DESTINO",
            Self::Project => "PROYECTO",
            Self::PlateNumber => "PLACA",
            Self::PropertyType => "PROPIEDAD",
            Self::Shift => "JORNADA",
            Self::GpsProvider => "GPS_Prov",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripFormError {
    MissingField(TripField),
    InvalidDate(String),
    InvalidPropertyType(String),
}

impl fmt::Display for TripFormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field \"{}\"", field.label()),
            Self::InvalidDate(value) => {
                write!(f, "invalid delivery date {value:?}; expected DD/MM/YYYY")
            }
            Self::InvalidPropertyType(value) => {
                write!(f, "invalid property type {value:?}; expected owned or rented")
            }
        }
    }
}

impl std::error::Error for TripFormError {}

/// Raw text of a trip as typed in the form or read from a CSV row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TripFormInput {
    pub external_trip_id: String,
    pub delivery_date: String,
    pub driver_name: String,
    pub driver_phone: String,
    pub origin: String,
    pub destination: String,
    pub project: String,
    pub plate_number: String,
    pub property_type: String,
    pub shift: String,
    pub gps_provider: String,
}

impl TripFormInput {
    pub fn field(&self, field: TripField) -> &str {
        match field {
            TripField::ExternalTripId => &self.external_trip_id,
            TripField::DeliveryDate => &self.delivery_date,
            TripField::DriverName => &self.driver_name,
            TripField::DriverPhone => &self.driver_phone,
            TripField::Origin => &self.origin,
            TripField::Destination => &self.destination,
            TripField::Project => &self.project,
            TripField::PlateNumber => &self.plate_number,
            TripField::PropertyType => &self.property_type,
            TripField::Shift => &self.shift,
            TripField::GpsProvider => &self.gps_provider,
        }
    }

    pub fn field_mut(&mut self, field: TripField) -> &mut String {
        match field {
            TripField::ExternalTripId => &mut self.external_trip_id,
            TripField::DeliveryDate => &mut self.delivery_date,
            TripField::DriverName => &mut self.driver_name,
            TripField::DriverPhone => &mut self.driver_phone,
            TripField::Origin => &mut self.origin,
            TripField::Destination => &mut self.destination,
            TripField::Project => &mut self.project,
            TripField::PlateNumber => &mut self.plate_number,
            TripField::PropertyType => &mut self.property_type,
            TripField::Shift => &mut self.shift,
            TripField::GpsProvider => &mut self.gps_provider,
        }
    }

    pub fn missing_field(&self) -> Option<TripField> {
        TripField::REQUIRED
            .into_iter()
            .find(|field| self.field(*field).trim().is_empty())
    }

    pub fn to_new_trip(&self) -> std::result::Result<NewTrip, TripFormError> {
        if let Some(field) = self.missing_field() {
            return Err(TripFormError::MissingField(field));
        }

        let delivery_date = parse_delivery_date(&self.delivery_date)
            .ok_or_else(|| TripFormError::InvalidDate(self.delivery_date.trim().to_owned()))?;

        let property_type = match self.property_type.trim() {
            "" => None,
            raw => Some(
                PropertyType::parse(raw)
                    .ok_or_else(|| TripFormError::InvalidPropertyType(raw.to_owned()))?,
            ),
        };

        Ok(NewTrip {
            external_trip_id: self.external_trip_id.trim().to_owned(),
            delivery_date,
            driver_name: self.driver_name.trim().to_owned(),
            driver_phone: self.driver_phone.trim().to_owned(),
            origin: self.origin.trim().to_owned(),
            destination: self.destination.trim().to_owned(),
            project: self.project.trim().to_owned(),
            plate_number: self.plate_number.trim().to_owned(),
            property_type,
            shift: self.shift.trim().to_owned(),
            gps_provider: self.gps_provider.trim().to_owned(),
        })
    }
}

/// Converts a `DD/MM/YYYY` delivery date into a UTC-midnight ISO instant.
pub fn parse_delivery_date(raw: &str) -> Option<String> {
    let date = parse_day_month_year(raw.trim())?;
    Some(format!("{}T00:00:00.000Z", format_iso_date(date)))
}

fn parse_day_month_year(raw: &str) -> Option<Date> {
    let mut parts = raw.split('/');
    let day: u8 = parts.next()?.trim().parse().ok()?;
    let month: u8 = parts.next()?.trim().parse().ok()?;
    let year_part = parts.next()?.trim();
    if parts.next().is_some() || year_part.len() != 4 {
        return None;
    }
    let year: i32 = year_part.parse().ok()?;
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateFormInput {
    pub category: UpdateCategory,
    pub notes: String,
    pub image_url: String,
}

impl UpdateFormInput {
    pub fn new(category: UpdateCategory) -> Self {
        Self {
            category,
            notes: String::new(),
            image_url: String::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let raw = self.image_url.trim();
        if raw.is_empty() {
            return Ok(());
        }
        let Ok(url) = Url::parse(raw) else {
            bail!("evidence URL {raw:?} is not a valid URL -- paste the full link and retry");
        };
        if !matches!(url.scheme(), "http" | "https") {
            bail!("evidence URL must use http or https, got {:?}", url.scheme());
        }
        Ok(())
    }

    pub fn image_url(&self) -> Option<String> {
        let trimmed = self.image_url.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    }

    pub fn to_new_update(&self, trip_id: TripId) -> Result<NewTripUpdate> {
        self.validate()?;
        Ok(NewTripUpdate {
            trip_id,
            category: self.category,
            notes: self.notes.trim().to_owned(),
            image_url: self.image_url(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{TripField, TripFormError, TripFormInput, UpdateFormInput, parse_delivery_date};
    use crate::{PropertyType, TripId, UpdateCategory};

    fn complete_form() -> TripFormInput {
        TripFormInput {
            external_trip_id: "V-2031".to_owned(),
            delivery_date: "05/03/2024".to_owned(),
            driver_name: "Rosa Quispe".to_owned(),
            driver_phone: "987111222".to_owned(),
            origin: "Callao".to_owned(),
            destination: "Ica".to_owned(),
            project: "Retail".to_owned(),
            plate_number: "B7Q-441".to_owned(),
            property_type: "Propio".to_owned(),
            shift: "Dia".to_owned(),
            gps_provider: String::new(),
        }
    }

    #[test]
    fn delivery_date_converts_to_iso_midnight() {
        assert_eq!(
            parse_delivery_date("05/03/2024").as_deref(),
            Some("2024-03-05T00:00:00.000Z")
        );
        assert_eq!(
            parse_delivery_date("5/3/2024").as_deref(),
            Some("2024-03-05T00:00:00.000Z")
        );
        assert_eq!(parse_delivery_date("31/02/2024"), None);
        assert_eq!(parse_delivery_date("2024-03-05"), None);
        assert_eq!(parse_delivery_date("05/03/24"), None);
    }

    #[test]
    fn complete_form_builds_new_trip() -> anyhow::Result<()> {
        let trip = complete_form().to_new_trip()?;
        assert_eq!(trip.delivery_date, "2024-03-05T00:00:00.000Z");
        assert_eq!(trip.property_type, Some(PropertyType::Owned));
        assert!(trip.gps_provider.is_empty());
        Ok(())
    }

    #[test]
    fn first_missing_required_field_is_reported() {
        let mut form = complete_form();
        form.plate_number = "  ".to_owned();
        assert_eq!(
            form.to_new_trip(),
            Err(TripFormError::MissingField(TripField::PlateNumber))
        );
        assert_eq!(
            TripFormError::MissingField(TripField::PlateNumber).to_string(),
            "missing required field \"Plate Number\""
        );
    }

    #[test]
    fn unknown_property_type_is_rejected() {
        let mut form = complete_form();
        form.property_type = "leasing".to_owned();
        assert!(matches!(
            form.to_new_trip(),
            Err(TripFormError::InvalidPropertyType(_))
        ));
    }

    #[test]
    fn update_form_requires_http_evidence_url() {
        let mut form = UpdateFormInput::new(UpdateCategory::Accident);
        assert!(form.validate().is_ok());

        form.image_url = "ftp://files.example/photo.jpg".to_owned();
        assert!(form.validate().is_err());

        form.image_url = "not a url".to_owned();
        assert!(form.validate().is_err());

        form.image_url = " https://cdn.example/evidence/1.jpg ".to_owned();
        let update = form.to_new_update(TripId::new(3)).expect("valid update");
        assert_eq!(
            update.image_url.as_deref(),
            Some("https://cdn.example/evidence/1.jpg")
        );
    }
}
