// weather_station - Telemetry ingestion service for a weather station
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::store::{
    parse_id, MeasurementStore, Reading, ReadingUpdate, RecordId, SortDirection, SortKey, StoreError,
    StoredReading,
};
use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use futures::TryStreamExt;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::error;
use std::fmt;
use std::sync::Arc;

/// Number of measurements returned by a listing when the caller doesn't pick one.
pub const DEFAULT_LIMIT: usize = 100;

const HUMIDITY_MIN: f64 = 0.0;
const HUMIDITY_MAX: f64 = 100.0;

#[derive(Debug)]
pub enum ServiceError {
    Validation(String),
    InvalidIdentifier(String),
    NotFound(String),
    StorageUnavailable(StoreError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{}", msg),
            Self::InvalidIdentifier(id) => write!(f, "invalid measurement id {}", id),
            Self::NotFound(msg) => write!(f, "{}", msg),
            Self::StorageUnavailable(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::StorageUnavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidIdentifier(id) => Self::InvalidIdentifier(id),
            e => Self::StorageUnavailable(e),
        }
    }
}

/// A measurement as submitted by the station. Every reading is required.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewMeasurement {
    /// Precipitation in mm
    pub precipitacion: f64,
    /// Wind speed in m/s
    pub velocidad_viento: f64,
    /// Atmospheric pressure in hPa
    pub presion_atmosferica: f64,
    /// Temperature in celsius
    pub temperatura: f64,
    /// Relative humidity (0-100)
    pub humedad: f64,
    /// Time the reading applies to, the time of insertion if not provided. Times
    /// without an offset are taken to be UTC.
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Partial changes to an existing measurement.
///
/// Only fields that are present and non-null are applied. A field cannot be cleared.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MeasurementUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitacion: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocidad_viento: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presion_atmosferica: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperatura: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humedad: Option<f64>,
}

impl From<MeasurementUpdate> for ReadingUpdate {
    fn from(u: MeasurementUpdate) -> Self {
        ReadingUpdate {
            precipitacion: u.precipitacion,
            velocidad_viento: u.velocidad_viento,
            presion_atmosferica: u.presion_atmosferica,
            temperatura: u.temperatura,
            humedad: u.humedad,
        }
    }
}

/// A persisted measurement as seen by callers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Measurement {
    pub id: String,
    pub precipitacion: f64,
    pub velocidad_viento: f64,
    pub presion_atmosferica: f64,
    pub temperatura: f64,
    pub humedad: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredReading> for Measurement {
    fn from(s: StoredReading) -> Self {
        Measurement {
            id: s.id.to_hex(),
            precipitacion: s.reading.precipitacion,
            velocidad_viento: s.reading.velocidad_viento,
            presion_atmosferica: s.reading.presion_atmosferica,
            temperatura: s.reading.temperatura,
            humedad: s.reading.humedad,
            timestamp: s.reading.timestamp,
        }
    }
}

/// Confirmation that a single measurement was removed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Deleted {
    pub deleted: bool,
    pub id: String,
}

/// Number of measurements removed by a bulk delete.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeletedCount {
    pub deleted: u64,
}

/// Validates, normalizes and maps measurements between callers and a `MeasurementStore`.
///
/// Holds no state besides the store itself. Each method is a single request against
/// the store (or two, in the case of `update`) with no locking between them.
#[derive(Debug, Clone)]
pub struct MeasurementService {
    store: Arc<dyn MeasurementStore>,
}

impl MeasurementService {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        MeasurementService { store }
    }

    /// Persist a new measurement, stamping it with the current time if it has no timestamp.
    pub async fn create(&self, input: NewMeasurement) -> Result<Measurement, ServiceError> {
        validate_humidity(input.humedad)?;

        let reading = Reading {
            precipitacion: input.precipitacion,
            velocidad_viento: input.velocidad_viento,
            presion_atmosferica: input.presion_atmosferica,
            temperatura: input.temperatura,
            humedad: input.humedad,
            // Stored with millisecond precision, so return exactly what a later read would
            timestamp: input.timestamp.unwrap_or_else(Utc::now).trunc_subsecs(3),
        };

        let id = self.store.insert(&reading).await?;
        tracing::debug!(message = "created measurement", id = %id);
        Ok(StoredReading { id, reading }.into())
    }

    /// Up to `limit` measurements, most recent first.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Measurement>, ServiceError> {
        Ok(self
            .store
            .find_many(SortKey::Timestamp, SortDirection::Descending, limit)
            .await?
            .map_ok(Measurement::from)
            .try_collect::<Vec<_>>()
            .await?)
    }

    /// The measurement with the most recent timestamp.
    pub async fn latest(&self) -> Result<Measurement, ServiceError> {
        self.store
            .find_latest(SortKey::Timestamp)
            .await?
            .map(Measurement::from)
            .ok_or_else(|| ServiceError::NotFound("no measurements yet".to_owned()))
    }

    pub async fn get(&self, id: &str) -> Result<Measurement, ServiceError> {
        let oid = parse_id(id)?;
        self.find(&oid, id).await
    }

    /// Apply the present fields of `input` to the measurement `id` and return the result.
    ///
    /// An update without any fields is rejected even if `id` doesn't exist.
    pub async fn update(&self, id: &str, input: MeasurementUpdate) -> Result<Measurement, ServiceError> {
        let oid = parse_id(id)?;
        let update = ReadingUpdate::from(input);
        if update.is_empty() {
            return Err(ServiceError::Validation("no fields were provided to update".to_owned()));
        }

        if let Some(h) = update.humedad {
            validate_humidity(h)?;
        }

        if !self.store.update_by_id(&oid, &update).await? {
            return Err(not_found(id));
        }

        tracing::debug!(message = "updated measurement", id = %id, fields = update.fields().len());
        self.find(&oid, id).await
    }

    pub async fn delete(&self, id: &str) -> Result<Deleted, ServiceError> {
        let oid = parse_id(id)?;
        if self.store.delete_by_id(&oid).await? == 0 {
            return Err(not_found(id));
        }

        tracing::debug!(message = "deleted measurement", id = %id);
        Ok(Deleted {
            deleted: true,
            id: id.to_owned(),
        })
    }

    /// Remove every measurement. There is no undo.
    pub async fn delete_all(&self) -> Result<DeletedCount, ServiceError> {
        let deleted = self.store.delete_all().await?;
        tracing::info!(message = "deleted all measurements", count = deleted);
        Ok(DeletedCount { deleted })
    }

    async fn find(&self, oid: &RecordId, id: &str) -> Result<Measurement, ServiceError> {
        self.store
            .find_by_id(oid)
            .await?
            .map(Measurement::from)
            .ok_or_else(|| not_found(id))
    }
}

fn validate_humidity(humedad: f64) -> Result<(), ServiceError> {
    if (HUMIDITY_MIN..=HUMIDITY_MAX).contains(&humedad) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "humedad must be between {} and {}, got {}",
            HUMIDITY_MIN, HUMIDITY_MAX, humedad
        )))
    }
}

/// Parse an RFC 3339 timestamp, or an ISO 8601 one without an offset as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(e) => s
            .parse::<NaiveDateTime>()
            .map(|naive| Utc.from_utc_datetime(&naive))
            .map_err(|_| e),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|s| parse_timestamp(&s).map_err(de::Error::custom))
        .transpose()
}

fn not_found(id: &str) -> ServiceError {
    ServiceError::NotFound(format!("measurement {} not found", id))
}
