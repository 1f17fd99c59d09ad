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

//! Persistence contract for measurement documents.
//!
//! The service only talks to storage through [`MeasurementStore`]. There are two
//! implementations: [`crate::mongo::MongoStore`] backed by a MongoDB collection and
//! [`crate::memory::MemoryStore`] which keeps everything in process.

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::error;
use std::fmt;

/// Native identifier type of the store.
pub type RecordId = ObjectId;

/// Lazy, finite sequence of documents produced by [`MeasurementStore::find_many`].
pub type ReadingStream = BoxStream<'static, Result<StoredReading, StoreError>>;

#[derive(Debug)]
pub enum StoreError {
    InvalidIdentifier(String),
    Unavailable(Box<dyn error::Error + Send + Sync>),
}

impl StoreError {
    pub fn unavailable<E>(e: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self::Unavailable(e.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentifier(id) => write!(f, "invalid identifier {}", id),
            Self::Unavailable(e) => write!(f, "storage unavailable: {}", e),
        }
    }
}

impl error::Error for StoreError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Unavailable(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Parse the external string form of an identifier into the store's native type.
pub fn parse_id(raw: &str) -> Result<RecordId, StoreError> {
    ObjectId::parse_str(raw).map_err(|_| StoreError::InvalidIdentifier(raw.to_owned()))
}

/// Field a query is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Timestamp,
}

impl SortKey {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Value used for this direction in a MongoDB sort document.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Every value persisted for a single measurement, minus the identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub precipitacion: f64,
    pub velocidad_viento: f64,
    pub presion_atmosferica: f64,
    pub temperatura: f64,
    pub humedad: f64,
    pub timestamp: DateTime<Utc>,
}

/// A reading along with the identifier the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub id: RecordId,
    pub reading: Reading,
}

/// Field level changes to apply to an existing reading.
///
/// `None` means "leave as is". There is no way to clear a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingUpdate {
    pub precipitacion: Option<f64>,
    pub velocidad_viento: Option<f64>,
    pub presion_atmosferica: Option<f64>,
    pub temperatura: Option<f64>,
    pub humedad: Option<f64>,
}

impl ReadingUpdate {
    /// Field names and values that will actually be written, in a stable order.
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        [
            ("precipitacion", self.precipitacion),
            ("velocidad_viento", self.velocidad_viento),
            ("presion_atmosferica", self.presion_atmosferica),
            ("temperatura", self.temperatura),
            ("humedad", self.humedad),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Apply each present field to `reading`, leaving the rest untouched.
    pub fn apply(&self, reading: &mut Reading) {
        if let Some(v) = self.precipitacion {
            reading.precipitacion = v;
        }
        if let Some(v) = self.velocidad_viento {
            reading.velocidad_viento = v;
        }
        if let Some(v) = self.presion_atmosferica {
            reading.presion_atmosferica = v;
        }
        if let Some(v) = self.temperatura {
            reading.temperatura = v;
        }
        if let Some(v) = self.humedad {
            reading.humedad = v;
        }
    }
}

/// Abstract document collection holding measurements.
///
/// Each call is expected to be individually atomic. Nothing above this trait does
/// any locking, so concurrent read-modify-write sequences may interleave.
#[async_trait]
pub trait MeasurementStore: fmt::Debug + Send + Sync {
    /// Store a new reading and return the identifier assigned to it.
    async fn insert(&self, reading: &Reading) -> Result<RecordId, StoreError>;

    /// Up to `limit` readings ordered by `key` in `direction`.
    async fn find_many(
        &self,
        key: SortKey,
        direction: SortDirection,
        limit: usize,
    ) -> Result<ReadingStream, StoreError>;

    /// The reading with the greatest value of `key`, if any exist.
    async fn find_latest(&self, key: SortKey) -> Result<Option<StoredReading>, StoreError>;

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<StoredReading>, StoreError>;

    /// Merge the present fields of `update` into the reading with `id`. Returns
    /// `true` if such a reading existed.
    async fn update_by_id(&self, id: &RecordId, update: &ReadingUpdate) -> Result<bool, StoreError>;

    /// Returns the number of readings removed, zero or one.
    async fn delete_by_id(&self, id: &RecordId) -> Result<u64, StoreError>;

    async fn delete_all(&self) -> Result<u64, StoreError>;
}
