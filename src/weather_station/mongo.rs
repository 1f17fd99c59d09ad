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
    MeasurementStore, Reading, ReadingStream, ReadingUpdate, RecordId, SortDirection, SortKey, StoreError,
    StoredReading,
};
use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use mongodb::options::{ClientOptions, FindOneOptions, FindOptions};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const APP_NAME: &str = "weather_station";

/// Shape of a measurement as stored in the collection.
#[derive(Serialize, Deserialize, Debug, Clone)]
struct MeasurementDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<RecordId>,
    precipitacion: f64,
    velocidad_viento: f64,
    presion_atmosferica: f64,
    temperatura: f64,
    humedad: f64,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    timestamp: DateTime<Utc>,
}

impl MeasurementDocument {
    fn from_reading(reading: &Reading) -> Self {
        MeasurementDocument {
            id: None,
            precipitacion: reading.precipitacion,
            velocidad_viento: reading.velocidad_viento,
            presion_atmosferica: reading.presion_atmosferica,
            temperatura: reading.temperatura,
            humedad: reading.humedad,
            timestamp: reading.timestamp,
        }
    }

    fn into_stored(self) -> Result<StoredReading, StoreError> {
        let id = self
            .id
            .ok_or_else(|| StoreError::unavailable("document returned without an _id"))?;

        Ok(StoredReading {
            id,
            reading: Reading {
                precipitacion: self.precipitacion,
                velocidad_viento: self.velocidad_viento,
                presion_atmosferica: self.presion_atmosferica,
                temperatura: self.temperatura,
                humedad: self.humedad,
                timestamp: self.timestamp,
            },
        })
    }
}

/// Measurement store backed by a MongoDB collection.
///
/// Construct with [`MongoStore::connect`] at startup and call [`MongoStore::close`]
/// once the server has stopped accepting requests.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    collection: Collection<MeasurementDocument>,
}

impl MongoStore {
    /// Connect to the server at `uri` and verify it responds before returning.
    ///
    /// `timeout` bounds both establishing connections and selecting a server for
    /// each operation, so no store call blocks indefinitely.
    pub async fn connect(uri: &str, database: &str, collection: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut opts = ClientOptions::parse(uri).await.map_err(StoreError::unavailable)?;
        opts.app_name = Some(APP_NAME.to_owned());
        opts.connect_timeout = Some(timeout);
        opts.server_selection_timeout = Some(timeout);

        let client = Client::with_options(opts).map_err(StoreError::unavailable)?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(StoreError::unavailable)?;

        tracing::debug!(message = "connected to store", database = %database, collection = %collection);
        Ok(MongoStore {
            collection: db.collection(collection),
            client,
        })
    }

    /// Close all connections held by the client.
    pub async fn close(&self) {
        self.client.clone().shutdown().await;
    }

    fn sort(key: SortKey, direction: SortDirection) -> Document {
        doc! { key.field(): direction.as_i32() }
    }
}

#[async_trait]
impl MeasurementStore for MongoStore {
    async fn insert(&self, reading: &Reading) -> Result<RecordId, StoreError> {
        let res = self
            .collection
            .insert_one(MeasurementDocument::from_reading(reading), None)
            .await
            .map_err(StoreError::unavailable)?;

        res.inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::unavailable(format!("unexpected inserted id {}", res.inserted_id)))
    }

    async fn find_many(
        &self,
        key: SortKey,
        direction: SortDirection,
        limit: usize,
    ) -> Result<ReadingStream, StoreError> {
        // A limit of zero means "no limit" to MongoDB
        if limit == 0 {
            return Ok(stream::empty().boxed());
        }

        let opts = FindOptions::builder()
            .sort(Self::sort(key, direction))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();

        let cursor = self
            .collection
            .find(None, opts)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(cursor
            .map_err(StoreError::unavailable)
            .and_then(|d| async move { d.into_stored() })
            .boxed())
    }

    async fn find_latest(&self, key: SortKey) -> Result<Option<StoredReading>, StoreError> {
        let opts = FindOneOptions::builder()
            .sort(Self::sort(key, SortDirection::Descending))
            .build();

        self.collection
            .find_one(None, opts)
            .await
            .map_err(StoreError::unavailable)?
            .map(MeasurementDocument::into_stored)
            .transpose()
    }

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<StoredReading>, StoreError> {
        self.collection
            .find_one(doc! { "_id": *id }, None)
            .await
            .map_err(StoreError::unavailable)?
            .map(MeasurementDocument::into_stored)
            .transpose()
    }

    async fn update_by_id(&self, id: &RecordId, update: &ReadingUpdate) -> Result<bool, StoreError> {
        let mut set = Document::new();
        for (field, value) in update.fields() {
            set.insert(field, value);
        }

        let res = self
            .collection
            .update_one(doc! { "_id": *id }, doc! { "$set": set }, None)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(res.matched_count > 0)
    }

    async fn delete_by_id(&self, id: &RecordId) -> Result<u64, StoreError> {
        let res = self
            .collection
            .delete_one(doc! { "_id": *id }, None)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(res.deleted_count)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let res = self
            .collection
            .delete_many(doc! {}, None)
            .await
            .map_err(StoreError::unavailable)?;

        Ok(res.deleted_count)
    }
}
