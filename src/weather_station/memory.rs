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
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Store that keeps readings in memory, in insertion order.
///
/// Useful for tests and for running the server without a database. Nothing is
/// persisted across restarts.
#[derive(Debug)]
pub struct MemoryStore {
    readings: Mutex<Vec<StoredReading>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            readings: Mutex::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent operation fail as if the backing store was unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<StoredReading>>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store marked unavailable"));
        }

        self.readings
            .lock()
            .map_err(|e| StoreError::unavailable(format!("memory store lock poisoned: {}", e)))
    }

    fn sorted(readings: &[StoredReading], key: SortKey, direction: SortDirection) -> Vec<StoredReading> {
        // Newest inserts come first among equal keys when descending, matching the
        // order a caller would expect from "most recent first".
        let mut out: Vec<StoredReading> = match direction {
            SortDirection::Ascending => readings.to_vec(),
            SortDirection::Descending => readings.iter().rev().cloned().collect(),
        };

        match key {
            SortKey::Timestamp => out.sort_by(|a, b| {
                let ord = a.reading.timestamp.cmp(&b.reading.timestamp);
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }),
        }

        out
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn insert(&self, reading: &Reading) -> Result<RecordId, StoreError> {
        let id = RecordId::new();
        self.lock()?.push(StoredReading {
            id,
            reading: reading.clone(),
        });

        Ok(id)
    }

    async fn find_many(
        &self,
        key: SortKey,
        direction: SortDirection,
        limit: usize,
    ) -> Result<ReadingStream, StoreError> {
        let mut readings = Self::sorted(&self.lock()?, key, direction);
        readings.truncate(limit);
        Ok(stream::iter(readings.into_iter().map(Ok)).boxed())
    }

    async fn find_latest(&self, key: SortKey) -> Result<Option<StoredReading>, StoreError> {
        Ok(Self::sorted(&self.lock()?, key, SortDirection::Descending)
            .into_iter()
            .next())
    }

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<StoredReading>, StoreError> {
        Ok(self.lock()?.iter().find(|r| &r.id == id).cloned())
    }

    async fn update_by_id(&self, id: &RecordId, update: &ReadingUpdate) -> Result<bool, StoreError> {
        let mut readings = self.lock()?;
        match readings.iter_mut().find(|r| &r.id == id) {
            Some(stored) => {
                update.apply(&mut stored.reading);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, id: &RecordId) -> Result<u64, StoreError> {
        let mut readings = self.lock()?;
        let before = readings.len();
        readings.retain(|r| &r.id != id);
        Ok((before - readings.len()) as u64)
    }

    async fn delete_all(&self) -> Result<u64, StoreError> {
        let mut readings = self.lock()?;
        let count = readings.len() as u64;
        readings.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use futures::TryStreamExt;

    fn reading(minutes: i64) -> Reading {
        Reading {
            precipitacion: 0.0,
            velocidad_viento: 1.2,
            presion_atmosferica: 1013.0,
            temperatura: minutes as f64,
            humedad: 55.0,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
        }
    }

    #[tokio::test]
    async fn test_find_many_sorted_and_limited() {
        let store = MemoryStore::new();
        for m in [3, 1, 4, 0, 2] {
            store.insert(&reading(m)).await.unwrap();
        }

        let res: Vec<StoredReading> = store
            .find_many(SortKey::Timestamp, SortDirection::Descending, 2)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let temps: Vec<f64> = res.iter().map(|r| r.reading.temperatura).collect();
        assert_eq!(vec![4.0, 3.0], temps);
    }

    #[tokio::test]
    async fn test_find_many_ascending() {
        let store = MemoryStore::new();
        for m in [2, 0, 1] {
            store.insert(&reading(m)).await.unwrap();
        }

        let res: Vec<StoredReading> = store
            .find_many(SortKey::Timestamp, SortDirection::Ascending, 10)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let temps: Vec<f64> = res.iter().map(|r| r.reading.temperatura).collect();
        assert_eq!(vec![0.0, 1.0, 2.0], temps);
    }

    #[tokio::test]
    async fn test_find_latest_empty() {
        let store = MemoryStore::new();
        assert_eq!(None, store.find_latest(SortKey::Timestamp).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = MemoryStore::new();
        let update = ReadingUpdate {
            temperatura: Some(1.0),
            ..Default::default()
        };

        assert!(!store.update_by_id(&RecordId::new(), &update).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_id_and_all() {
        let store = MemoryStore::new();
        let id = store.insert(&reading(0)).await.unwrap();
        store.insert(&reading(1)).await.unwrap();
        store.insert(&reading(2)).await.unwrap();

        assert_eq!(1, store.delete_by_id(&id).await.unwrap());
        assert_eq!(0, store.delete_by_id(&id).await.unwrap());
        assert_eq!(2, store.delete_all().await.unwrap());
        assert_eq!(0, store.delete_all().await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);

        match store.insert(&reading(0)).await {
            Err(StoreError::Unavailable(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
