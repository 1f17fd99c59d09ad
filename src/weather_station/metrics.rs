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

use crate::service::{Measurement, ServiceError};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_INVALID: &str = "invalid";
pub const OUTCOME_NOT_FOUND: &str = "not_found";
pub const OUTCOME_UNAVAILABLE: &str = "unavailable";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    operation: String,
    outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReadingLabels {
    field: String,
}

/// Holder for metrics about requests handled and the most recent reading submitted.
///
/// All metrics are created and registered upon call to `MeasurementMetrics::new()` and
/// share the "station_" prefix when the registry is created with `Registry::with_prefix`.
#[derive(Debug, Clone)]
pub struct MeasurementMetrics {
    requests: Family<RequestLabels, Counter>,
    last_reading: Family<ReadingLabels, Gauge<f64, AtomicU64>>,
}

impl MeasurementMetrics {
    pub fn new(reg: &mut Registry) -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        let last_reading = Family::<ReadingLabels, Gauge<f64, AtomicU64>>::default();

        reg.register(
            "requests",
            "Measurement operations handled by operation and outcome",
            requests.clone(),
        );
        reg.register(
            "last_reading",
            "Values of the most recently submitted measurement",
            last_reading.clone(),
        );

        Self { requests, last_reading }
    }

    /// Count a single operation and what happened to it.
    pub fn record<T>(&self, operation: &str, res: &Result<T, ServiceError>) {
        let outcome = match res {
            Ok(_) => OUTCOME_SUCCESS,
            Err(ServiceError::Validation(_)) | Err(ServiceError::InvalidIdentifier(_)) => OUTCOME_INVALID,
            Err(ServiceError::NotFound(_)) => OUTCOME_NOT_FOUND,
            Err(ServiceError::StorageUnavailable(_)) => OUTCOME_UNAVAILABLE,
        };

        self.requests
            .get_or_create(&RequestLabels {
                operation: operation.to_owned(),
                outcome: outcome.to_owned(),
            })
            .inc();
    }

    /// Set the reading gauges from a newly created measurement.
    pub fn observe(&self, m: &Measurement) {
        self.set_reading("precipitacion", m.precipitacion);
        self.set_reading("velocidad_viento", m.velocidad_viento);
        self.set_reading("presion_atmosferica", m.presion_atmosferica);
        self.set_reading("temperatura", m.temperatura);
        self.set_reading("humedad", m.humedad);
    }

    fn set_reading(&self, field: &str, value: f64) {
        self.last_reading
            .get_or_create(&ReadingLabels {
                field: field.to_owned(),
            })
            .set(value);
    }
}
