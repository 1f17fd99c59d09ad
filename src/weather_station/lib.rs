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

//! Telemetry ingestion service for a weather station
//!
//! ## Features
//!
//! `weather_station` accepts sensor readings from a weather station over HTTP and keeps them in a
//! MongoDB collection. Each measurement has the following fields.
//!
//! * `precipitacion` - Precipitation, in mm.
//! * `velocidad_viento` - Wind speed, in m/s.
//! * `presion_atmosferica` - Atmospheric pressure, in hPa.
//! * `temperatura` - Temperature, in degrees celsius.
//! * `humedad` - Relative humidity (0-100). Values outside this range are rejected.
//! * `timestamp` - When the reading was taken. Set to the time the server received it if omitted.
//!
//! Measurements can be listed (most recent first), fetched, partially updated and deleted.
//!
//! ## Build
//!
//! `weather_station` is a Rust program and must be built from source using a
//! [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Server
//!
//! The server needs a MongoDB connection string. It can be given with `--mongo-uri` or the `MONGO_URI`
//! environment variable. The server refuses to start without one.
//!
//! ```text
//! MONGO_URI=mongodb://localhost:27017 ./weather_station --db-name weather_station
//! ```
//!
//! The HTTP API is exposed on port `8000` by default.
//!
//! | Method   | Path                 | Description                                      |
//! |----------|----------------------|--------------------------------------------------|
//! | `POST`   | `/mediciones`        | Store a new measurement                          |
//! | `GET`    | `/mediciones?limit=N`| Up to `N` (default 100) measurements, newest first |
//! | `GET`    | `/mediciones/ultima` | The most recent measurement                      |
//! | `GET`    | `/mediciones/{id}`   | A single measurement                             |
//! | `PUT`    | `/mediciones/{id}`   | Change only the fields sent                      |
//! | `DELETE` | `/mediciones/{id}`   | Delete a single measurement                      |
//! | `DELETE` | `/mediciones`        | Delete every measurement                         |
//! | `GET`    | `/admin/docs`        | API documentation, requires admin credentials    |
//! | `GET`    | `/metrics`           | Prometheus metrics                               |
//!
//! Only `/admin/docs` is authenticated, using HTTP basic auth against `--admin-user` and
//! `--admin-password` (or `ADMIN_USER` and `ADMIN_PASSWORD`). Every other route is open.
//!
//! ### Client
//!
//! `station_client` is a text menu for submitting and managing measurements by hand.
//!
//! ```text
//! ./station_client --base-url http://127.0.0.1:8000
//! ```
//!

pub mod client;
pub mod docs;
pub mod http;
pub mod memory;
pub mod metrics;
pub mod mongo;
pub mod service;
pub mod store;
