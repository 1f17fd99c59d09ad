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

use clap::Parser;
use prometheus_client::registry::Registry;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;
use weather_station::http::{AdminCredentials, RequestContext};
use weather_station::memory::MemoryStore;
use weather_station::metrics::MeasurementMetrics;
use weather_station::mongo::MongoStore;
use weather_station::service::MeasurementService;
use weather_station::store::MeasurementStore;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8000);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_DB_NAME: &str = "weather_station";
const DEFAULT_COLLECTION: &str = "mediciones";
const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
const METRICS_PREFIX: &str = "station";

#[derive(Debug, Parser)]
#[clap(name = "weather_station", version = clap::crate_version!())]
struct WeatherStationApplication {
    /// MongoDB connection string. The server will not start without one unless
    /// --memory-store is used.
    #[clap(long, env = "MONGO_URI", hide_env_values = true, required_unless_present = "memory_store")]
    mongo_uri: Option<String>,

    /// Database measurements are stored in
    #[clap(long, env = "DB_NAME", default_value_t = DEFAULT_DB_NAME.into())]
    db_name: String,

    /// Collection measurements are stored in
    #[clap(long, env = "COLLECTION", default_value_t = DEFAULT_COLLECTION.into())]
    collection: String,

    /// Username required for the admin documentation page
    #[clap(long, env = "ADMIN_USER", default_value_t = DEFAULT_ADMIN_USER.into())]
    admin_user: String,

    /// Password required for the admin documentation page
    #[clap(long, env = "ADMIN_PASSWORD", hide_env_values = true, default_value_t = DEFAULT_ADMIN_PASSWORD.into())]
    admin_password: String,

    /// Keep measurements in memory instead of MongoDB. Everything is lost when the
    /// server stops, only useful for development.
    #[clap(long)]
    memory_store: bool,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for connecting to MongoDB and selecting a server for each operation, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, weather_station will bind to public address since
    /// the purpose is to accept measurements from a station on the network.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Settings may come from a .env file in the working directory, real environment
    // variables take precedence.
    let env_file = dotenvy::dotenv().ok();
    let opts = WeatherStationApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    if let Some(path) = env_file {
        tracing::info!(message = "loaded settings from env file", path = %path.display());
    }

    let timeout = Duration::from_millis(opts.timeout_millis);
    let (store, mongo): (Arc<dyn MeasurementStore>, Option<MongoStore>) = match (&opts.mongo_uri, opts.memory_store) {
        (_, true) => {
            tracing::warn!("using in-memory store, measurements will not be persisted");
            let store: Arc<dyn MeasurementStore> = Arc::new(MemoryStore::new());
            (store, None)
        }
        (Some(uri), false) => {
            let mongo = MongoStore::connect(uri, &opts.db_name, &opts.collection, timeout)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!(message = "unable to connect to store", error = %e);
                    process::exit(1)
                });

            tracing::info!(message = "store connected", database = %opts.db_name, collection = %opts.collection);
            let store: Arc<dyn MeasurementStore> = Arc::new(mongo.clone());
            (store, Some(mongo))
        }
        (None, false) => {
            tracing::error!("no MongoDB connection string provided");
            process::exit(1)
        }
    };

    let mut registry = Registry::with_prefix(METRICS_PREFIX);
    let metrics = MeasurementMetrics::new(&mut registry);
    let service = MeasurementService::new(store);
    let admin = AdminCredentials::new(opts.admin_user.clone(), opts.admin_password.clone());
    let context = Arc::new(RequestContext::new(service, metrics, registry, admin));
    let handler = weather_station::http::router(context);

    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(handler.into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());
    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    if let Some(mongo) = mongo {
        mongo.close().await;
        tracing::info!("store closed");
    }

    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
