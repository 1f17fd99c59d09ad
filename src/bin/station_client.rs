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
use reqwest::Client;
use std::error::Error;
use std::io::{self, Write};
use std::process;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::Level;
use weather_station::client::StationClient;
use weather_station::service::{Measurement, MeasurementUpdate, NewMeasurement};

const DEFAULT_LOG_LEVEL: Level = Level::WARN;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

const PROMPT_PRECIPITATION: &str = "Precipitación (mm): ";
const PROMPT_WIND_SPEED: &str = "Velocidad del viento (m/s): ";
const PROMPT_PRESSURE: &str = "Presión atmosférica (hPa): ";
const PROMPT_TEMPERATURE: &str = "Temperatura (°C): ";
const PROMPT_HUMIDITY: &str = "Humedad (%): ";

#[derive(Debug, Parser)]
#[clap(name = "station_client", version = clap::crate_version!())]
struct StationClientApplication {
    /// Base URL of the weather_station server
    #[clap(long, default_value_t = DEFAULT_BASE_URL.into())]
    base_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for each request to the server, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,
}

/// Line oriented reader for answers typed at the terminal.
struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn new() -> Self {
        Prompt {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn line(&mut self, msg: &str) -> io::Result<String> {
        print!("{}", msg);
        io::stdout().flush()?;

        match self.lines.next_line().await? {
            Some(l) => Ok(l.trim().to_owned()),
            None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed")),
        }
    }

    /// Ask until the answer is a number.
    async fn float(&mut self, msg: &str) -> io::Result<f64> {
        loop {
            match self.line(msg).await?.parse::<f64>() {
                Ok(v) => return Ok(v),
                Err(_) => println!("Valor inválido, escribe un número."),
            }
        }
    }

    /// Ask until the answer is a number or blank. Blank means no value.
    async fn optional_float(&mut self, msg: &str) -> io::Result<Option<f64>> {
        loop {
            let answer = self.line(msg).await?;
            if answer.is_empty() {
                return Ok(None);
            }

            match answer.parse::<f64>() {
                Ok(v) => return Ok(Some(v)),
                Err(_) => println!("Valor inválido, escribe un número o deja vacío."),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = StationClientApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let client = StationClient::new(http_client, &opts.base_url).unwrap_or_else(|e| {
        tracing::error!(message = "invalid base URL", error = %e);
        process::exit(1)
    });

    let mut prompt = Prompt::new();
    loop {
        print_menu();
        let choice = prompt.line("Selecciona una opción: ").await?;
        let res = match choice.as_str() {
            "1" => add(&client, &mut prompt).await,
            "2" => list(&client).await,
            "3" => update(&client, &mut prompt).await,
            "4" => delete(&client, &mut prompt).await,
            "5" => delete_all(&client).await,
            "6" => latest(&client).await,
            "0" => {
                println!("Saliendo...");
                break;
            }
            _ => {
                println!("Opción inválida");
                Ok(())
            }
        };

        if let Err(e) = res {
            println!("Error: {}", e);
        }
    }

    Ok(())
}

fn print_menu() {
    println!();
    println!("===== INTERFAZ USUARIO - ESTACIÓN METEOROLÓGICA =====");
    println!("1. Agregar nueva medición");
    println!("2. Listar mediciones");
    println!("3. Actualizar una medición");
    println!("4. Eliminar una medición por ID");
    println!("5. Eliminar TODAS las mediciones");
    println!("6. Ver la última medición");
    println!("0. Salir");
    println!("=====================================================");
}

fn print_measurement(m: &Measurement) {
    println!("----------------------------------------");
    println!("ID: {}", m.id);
    println!("Temperatura: {}", m.temperatura);
    println!("Humedad: {}", m.humedad);
    println!("Presión: {}", m.presion_atmosferica);
    println!("Viento: {}", m.velocidad_viento);
    println!("Precipitación: {}", m.precipitacion);
    println!("Fecha: {}", m.timestamp.to_rfc3339());
}

async fn add(client: &StationClient, prompt: &mut Prompt) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("\nAgregar nueva medición");
    let input = NewMeasurement {
        precipitacion: prompt.float(PROMPT_PRECIPITATION).await?,
        velocidad_viento: prompt.float(PROMPT_WIND_SPEED).await?,
        presion_atmosferica: prompt.float(PROMPT_PRESSURE).await?,
        temperatura: prompt.float(PROMPT_TEMPERATURE).await?,
        humedad: prompt.float(PROMPT_HUMIDITY).await?,
        timestamp: None,
    };

    let created = client.create(&input).await?;
    println!("Medición creada:");
    print_measurement(&created);
    Ok(())
}

async fn list(client: &StationClient) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("\nListando mediciones...");
    let measurements = client.list(None).await?;
    if measurements.is_empty() {
        println!("No hay mediciones todavía");
        return Ok(());
    }

    for m in &measurements {
        print_measurement(m);
    }
    println!("----------------------------------------");
    Ok(())
}

async fn update(client: &StationClient, prompt: &mut Prompt) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("\nActualizar una medición");
    let id = prompt.line("ID de la medición: ").await?;

    println!("Introduce los nuevos valores (deja vacío para no cambiarlo):");
    let input = MeasurementUpdate {
        precipitacion: prompt.optional_float(PROMPT_PRECIPITATION).await?,
        velocidad_viento: prompt.optional_float(PROMPT_WIND_SPEED).await?,
        presion_atmosferica: prompt.optional_float(PROMPT_PRESSURE).await?,
        temperatura: prompt.optional_float(PROMPT_TEMPERATURE).await?,
        humedad: prompt.optional_float(PROMPT_HUMIDITY).await?,
    };

    let updated = client.update(&id, &input).await?;
    println!("Medición actualizada:");
    print_measurement(&updated);
    Ok(())
}

async fn delete(client: &StationClient, prompt: &mut Prompt) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("\nEliminar medición");
    let id = prompt.line("ID de la medición: ").await?;
    let deleted = client.delete(&id).await?;
    println!("Medición {} eliminada", deleted.id);
    Ok(())
}

async fn delete_all(client: &StationClient) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("\nEliminando TODAS las mediciones...");
    let res = client.delete_all().await?;
    println!("{} mediciones eliminadas", res.deleted);
    Ok(())
}

async fn latest(client: &StationClient) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("\nÚltima medición");
    let m = client.latest().await?;
    print_measurement(&m);
    Ok(())
}
