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

use crate::http::ErrorBody;
use crate::service::{Deleted, DeletedCount, Measurement, MeasurementUpdate, NewMeasurement};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    Api(StatusCode, String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(u) => write!(f, "invalid url {}", u),
            Self::Api(status, detail) => write!(f, "{}: {}", status, detail),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for the measurement REST API exposed by the `weather_station` server.
#[derive(Debug)]
pub struct StationClient {
    client: Client,
    base_url: Url,
}

impl StationClient {
    const USER_AGENT: &'static str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|_| ClientError::InvalidUrl(base_url.to_owned()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        Ok(StationClient { client, base_url })
    }

    pub async fn create(&self, input: &NewMeasurement) -> Result<Measurement, ClientError> {
        let req = self.request(Method::POST, &[]).json(input);
        self.send(req).await
    }

    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<Measurement>, ClientError> {
        let mut req = self.request(Method::GET, &[]);
        if let Some(l) = limit {
            req = req.query(&[("limit", l)]);
        }

        self.send(req).await
    }

    pub async fn latest(&self) -> Result<Measurement, ClientError> {
        self.send(self.request(Method::GET, &["ultima"])).await
    }

    pub async fn update(&self, id: &str, input: &MeasurementUpdate) -> Result<Measurement, ClientError> {
        let req = self.request(Method::PUT, &[id]).json(input);
        self.send(req).await
    }

    pub async fn delete(&self, id: &str) -> Result<Deleted, ClientError> {
        self.send(self.request(Method::DELETE, &[id])).await
    }

    pub async fn delete_all(&self) -> Result<DeletedCount, ClientError> {
        self.send(self.request(Method::DELETE, &[])).await
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.measurements_url(segments);
        tracing::debug!(message = "making measurement request", method = %method, url = %url);

        self.client
            .request(method, url)
            .header(USER_AGENT, Self::USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let res = req.send().await.map_err(ClientError::Internal)?;
        let res = Self::check_status(res).await?;
        res.json::<T>().await.map_err(ClientError::Internal)
    }

    async fn check_status(res: Response) -> Result<Response, ClientError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let text = res.text().await.map_err(ClientError::Internal)?;
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.detail)
            .unwrap_or(text);

        Err(ClientError::Api(status, detail))
    }

    fn measurements_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut p) = url.path_segments_mut() {
            // Segments are percent-encoded as they are pushed
            p.pop_if_empty().push("mediciones").extend(segments);
        }

        url
    }
}
