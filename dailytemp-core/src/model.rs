use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;

use crate::error::TransportError;

/// Temperature in degrees Celsius (`units=metric`).
pub type Temperature = f64;

/// A point on the globe in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// One point-in-time query against the timemachine endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRequest {
    pub at: DateTime<Utc>,
    pub location: Coordinates,
}

impl SampleRequest {
    pub fn new(at: DateTime<Utc>, location: Coordinates) -> Self {
        Self { at, location }
    }

    /// Full request URL, including the `appid` token.
    pub fn url(&self, host: &str, token: &str) -> Result<Url, TransportError> {
        let url = Url::parse_with_params(
            &format!("https://{host}/data/3.0/onecall/timemachine"),
            &[
                ("lat", format!("{:.6}", self.location.lat)),
                ("lon", format!("{:.6}", self.location.lon)),
                ("dt", self.at.timestamp().to_string()),
                ("appid", token.to_string()),
                ("units", "metric".to_string()),
            ],
        )
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        Ok(url)
    }
}

/// Body of a successful timemachine response. Only `temp` of each record is read.
#[derive(Debug, Deserialize)]
pub(crate) struct TimeMachineResponse {
    pub data: Vec<TimeMachineRecord>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TimeMachineRecord {
    pub temp: f64,
}
