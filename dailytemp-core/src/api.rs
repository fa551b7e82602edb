use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    aggregator::DailyAggregator,
    config::Config,
    error::{ConfigError, SampleError},
    model::{Coordinates, Temperature},
    sampler::PointSampler,
    transport::{ReqwestTransport, Transport},
};

/// Entry point: single-point and whole-day temperature lookups.
///
/// Built once per token/sample-count pair and reused across calls.
#[derive(Debug, Clone)]
pub struct OpenWeatherApi {
    sampler: Arc<PointSampler>,
    aggregator: DailyAggregator,
}

impl OpenWeatherApi {
    /// Construct a client talking to the real API over a pooled HTTPS transport.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.max_connections)?;
        Self::new(config, Arc::new(transport))
    }

    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        config.validate()?;

        let sampler = Arc::new(PointSampler::from_config(transport, config));
        let aggregator = DailyAggregator::new(Arc::clone(&sampler), config.count_measurement)?
            .with_plan(config.sampling_plan());

        Ok(Self {
            sampler,
            aggregator,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.aggregator.count()
    }

    /// Temperature at a single point in time.
    pub async fn temp_at(
        &self,
        cancel: &CancellationToken,
        at: DateTime<Utc>,
        location: &Coordinates,
    ) -> Result<Temperature, SampleError> {
        self.sampler.sample(cancel, at, location).await
    }

    /// Average temperature of the day starting at `date`.
    pub async fn daily_temp(
        &self,
        cancel: &CancellationToken,
        date: DateTime<Utc>,
        location: &Coordinates,
    ) -> Result<Temperature, SampleError> {
        self.aggregator.compute(cancel, date, location).await
    }
}
