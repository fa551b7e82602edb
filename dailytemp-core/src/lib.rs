//! Core library for the `dailytemp` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - A single point-in-time temperature sampler over the OpenWeather timemachine API
//! - A daily aggregator that fans out concurrent samples and averages them
//!
//! It is used by `dailytemp-cli`, but can also be reused by other binaries or services.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod sampler;
pub mod transport;

pub use aggregator::{DailyAggregator, SamplingPlan};
pub use api::OpenWeatherApi;
pub use config::Config;
pub use error::{ConfigError, ErrorKind, SampleError, TransportError};
pub use model::{Coordinates, SampleRequest, Temperature};
pub use sampler::PointSampler;
pub use transport::{HttpResponse, ReqwestTransport, Transport};
pub use tokio_util::sync::CancellationToken;
