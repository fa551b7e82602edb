use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{BASE_OFFSET_MINUTES, DAY_SPAN_MINUTES},
    error::{ConfigError, SampleError},
    model::{Coordinates, Temperature},
    sampler::PointSampler,
};

/// Where in a day the samples fall.
///
/// Sample `i` of `n` is taken `ceil(base + span * i / n)` minutes after the
/// requested date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPlan {
    pub base_offset_minutes: u32,
    pub day_span_minutes: u32,
}

impl Default for SamplingPlan {
    fn default() -> Self {
        Self::new(BASE_OFFSET_MINUTES, DAY_SPAN_MINUTES)
    }
}

impl SamplingPlan {
    pub const fn new(base_offset_minutes: u32, day_span_minutes: u32) -> Self {
        Self {
            base_offset_minutes,
            day_span_minutes,
        }
    }

    /// Offsets in whole minutes, one per sample.
    pub fn offsets(&self, count: usize) -> Vec<i64> {
        let base = f64::from(self.base_offset_minutes);
        let span = f64::from(self.day_span_minutes);
        let n = count as f64;

        (0..count)
            .map(|i| (base + span * i as f64 / n).ceil() as i64)
            .collect()
    }

    pub fn timestamps(&self, date: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.offsets(count)
            .into_iter()
            .map(|minutes| date + Duration::minutes(minutes))
            .collect()
    }
}

/// Averages a fixed number of concurrent samples over one day.
///
/// All-or-nothing: either every sample succeeds and their mean is returned,
/// or the first failure observed is returned and the rest are abandoned.
/// When several samples fail at once, which error wins is not specified.
#[derive(Debug, Clone)]
pub struct DailyAggregator {
    sampler: Arc<PointSampler>,
    count: usize,
    plan: SamplingPlan,
}

impl DailyAggregator {
    pub fn new(sampler: Arc<PointSampler>, count: usize) -> Result<Self, ConfigError> {
        if count == 0 {
            return Err(ConfigError::InvalidSampleCount(count));
        }

        Ok(Self {
            sampler,
            count,
            plan: SamplingPlan::default(),
        })
    }

    pub fn with_plan(mut self, plan: SamplingPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn plan(&self) -> SamplingPlan {
        self.plan
    }

    /// Mean temperature of the day starting at `date`.
    ///
    /// Returns [`SampleError::Cancelled`] as soon as `cancel` fires, without
    /// waiting for samples still in flight.
    pub async fn compute(
        &self,
        cancel: &CancellationToken,
        date: DateTime<Utc>,
        location: &Coordinates,
    ) -> Result<Temperature, SampleError> {
        let scope = cancel.child_token();
        // Stragglers are cancelled on every exit path, and aborted when `tasks` drops.
        let _scope_guard = scope.clone().drop_guard();

        let mut tasks = JoinSet::new();
        for at in self.plan.timestamps(date, self.count) {
            let sampler = Arc::clone(&self.sampler);
            let scope = scope.clone();
            let location = *location;

            tasks.spawn(async move { sampler.sample(&scope, at, &location).await });
        }

        log::debug!(
            "scheduled {} samples for {} at {}",
            self.count,
            date,
            location
        );

        let mut sum = 0.0;
        let mut collected = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("aggregation for {} at {} cancelled", date, location);
                    return Err(SampleError::Cancelled);
                }
                next = tasks.join_next() => next,
            };

            match next {
                Some(Ok(Ok(temp))) => {
                    sum += temp;
                    collected += 1;
                }
                Some(Ok(Err(e))) => {
                    log::warn!(
                        "sample failed after {collected}/{} successes, aborting aggregation: {e}",
                        self.count
                    );
                    return Err(e);
                }
                Some(Err(source)) => return Err(SampleError::Task { source }),
                None => break,
            }
        }

        debug_assert_eq!(collected, self.count);
        let mean = sum / self.count as f64;

        log::info!(
            "daily mean for {} at {}: {:.2} over {} samples",
            date,
            location,
            mean,
            self.count
        );

        Ok(mean)
    }
}
