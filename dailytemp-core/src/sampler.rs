use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, DEFAULT_HOST, DEFAULT_MAX_CONNECTIONS, DEFAULT_REQUEST_TIMEOUT},
    error::{SampleError, TransportError},
    model::{Coordinates, SampleRequest, Temperature, TimeMachineResponse},
    transport::{HttpResponse, Transport},
};

/// Fetches the temperature at a single point in time.
///
/// Every concurrent call shares one connection ceiling: callers beyond
/// `max_connections` wait for a slot instead of failing, and that wait is not
/// counted against the per-request timeout.
#[derive(Debug)]
pub struct PointSampler {
    transport: Arc<dyn Transport>,
    host: String,
    token: String,
    timeout: Duration,
    pool: Arc<Semaphore>,
    max_connections: usize,
}

impl PointSampler {
    pub fn new(transport: Arc<dyn Transport>, token: impl Into<String>) -> Self {
        Self {
            transport,
            host: DEFAULT_HOST.to_string(),
            token: token.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            pool: Arc::new(Semaphore::new(DEFAULT_MAX_CONNECTIONS)),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn from_config(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self::new(transport, config.token.clone())
            .with_host(config.host.clone())
            .with_timeout(config.request_timeout())
            .with_max_connections(config.max_connections)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Zero is clamped to one slot.
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self.pool = Arc::new(Semaphore::new(self.max_connections));
        self
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Free connection slots. Equals [`max_connections`](Self::max_connections) when idle.
    pub fn available_connections(&self) -> usize {
        self.pool.available_permits()
    }

    /// Temperature at `at` for `location`, or the reason there is none.
    ///
    /// Cancelling `cancel` drops the in-flight request, which releases its
    /// connection slot, and yields [`SampleError::Cancelled`].
    pub async fn sample(
        &self,
        cancel: &CancellationToken,
        at: DateTime<Utc>,
        location: &Coordinates,
    ) -> Result<Temperature, SampleError> {
        let request = SampleRequest::new(at, *location);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("sample dt={} at {} cancelled", at.timestamp(), location);
                Err(SampleError::Cancelled)
            }
            outcome = self.fetch(&request) => outcome,
        }
    }

    async fn fetch(&self, request: &SampleRequest) -> Result<Temperature, SampleError> {
        let url = request.url(&self.host, &self.token)?;

        let _permit = self.pool.acquire().await.map_err(|_| SampleError::Cancelled)?;

        log::debug!(
            "requesting temperature dt={} at {}",
            request.at.timestamp(),
            request.location
        );

        let res = tokio::time::timeout(self.timeout, self.transport.get(url))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        classify(request, &res)
    }
}

fn classify(request: &SampleRequest, res: &HttpResponse) -> Result<Temperature, SampleError> {
    match res.status {
        200 => {
            let parsed: TimeMachineResponse = serde_json::from_slice(&res.body)
                .map_err(|source| SampleError::Parse { source })?;

            // Upstream may return finer granularity than asked for; the first record wins.
            parsed
                .data
                .first()
                .map(|record| record.temp)
                .ok_or(SampleError::EmptyResult)
        }
        429 => Err(SampleError::RateLimited {
            at: request.at,
            location: request.location,
        }),
        status => Err(SampleError::Remote {
            status,
            at: request.at,
            location: request.location,
            body: truncate_body(&res.body_text()),
        }),
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        transport::mock::{MockTransport, Reply, fail, ok_temp, status},
    };
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap()
    }

    fn berlin() -> Coordinates {
        Coordinates::new(52.52, 13.405)
    }

    fn sampler(mock: &Arc<MockTransport>) -> PointSampler {
        let transport: Arc<dyn Transport> = mock.clone();
        PointSampler::new(transport, "TOKEN")
    }

    async fn sample_now(mock: &Arc<MockTransport>) -> Result<Temperature, SampleError> {
        sampler(mock)
            .sample(&CancellationToken::new(), at(), &berlin())
            .await
    }

    fn respond(code: u16, body: &'static str) -> MockTransport {
        MockTransport::new(move |_| status(code, body))
    }

    #[tokio::test]
    async fn returns_first_record_temperature() {
        let mock = Arc::new(respond(200, r#"{"data":[{"temp":21.5},{"temp":30.0}]}"#));

        let temp = sample_now(&mock).await;

        assert_eq!(temp.unwrap(), 21.5);
        assert_eq!(mock.calls().len(), 1);
        assert_eq!(mock.requested_dts(), vec![at().timestamp()]);
    }

    #[tokio::test]
    async fn requests_configured_host_with_token() {
        let mock = Arc::new(MockTransport::new(|_| ok_temp(1.0)));
        let sampler = sampler(&mock).with_host("weather.test");

        sampler
            .sample(&CancellationToken::new(), at(), &berlin())
            .await
            .unwrap();

        let url = &mock.calls()[0];
        assert_eq!(url.host_str(), Some("weather.test"));
        assert!(url.query_pairs().any(|(k, v)| k == "appid" && v == "TOKEN"));
    }

    #[tokio::test]
    async fn status_429_is_rate_limited_regardless_of_body() {
        let mock = Arc::new(respond(429, r#"{"data":[{"temp":10.0}]}"#));

        let err = sample_now(&mock).await.unwrap_err();

        match err {
            SampleError::RateLimited { at: when, location } => {
                assert_eq!(when, at());
                assert_eq!(location, berlin());
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_status_is_remote_error_with_context() {
        let mock = Arc::new(respond(401, r#"{"cod":401,"message":"Invalid API key"}"#));

        let err = sample_now(&mock).await.unwrap_err();

        match err {
            SampleError::Remote {
                status,
                at: when,
                location,
                body,
            } => {
                assert_eq!(status, 401);
                assert_eq!(when, at());
                assert_eq!(location, berlin());
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_200_success_status_is_still_remote_error() {
        let mock = Arc::new(respond(204, ""));

        let err = sample_now(&mock).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[tokio::test]
    async fn malformed_body_is_parse_failure() {
        let mock = Arc::new(respond(200, "<html>not json</html>"));

        let err = sample_now(&mock).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn empty_data_is_empty_result() {
        let mock = Arc::new(respond(200, r#"{"data":[]}"#));

        let err = sample_now(&mock).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EmptyResult);
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let mock = Arc::new(MockTransport::new(|_| fail("connection refused")));

        let err = sample_now(&mock).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn slow_response_times_out_as_transport_error() {
        let mock = Arc::new(MockTransport::new(|_| Reply::Hang));
        let sampler = sampler(&mock).with_timeout(Duration::from_millis(50));

        let err = sampler.sample(&CancellationToken::new(), at(), &berlin()).await.unwrap_err();

        assert!(matches!(
            err,
            SampleError::Transport {
                source: TransportError::Timeout(_)
            }
        ));
        assert_eq!(mock.in_flight(), 0);
        assert_eq!(sampler.available_connections(), sampler.max_connections());
    }

    #[tokio::test]
    async fn cancellation_abandons_in_flight_request() {
        let mock = Arc::new(MockTransport::new(|_| Reply::Hang));
        let sampler = sampler(&mock);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = sampler.sample(&cancel, at(), &berlin()).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(mock.calls().len(), 1);
        assert_eq!(mock.in_flight(), 0);
        assert_eq!(sampler.available_connections(), sampler.max_connections());
    }

    #[tokio::test]
    async fn already_cancelled_token_sends_nothing() {
        let mock = Arc::new(MockTransport::new(|_| ok_temp(5.0)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = sampler(&mock)
            .sample(&cancel, at(), &berlin())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn waiting_for_a_connection_does_not_count_against_timeout() {
        let mock = Arc::new(
            MockTransport::new(|_| ok_temp(3.0))
                .with_delay(Duration::from_millis(60))
                .with_connection_limit(1),
        );
        let sampler = Arc::new(
            sampler(&mock)
                .with_max_connections(1)
                .with_timeout(Duration::from_millis(150)),
        );
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let sampler = Arc::clone(&sampler);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                sampler.sample(&cancel, at(), &berlin()).await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 3.0);
        }
        assert_eq!(mock.peak(), 1);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);

        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
