//! Periodic connection probing.
//!
//! A [`ConnectionMonitor`] runs a [`BandwidthProbe`] on a repeating task,
//! folds each sample into a [`ConnectionEstimator`] and publishes the
//! latest [`ConnectionEstimate`] on a `watch` channel. Failed probes are
//! logged and leave the previous estimate in place.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use marquee_core::{ConnectionEstimate, FetchError, PlaybackSettings, RepeatingTask};
use tokio::sync::watch;

use crate::estimator::{ConnectionEstimator, ProbeSample};

/// Measures the network once.
#[async_trait]
pub trait BandwidthProbe: Send + Sync {
    async fn probe(&self) -> Result<ProbeSample, FetchError>;
}

/// Times a GET of a fixed test resource.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    const ENDPOINT: &'static str = "probe";

    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("marquee/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network {
                endpoint: Self::ENDPOINT.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    /// Probe configured in `[playback]`, if a probe URL is set.
    pub fn from_settings(settings: &PlaybackSettings) -> Result<Option<Self>, FetchError> {
        settings
            .probe_url
            .as_deref()
            .map(|url| Self::new(url, settings.probe_timeout()))
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn network_error(e: reqwest::Error) -> FetchError {
        FetchError::Network {
            endpoint: Self::ENDPOINT.to_string(),
            reason: e.to_string(),
        }
    }

    fn timeout_error(&self) -> FetchError {
        FetchError::Timeout {
            endpoint: Self::ENDPOINT.to_string(),
            after: self.timeout,
        }
    }
}

#[async_trait]
impl BandwidthProbe for HttpProbe {
    async fn probe(&self) -> Result<ProbeSample, FetchError> {
        let started = Instant::now();

        let response = tokio::time::timeout(self.timeout, self.client.get(&self.url).send())
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(Self::network_error)?;
        let latency = started.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: Self::ENDPOINT.to_string(),
                status: status.as_u16(),
            });
        }

        let remaining = self.timeout.saturating_sub(latency);
        let body = tokio::time::timeout(remaining, response.bytes())
            .await
            .map_err(|_| self.timeout_error())?
            .map_err(Self::network_error)?;

        Ok(ProbeSample {
            bytes: body.len() as u64,
            duration: started.elapsed(),
            latency,
        })
    }
}

/// Background probing with the latest estimate on a watch channel.
#[derive(Debug)]
pub struct ConnectionMonitor {
    task: RepeatingTask,
    estimate_rx: watch::Receiver<Option<ConnectionEstimate>>,
}

impl ConnectionMonitor {
    /// Start probing now and then every `interval`.
    pub fn spawn(probe: Arc<dyn BandwidthProbe>, interval: Duration) -> Self {
        let (estimate_tx, estimate_rx) = watch::channel(None);
        let estimate_tx = Arc::new(estimate_tx);
        let estimator = Arc::new(Mutex::new(ConnectionEstimator::new()));

        tracing::info!(interval_secs = interval.as_secs(), "Starting connection monitor");

        let task = RepeatingTask::spawn("connection-monitor", interval, move || {
            let probe = Arc::clone(&probe);
            let estimator = Arc::clone(&estimator);
            let estimate_tx = Arc::clone(&estimate_tx);
            async move {
                let sample = match probe.probe().await {
                    Ok(sample) => sample,
                    Err(e) => {
                        tracing::warn!(error = %e, "Connection probe failed, keeping last estimate");
                        return;
                    }
                };

                let estimate = {
                    let mut estimator = estimator.lock().unwrap_or_else(|p| p.into_inner());
                    estimator.push_sample(sample);
                    estimator.estimate()
                };

                if let Some(estimate) = estimate {
                    tracing::debug!(
                        speed_mbps = estimate.speed_mbps,
                        latency_ms = estimate.latency_ms,
                        tier = %estimate.quality_tier,
                        "Connection estimate updated"
                    );
                    estimate_tx.send_replace(Some(estimate));
                }
            }
        });

        Self { task, estimate_rx }
    }

    /// Monitor for the configured probe, or `None` when probing is off.
    pub fn from_settings(settings: &PlaybackSettings) -> Result<Option<Self>, FetchError> {
        Ok(HttpProbe::from_settings(settings)?
            .map(|probe| Self::spawn(Arc::new(probe), settings.probe_interval())))
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ConnectionEstimate>> {
        self.estimate_rx.clone()
    }

    pub fn latest(&self) -> Option<ConnectionEstimate> {
        *self.estimate_rx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Stop probing and wait for the task; returns the number of probes run.
    pub async fn shutdown(self) -> u64 {
        self.task.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marquee_core::QualityTier;
    use std::collections::VecDeque;

    struct ScriptedProbe {
        script: Mutex<VecDeque<Result<ProbeSample, FetchError>>>,
    }

    impl ScriptedProbe {
        fn new(script: Vec<Result<ProbeSample, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl BandwidthProbe for ScriptedProbe {
        async fn probe(&self) -> Result<ProbeSample, FetchError> {
            self.script
                .lock()
                .expect("script lock should not be poisoned")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(FetchError::Network {
                        endpoint: "probe".to_string(),
                        reason: "script exhausted".to_string(),
                    })
                })
        }
    }

    fn fast_sample() -> ProbeSample {
        ProbeSample {
            bytes: 2_500_000,
            duration: Duration::from_secs(1),
            latency: Duration::from_millis(20),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_publishes_estimate() {
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(fast_sample())]));
        let monitor = ConnectionMonitor::spawn(probe, Duration::from_secs(30));
        let mut rx = monitor.subscribe();

        rx.changed().await.expect("monitor should publish");
        let estimate = monitor.latest().expect("estimate should be published");
        assert_eq!(estimate.quality_tier, QualityTier::Excellent);

        let probes = monitor.shutdown().await;
        assert!(probes >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_keeps_last_estimate() {
        let probe = Arc::new(ScriptedProbe::new(vec![
            Ok(fast_sample()),
            Err(FetchError::Timeout {
                endpoint: "probe".to_string(),
                after: Duration::from_secs(10),
            }),
        ]));
        let monitor = ConnectionMonitor::spawn(probe, Duration::from_secs(30));
        let mut rx = monitor.subscribe();
        rx.changed().await.expect("monitor should publish");

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(monitor.latest().map(|e| e.quality_tier), Some(QualityTier::Excellent));
        monitor.shutdown().await;
    }

    #[test]
    fn test_probe_disabled_without_url() {
        let settings = PlaybackSettings::default();
        assert!(HttpProbe::from_settings(&settings)
            .expect("settings should be valid")
            .is_none());
    }

    #[tokio::test]
    async fn test_http_probe_unreachable_host() {
        let probe = HttpProbe::new("http://127.0.0.1:9/probe.bin", Duration::from_secs(2))
            .expect("probe should build");
        let err = probe.probe().await.expect_err("nothing listens there");
        assert_eq!(err.endpoint(), "probe");
    }
}
