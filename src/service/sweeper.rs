// service/sweeper.rs - Background Expiry Sweeper

use std::sync::Arc;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::registration::RegistrationService;

/// Periodically removes expired registrations.
///
/// Runs [`RegistrationService::cleanup`] once at start and then every
/// configured interval. The loop is a plain detached task; `stop` aborts it.
pub struct ExpirySweeper {
    service: Arc<RegistrationService>,

    /// Background task handle
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Create a sweeper over the service. The loop is not started yet.
    pub fn new(service: Arc<RegistrationService>) -> Self {
        Self {
            service,
            task: None,
        }
    }

    /// Start the background sweep loop.
    ///
    /// The interval comes from the service configuration. Starting again
    /// replaces a previous loop.
    pub fn start(&mut self) {
        self.stop();

        let service = Arc::clone(&self.service);
        let period = service.config().sweep_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                ticker.tick().await;

                match service.cleanup(Utc::now()).await {
                    Ok(swept) if !swept.is_empty() => {
                        debug!("Background sweep removed {} agent(s)", swept.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Background sweep failed: {}", e);
                    }
                }
            }
        });

        self.task = Some(handle);
        info!("Started expiry sweeper (interval: {:?})", period);
    }

    /// Stop the background sweep loop
    pub fn stop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            info!("Stopped expiry sweeper");
        }
    }

    /// Whether the sweep loop is currently running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{Ed25519Verifier, IssuerKey};
    use crate::config::PoidConfig;
    use crate::registry::MemoryStore;
    use crate::service::RegistrationRequest;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn sweeping_service(interval_secs: u64) -> (Arc<RegistrationService>, IssuerKey) {
        let issuer = IssuerKey::generate("test-ca");
        let verifier = Ed25519Verifier::new();
        verifier.trust_issuer(&issuer);
        let config = PoidConfig {
            sweep_interval_secs: interval_secs,
            ..PoidConfig::default()
        };
        let service =
            RegistrationService::new(config, Arc::new(verifier), Arc::new(MemoryStore::new()));
        (Arc::new(service), issuer)
    }

    #[tokio::test]
    async fn test_sweeper_runs_cleanup() {
        let (service, issuer) = sweeping_service(1);
        let certificate = issuer.issue(
            98,
            "sha256:ab12",
            Utc::now() + ChronoDuration::days(30),
        );
        service
            .register(
                RegistrationRequest::new("bot-1")
                    .with_capability("chat")
                    .with_certificate(certificate),
            )
            .await
            .unwrap();

        let mut sweeper = ExpirySweeper::new(Arc::clone(&service));
        sweeper.start();
        assert!(sweeper.is_running());

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(service.stats().sweeps >= 1);

        // Nothing expired, so the agent survives the sweep
        assert!(service.agent("bot-1").is_some());

        sweeper.stop();
        assert!(!sweeper.is_running());
    }

    #[tokio::test]
    async fn test_sweeper_restart_and_idempotent_stop() {
        let (service, _issuer) = sweeping_service(1);

        let mut sweeper = ExpirySweeper::new(service);
        sweeper.start();
        sweeper.start();
        assert!(sweeper.is_running());

        sweeper.stop();
        sweeper.stop();
        assert!(!sweeper.is_running());
    }
}
