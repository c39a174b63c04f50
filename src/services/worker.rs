use crate::services::analysis::AnalysisService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodic janitor over the upload and result directories
pub struct BackgroundWorker {
    analysis: Arc<AnalysisService>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        analysis: Arc<AnalysisService>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            analysis,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            "🚀 Background worker started (sweep every {}s)",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        tracing::debug!("🧹 Running periodic sweep...");
        let (uploads, results) = self.analysis.sweep_all().await;

        let deleted = uploads.deleted.len() + results.deleted.len();
        if deleted > 0 {
            tracing::info!("✅ Periodic sweep removed {} expired files", deleted);
        }
    }
}
