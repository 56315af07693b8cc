use crate::core::{FilterPlan, FilterReport, Pipeline};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct FilterEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> FilterEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Scan and plan only; nothing is written.
    pub async fn preview(&self) -> Result<FilterPlan> {
        tracing::info!("🔍 Scanning input bag...");
        let summary = self.pipeline.scan().await?;
        tracing::info!(
            "Found {} topics, {} messages",
            summary.topics.len(),
            summary.message_count
        );
        self.monitor.log_stats("Scan");

        let plan = self.pipeline.plan(summary).await?;
        tracing::info!("Selected {} topic(s)", plan.topics.len());
        self.monitor.log_stats("Plan");

        Ok(plan)
    }

    pub async fn run(&self) -> Result<FilterReport> {
        tracing::info!("🚀 Starting bag filter...");

        let plan = self.preview().await?;

        tracing::info!("💾 Writing filtered bag...");
        let report = self.pipeline.write(plan).await?;
        tracing::info!(
            "Wrote {} of {} messages on the selected topics to {}",
            report.messages_written,
            report.messages_read,
            report.output_path.display()
        );
        self.monitor.log_stats("Write");
        self.monitor.log_final_stats(report.messages_written);

        Ok(report)
    }
}
