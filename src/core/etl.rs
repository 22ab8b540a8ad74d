use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting exit factor computation");

        // Extract
        tracing::info!("📥 Extracting exit probabilities...");
        let probabilities = self.pipeline.extract().await?;
        tracing::info!("Extracted {} country probabilities", probabilities.len());
        self.monitor.log_stats("extract");

        // Transform
        tracing::info!("🔄 Computing incentive factors...");
        let report = self.pipeline.transform(probabilities).await?;
        tracing::info!(
            "Computed {} factors with strategy {}",
            report.factors.len(),
            report.strategy
        );
        self.monitor.log_stats("transform");

        // Load
        tracing::info!("💾 Writing results...");
        let output_path = self.pipeline.load(report).await?;
        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_stats("load");
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}
