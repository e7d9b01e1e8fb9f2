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
        tracing::info!("Starting pricing ETL process...");

        // Extract
        let collected = self.pipeline.extract().await?;
        tracing::info!(
            "Extracted {} municipality rows and {} observations",
            collected.municipalities.len(),
            collected.observations.len()
        );
        self.monitor.log_stats("extract");

        // Transform：聚合 → 插值 → 組裝
        let result = self.pipeline.transform(collected).await?;
        tracing::info!(
            "Assembled pricing for {} municipalities in {} regions",
            result.document.municipality_count(),
            result.document.regions().len()
        );
        self.monitor.log_stats("transform");

        // Load
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_stats("load");
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}
