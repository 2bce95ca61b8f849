use std::{env, time::Instant};

use anyhow::Result;
use kg_triple_etl::{
    config::{Config, PipelineEnv},
    pipeline,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kg_triple_etl=info".into()),
        )
        .init();

    // An environment name on the command line overrides KG_ETL_ENV.
    let config = match env::args().nth(1) {
        Some(raw) => {
            let environment = PipelineEnv::parse(&raw)?;
            Config::from_lookup(|key| match key {
                "KG_ETL_ENV" => Some(environment.as_str().to_string()),
                _ => env::var(key).ok(),
            })?
        }
        None => Config::from_env()?,
    };

    let started = Instant::now();
    match pipeline::run(&config).await {
        Ok(report) => {
            info!(
                environment = %config.environment.as_str(),
                nodes = report.totals.nodes,
                relationships = report.totals.relationships,
                output_dir = %report.output_dir.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "kg-triple-etl finished"
            );
            Ok(())
        }
        Err(err) => {
            error!(environment = %config.environment.as_str(), "Pipeline failed: {err:#}");
            Err(err)
        }
    }
}
