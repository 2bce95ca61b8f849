use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    artifact_store::{ensure_output_dir, promote, StagedArtifact},
    config::Config,
    export_writer::{stage_exports, ExportBundle},
    loader::load_inputs,
    models::{ManifestTotals, PipelineStage, RunSummary},
    transform::{build_graph, build_manifest, summarize},
};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub output_dir: PathBuf,
    pub artifacts: Vec<PathBuf>,
    pub totals: ManifestTotals,
    pub summary: RunSummary,
}

fn report_progress(stage: PipelineStage, progress: f32, message: impl AsRef<str>) {
    info!(
        stage = %stage,
        progress,
        message = %message.as_ref(),
        "Pipeline progress update"
    );
}

pub async fn run(config: &Config) -> Result<RunReport> {
    info!(
        environment = %config.environment.as_str(),
        triple_files = config.triple_files.len(),
        property_files = config.property_files.len(),
        output_dir = %config.output_dir.display(),
        "Pipeline run started"
    );

    ensure_output_dir(&config.output_dir)
        .await
        .with_context(|| format!("stage {} failed", PipelineStage::Export))?;

    let run_config = config.clone();
    let (staged, totals, summary) =
        tokio::task::spawn_blocking(move || build_and_stage(&run_config))
            .await
            .context("Pipeline task join error")??;

    report_progress(
        PipelineStage::Export,
        90.0,
        format!("Promoting {} artifacts", staged.len()),
    );
    promote(&staged)
        .await
        .with_context(|| format!("stage {} failed", PipelineStage::Export))?;

    log_summary(&summary);
    report_progress(PipelineStage::Export, 100.0, "Pipeline completed");

    Ok(RunReport {
        output_dir: config.output_dir.clone(),
        artifacts: staged.into_iter().map(|artifact| artifact.target).collect(),
        totals,
        summary,
    })
}

fn build_and_stage(config: &Config) -> Result<(Vec<StagedArtifact>, ManifestTotals, RunSummary)> {
    report_progress(PipelineStage::Load, 5.0, "Loading input files");
    let inputs = load_inputs(&config.triple_files, &config.property_files)
        .with_context(|| format!("stage {} failed", PipelineStage::Load))?;
    info!(
        triples = inputs.triples.triples.len(),
        invalid_triples = inputs.triples.invalid_count(),
        property_records = inputs.properties.records.len(),
        "Inputs loaded"
    );

    report_progress(
        PipelineStage::Resolve,
        25.0,
        format!("Resolving sources for {} triples", inputs.triples.triples.len()),
    );
    let build = build_graph(&inputs, &config.policy)?;

    let summary = summarize(&inputs, &build);
    let manifest = build_manifest(config.environment, &inputs, &build, summary.clone());

    report_progress(
        PipelineStage::Export,
        60.0,
        format!(
            "Writing {} nodes and {} relationships",
            build.nodes.nodes.len(),
            build.edges.edges.len()
        ),
    );
    let bundle = ExportBundle {
        nodes: &build.nodes.nodes,
        edges: &build.edges.edges,
        properties: &inputs.properties.records,
        with_effectiveness: inputs.triples.has_effectiveness_column,
        manifest: &manifest,
    };
    let staged = stage_exports(&config.output_dir, &bundle)
        .with_context(|| format!("stage {} failed", PipelineStage::Export))?;

    Ok((staged, manifest.totals, summary))
}

fn log_summary(summary: &RunSummary) {
    let rows_read: usize = summary.rows_read.values().sum();
    info!(
        rows_read,
        dropped_triples = summary.dropped_triples(),
        bare_sources = summary.bare_sources_created,
        duplicate_edges_merged = summary.duplicate_edges_merged,
        "Run summary"
    );

    if summary.dropped_triples() > 0 {
        warn!(
            dropped = summary.dropped_triples(),
            reasons = ?summary.invalid_triples,
            "Triples dropped during load"
        );
    }
    if summary.unresolved_endpoints > 0 {
        warn!(
            count = summary.unresolved_endpoints,
            "Relationships dropped for unresolved endpoints"
        );
    }
    if summary.unresolved_sources > 0 {
        warn!(
            count = summary.unresolved_sources,
            "Source edges dropped for unresolved source references"
        );
    }
    if summary.ambiguous_aliases > 0 {
        warn!(
            count = summary.ambiguous_aliases,
            "Ambiguous source aliases fell back to bare sources"
        );
    }
    if summary.unvalidated_external_ids > 0 {
        warn!(
            count = summary.unvalidated_external_ids,
            "External source ids not present in the property table"
        );
    }
    if summary.unparseable_effectiveness > 0 {
        warn!(
            count = summary.unparseable_effectiveness,
            "Effectiveness values could not be parsed"
        );
    }
    if summary.conflicting_effectiveness > 0 {
        warn!(
            count = summary.conflicting_effectiveness,
            "Relationships with conflicting effectiveness values"
        );
    }
    if summary.skipped_property_rows > 0 || summary.duplicate_property_ids > 0 {
        warn!(
            skipped = summary.skipped_property_rows,
            duplicates = summary.duplicate_property_ids,
            "Property rows skipped or overridden"
        );
    }
}
