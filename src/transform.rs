use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::{
    config::{IdentityPolicy, PipelineEnv},
    export_writer::{MANIFEST_FILE, NODES_FILE, PROPERTIES_FILE, RELATIONSHIPS_FILE},
    loader::LoadedInputs,
    models::{ExportManifest, ManifestTotals, PipelineStage, RunSummary},
    node_builder::{build_nodes, NodeTable},
    relationship_builder::{build_relationships, EdgeTable},
    resolver::{resolve_sources, NameIdentityMap, ResolvedSources},
};

const EXPORT_SCHEMA_VERSION: &str = "kg-triple-etl.export.v1";

#[derive(Debug, Clone)]
pub struct GraphBuild {
    pub sources: ResolvedSources,
    pub nodes: NodeTable,
    pub edges: EdgeTable,
}

pub fn build_graph(inputs: &LoadedInputs, policy: &IdentityPolicy) -> Result<GraphBuild> {
    let triples = &inputs.triples.triples;
    let records = &inputs.properties.records;

    let map = NameIdentityMap::build(records, policy);
    let sources = resolve_sources(triples, records, &map, policy);
    info!(
        stage = %PipelineStage::Resolve,
        canonical_sources = sources.len(),
        bare = sources.stats.bare_sources_created,
        ambiguous_aliases = sources.stats.ambiguous_aliases,
        "Source identities resolved"
    );

    let nodes = build_nodes(triples, records, &sources, policy)
        .with_context(|| format!("stage {} failed", PipelineStage::BuildNodes))?;
    info!(
        stage = %PipelineStage::BuildNodes,
        entities = nodes.entity_count,
        sources = nodes.source_count,
        "Nodes built"
    );

    let edges = build_relationships(triples, &nodes, &sources, policy);
    info!(
        stage = %PipelineStage::BuildRelationships,
        relationships = edges.edges.len(),
        merged = edges.stats.duplicate_edges_merged,
        "Relationships built"
    );

    Ok(GraphBuild {
        sources,
        nodes,
        edges,
    })
}

pub fn summarize(inputs: &LoadedInputs, build: &GraphBuild) -> RunSummary {
    let mut rows_read = inputs.triples.rows_read.clone();
    rows_read.extend(inputs.properties.rows_read.clone());

    RunSummary {
        rows_read,
        invalid_triples: inputs
            .triples
            .invalid
            .iter()
            .map(|(reason, count)| (reason.as_str().to_string(), *count))
            .collect(),
        skipped_property_rows: inputs.properties.skipped_rows,
        duplicate_property_ids: inputs.properties.duplicate_ids,
        ambiguous_aliases: build.sources.stats.ambiguous_aliases,
        unvalidated_external_ids: build.sources.stats.unvalidated_external_ids,
        bare_sources_created: build.sources.stats.bare_sources_created,
        unresolved_endpoints: build.edges.stats.unresolved_endpoints,
        unresolved_sources: build.edges.stats.unresolved_sources,
        unparseable_effectiveness: build.edges.stats.unparseable_effectiveness,
        duplicate_edges_merged: build.edges.stats.duplicate_edges_merged,
        conflicting_effectiveness: build.edges.stats.conflicting_effectiveness,
    }
}

pub fn build_manifest(
    environment: PipelineEnv,
    inputs: &LoadedInputs,
    build: &GraphBuild,
    summary: RunSummary,
) -> ExportManifest {
    let mut node_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut relationship_types: BTreeMap<String, usize> = BTreeMap::new();

    for node in &build.nodes.nodes {
        *node_types.entry(node.node_type.clone()).or_insert(0) += 1;
    }
    for edge in &build.edges.edges {
        *relationship_types
            .entry(edge.relation_type.clone())
            .or_insert(0) += 1;
    }

    ExportManifest {
        schema_version: EXPORT_SCHEMA_VERSION.to_string(),
        environment: environment.as_str().to_string(),
        generated_at: Utc::now(),
        triple_inputs: inputs.triple_paths.clone(),
        property_inputs: inputs.property_paths.clone(),
        artifacts: [NODES_FILE, RELATIONSHIPS_FILE, PROPERTIES_FILE, MANIFEST_FILE]
            .iter()
            .map(|name| name.to_string())
            .collect(),
        totals: ManifestTotals {
            triples: inputs.triples.triples.len(),
            property_records: inputs.properties.records.len(),
            nodes: build.nodes.nodes.len(),
            source_nodes: build.nodes.source_count,
            relationships: build.edges.edges.len(),
        },
        node_types,
        relationship_types,
        summary,
    }
}
