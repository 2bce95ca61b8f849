use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::{
    artifact_store::{discard_staged, staging_path, StagedArtifact},
    error::{EtlError, Result},
    models::{Edge, ExportManifest, Node, PropertyRecord},
};

pub const NODES_FILE: &str = "nodes.csv";
pub const RELATIONSHIPS_FILE: &str = "relationships.csv";
pub const PROPERTIES_FILE: &str = "other_resources_property.csv";
pub const MANIFEST_FILE: &str = "manifest.json";

pub const NODE_COLUMNS: &[&str] = &[
    "TYPE",
    "NAME",
    "NODE_ID",
    "source_primary",
    "source_secondary",
    "title",
    "source_link",
    "source_date",
    "pubmed_id",
    "country_of_origin",
];

#[derive(Debug, Serialize)]
struct NodeRow<'a> {
    #[serde(rename = "TYPE")]
    node_type: &'a str,
    #[serde(rename = "NAME")]
    name: &'a str,
    #[serde(rename = "NODE_ID")]
    node_id: &'a str,
    source_primary: Option<&'a str>,
    source_secondary: Option<&'a str>,
    title: Option<&'a str>,
    source_link: Option<&'a str>,
    source_date: Option<&'a str>,
    pubmed_id: Option<&'a str>,
    country_of_origin: Option<&'a str>,
}

impl<'a> From<&'a Node> for NodeRow<'a> {
    fn from(node: &'a Node) -> Self {
        let props = node.source.as_ref();
        Self {
            node_type: &node.node_type,
            name: &node.name,
            node_id: &node.node_id,
            source_primary: props.and_then(|p| p.source_primary.as_deref()),
            source_secondary: props.and_then(|p| p.source_secondary.as_deref()),
            title: props.and_then(|p| p.title.as_deref()),
            source_link: props.and_then(|p| p.source_link.as_deref()),
            source_date: props.and_then(|p| p.source_date.as_deref()),
            pubmed_id: props.and_then(|p| p.pubmed_id.as_deref()),
            country_of_origin: props.and_then(|p| p.country_of_origin.as_deref()),
        }
    }
}

pub fn relationship_columns(with_effectiveness: bool) -> Vec<&'static str> {
    let mut columns = vec!["START_ID", "END_ID", "TYPE"];
    if with_effectiveness {
        columns.push("is_effective");
    }
    columns
}

pub struct ExportBundle<'a> {
    pub nodes: &'a [Node],
    pub edges: &'a [Edge],
    pub properties: &'a [PropertyRecord],
    pub with_effectiveness: bool,
    pub manifest: &'a ExportManifest,
}

pub fn stage_exports(output_dir: &Path, bundle: &ExportBundle<'_>) -> Result<Vec<StagedArtifact>> {
    let mut staged = Vec::with_capacity(4);
    match stage_each(output_dir, bundle, &mut staged) {
        Ok(()) => Ok(staged),
        Err(err) => {
            discard_staged(&staged);
            Err(err)
        }
    }
}

fn stage_each(
    output_dir: &Path,
    bundle: &ExportBundle<'_>,
    staged: &mut Vec<StagedArtifact>,
) -> Result<()> {
    staged.push(stage_csv(&output_dir.join(NODES_FILE), |writer| {
        if bundle.nodes.is_empty() {
            writer.write_record(NODE_COLUMNS)?;
        }
        for node in bundle.nodes {
            writer.serialize(NodeRow::from(node))?;
        }
        Ok(())
    })?);

    staged.push(stage_csv(&output_dir.join(RELATIONSHIPS_FILE), |writer| {
        writer.write_record(relationship_columns(bundle.with_effectiveness))?;
        for edge in bundle.edges {
            if bundle.with_effectiveness {
                writer.write_record([
                    edge.start_id.as_str(),
                    edge.end_id.as_str(),
                    edge.relation_type.as_str(),
                    edge.is_effective.as_field().as_str(),
                ])?;
            } else {
                writer.write_record([
                    edge.start_id.as_str(),
                    edge.end_id.as_str(),
                    edge.relation_type.as_str(),
                ])?;
            }
        }
        Ok(())
    })?);

    staged.push(stage_csv(&output_dir.join(PROPERTIES_FILE), |writer| {
        if bundle.properties.is_empty() {
            writer.write_record([
                "external_source_id",
                "source_primary",
                "source_secondary",
                "title",
                "source_link",
                "source_date",
                "pubmed_id",
                "country_of_origin",
            ])?;
        }
        for record in bundle.properties {
            writer.serialize(record)?;
        }
        Ok(())
    })?);

    staged.push(stage_manifest(&output_dir.join(MANIFEST_FILE), bundle.manifest)?);

    info!(
        nodes = bundle.nodes.len(),
        relationships = bundle.edges.len(),
        properties = bundle.properties.len(),
        "Export artifacts staged"
    );
    Ok(())
}

fn stage_csv<F>(target: &Path, write_rows: F) -> Result<StagedArtifact>
where
    F: FnOnce(&mut Writer<BufWriter<File>>) -> csv::Result<()>,
{
    let staged = staging_path(target);
    let artifact = StagedArtifact {
        staged: staged.clone(),
        target: target.to_path_buf(),
    };

    let result = (|| {
        let file = File::create(&staged).map_err(|source| EtlError::Write {
            path: staged.clone(),
            source,
        })?;
        let mut writer = Writer::from_writer(BufWriter::new(file));
        write_rows(&mut writer).map_err(|source| EtlError::Serialize {
            path: target.to_path_buf(),
            source,
        })?;
        let buffered = writer.into_inner().map_err(|err| EtlError::Write {
            path: staged.clone(),
            source: err.into_error(),
        })?;
        let file = buffered.into_inner().map_err(|err| EtlError::Write {
            path: staged.clone(),
            source: err.into_error(),
        })?;
        file.sync_all().map_err(|source| EtlError::Write {
            path: staged.clone(),
            source,
        })
    })();

    match result {
        Ok(()) => Ok(artifact),
        Err(err) => {
            discard_staged(std::slice::from_ref(&artifact));
            Err(err)
        }
    }
}

fn stage_manifest(target: &Path, manifest: &ExportManifest) -> Result<StagedArtifact> {
    let staged = staging_path(target);
    let artifact = StagedArtifact {
        staged: staged.clone(),
        target: target.to_path_buf(),
    };

    let result = (|| {
        let file = File::create(&staged).map_err(|source| EtlError::Write {
            path: staged.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, manifest).map_err(|source| {
            EtlError::Manifest {
                path: target.to_path_buf(),
                source,
            }
        })?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|source| EtlError::Write {
                path: staged.clone(),
                source,
            })
    })();

    match result {
        Ok(()) => Ok(artifact),
        Err(err) => {
            discard_staged(std::slice::from_ref(&artifact));
            Err(err)
        }
    }
}
