use std::{collections::BTreeMap, fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SOURCE_RELATION: &str = "SOURCE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub x_name: String,
    pub x_type: String,
    pub relation: String,
    pub y_name: String,
    pub y_type: String,
    pub x_source: Option<String>,
    pub y_source: Option<String>,
    pub x_external_source_id: Option<String>,
    pub y_external_source_id: Option<String>,
    pub is_effective: Option<String>,
}

impl Triple {
    pub fn subject_source_ref(&self) -> Option<&str> {
        self.x_external_source_id
            .as_deref()
            .or(self.x_source.as_deref())
    }

    pub fn object_source_ref(&self) -> Option<&str> {
        self.y_external_source_id
            .as_deref()
            .or(self.y_source.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidTripleReason {
    MissingSubjectName,
    MissingSubjectType,
    MissingRelation,
    MissingObjectName,
    MissingObjectType,
}

impl InvalidTripleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingSubjectName => "missing_subject_name",
            Self::MissingSubjectType => "missing_subject_type",
            Self::MissingRelation => "missing_relation",
            Self::MissingObjectName => "missing_object_name",
            Self::MissingObjectType => "missing_object_type",
        }
    }
}

// Field order here is the column order of the audit property file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub external_source_id: String,
    pub source_primary: Option<String>,
    pub source_secondary: Option<String>,
    pub title: Option<String>,
    pub source_link: Option<String>,
    pub source_date: Option<String>,
    pub pubmed_id: Option<String>,
    pub country_of_origin: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceProperties {
    pub source_primary: Option<String>,
    pub source_secondary: Option<String>,
    pub title: Option<String>,
    pub source_link: Option<String>,
    pub source_date: Option<String>,
    pub pubmed_id: Option<String>,
    pub country_of_origin: Option<String>,
}

impl From<&PropertyRecord> for SourceProperties {
    fn from(record: &PropertyRecord) -> Self {
        Self {
            source_primary: record.source_primary.clone(),
            source_secondary: record.source_secondary.clone(),
            title: record.title.clone(),
            source_link: record.source_link.clone(),
            source_date: record.source_date.clone(),
            pubmed_id: record.pubmed_id.clone(),
            country_of_origin: record.country_of_origin.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub node_id: String,
    pub node_type: String,
    pub name: String,
    pub source: Option<SourceProperties>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Effectiveness {
    Known(i64),
    #[default]
    Unknown,
}

impl Effectiveness {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return Some(Self::Known(value));
        }
        let value = trimmed.parse::<f64>().ok()?;
        if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            Some(Self::Known(value as i64))
        } else {
            None
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn as_field(&self) -> String {
        match self {
            Self::Known(value) => value.to_string(),
            Self::Unknown => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub start_id: String,
    pub end_id: String,
    pub relation_type: String,
    pub is_effective: Effectiveness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Load,
    Resolve,
    BuildNodes,
    BuildRelationships,
    Export,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Resolve => "resolve",
            Self::BuildNodes => "build_nodes",
            Self::BuildRelationships => "build_relationships",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub rows_read: BTreeMap<String, usize>,
    pub invalid_triples: BTreeMap<String, usize>,
    pub skipped_property_rows: usize,
    pub duplicate_property_ids: usize,
    pub ambiguous_aliases: usize,
    pub unvalidated_external_ids: usize,
    pub bare_sources_created: usize,
    pub unresolved_endpoints: usize,
    pub unresolved_sources: usize,
    pub unparseable_effectiveness: usize,
    pub duplicate_edges_merged: usize,
    pub conflicting_effectiveness: usize,
}

impl RunSummary {
    pub fn dropped_triples(&self) -> usize {
        self.invalid_triples.values().sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportManifest {
    pub schema_version: String,
    pub environment: String,
    pub generated_at: DateTime<Utc>,
    pub triple_inputs: Vec<PathBuf>,
    pub property_inputs: Vec<PathBuf>,
    pub artifacts: Vec<String>,
    pub totals: ManifestTotals,
    pub node_types: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestTotals {
    pub triples: usize,
    pub property_records: usize,
    pub nodes: usize,
    pub source_nodes: usize,
    pub relationships: usize,
}
