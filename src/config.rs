use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEnv {
    Dev,
    Prod,
}

impl PipelineEnv {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            other => bail!("Unsupported KG_ETL_ENV `{other}`. Supported: dev, prod."),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub required: bool,
}

impl InputFile {
    pub fn required(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: true,
        }
    }

    pub fn optional(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPolicy {
    pub source_type: String,
    pub external_id_prefix: String,
    pub bare_id_prefix: String,
    pub entity_id_prefix: String,
    pub bare_source_label: String,
    pub emit_unreferenced_sources: bool,
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        Self {
            source_type: "source".to_string(),
            external_id_prefix: "es_".to_string(),
            bare_id_prefix: "s_".to_string(),
            entity_id_prefix: "n_".to_string(),
            bare_source_label: "PrimeKG".to_string(),
            emit_unreferenced_sources: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: PipelineEnv,
    pub data_root: PathBuf,
    pub triple_files: Vec<InputFile>,
    pub property_files: Vec<InputFile>,
    pub output_dir: PathBuf,
    pub policy: IdentityPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("KG_ETL_ENV") {
            Some(raw) => PipelineEnv::parse(&raw)?,
            None => PipelineEnv::Dev,
        };

        let data_root = PathBuf::from(
            lookup("KG_ETL_DATA_ROOT")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "data".to_string()),
        );

        let mut config = Self::for_environment(&data_root, environment);

        if let Some(files) = lookup("KG_ETL_TRIPLE_FILES").and_then(|v| parse_path_list(&v)) {
            config.triple_files = files.into_iter().map(InputFile::required).collect();
        }

        if let Some(files) = lookup("KG_ETL_PROPERTY_FILES").and_then(|v| parse_path_list(&v)) {
            config.property_files = files.into_iter().map(InputFile::required).collect();
        }

        if let Some(dir) = lookup("KG_ETL_OUTPUT_DIR")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            config.output_dir = PathBuf::from(dir);
        }

        let defaults = IdentityPolicy::default();
        config.policy = IdentityPolicy {
            source_type: non_empty(lookup("KG_ETL_SOURCE_TYPE")).unwrap_or(defaults.source_type),
            external_id_prefix: non_empty(lookup("KG_ETL_EXTERNAL_ID_PREFIX"))
                .unwrap_or(defaults.external_id_prefix),
            bare_id_prefix: defaults.bare_id_prefix,
            entity_id_prefix: defaults.entity_id_prefix,
            bare_source_label: non_empty(lookup("KG_ETL_BARE_SOURCE_LABEL"))
                .unwrap_or(defaults.bare_source_label),
            emit_unreferenced_sources: lookup("KG_ETL_EMIT_UNREFERENCED_SOURCES")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.emit_unreferenced_sources),
        };

        if config.policy.external_id_prefix == config.policy.bare_id_prefix
            || config.policy.external_id_prefix == config.policy.entity_id_prefix
        {
            bail!(
                "KG_ETL_EXTERNAL_ID_PREFIX `{}` collides with a pipeline-assigned id prefix",
                config.policy.external_id_prefix
            );
        }

        Ok(config)
    }

    pub fn for_environment(data_root: &Path, environment: PipelineEnv) -> Self {
        let env_dir = data_root.join(environment.as_str());
        let input_dir = env_dir.join("input");

        Self {
            environment,
            data_root: data_root.to_path_buf(),
            triple_files: vec![
                InputFile::required(input_dir.join("1_kg.csv")),
                InputFile::optional(input_dir.join("2_other_resources_triple.csv")),
            ],
            property_files: vec![InputFile::required(
                input_dir.join("3_other_resources_property.csv"),
            )],
            output_dir: env_dir.join("output"),
            policy: IdentityPolicy::default(),
        }
    }
}

fn parse_path_list(raw: &str) -> Option<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = raw
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .collect();
    if paths.is_empty() {
        None
    } else {
        Some(paths)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
