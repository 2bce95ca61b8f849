use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, Trim};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info, warn};

use crate::{
    config::InputFile,
    error::{EtlError, Result},
    models::{InvalidTripleReason, PropertyRecord, Triple},
};

pub const TRIPLE_REQUIRED_COLUMNS: &[&str] = &[
    "x_name", "x_type", "relation", "y_name", "y_type", "x_source", "y_source",
];
pub const PROPERTY_REQUIRED_COLUMNS: &[&str] =
    &["external_source_id", "source_primary", "source_secondary"];
pub const EFFECTIVENESS_COLUMN: &str = "is_effective";

// Spellings pandas-generated exports use for a missing cell.
const NULL_SPELLINGS: &[&str] = &["nan", "null", "none", "n/a", "na"];

#[derive(Debug, Deserialize)]
struct TripleRow {
    x_name: Option<String>,
    x_type: Option<String>,
    relation: Option<String>,
    y_name: Option<String>,
    y_type: Option<String>,
    x_source: Option<String>,
    y_source: Option<String>,
    #[serde(default)]
    x_external_source_id: Option<String>,
    #[serde(default)]
    y_external_source_id: Option<String>,
    #[serde(default)]
    is_effective: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PropertyRow {
    external_source_id: Option<String>,
    source_primary: Option<String>,
    source_secondary: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source_link: Option<String>,
    #[serde(default)]
    source_date: Option<String>,
    #[serde(default)]
    pubmed_id: Option<String>,
    #[serde(default)]
    country_of_origin: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TripleTable {
    pub triples: Vec<Triple>,
    pub has_effectiveness_column: bool,
    pub rows_read: BTreeMap<String, usize>,
    pub invalid: BTreeMap<InvalidTripleReason, usize>,
}

impl TripleTable {
    pub fn invalid_count(&self) -> usize {
        self.invalid.values().sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    pub records: Vec<PropertyRecord>,
    pub rows_read: BTreeMap<String, usize>,
    pub duplicate_ids: usize,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedInputs {
    pub triples: TripleTable,
    pub properties: PropertyTable,
    pub triple_paths: Vec<PathBuf>,
    pub property_paths: Vec<PathBuf>,
}

pub fn load_inputs(triple_files: &[InputFile], property_files: &[InputFile]) -> Result<LoadedInputs> {
    let triple_paths = present_paths(triple_files)?;
    let property_paths = present_paths(property_files)?;

    let triples = load_triples(&triple_paths)?;
    let properties = load_properties(&property_paths)?;

    Ok(LoadedInputs {
        triples,
        properties,
        triple_paths,
        property_paths,
    })
}

pub fn load_triples(paths: &[PathBuf]) -> Result<TripleTable> {
    let mut table = TripleTable::default();

    for path in paths {
        let (rows, headers) = read_rows::<TripleRow>(path, TRIPLE_REQUIRED_COLUMNS)?;
        if headers.iter().any(|h| h == EFFECTIVENESS_COLUMN) {
            table.has_effectiveness_column = true;
        }

        let mut dropped = 0usize;
        let row_count = rows.len();
        for row in rows {
            match validate_triple(row) {
                Ok(triple) => table.triples.push(triple),
                Err(reason) => {
                    dropped += 1;
                    *table.invalid.entry(reason).or_insert(0) += 1;
                }
            }
        }

        info!(
            path = %path.display(),
            rows = row_count,
            dropped,
            "Loaded triple file"
        );
        table.rows_read.insert(path.display().to_string(), row_count);
    }

    Ok(table)
}

pub fn load_properties(paths: &[PathBuf]) -> Result<PropertyTable> {
    let mut table = PropertyTable::default();
    let mut position_by_id: HashMap<String, usize> = HashMap::new();

    for path in paths {
        let (rows, _) = read_rows::<PropertyRow>(path, PROPERTY_REQUIRED_COLUMNS)?;
        let row_count = rows.len();

        for row in rows {
            let Some(external_source_id) = clean(row.external_source_id) else {
                table.skipped_rows += 1;
                continue;
            };

            let record = PropertyRecord {
                external_source_id,
                source_primary: clean(row.source_primary),
                source_secondary: clean(row.source_secondary),
                title: clean(row.title),
                source_link: clean(row.source_link),
                source_date: clean(row.source_date),
                pubmed_id: clean(row.pubmed_id),
                country_of_origin: clean(row.country_of_origin),
            };

            match position_by_id.get(&record.external_source_id) {
                Some(&idx) => {
                    warn!(
                        external_source_id = %record.external_source_id,
                        path = %path.display(),
                        "Duplicate property record, later definition wins"
                    );
                    table.duplicate_ids += 1;
                    table.records[idx] = record;
                }
                None => {
                    position_by_id.insert(record.external_source_id.clone(), table.records.len());
                    table.records.push(record);
                }
            }
        }

        info!(path = %path.display(), rows = row_count, "Loaded property file");
        table.rows_read.insert(path.display().to_string(), row_count);
    }

    Ok(table)
}

fn present_paths(files: &[InputFile]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(files.len());
    for file in files {
        if file.path.is_file() {
            paths.push(file.path.clone());
        } else if file.required {
            return Err(EtlError::MissingFile {
                path: file.path.clone(),
            });
        } else {
            warn!(path = %file.path.display(), "Optional input file not found, skipping");
        }
    }
    Ok(paths)
}

fn read_rows<T>(path: &Path, required: &[&str]) -> Result<(Vec<T>, Vec<String>)>
where
    T: DeserializeOwned,
{
    let file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            EtlError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            EtlError::Read {
                path: path.to_path_buf(),
                source: csv::Error::from(err),
            }
        }
    })?;

    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| EtlError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(EtlError::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EtlError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    // Re-apply the BOM-stripped header so serde can match the first column.
    reader.set_headers(csv::StringRecord::from(headers.clone()));

    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        let row = result.map_err(|source| EtlError::MalformedRow {
            path: path.to_path_buf(),
            line: source.position().map(|p| p.line()).unwrap_or(0),
            source,
        })?;
        rows.push(row);
    }

    debug!(path = %path.display(), columns = headers.len(), rows = rows.len(), "Parsed CSV");
    Ok((rows, headers))
}

fn validate_triple(row: TripleRow) -> std::result::Result<Triple, InvalidTripleReason> {
    let x_name = clean(row.x_name).ok_or(InvalidTripleReason::MissingSubjectName)?;
    let x_type = clean(row.x_type).ok_or(InvalidTripleReason::MissingSubjectType)?;
    let relation = clean(row.relation).ok_or(InvalidTripleReason::MissingRelation)?;
    let y_name = clean(row.y_name).ok_or(InvalidTripleReason::MissingObjectName)?;
    let y_type = clean(row.y_type).ok_or(InvalidTripleReason::MissingObjectType)?;

    Ok(Triple {
        x_name,
        x_type,
        relation,
        y_name,
        y_type,
        x_source: clean(row.x_source),
        y_source: clean(row.y_source),
        x_external_source_id: clean(row.x_external_source_id),
        y_external_source_id: clean(row.y_external_source_id),
        is_effective: clean(row.is_effective),
    })
}

pub fn clean(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if NULL_SPELLINGS.contains(&lowered.as_str()) {
        return None;
    }
    if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const TRIPLE_HEADER: &str = "x_name,x_type,relation,y_name,y_type,x_source,y_source";

    fn write(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn concatenates_triple_files_without_dedup() {
        let dir = TempDir::new().unwrap();
        let row = "Donepezil,Treatment,HAS_SIDE_EFFECT,Nausea,SideEffect,PrimeKG,PrimeKG";
        let a = write(&dir, "a.csv", &format!("{TRIPLE_HEADER}\n{row}\n"));
        let b = write(&dir, "b.csv", &format!("{TRIPLE_HEADER}\n{row}\n{row}\n"));

        let table = load_triples(&[a, b]).unwrap();
        assert_eq!(table.triples.len(), 3);
        assert_eq!(table.rows_read.values().sum::<usize>(), 3);
        assert!(!table.has_effectiveness_column);
    }

    #[test]
    fn drops_rows_with_missing_endpoint_names() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "kg.csv",
            &format!(
                "{TRIPLE_HEADER}\n\
                 Donepezil,Treatment,HAS_SIDE_EFFECT,NaN,SideEffect,PrimeKG,PrimeKG\n\
                 ,Treatment,HAS_SIDE_EFFECT,Nausea,SideEffect,PrimeKG,PrimeKG\n\
                 Donepezil,Treatment,HAS_SIDE_EFFECT,Nausea,SideEffect,PrimeKG,\n"
            ),
        );

        let table = load_triples(&[path]).unwrap();
        assert_eq!(table.triples.len(), 1);
        assert_eq!(table.invalid_count(), 2);
        assert_eq!(table.invalid[&InvalidTripleReason::MissingObjectName], 1);
        assert_eq!(table.invalid[&InvalidTripleReason::MissingSubjectName], 1);
        assert_eq!(table.triples[0].y_source, None);
    }

    #[test]
    fn trims_whitespace_and_reads_optional_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "kg.csv",
            "x_name,x_type,relation,y_name,y_type,x_source,y_source,x_external_source_id,y_external_source_id,is_effective\n\
             Donepezil,Treatment,TREATS,AD,Disease, PrimeKG ,PrimeKG,es_1,,1\n",
        );

        let table = load_triples(&[path]).unwrap();
        let triple = &table.triples[0];
        assert!(table.has_effectiveness_column);
        assert_eq!(triple.x_source.as_deref(), Some("PrimeKG"));
        assert_eq!(triple.x_external_source_id.as_deref(), Some("es_1"));
        assert_eq!(triple.y_external_source_id, None);
        assert_eq!(triple.is_effective.as_deref(), Some("1"));
    }

    #[test]
    fn missing_columns_are_listed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "kg.csv", "x_name,x_type,relation,y_name\nA,B,C,D\n");

        match load_triples(&[path]) {
            Err(EtlError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec!["y_type", "x_source", "y_source"]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_row_names_file_and_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kg.csv");
        let mut body = format!(
            "{TRIPLE_HEADER}\nDonepezil,Treatment,TREATS,AD,Disease,PrimeKG,PrimeKG\n"
        )
        .into_bytes();
        body.extend_from_slice(b"A\xff,Drug,TREATS,AD,Disease,PrimeKG,PrimeKG\n");
        fs::write(&path, body).unwrap();

        match load_triples(&[path.clone()]) {
            Err(EtlError::MalformedRow {
                path: bad_path,
                line,
                ..
            }) => {
                assert_eq!(bad_path, path);
                assert_eq!(line, 3);
            }
            other => panic!("expected MalformedRow, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "kg.csv", "");
        assert!(matches!(
            load_triples(&[path]),
            Err(EtlError::EmptyFile { .. })
        ));
    }

    #[test]
    fn missing_required_file_is_fatal_optional_is_skipped() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.csv");

        let err = load_inputs(&[InputFile::required(&missing)], &[]).unwrap_err();
        assert!(matches!(err, EtlError::MissingFile { ref path } if path == &missing));

        let loaded = load_inputs(&[InputFile::optional(&missing)], &[]).unwrap();
        assert!(loaded.triple_paths.is_empty());
        assert!(loaded.triples.triples.is_empty());
    }

    #[test]
    fn duplicate_property_ids_last_wins_in_first_position() {
        let dir = TempDir::new().unwrap();
        let header = "external_source_id,source_primary,source_secondary,title,source_link,source_date,pubmed_id,country_of_origin";
        let a = write(
            &dir,
            "a.csv",
            &format!("{header}\nes_1,NICE,NG97,Old title,,,,\nes_2,AAN,Practice,,,,,\n"),
        );
        let b = write(
            &dir,
            "b.csv",
            &format!("{header}\nes_1,NICE,NG97,New title,https://nice.org.uk,2018,,UK\n,,,,,,,\n"),
        );

        let table = load_properties(&[a, b]).unwrap();
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.duplicate_ids, 1);
        assert_eq!(table.skipped_rows, 1);
        assert_eq!(table.records[0].external_source_id, "es_1");
        assert_eq!(table.records[0].title.as_deref(), Some("New title"));
        assert_eq!(table.records[0].country_of_origin.as_deref(), Some("UK"));
        assert_eq!(table.records[0].pubmed_id, None);
    }

    #[test]
    fn strips_byte_order_mark_from_first_header() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "props.csv",
            "\u{feff}external_source_id,source_primary,source_secondary\nes_3,Cochrane,Review\n",
        );
        let table = load_properties(&[path]).unwrap();
        assert_eq!(table.records[0].external_source_id, "es_3");
    }

    #[test]
    fn clean_maps_null_spellings() {
        assert_eq!(clean(Some("NaN".to_string())), None);
        assert_eq!(clean(Some("  ".to_string())), None);
        assert_eq!(clean(Some(" x ".to_string())).as_deref(), Some("x"));
    }
}
