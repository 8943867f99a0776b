use crate::data::{FeatureMatrix, SampleInfo, SampleInfoTable, MUTATION_COVARIATE};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use flate2::read::GzDecoder;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// TCGA sample barcodes are compared on their first 15 characters
pub const BARCODE_LENGTH: usize = 15;

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(anyhow::anyhow!("Cannot determine format of gzipped file {:?}", path))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(anyhow::anyhow!("Unsupported file format: {:?}", path)),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Delimited table held as header + raw records
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub records: Vec<StringRecord>,
}

impl Table {
    /// Position of a named column
    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("Missing required column: {} (have {:?})", name, self.headers))
    }

    /// Position of the first of several accepted column names
    pub fn column_any(&self, names: &[&str]) -> Result<usize> {
        names
            .iter()
            .find_map(|name| self.headers.iter().position(|h| h == name))
            .with_context(|| format!("Missing required column: one of {:?}", names))
    }
}

/// Open a (possibly gzipped) file as a byte stream
fn open_reader(path: &Path, format: FileFormat) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("Failed to open file {:?}", path))?;
    if format.is_gzipped() {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a whole delimited table
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    debug!("Reading {:?} as {:?}", path, format);
    parse_table(open_reader(path, format)?, format)
}

fn parse_table<R: Read>(reader: R, format: FileFormat) -> Result<Table> {
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .context("Failed to read header row")?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut records = Vec::new();
    for result in csv_reader.records() {
        records.push(result.context("Failed to parse record")?);
    }
    Ok(Table { headers, records })
}

fn parse_value(field: &str) -> f64 {
    field.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Read a samples x features matrix; the first column is the sample index
pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<FeatureMatrix> {
    let path = path.as_ref();
    info!("Loading matrix from {:?}", path);
    let table = read_table(path)?;
    let matrix = table_to_matrix(table).with_context(|| format!("Bad matrix in {:?}", path))?;
    info!(
        "Loaded {} samples x {} features",
        matrix.n_samples(),
        matrix.n_features()
    );
    Ok(matrix)
}

fn table_to_matrix(table: Table) -> Result<FeatureMatrix> {
    if table.headers.is_empty() {
        anyhow::bail!("Matrix has no header");
    }
    let features: Vec<String> = table.headers[1..].to_vec();
    let n_features = features.len();

    let mut samples = Vec::with_capacity(table.records.len());
    let mut values = Vec::with_capacity(table.records.len() * n_features);
    for (line, record) in table.records.iter().enumerate() {
        let sample = record
            .get(0)
            .with_context(|| format!("Empty row at line {}", line + 2))?;
        samples.push(sample.to_string());
        for j in 0..n_features {
            values.push(record.get(j + 1).map(parse_value).unwrap_or(f64::NAN));
        }
        if record.len() != n_features + 1 {
            warn!(
                "Row {} has {} fields, expected {}",
                sample,
                record.len(),
                n_features + 1
            );
        }
    }

    let values = Array2::from_shape_vec((samples.len(), n_features), values)?;
    Ok(FeatureMatrix::new(samples, features, values)?)
}

/// Read only the sample index column of a matrix
pub fn read_sample_ids<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .has_headers(true)
        .flexible(true)
        .from_reader(open_reader(path, format)?);

    let mut ids = Vec::new();
    for result in csv_reader.records() {
        let record = result.with_context(|| format!("Failed to parse record in {:?}", path))?;
        if let Some(id) = record.get(0) {
            ids.push(id.to_string());
        }
    }
    debug!("Read {} sample ids from {:?}", ids.len(), path);
    Ok(ids)
}

/// Intersection of the sample ids of several matrices, in first-file order
pub fn read_overlap_samples(paths: &[(String, std::path::PathBuf)]) -> Result<Vec<String>> {
    let mut valid: Option<Vec<String>> = None;
    for (data_type, path) in paths {
        info!("Loading sample IDs for {} data", data_type);
        let ids = read_sample_ids(path)?;
        valid = Some(match valid {
            None => ids,
            Some(current) => {
                let next: HashSet<String> = ids.into_iter().collect();
                current.into_iter().filter(|s| next.contains(s)).collect()
            }
        });
    }
    Ok(valid.unwrap_or_default())
}

/// Read sample identifiers written by `sample_info::write_sample_info`
pub fn read_sample_info<P: AsRef<Path>>(path: P) -> Result<SampleInfoTable> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .from_reader(open_reader(path, format)?);

    let mut records = Vec::new();
    for result in csv_reader.deserialize::<SampleInfo>() {
        records.push(result.with_context(|| format!("Bad sample info row in {:?}", path))?);
    }
    info!("Loaded sample info for {} samples", records.len());
    Ok(SampleInfoTable::new(records))
}

/// Read the sample freeze as (barcode, disease) pairs
pub fn read_sample_freeze<P: AsRef<Path>>(path: P) -> Result<Vec<(String, String)>> {
    let table = read_table(path)?;
    let barcode = table.column("SAMPLE_BARCODE")?;
    let disease = table.column("DISEASE")?;
    Ok(table
        .records
        .iter()
        .filter_map(|r| Some((r.get(barcode)?.to_string(), r.get(disease)?.to_string())))
        .collect())
}

/// Read log10 mutation burden keyed by sample
pub fn read_mutation_burden<P: AsRef<Path>>(path: P) -> Result<HashMap<String, f64>> {
    let table = read_table(path)?;
    let burden = table.column(MUTATION_COVARIATE)?;
    let mut out = HashMap::with_capacity(table.records.len());
    for record in &table.records {
        let (Some(sample), Some(value)) = (record.get(0), record.get(burden)) else {
            continue;
        };
        let value = parse_value(value);
        if value.is_finite() {
            out.insert(sample.to_string(), value);
        }
    }
    Ok(out)
}

/// Gene to predict, with its driver classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneInfo {
    pub gene: String,
    /// "Oncogene", "TSG", or anything else
    pub classification: String,
}

/// Read the gene list (gene, classification)
pub fn read_gene_list<P: AsRef<Path>>(path: P) -> Result<Vec<GeneInfo>> {
    let table = read_table(path)?;
    let gene = table.column("gene")?;
    let classification = table.column("classification")?;
    Ok(table
        .records
        .iter()
        .filter_map(|r| {
            Some(GeneInfo {
                gene: r.get(gene)?.to_string(),
                classification: r.get(classification)?.to_string(),
            })
        })
        .collect())
}

/// Read tumor purity as (15-character barcode, purity); NaN rows are skipped
pub fn read_purity<P: AsRef<Path>>(path: P) -> Result<Vec<(String, f64)>> {
    let table = read_table(path)?;
    let sample = table.column_any(&["array", "sample_id"])?;
    let purity = table.column("purity")?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for record in &table.records {
        let (Some(id), Some(value)) = (record.get(sample), record.get(purity)) else {
            continue;
        };
        let value = parse_value(value);
        let id: String = id.chars().take(BARCODE_LENGTH).collect();
        if value.is_finite() && seen.insert(id.clone()) {
            out.push((id, value));
        }
    }
    info!("Loaded purity for {} samples", out.len());
    Ok(out)
}

/// Read a two-column code table (e.g. TSS code -> cancer acronym)
pub fn read_code_table<P: AsRef<Path>>(
    path: P,
    key_column: &str,
    value_column: &str,
) -> Result<HashMap<String, String>> {
    let table = read_table(path)?;
    let key = table.column(key_column)?;
    let value = table.column(value_column)?;
    Ok(table
        .records
        .iter()
        .filter_map(|r| Some((r.get(key)?.to_string(), r.get(value)?.to_string())))
        .collect())
}
