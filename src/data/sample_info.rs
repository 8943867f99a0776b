//! Decoding of TCGA barcodes into cancer type and sample type.
//!
//! A barcode such as `TCGA-02-0047-01` carries the tissue source site (TSS)
//! code right after `TCGA-` and the sample type code in its last two
//! characters. The code -> name tables come from the cognoma cancer-data
//! repository and are passed in as local files.

use crate::data::{SampleInfo, SampleInfoTable};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const BARCODE_PREFIX: &str = "TCGA-";

/// Sample type code (last two characters of the barcode)
pub fn sample_type_code(sample_id: &str) -> &str {
    let start = sample_id
        .char_indices()
        .rev()
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &sample_id[start..]
}

/// Tissue source site code (two characters after `TCGA-`)
pub fn tss_code(sample_id: &str) -> Option<&str> {
    let rest = sample_id.split(BARCODE_PREFIX).nth(1)?;
    rest.get(..2)
}

/// Build sample info for a list of barcodes
///
/// Codes missing from the lookup tables are kept verbatim so the sample still
/// gets a (distinct) stratum.
pub fn build_sample_info(
    sample_ids: &[String],
    sample_type_codes: &HashMap<String, String>,
    cancer_type_codes: &HashMap<String, String>,
) -> SampleInfoTable {
    let mut unknown = 0usize;
    let records = sample_ids
        .iter()
        .map(|id| {
            let st_code = sample_type_code(id);
            let sample_type = sample_type_codes
                .get(st_code)
                .cloned()
                .unwrap_or_else(|| st_code.to_string());

            let tss = tss_code(id).unwrap_or_default();
            let cancer_type = match cancer_type_codes.get(tss) {
                Some(ct) => ct.clone(),
                None => {
                    unknown += 1;
                    tss.to_string()
                }
            };
            SampleInfo::new(id.clone(), sample_type, cancer_type)
        })
        .collect();

    if unknown > 0 {
        warn!("{} samples had an unknown TSS code", unknown);
    }
    SampleInfoTable::new(records)
}

/// Write sample identifiers to `tcga_{training_data}_sample_identifiers.tsv`
pub fn write_sample_info<P: AsRef<Path>>(
    dir: P,
    training_data: &str,
    table: &SampleInfoTable,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    crate::utils::ensure_dir(dir)?;
    let path = dir.join(format!("tcga_{}_sample_identifiers.tsv", training_data));

    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for record in table.records() {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("Wrote sample info for {} samples to {:?}", table.len(), path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::read_sample_info;
    use tempfile::TempDir;

    fn codes() -> (HashMap<String, String>, HashMap<String, String>) {
        let sample_types = HashMap::from([
            ("01".to_string(), "Primary Solid Tumor".to_string()),
            ("11".to_string(), "Solid Tissue Normal".to_string()),
        ]);
        let cancer_types = HashMap::from([
            ("02".to_string(), "GBM".to_string()),
            ("A1".to_string(), "BRCA".to_string()),
        ]);
        (sample_types, cancer_types)
    }

    #[test]
    fn test_barcode_parts() {
        assert_eq!(sample_type_code("TCGA-02-0047-01"), "01");
        assert_eq!(tss_code("TCGA-A1-A0SB-11"), Some("A1"));
        assert_eq!(tss_code("not-a-barcode"), None);
    }

    #[test]
    fn test_build_and_roundtrip() {
        let (st, ct) = codes();
        let ids = vec![
            "TCGA-02-0047-01".to_string(),
            "TCGA-A1-A0SB-11".to_string(),
            "TCGA-ZZ-0001-06".to_string(),
        ];
        let table = build_sample_info(&ids, &st, &ct);

        let gbm = table.get("TCGA-02-0047-01").unwrap();
        assert_eq!(gbm.cancer_type, "GBM");
        assert_eq!(gbm.id_for_stratification, "GBMPrimary Solid Tumor");
        let unknown = table.get("TCGA-ZZ-0001-06").unwrap();
        assert_eq!(unknown.cancer_type, "ZZ");
        assert_eq!(unknown.sample_type, "06");

        let dir = TempDir::new().unwrap();
        let path = write_sample_info(dir.path(), "expression", &table).unwrap();
        let loaded = read_sample_info(&path).unwrap();
        assert_eq!(loaded.records(), table.records());
    }
}
