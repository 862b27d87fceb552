use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{Result, RunError};

use super::NUM_CLASSES;

/// Dataset split a patch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
        }
    }
}

/// One patch of the metadata table.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRecord {
    pub patch_id: String,
    pub country: String,
    pub split: Split,
    pub snowy: bool,
    pub cloudy: bool,
    /// Multi-label target over the 19 label slots.
    pub labels: Vec<bool>,
}

/// In-memory patch metadata, loaded once per run.
///
/// Format: one patch per line,
/// `patch_id,country,split,snowy,cloudy,labels` with `labels` a
/// `;`-separated list of label indices. A header line starting with
/// `patch_id,` is skipped.
#[derive(Debug, Clone)]
pub struct MetadataTable {
    records: Vec<PatchRecord>,
}

impl MetadataTable {
    /// Loads the table from a CSV file.
    ///
    /// # Errors
    /// Returns `RunError::Io` if the file cannot be read and
    /// `RunError::Metadata` with the offending line number if a line
    /// does not parse.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path.to_path_buf())
    }

    /// Parses the table from an in-memory document.
    pub fn from_str(content: &str) -> Result<Self> {
        Self::parse(content, PathBuf::from("<inline>"))
    }

    fn parse(content: &str, path: PathBuf) -> Result<Self> {
        let mut records = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if i == 0 && line.starts_with("patch_id,") {
                continue;
            }

            let record = parse_line(line).map_err(|reason| RunError::Metadata {
                path: path.clone(),
                line: i + 1,
                reason,
            })?;
            records.push(record);
        }

        log::debug!("loaded {} patch record(s)", records.len());
        Ok(Self { records })
    }

    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn parse_line(line: &str) -> std::result::Result<PatchRecord, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, got {}", fields.len()));
    }

    let patch_id = fields[0];
    if patch_id.is_empty() {
        return Err("empty patch_id".into());
    }
    let country = fields[1];
    if country.is_empty() {
        return Err("empty country".into());
    }

    let split = match fields[2] {
        "train" => Split::Train,
        "test" => Split::Test,
        other => return Err(format!("unknown split: '{other}'")),
    };

    let snowy = parse_flag(fields[3], "snowy")?;
    let cloudy = parse_flag(fields[4], "cloudy")?;

    let mut labels = vec![false; NUM_CLASSES];
    if !fields[5].is_empty() {
        for part in fields[5].split(';') {
            let idx: usize = part
                .trim()
                .parse()
                .map_err(|_| format!("cannot parse label index '{part}'"))?;
            if idx >= NUM_CLASSES {
                return Err(format!("label index {idx} out of range (0..{NUM_CLASSES})"));
            }
            labels[idx] = true;
        }
    }

    Ok(PatchRecord {
        patch_id: patch_id.to_string(),
        country: country.to_string(),
        split,
        snowy,
        cloudy,
        labels,
    })
}

fn parse_flag(value: &str, name: &str) -> std::result::Result<bool, String> {
    match value {
        "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(format!("cannot parse {name} flag '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
patch_id,country,split,snowy,cloudy,labels
p0,Ireland,train,0,0,0;4
p1,Ireland,train,1,0,2
p2,Ireland,test,0,1,
p3,Portugal,train,0,0,18
";

    #[test]
    fn parses_table_with_header() {
        let table = MetadataTable::from_str(DOC).unwrap();
        assert_eq!(table.len(), 4);

        let p0 = &table.records()[0];
        assert_eq!(p0.patch_id, "p0");
        assert_eq!(p0.split, Split::Train);
        assert!(p0.labels[0] && p0.labels[4]);
        assert_eq!(p0.labels.iter().filter(|&&l| l).count(), 2);

        let p2 = &table.records()[2];
        assert_eq!(p2.split, Split::Test);
        assert!(p2.cloudy && !p2.snowy);
        assert!(p2.labels.iter().all(|&l| !l));
    }

    #[test]
    fn reports_offending_line() {
        let doc = "p0,Ireland,train,0,0,0\np1,Ireland,holdout,0,0,1\n";
        let err = MetadataTable::from_str(doc).unwrap_err();
        match err {
            RunError::Metadata { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("holdout"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_out_of_range_label() {
        let doc = "p0,Ireland,train,0,0,19\n";
        assert!(MetadataTable::from_str(doc).is_err());
    }

    #[test]
    fn rejects_wrong_field_count() {
        let doc = "p0,Ireland,train,0,0\n";
        assert!(MetadataTable::from_str(doc).is_err());
    }
}
