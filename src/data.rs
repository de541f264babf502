use crate::{
    error::HarvestError,
    record::{OutputRow, COLUMNS, SCHEMA_VERSION},
};
use std::{
    collections::HashSet,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};
use tracing::info;

/// Append-only CSV output. Each row is flushed as soon as it is written so an
/// interrupted run keeps every completed row.
pub struct OutputTable {
    writer: csv::Writer<File>,
    processed: HashSet<String>,
}

impl OutputTable {
    /// Creates `path` with a header, or with `resume` and a non-empty existing
    /// file, validates its header and appends to it.
    pub fn open<P: AsRef<Path>>(path: P, resume: bool) -> Result<Self, HarvestError> {
        let path = path.as_ref();
        let existing = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);

        if resume && existing {
            let processed = read_processed(path)?;
            info!(
                "Resuming {}: {} URL(s) already processed",
                path.display(),
                processed.len()
            );

            let mut file = OpenOptions::new().read(true).append(true).open(path)?;
            if !ends_with_newline(&mut file)? {
                file.write_all(b"\n")?;
            }

            let writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            Ok(Self { writer, processed })
        } else {
            let writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(path)?;
            let mut table = Self {
                writer,
                processed: HashSet::new(),
            };
            table.writer.write_record(COLUMNS)?;
            table.writer.flush()?;
            Ok(table)
        }
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.processed.contains(url)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn append(&mut self, row: &OutputRow) -> Result<(), HarvestError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.processed.insert(row.source_url.clone());
        Ok(())
    }
}

/// `source_url` values of the complete rows in `path`. A trailing row cut short
/// by an interruption is not counted, so its URL is processed again.
fn read_processed(path: &Path) -> Result<HashSet<String>, HarvestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let header = reader.headers()?.clone();
    if !header.iter().eq(COLUMNS.iter().copied()) {
        return Err(HarvestError::SchemaMismatch {
            path: path.to_path_buf(),
            version: SCHEMA_VERSION,
            found: header.iter().map(ToString::to_string).collect(),
        });
    }

    let mut processed = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != COLUMNS.len() {
            continue;
        }
        if let Some(url) = record.get(0).filter(|url| !url.trim().is_empty()) {
            processed.insert(url.to_string());
        }
    }
    Ok(processed)
}

fn ends_with_newline(file: &mut File) -> Result<bool, std::io::Error> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
