//! Lazy, batched CSV decoding.
//!
//! The reader never holds more than one batch of records in memory.
//! Decoding is blocking I/O, so each batch is read on the blocking pool.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use catalog_core::catalog_import::{ColumnMap, ProductRow, RowError};

use crate::error::ImportError;

type SourceReader = csv::Reader<Box<dyn Read + Send>>;

/// Where an import reads its CSV from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// A file on the server's filesystem.
    File(PathBuf),
    /// CSV text already in memory, e.g. handed over by a webhook.
    Text { name: String, content: String },
}

impl ImportSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn text(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Text {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Label stored on the job.
    pub fn label(&self) -> String {
        match self {
            Self::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Text { name, .. } => name.clone(),
        }
    }

    fn open(&self) -> Result<SourceReader, ImportError> {
        let inner: Box<dyn Read + Send> = match self {
            Self::File(path) => Box::new(open_file(path)?),
            Self::Text { content, .. } => Box::new(Cursor::new(content.clone().into_bytes())),
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(inner);

        if reader.byte_headers()?.is_empty() {
            return Err(ImportError::MissingHeader);
        }
        Ok(reader)
    }
}

fn open_file(path: &Path) -> Result<File, ImportError> {
    File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImportError::NotFound(path.to_path_buf()),
        _ => ImportError::Io(e),
    })
}

/// Count the data records of `source` in one streaming pass.
pub async fn count_rows(source: ImportSource) -> Result<u64, ImportError> {
    run_blocking(move || {
        let mut reader = source.open()?;
        let mut record = csv::ByteRecord::new();
        let mut count = 0u64;
        while reader.read_byte_record(&mut record)? {
            count += 1;
        }
        Ok(count)
    })
    .await
}

/// One decoded batch.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    /// Rows that passed normalisation, in source order.
    pub rows: Vec<ProductRow>,
    /// Rows that did not.
    pub errors: Vec<RowError>,
    /// Records read from the source, valid or not.
    pub consumed: u64,
}

/// Reads a CSV source in batches of at most `batch_size` records.
pub struct CsvBatchReader {
    reader: Option<SourceReader>,
    columns: ColumnMap,
    batch_size: usize,
}

impl CsvBatchReader {
    /// Open `source` and read its header row.
    pub async fn open(source: ImportSource, batch_size: usize) -> Result<Self, ImportError> {
        run_blocking(move || {
            let mut reader = source.open()?;
            let columns = {
                let headers = reader.headers()?;
                ColumnMap::from_headers(headers.iter())
            };
            Ok(Self {
                reader: Some(reader),
                columns,
                batch_size: batch_size.max(1),
            })
        })
        .await
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    /// Decode the next batch. `None` once the source is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<ParsedBatch>, ImportError> {
        let Some(mut reader) = self.reader.take() else {
            return Ok(None);
        };
        let columns = self.columns.clone();
        let batch_size = self.batch_size;

        let (reader, result) = tokio::task::spawn_blocking(move || {
            let result = read_batch(&mut reader, &columns, batch_size);
            (reader, result)
        })
        .await
        .map_err(|e| ImportError::Io(std::io::Error::other(e)))?;

        let batch = result?;
        if batch.consumed == 0 {
            return Ok(None);
        }
        self.reader = Some(reader);
        Ok(Some(batch))
    }
}

fn read_batch(
    reader: &mut SourceReader,
    columns: &ColumnMap,
    batch_size: usize,
) -> Result<ParsedBatch, ImportError> {
    let mut batch = ParsedBatch::default();
    let mut record = csv::ByteRecord::new();

    while batch.consumed < batch_size as u64 {
        if !reader.read_byte_record(&mut record)? {
            break;
        }
        batch.consumed += 1;

        // Line numbers count the header as line 1.
        let line = record.position().map_or(0, |pos| pos.line());
        let decoded = match csv::StringRecord::from_byte_record(record.clone()) {
            Ok(decoded) => decoded,
            Err(_) => {
                batch
                    .errors
                    .push(RowError::new(line, "Row is not valid UTF-8."));
                continue;
            }
        };

        match columns.normalize(line, |idx| decoded.get(idx)) {
            Ok(row) => batch.rows.push(row),
            Err(err) => batch.errors.push(err),
        }
    }

    Ok(batch)
}

async fn run_blocking<T, F>(f: F) -> Result<T, ImportError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ImportError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ImportError::Io(std::io::Error::other(e)))?
}
