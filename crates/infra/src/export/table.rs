use std::path::{Path, PathBuf};

use csv::{Terminator, WriterBuilder};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const SEPARATOR: u8 = b';';
const BOM: &[u8] = "\u{feff}".as_bytes();

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("csv io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv encode error: {0}")]
    Encode(#[from] csv::Error),
}

/// Append-only `;`-separated table. A new file starts with a UTF-8 BOM and
/// the header row so spreadsheet tools pick the right encoding.
#[derive(Debug, Clone)]
pub struct CsvTable {
    path: PathBuf,
    headers: Vec<String>,
}

impl CsvTable {
    pub fn new(path: impl Into<PathBuf>, headers: &[&str]) -> Self {
        Self {
            path: path.into(),
            headers: headers.iter().map(|header| header.to_string()).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the header when the file does not exist yet.
    pub async fn ensure_exists(&self) -> Result<(), CsvError> {
        if fs::try_exists(&self.path).await.map_err(|err| self.io(err))? {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|err| self.io(err))?;
        }
        let mut bytes = BOM.to_vec();
        bytes.extend(encode_rows(std::slice::from_ref(&self.headers))?);
        fs::write(&self.path, bytes).await.map_err(|err| self.io(err))
    }

    pub async fn append(&self, rows: &[Vec<String>]) -> Result<(), CsvError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.ensure_exists().await?;
        let bytes = encode_rows(rows)?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| self.io(err))?;
        file.write_all(&bytes).await.map_err(|err| self.io(err))?;
        file.flush().await.map_err(|err| self.io(err))
    }

    fn io(&self, source: std::io::Error) -> CsvError {
        CsvError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Serializes rows into one buffer so a batch lands in a single append.
fn encode_rows(rows: &[Vec<String>]) -> Result<Vec<u8>, CsvError> {
    let mut writer = WriterBuilder::new()
        .delimiter(SEPARATOR)
        .terminator(Terminator::Any(b'\n'))
        .has_headers(false)
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| CsvError::Encode(csv::Error::from(err.into_error())))
}
