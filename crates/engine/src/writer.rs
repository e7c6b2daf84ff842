//! Parquet directory output.
//!
//! Parts are written into a hidden staging directory next to the target and
//! moved into place only after every part succeeded, so a failed write never
//! leaves a half-replaced output behind.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use contracts::{ParquetCompression, SaveMode};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Rows and bytes of one written part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartStats {
    pub rows: u64,
    pub bytes: u64,
}

/// Output directory being assembled. Dropping it without `commit` discards
/// the staging directory.
pub struct StagedOutput {
    target: PathBuf,
    staging: PathBuf,
    app_id: String,
    compression: ParquetCompression,
    committed: bool,
}

impl StagedOutput {
    /// Check the save mode and create a fresh staging directory
    pub fn prepare(
        target: &Path,
        mode: SaveMode,
        app_id: &str,
        compression: ParquetCompression,
    ) -> Result<Self> {
        if mode == SaveMode::ErrorIfExists && target.exists() {
            return Err(EngineError::OutputExists {
                path: target.display().to_string(),
            });
        }

        let name = target.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("output path '{}' has no file name", target.display()),
            )
        })?;
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = parent.join(format!(".{}-{app_id}.staging", name.to_string_lossy()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir(&staging)?;

        Ok(Self {
            target: target.to_path_buf(),
            staging,
            app_id: app_id.to_string(),
            compression,
            committed: false,
        })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Path of part file `index` inside the staging directory
    pub fn part_path(&self, index: usize) -> PathBuf {
        let name = match self.compression.file_infix() {
            Some(infix) => format!("part-{index:05}-{}.{infix}.parquet", self.app_id),
            None => format!("part-{index:05}-{}.parquet", self.app_id),
        };
        self.staging.join(name)
    }

    /// Replace the target with the staged directory
    pub fn commit(mut self) -> Result<()> {
        File::create(self.staging.join(SUCCESS_MARKER))?;

        if self.target.is_dir() {
            fs::remove_dir_all(&self.target)?;
        } else if self.target.exists() {
            fs::remove_file(&self.target)?;
        }
        fs::rename(&self.staging, &self.target)?;
        self.committed = true;
        debug!(path = %self.target.display(), "Output committed");
        Ok(())
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if self.committed || !self.staging.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.staging) {
            warn!(error = %e, path = %self.staging.display(), "Failed to remove staging directory");
        }
    }
}

/// Writer settings shared by every part of one output
pub fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    let codec = match compression {
        ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
    };
    WriterProperties::builder()
        .set_compression(codec)
        .set_created_by(format!("reviews-loader engine {}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Write `batches` to `path`. No file is created when there are no rows,
/// unless `always` is set.
pub fn write_part<I>(
    path: &Path,
    schema: SchemaRef,
    batches: I,
    props: WriterProperties,
    always: bool,
) -> Result<Option<PartStats>>
where
    I: IntoIterator<Item = Result<RecordBatch>>,
{
    let mut writer: Option<ArrowWriter<File>> = None;
    let mut rows = 0u64;

    for batch in batches {
        let batch = batch?;
        if batch.num_rows() == 0 {
            continue;
        }
        if writer.is_none() {
            writer = Some(ArrowWriter::try_new(
                File::create(path)?,
                schema.clone(),
                Some(props.clone()),
            )?);
        }
        if let Some(w) = writer.as_mut() {
            w.write(&batch)?;
        }
        rows += batch.num_rows() as u64;
    }

    let writer = match writer {
        Some(w) => w,
        None if always => ArrowWriter::try_new(File::create(path)?, schema, Some(props))?,
        None => return Ok(None),
    };
    writer.close()?;

    let bytes = fs::metadata(path)?.len();
    Ok(Some(PartStats { rows, bytes }))
}

/// Total size of a file, or of all files below a directory
pub fn directory_size(path: &Path) -> io::Result<u64> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }
    fs::read_dir(path)?.try_fold(0u64, |total, entry| {
        Ok(total + directory_size(&entry?.path())?)
    })
}
