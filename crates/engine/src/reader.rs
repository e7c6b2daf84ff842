//! Line-delimited JSON reader.
//!
//! - gzip input is detected by magic bytes and read as one partition
//! - plain input is split into byte ranges; a line belongs to the partition
//!   in which it starts
//! - records are parsed against a fixed schema under a [`ParseMode`]

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use contracts::{FieldType, ParseMode, RecordSchema};
use flate2::read::MultiGzDecoder;
use serde_json::Value;

use crate::error::{EngineError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Arrow schema for a record schema
pub fn to_arrow_schema(schema: &RecordSchema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| {
            let data_type = match f.data_type {
                FieldType::String => DataType::Utf8,
                FieldType::Double => DataType::Float64,
                FieldType::Long => DataType::Int64,
            };
            Field::new(&f.name, data_type, f.nullable)
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Physical encoding of the input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCodec {
    Plain,
    Gzip,
}

/// Resolved input file
#[derive(Debug, Clone)]
pub struct InputFile {
    pub path: PathBuf,
    /// Size on disk (compressed size for gzip)
    pub len: u64,
    pub codec: InputCodec,
}

impl InputFile {
    pub fn open(path: &Path) -> Result<Self> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::input_not_found(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )
            .into());
        }

        let mut magic = Vec::with_capacity(2);
        File::open(path)?.take(2).read_to_end(&mut magic)?;
        let codec = if magic == GZIP_MAGIC {
            InputCodec::Gzip
        } else {
            InputCodec::Plain
        };

        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
            codec,
        })
    }

    /// Compressed streams cannot be entered mid-way
    pub fn is_splittable(&self) -> bool {
        self.codec == InputCodec::Plain
    }

    /// Split into partitions of at most `max_partition_bytes`
    pub fn plan(&self, max_partition_bytes: u64) -> Vec<PartitionSpec> {
        let max = max_partition_bytes.max(1);
        if !self.is_splittable() || self.len <= max {
            return vec![PartitionSpec {
                index: 0,
                start: 0,
                end: self.len,
            }];
        }

        let count = self.len.div_ceil(max);
        (0..count)
            .map(|i| PartitionSpec {
                index: i as usize,
                start: i * max,
                end: ((i + 1) * max).min(self.len),
            })
            .collect()
    }
}

/// Byte range of one partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSpec {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

/// Progress shared between a running scan and whoever waits on it
#[derive(Debug, Default)]
pub struct ScanProgress {
    rows: AtomicU64,
    bytes_read: AtomicU64,
    total_bytes: u64,
    cancelled: AtomicBool,
}

impl ScanProgress {
    pub fn new(total_bytes: u64) -> Arc<Self> {
        Arc::new(Self {
            total_bytes,
            ..Default::default()
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Bytes consumed from disk (compressed bytes for gzip)
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Share of the input consumed, in [0, 1]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_read() as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    fn add_rows(&self, rows: u64) {
        self.rows.fetch_add(rows, Ordering::Relaxed);
    }
}

/// Counts bytes pulled from the underlying file
struct CountingReader<R> {
    inner: R,
    progress: Arc<ScanProgress>,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.progress.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

/// Per-partition parse statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Rows emitted (including null rows for malformed records)
    pub rows: u64,
    /// Lines that were not a JSON object
    pub malformed: u64,
    /// Rows with at least one field that did not fit its type
    pub partial: u64,
    /// Lines skipped (blank, or dropped by the parse mode)
    pub skipped: u64,
}

/// What happened to one input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Blank,
    Row,
    PartialRow,
    MalformedRow,
    Dropped,
}

enum ColumnBuilder {
    Utf8(StringBuilder),
    Float64(Float64Builder),
    Int64(Int64Builder),
}

impl ColumnBuilder {
    fn new(data_type: FieldType, capacity: usize) -> Self {
        match data_type {
            FieldType::String => Self::Utf8(StringBuilder::with_capacity(capacity, capacity * 64)),
            FieldType::Double => Self::Float64(Float64Builder::with_capacity(capacity)),
            FieldType::Long => Self::Int64(Int64Builder::with_capacity(capacity)),
        }
    }

    fn append_null(&mut self) {
        match self {
            Self::Utf8(b) => b.append_null(),
            Self::Float64(b) => b.append_null(),
            Self::Int64(b) => b.append_null(),
        }
    }

    /// Appends the converted value, or null. Returns false when a present
    /// value did not fit the column type.
    fn append_json(&mut self, value: Option<&Value>) -> bool {
        let value = match value {
            None | Some(Value::Null) => {
                self.append_null();
                return true;
            }
            Some(value) => value,
        };

        match self {
            // Non-string JSON goes in as its raw text ("helpful": [2, 3] -> "[2,3]")
            Self::Utf8(b) => {
                match value {
                    Value::String(s) => b.append_value(s),
                    other => b.append_value(other.to_string()),
                }
                true
            }
            Self::Float64(b) => match as_double(value) {
                Some(v) => {
                    b.append_value(v);
                    true
                }
                None => {
                    b.append_null();
                    false
                }
            },
            Self::Int64(b) => match value.as_i64() {
                Some(v) => {
                    b.append_value(v);
                    true
                }
                None => {
                    b.append_null();
                    false
                }
            },
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            Self::Utf8(b) => Arc::new(b.finish()),
            Self::Float64(b) => Arc::new(b.finish()),
            Self::Int64(b) => Arc::new(b.finish()),
        }
    }
}

fn as_double(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" | "+Infinity" | "Inf" | "+Inf" => Some(f64::INFINITY),
            "-Infinity" | "-Inf" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn fits(data_type: FieldType, value: Option<&Value>) -> bool {
    match (data_type, value) {
        (_, None | Some(Value::Null)) => true,
        (FieldType::String, _) => true,
        (FieldType::Double, Some(v)) => as_double(v).is_some(),
        (FieldType::Long, Some(v)) => v.as_i64().is_some(),
    }
}

/// Accumulates parsed lines into one record batch
pub struct BatchBuilder {
    schema: RecordSchema,
    arrow_schema: SchemaRef,
    columns: Vec<ColumnBuilder>,
    rows: usize,
    capacity: usize,
}

impl BatchBuilder {
    pub fn new(schema: &RecordSchema, capacity: usize) -> Self {
        Self {
            schema: schema.clone(),
            arrow_schema: to_arrow_schema(schema),
            columns: Self::fresh_columns(schema, capacity),
            rows: 0,
            capacity,
        }
    }

    fn fresh_columns(schema: &RecordSchema, capacity: usize) -> Vec<ColumnBuilder> {
        schema
            .fields()
            .iter()
            .map(|f| ColumnBuilder::new(f.data_type, capacity))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Parse one line (without requiring the trailing newline)
    pub fn append_line(&mut self, line: &[u8], line_no: u64, mode: ParseMode) -> Result<LineOutcome> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Ok(LineOutcome::Blank);
        }

        let object = match serde_json::from_slice::<Value>(trimmed) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return self.malformed(line_no, mode, format!("expected a JSON object, got {}", kind_of(&other)))
            }
            Err(e) => return self.malformed(line_no, mode, e.to_string()),
        };

        if mode != ParseMode::Permissive {
            let mismatch = self
                .schema
                .fields()
                .iter()
                .find(|f| !fits(f.data_type, object.get(&f.name)));
            if let Some(field) = mismatch {
                let message = format!("field '{}' is not a valid {}", field.name, field.data_type);
                return self.malformed(line_no, mode, message);
            }
        }

        let mut all_fit = true;
        for (field, column) in self.schema.fields().iter().zip(self.columns.iter_mut()) {
            all_fit &= column.append_json(object.get(&field.name));
        }
        self.rows += 1;

        Ok(if all_fit {
            LineOutcome::Row
        } else {
            LineOutcome::PartialRow
        })
    }

    fn malformed(&mut self, line_no: u64, mode: ParseMode, message: String) -> Result<LineOutcome> {
        match mode {
            ParseMode::Permissive => {
                for column in &mut self.columns {
                    column.append_null();
                }
                self.rows += 1;
                Ok(LineOutcome::MalformedRow)
            }
            ParseMode::DropMalformed => Ok(LineOutcome::Dropped),
            ParseMode::FailFast => Err(EngineError::MalformedRecord {
                line: line_no,
                message,
            }),
        }
    }

    /// Emit the accumulated rows and reset
    pub fn finish(&mut self) -> Result<RecordBatch> {
        let arrays: Vec<ArrayRef> = self.columns.iter_mut().map(ColumnBuilder::finish).collect();
        self.columns = Self::fresh_columns(&self.schema, self.capacity);
        self.rows = 0;
        Ok(RecordBatch::try_new(self.arrow_schema.clone(), arrays)?)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Scan tuning
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub batch_size: usize,
    pub mode: ParseMode,
    /// Stop after this many rows
    pub limit: Option<usize>,
}

/// Iterator of record batches over one partition
pub struct PartitionScan {
    reader: Box<dyn BufRead + Send>,
    spec: PartitionSpec,
    split_end: Option<u64>,
    pos: u64,
    line_no: u64,
    builder: BatchBuilder,
    options: ScanOptions,
    emitted: usize,
    progress: Arc<ScanProgress>,
    stats: ScanStats,
    buf: Vec<u8>,
    finished: bool,
}

impl PartitionScan {
    pub fn open(
        input: &InputFile,
        spec: PartitionSpec,
        schema: &RecordSchema,
        options: ScanOptions,
        progress: Arc<ScanProgress>,
    ) -> Result<Self> {
        let mut file = File::open(&input.path)?;

        let (reader, split_end): (Box<dyn BufRead + Send>, Option<u64>) = match input.codec {
            InputCodec::Gzip => {
                let counting = CountingReader {
                    inner: file,
                    progress: progress.clone(),
                };
                (Box::new(BufReader::new(MultiGzDecoder::new(counting))), None)
            }
            InputCodec::Plain => {
                file.seek(SeekFrom::Start(spec.start))?;
                let counting = CountingReader {
                    inner: file,
                    progress: progress.clone(),
                };
                (Box::new(BufReader::new(counting)), Some(spec.end))
            }
        };

        let batch_size = options.batch_size.max(1);
        let mut scan = Self {
            reader,
            spec,
            split_end,
            pos: spec.start,
            line_no: 0,
            builder: BatchBuilder::new(schema, batch_size),
            options: ScanOptions {
                batch_size,
                ..options
            },
            emitted: 0,
            progress,
            stats: ScanStats::default(),
            buf: Vec::new(),
            finished: false,
        };

        // The line straddling `start` belongs to the previous partition
        if split_end.is_some() && spec.start != 0 {
            scan.pos += scan.reader.read_until(b'\n', &mut scan.buf)? as u64;
        }

        Ok(scan)
    }

    pub fn spec(&self) -> PartitionSpec {
        self.spec
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    fn limit_reached(&self) -> bool {
        self.options
            .limit
            .is_some_and(|limit| self.emitted + self.builder.len() >= limit)
    }

    /// Next batch, or None at the end of the partition
    pub fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.finished {
            return Ok(None);
        }

        while self.builder.len() < self.options.batch_size && !self.limit_reached() {
            if self.progress.is_cancelled() {
                self.finished = true;
                return Err(EngineError::Cancelled);
            }
            if self.split_end.is_some_and(|end| self.pos > end) {
                self.finished = true;
                break;
            }

            self.buf.clear();
            let n = self.reader.read_until(b'\n', &mut self.buf)?;
            if n == 0 {
                self.finished = true;
                break;
            }
            self.pos += n as u64;
            self.line_no += 1;

            match self
                .builder
                .append_line(&self.buf, self.line_no, self.options.mode)?
            {
                LineOutcome::Row => {}
                LineOutcome::PartialRow => self.stats.partial += 1,
                LineOutcome::MalformedRow => self.stats.malformed += 1,
                LineOutcome::Blank | LineOutcome::Dropped => self.stats.skipped += 1,
            }
        }

        if self.limit_reached() {
            self.finished = true;
        }
        if self.builder.is_empty() {
            self.finished = true;
            return Ok(None);
        }

        let batch = self.builder.finish()?;
        let rows = batch.num_rows();
        self.emitted += rows;
        self.stats.rows += rows as u64;
        self.progress.add_rows(rows as u64);
        Ok(Some(batch))
    }
}

impl Iterator for PartitionScan {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const VALID: &str = r#"{"reviewerID":"A1","asin":"0001","reviewerName":"Ann","helpful":[2,3],"reviewText":"Good","overall":5.0,"summary":"ok","unixReviewTime":1382140800,"reviewTime":"10 19, 2013"}"#;

    fn write_plain(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn write_gzip(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();
        path
    }

    fn options(limit: Option<usize>) -> ScanOptions {
        ScanOptions {
            batch_size: 1024,
            mode: ParseMode::Permissive,
            limit,
        }
    }

    fn scan_all(input: &InputFile, max_partition_bytes: u64) -> Vec<RecordBatch> {
        let schema = RecordSchema::reviews();
        let progress = ScanProgress::new(input.len);
        input
            .plan(max_partition_bytes)
            .into_iter()
            .flat_map(|spec| {
                PartitionScan::open(input, spec, &schema, options(None), progress.clone())
                    .unwrap()
                    .collect::<Result<Vec<_>>>()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_detects_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let gz = write_gzip(dir.path(), "a.json.gz", VALID);
        let plain = write_plain(dir.path(), "a.json", VALID);

        assert_eq!(InputFile::open(&gz).unwrap().codec, InputCodec::Gzip);
        assert_eq!(InputFile::open(&plain).unwrap().codec, InputCodec::Plain);
    }

    #[test]
    fn test_missing_input() {
        let err = InputFile::open(Path::new("/definitely/not/here.json.gz")).unwrap_err();
        assert!(matches!(err, EngineError::InputNotFound { .. }));
    }

    #[test]
    fn test_gzip_is_single_partition() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("{VALID}\n").repeat(200);
        let input = InputFile::open(&write_gzip(dir.path(), "a.json.gz", &content)).unwrap();
        assert_eq!(input.plan(16).len(), 1);
    }

    #[test]
    fn test_plain_split_covers_every_line_once() {
        let dir = tempfile::tempdir().unwrap();
        let content: String = (0..50)
            .map(|i| format!("{{\"reviewerID\":\"R{i}\",\"overall\":{i}.0}}\n"))
            .collect();
        let input = InputFile::open(&write_plain(dir.path(), "a.json", &content)).unwrap();

        let plan = input.plan(97);
        assert!(plan.len() > 5);
        assert_eq!(plan.last().unwrap().end, input.len);

        let batches = scan_all(&input, 97);
        let mut ids: Vec<String> = batches
            .iter()
            .flat_map(|b| {
                let col = b.column(0).as_any().downcast_ref::<StringArray>().unwrap();
                (0..col.len()).map(|i| col.value(i).to_string()).collect::<Vec<_>>()
            })
            .collect();
        ids.sort();
        let mut expected: Vec<String> = (0..50).map(|i| format!("R{i}")).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_permissive_malformed_line_becomes_null_row() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("{VALID}\n{{not json\n\n{VALID}\n");
        let input = InputFile::open(&write_gzip(dir.path(), "a.json.gz", &content)).unwrap();
        let schema = RecordSchema::reviews();
        let mut scan = PartitionScan::open(
            &input,
            input.plan(1 << 20)[0],
            &schema,
            options(None),
            ScanProgress::new(input.len),
        )
        .unwrap();

        let batch = scan.next_batch().unwrap().unwrap();
        assert!(scan.next_batch().unwrap().is_none());
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.num_columns(), 9);
        for col in batch.columns() {
            assert!(col.is_null(1));
        }

        let stats = scan.stats();
        assert_eq!(stats.rows, 3);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_field_conversion() {
        let schema = RecordSchema::reviews();
        let mut builder = BatchBuilder::new(&schema, 4);
        let outcome = builder.append_line(VALID.as_bytes(), 1, ParseMode::Permissive).unwrap();
        assert_eq!(outcome, LineOutcome::Row);

        let outcome = builder
            .append_line(
                br#"{"reviewerID":"A2","overall":"five","unixReviewTime":12.5}"#,
                2,
                ParseMode::Permissive,
            )
            .unwrap();
        assert_eq!(outcome, LineOutcome::PartialRow);

        let batch = builder.finish().unwrap();
        let helpful = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(helpful.value(0), "[2,3]");

        let overall = batch.column(5).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(overall.value(0), 5.0);
        assert!(overall.is_null(1));

        let time = batch.column(7).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(time.value(0), 1382140800);
        assert!(time.is_null(1));

        let reviewer = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(reviewer.value(1), "A2");
        assert!(builder.is_empty());
    }

    #[test]
    fn test_drop_and_fail_fast_modes() {
        let schema = RecordSchema::reviews();
        let mut builder = BatchBuilder::new(&schema, 4);
        assert_eq!(
            builder.append_line(b"[1, 2]", 1, ParseMode::DropMalformed).unwrap(),
            LineOutcome::Dropped
        );
        assert_eq!(
            builder
                .append_line(br#"{"overall":"x"}"#, 2, ParseMode::DropMalformed)
                .unwrap(),
            LineOutcome::Dropped
        );
        assert!(builder.is_empty());

        let err = builder
            .append_line(b"{broken", 7, ParseMode::FailFast)
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedRecord { line: 7, .. }));
    }

    #[test]
    fn test_limit_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!("{VALID}\n").repeat(100);
        let input = InputFile::open(&write_gzip(dir.path(), "a.json.gz", &content)).unwrap();
        let progress = ScanProgress::new(input.len);
        let batches: Vec<_> = PartitionScan::open(
            &input,
            input.plan(1 << 20)[0],
            &RecordSchema::reviews(),
            options(Some(2)),
            progress.clone(),
        )
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();

        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        assert_eq!(progress.rows(), 2);
    }

    #[test]
    fn test_cancelled_scan() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputFile::open(&write_plain(dir.path(), "a.json", VALID)).unwrap();
        let progress = ScanProgress::new(input.len);
        progress.cancel();
        let mut scan = PartitionScan::open(
            &input,
            input.plan(1 << 20)[0],
            &RecordSchema::reviews(),
            options(None),
            progress,
        )
        .unwrap();
        assert!(matches!(scan.next(), Some(Err(EngineError::Cancelled))));
        assert!(scan.next().is_none());
    }
}
