//! # Integration Tests
//!
//! End-to-end runs of the loader against the in-process engine.
//!
//! Covers:
//! - Contract snapshot checks
//! - Full runs over small NDJSON inputs (plain and gzip)
//! - Failure paths: missing input, existing output

#[cfg(test)]
mod contract_tests {
    use contracts::{ConfigVersion, PipelineSettings, RecordSchema};

    #[test]
    fn test_contracts_compile() {
        let _ = ConfigVersion::V1;
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = PipelineSettings::default();
        assert!(config_loader::ConfigLoader::validate(&settings).is_ok());
        assert_eq!(RecordSchema::reviews().len(), 9);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use arrow::array::Array;
    use contracts::{ParseMode, PipelineSettings, SaveMode};
    use engine::writer::SUCCESS_MARKER;
    use observability::{Diagnostics, DiagnosticsConfig, NO_GPU_FOUND};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use reviews_loader::pipeline::{Pipeline, COMPLETE_MARKER, START_MARKER};

    const REVIEWS: [&str; 3] = [
        r#"{"reviewerID":"A2SUAM1J3GNN3B","asin":"0000013714","reviewerName":"J. McDonald","helpful":[2,3],"reviewText":"I bought this for my husband.","overall":5.0,"summary":"Heavenly Highway Hymns","unixReviewTime":1252800000,"reviewTime":"09 13, 2009"}"#,
        r#"{"reviewerID":"A3QL7TRO7MZ2JD","asin":"0000013714","reviewerName":"Cathy","helpful":[0,0],"reviewText":"Great book.","overall":4.0,"summary":"Good","unixReviewTime":1381536000,"reviewTime":"10 12, 2013"}"#,
        r#"{"reviewerID":"AMOL6Z7N25LZ2","asin":"0000031852","overall":3.0,"unixReviewTime":1359158400}"#,
    ];
    const MALFORMED: &str = r#"{"reviewerID": "broken"#;

    /// Three reviews followed by one malformed line
    fn reviews_ndjson() -> String {
        REVIEWS
            .iter()
            .chain(std::iter::once(&MALFORMED))
            .map(|line| format!("{line}\n"))
            .collect()
    }

    fn settings(dir: &Path, input: PathBuf) -> PipelineSettings {
        let mut settings = PipelineSettings::default();
        settings.input.path = input;
        settings.output.path = dir.join("amazon_reviews.parquet");
        settings.logging.dir = dir.join("logs");
        settings.session.event_log.dir = dir.join("logs/spark_events");
        settings.session.driver_memory = "256m".parse().unwrap();
        settings.session.executor_memory = "256m".parse().unwrap();
        settings.sampling.count_timeout_secs = 10;
        settings
    }

    fn scoped_logs(settings: &PipelineSettings) -> Diagnostics {
        Diagnostics::scoped(DiagnosticsConfig {
            console: None,
            ..DiagnosticsConfig::from_settings(&settings.logging)
        })
        .unwrap()
    }

    fn parquet_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
            .collect();
        files.sort();
        files
    }

    /// Total rows and null `reviewerID` values across all part files
    fn read_output(dir: &Path) -> (usize, usize) {
        let mut rows = 0;
        let mut null_ids = 0;
        for path in parquet_files(dir) {
            let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
                .unwrap()
                .build()
                .unwrap();
            for batch in reader {
                let batch = batch.unwrap();
                rows += batch.num_rows();
                null_ids += batch.column_by_name("reviewerID").unwrap().null_count();
            }
        }
        (rows, null_ids)
    }

    #[tokio::test]
    async fn test_full_run_plain_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reviews.json");
        fs::write(&input, reviews_ndjson()).unwrap();
        let settings = settings(dir.path(), input);
        let output = settings.output.path.clone();
        let event_dir = settings.session.event_log.dir.clone();
        let diagnostics = scoped_logs(&settings);

        let report = Pipeline::new(settings.clone()).run().await.unwrap();

        let count = report.row_count.unwrap();
        assert!(count.complete);
        assert_eq!(count.estimate, 4);
        assert_eq!(report.written.rows, 4);
        assert!(report.written.files >= 1);
        assert!(report.output_bytes > 0);
        assert!(report.memory.is_some());

        // Malformed line kept as an all-null row
        assert_eq!(read_output(&output), (4, 1));
        assert!(output.join(SUCCESS_MARKER).exists());
        assert!(parquet_files(&output)
            .iter()
            .all(|p| p.to_string_lossy().contains(&report.app_id)));

        // Event log finalized under the application id
        assert!(event_dir.join(&report.app_id).exists());
        assert!(!event_dir.join(format!("{}.inprogress", report.app_id)).exists());

        let gpu_info = fs::read_to_string(settings.logging.gpu_info_file()).unwrap();
        assert!(report.gpu_available || gpu_info == NO_GPU_FOUND);

        diagnostics.flush();
        let log = fs::read_to_string(diagnostics.log_file()).unwrap();
        assert!(log.contains(START_MARKER));
        assert!(log.contains("Input file size: 0.00 GB"));
        assert!(log.contains("Approximate row count: 4 (exact)"));
        assert!(log.contains(COMPLETE_MARKER));
        assert!(log.contains(" - INFO - "));

        // The file keeps DEBUG lines whatever the console level
        assert!(log.contains(" - DEBUG - "));
        assert!(log.contains("Session config: engine.app.name = AmazonReviewsLoader"));

        let sample = sample_table(&log);
        assert!(sample.contains("A2SUAM1J3GNN3B"));
        assert!(sample.contains("A3QL7TRO7MZ2JD"));
        assert!(!sample.contains("AMOL6Z7N25LZ2"));
        assert!(!sample.contains("|null"));
    }

    /// The sample table logged by the run, up to its footer
    fn sample_table(log: &str) -> String {
        log.lines()
            .skip_while(|line| !line.ends_with("Sample records:"))
            .skip(1)
            .take_while(|line| !line.contains("only showing top 2 rows"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_rerun_overwrites_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reviews.json");
        fs::write(&input, reviews_ndjson()).unwrap();
        let settings = settings(dir.path(), input);
        let output = settings.output.path.clone();
        let _diagnostics = scoped_logs(&settings);

        Pipeline::new(settings.clone()).run().await.unwrap();
        fs::write(output.join("part-99999-stale.parquet"), b"stale").unwrap();

        let report = Pipeline::new(settings).run().await.unwrap();
        assert!(!output.join("part-99999-stale.parquet").exists());
        assert_eq!(parquet_files(&output).len(), report.written.files);
        assert_eq!(read_output(&output), (4, 1));
    }

    #[tokio::test]
    async fn test_full_run_gzip_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reviews.json.gz");
        let mut encoder =
            flate2::write::GzEncoder::new(File::create(&input).unwrap(), flate2::Compression::default());
        encoder.write_all(reviews_ndjson().as_bytes()).unwrap();
        encoder.finish().unwrap();

        let mut settings = settings(dir.path(), input);
        settings.input.parse_mode = ParseMode::DropMalformed;
        let output = settings.output.path.clone();
        let _diagnostics = scoped_logs(&settings);

        let report = Pipeline::new(settings).run().await.unwrap();

        // Gzip input is not splittable
        assert_eq!(report.partitions, 1);
        assert_eq!(report.written.files, 1);
        assert_eq!(report.row_count.unwrap().estimate, 3);
        assert_eq!(read_output(&output), (3, 0));
    }

    #[tokio::test]
    async fn test_missing_input_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), dir.path().join("All_Amazon_Review.json.gz"));
        let output = settings.output.path.clone();
        let diagnostics = scoped_logs(&settings);

        let err = Pipeline::new(settings).run().await.unwrap_err();

        assert!(format!("{err:?}").contains("input file not found"));
        assert!(!output.exists());

        diagnostics.flush();
        let log = fs::read_to_string(diagnostics.log_file()).unwrap();
        assert!(log.contains(START_MARKER));
        assert!(log.contains(" - ERROR - "));
        assert!(!log.contains(COMPLETE_MARKER));
    }

    #[tokio::test]
    async fn test_existing_output_with_error_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reviews.json");
        fs::write(&input, reviews_ndjson()).unwrap();
        let mut settings = settings(dir.path(), input);
        settings.output.save_mode = SaveMode::ErrorIfExists;
        fs::create_dir_all(&settings.output.path).unwrap();
        fs::write(settings.output.path.join("keep.parquet"), b"old").unwrap();
        let output = settings.output.path.clone();
        let _diagnostics = scoped_logs(&settings);

        let err = Pipeline::new(settings).run().await.unwrap_err();

        assert!(err.to_string().contains("Failed to write Parquet"));
        assert_eq!(fs::read(output.join("keep.parquet")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_count_returns_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("reviews.json");
        let content: String = (0..500).map(|_| format!("{}\n", REVIEWS[0])).collect();
        fs::write(&input, content).unwrap();
        let mut settings = settings(dir.path(), input);
        settings.sampling.count_timeout_secs = 1;
        let _diagnostics = scoped_logs(&settings);

        let report = Pipeline::new(settings).run().await.unwrap();

        let count = report.row_count.unwrap();
        assert!(report.timings.get("count").unwrap().as_secs_f64() < 5.0);
        if count.complete {
            assert_eq!(count.estimate, 500);
        } else {
            assert!(count.low <= count.estimate && count.estimate <= count.high);
        }
        assert_eq!(report.written.rows, 500);
    }
}
