//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::ConfigLoader;
use contracts::{FieldSpec, PipelineSettings, RecordSchema};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Settings info for JSON output
#[derive(Serialize)]
struct SettingsInfo<'a> {
    source: String,
    settings: &'a PipelineSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a [FieldSpec]>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let source = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Configuration file not found: {}", path.display());
            }
            path.display().to_string()
        }
        None => "built-in defaults".to_string(),
    };
    info!(source = %source, "Loading settings info");

    let settings = ConfigLoader::load_or_default(args.config.as_deref())
        .with_context(|| format!("Failed to load settings from {source}"))?;
    let schema = RecordSchema::reviews();

    if args.json {
        let info = SettingsInfo {
            source,
            settings: &settings,
            schema: args.schema.then(|| schema.fields()),
        };
        let json = serde_json::to_string_pretty(&info).context("Failed to serialize settings info")?;
        println!("{}", json);
    } else {
        print_settings_info(&source, &settings, args.schema.then_some(&schema));
    }

    Ok(())
}

fn print_settings_info(source: &str, settings: &PipelineSettings, schema: Option<&RecordSchema>) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Reviews Loader Settings                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("Source: {source}\n");

    println!("📥 Input");
    println!("   ├─ Path: {}", settings.input.path.display());
    println!("   ├─ Parse mode: {:?}", settings.input.parse_mode);
    println!("   ├─ Batch size: {}", settings.input.batch_size);
    println!("   └─ Max partition size: {}", settings.input.max_partition_bytes);

    println!("\n📤 Output");
    println!("   ├─ Path: {}", settings.output.path.display());
    println!("   ├─ Save mode: {:?}", settings.output.save_mode);
    println!("   └─ Compression: {:?}", settings.output.compression);

    let session = &settings.session;
    println!("\n⚙️  Session");
    println!("   ├─ App name: {}", session.app_name);
    println!("   ├─ Driver memory: {}", session.driver_memory);
    println!("   ├─ Executor memory: {}", session.executor_memory);
    println!("   ├─ Shuffle partitions: {}", session.shuffle_partitions);
    if session.event_log.enabled {
        println!("   └─ Event log: {}", session.event_log.dir.display());
    } else {
        println!("   └─ Event log: disabled");
    }

    let sampling = &settings.sampling;
    println!("\n🔎 Sampling");
    println!("   ├─ Sample size: {}", sampling.sample_size);
    println!("   ├─ Count timeout: {}s", sampling.count_timeout_secs);
    println!("   └─ Count confidence: {}", sampling.count_confidence);

    println!("\n📝 Logging");
    println!("   ├─ Log file: {}", settings.logging.log_file().display());
    println!("   └─ GPU info: {}", settings.logging.gpu_info_file().display());

    if let Some(schema) = schema {
        println!("\n📋 Schema ({} fields)", schema.len());
        print!("{}", schema.tree_string());
    }

    println!();
}
