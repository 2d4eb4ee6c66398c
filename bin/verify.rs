use abn_verify::{
    upload_from_path, verify_csv, write_export, BatchFailurePolicy, EnrichedRecord, ResultSink,
    RunSummary, VerifyConfig,
};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Keeps records for export and logs progress as batches land.
#[derive(Default)]
struct ProgressSink {
    records: Vec<EnrichedRecord>,
}

impl ResultSink for ProgressSink {
    fn on_batch(&mut self, records: Vec<EnrichedRecord>, processed: usize, total: usize) {
        self.records.extend(records);
        log::info!("verified {processed}/{total}");
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        if !summary.lost.is_empty() {
            log::warn!("{} rows lost to failed batches", summary.lost.len());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("abn-verify")
        .about("Verify the ABNs in a CSV file and export the enriched rows")
        .arg(
            Arg::new("path")
                .long("path")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("out")
                .long("out")
                .help("Write the export here instead of stdout")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("guid")
                .long("guid")
                .help("ABR GUID (defaults to ABN_LOOKUP_GUID)"),
        )
        .arg(
            Arg::new("charset")
                .long("charset")
                .help("Encoding of uploads without a BOM")
                .default_value("utf-8"),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("delay-ms")
                .long("delay-ms")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("drop-failed")
                .long("drop-failed")
                .help("Emit nothing for batches that fail instead of placeholder rows")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = VerifyConfig::from_env()?;
    if let Some(guid) = matches.get_one::<String>("guid") {
        config.guid = Some(guid.clone());
    }
    if let Some(size) = matches.get_one::<usize>("batch-size") {
        config.batch_size = *size;
    }
    if let Some(ms) = matches.get_one::<u64>("delay-ms") {
        config.batch_delay = Duration::from_millis(*ms);
    }
    if let Some(ms) = matches.get_one::<u64>("timeout-ms") {
        config.lookup_timeout = Duration::from_millis(*ms);
    }
    if matches.get_flag("drop-failed") {
        config.failure_policy = BatchFailurePolicy::Drop;
    }

    let label = matches
        .get_one::<String>("charset")
        .map(String::as_str)
        .unwrap_or("utf-8");
    let charset = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| anyhow::anyhow!("unknown charset {label}"))?;

    let path = matches
        .get_one::<PathBuf>("path")
        .ok_or_else(|| anyhow::anyhow!("--path is required"))?;
    let start = Instant::now();
    let upload = upload_from_path(path, charset).await?;

    let mut sink = ProgressSink::default();
    let summary = verify_csv(&upload.text, &config, &mut sink).await?;

    match matches.get_one::<PathBuf>("out") {
        Some(out) => write_export(tokio::fs::File::create(out).await?, &sink.records).await?,
        None => write_export(tokio::io::stdout(), &sink.records).await?,
    }

    let elapsed = start.elapsed().as_secs_f64();
    eprintln!(
        "source={} crc=0x{:08x} rows={} emitted={} active={} cancelled={} \
         failed_batches={}\nelapsed={:.1}s",
        path.display(),
        upload.checksum,
        summary.total,
        summary.emitted,
        summary.active,
        summary.cancelled,
        summary.failed_batches,
        elapsed
    );
    Ok(())
}
