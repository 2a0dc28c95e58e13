use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use gps_ins_ekf::filters::{Ekf15, EkfConfig};
use gps_ins_ekf::nav_data::load_datafile;
use gps_ins_ekf::output::RunLog;
use gps_ins_ekf::Sample;

#[derive(Parser, Debug)]
#[command(name = "run_ekf")]
#[command(about = "GPS-aided strapdown INS: run the 15-state EKF over a recorded data file", long_about = None)]
struct Args {
    /// Path to the input record file (.csv or .csv.gz)
    data_file: PathBuf,

    /// Directory that receives the result CSV files
    output_dir: PathBuf,

    /// JSON file overriding the default noise tuning
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EkfConfig> {
    let Some(path) = path else {
        return Ok(EkfConfig::default());
    };
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse config {}", path.display()))
}

/// Run the filter over every sample; nothing is written here.
fn run_filter(config: &EkfConfig, samples: &[Sample]) -> anyhow::Result<RunLog> {
    let noise = config.configure()?;
    let mut ekf = Ekf15::new(noise);
    let mut log = RunLog::new();

    let Some((first, rest)) = samples.split_first() else {
        anyhow::bail!("No samples to process");
    };

    // Initialize with first instance of data
    ekf.initialize(first)?;
    log.record(first.timestamp_us, &ekf.get_state()?, &ekf.get_cov_full()?, false)?;

    for (i, sample) in rest.iter().enumerate() {
        let outcome = ekf
            .update(sample)
            .with_context(|| format!("Update failed at row {}", i + 2))?;
        log.record(
            sample.timestamp_us,
            &ekf.get_state()?,
            &ekf.get_cov_full()?,
            outcome.measurement_available(),
        )?;
    }

    let summary = ekf.snapshot()?;
    log::info!(
        "Processed {} samples: {} fixes fused, {} stale, {} singular; final trace(P)={:.6}",
        log.len(),
        summary.fix_updates,
        summary.stale_samples,
        summary.singular_rejections,
        summary.covariance_trace
    );
    log::debug!("Final state: {}", serde_json::to_string(&summary)?);
    Ok(log)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Datafile path: {}", ts_now(), args.data_file.display());
    println!("[{}] Output directory: {}", ts_now(), args.output_dir.display());

    let config = load_config(args.config.as_deref())?;
    let samples = load_datafile(&args.data_file)
        .with_context(|| format!("Failed to load {}", args.data_file.display()))?;
    println!("[{}] NavDataSize: {}", ts_now(), samples.len());

    let log = run_filter(&config, &samples)?;
    log.write_dir(&args.output_dir)?;

    println!("[{}] Wrote {} rows to {}", ts_now(), log.len(), args.output_dir.display());
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
