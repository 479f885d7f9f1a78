use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use beacon_localizer::{Localizer, LocalizerConfig, MotionInput};
use clap::Parser;
use flate2::read::GzDecoder;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(about = "Feed a recorded LIDAR byte stream through the localizer")]
struct Args {
    /// Raw capture (.bin) or gzip capture (.gz)
    #[arg(long)]
    capture: PathBuf,

    /// JSON config (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bytes handed to the localizer per read, like a serial port would
    #[arg(long, default_value = "512")]
    chunk: usize,

    /// Zero-motion predict step applied before each chunk [s] (0 = none)
    #[arg(long, default_value = "0.0")]
    still_dt: f64,
}

fn open_capture(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LocalizerConfig::from_json_file(path)?,
        None => LocalizerConfig::default(),
    };
    let mut localizer = Localizer::new(config)?;
    let mut reader = open_capture(&args.capture)?;
    let mut buf = vec![0u8; args.chunk.max(1)];
    let mut scan_index = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if args.still_dt > 0.0 {
            localizer.predict(&MotionInput::still(args.still_dt))?;
        }
        for report in localizer.ingest(&buf[..n]) {
            let line = json!({
                "scan": scan_index,
                "x_mm": report.pose.x,
                "y_mm": report.pose.y,
                "heading_deg": report.pose.theta.to_degrees(),
                "trace": report.covariance_trace,
                "samples": report.scan_len,
                "applied": report.applied,
                "visibility": report.visibility,
            });
            println!("{}", line);
            scan_index += 1;
        }
    }

    let summary = json!({
        "capture": args.capture.display().to_string(),
        "state": localizer.state(),
        "stats": localizer.stats(),
        "final_pose": localizer.pose(),
    });
    eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
