use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration};

use beacon_localizer::lidar::Handshake;
use beacon_localizer::live_status::LiveStatus;
use beacon_localizer::transport::{SerialTransport, DEFAULT_BAUD};
use beacon_localizer::{
    Error, Localizer, LocalizerConfig, MotionInput, RplidarDriver, SharedLocalizer,
};

#[derive(Parser, Debug)]
#[command(name = "beacon_localizer")]
#[command(about = "Beacon-based pose localizer for an RPLIDAR C1", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// LIDAR serial port
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    #[arg(long, default_value_t = DEFAULT_BAUD)]
    baud: u32,

    /// JSON config (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for live status files
    #[arg(long, default_value = "localizer_sessions")]
    output_dir: String,

    /// Seconds between status updates
    #[arg(long, default_value = "2")]
    status_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("[{}] Beacon Localizer Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!("  Port: {} @ {} baud", args.port, args.baud);
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)?;

    let config = match &args.config {
        Some(path) => LocalizerConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LocalizerConfig::default(),
    };
    let shared = SharedLocalizer::new(Localizer::new(config)?);

    let transport = SerialTransport::open(&args.port, args.baud, Duration::from_millis(50))
        .with_context(|| format!("opening {}", args.port))?;
    let mut driver = RplidarDriver::new(transport);
    match driver.start_scan()? {
        Handshake::Confirmed => log::info!("Scan descriptor confirmed"),
        Handshake::Unexpected(bytes) => {
            log::warn!("Continuing after unexpected descriptor ({} bytes)", bytes.len())
        }
    }

    let running = Arc::new(AtomicBool::new(true));

    // LIDAR ingestion: blocking serial reads on their own thread
    let lidar_handle = {
        let shared = shared.clone();
        let running = running.clone();
        tokio::task::spawn_blocking(move || -> beacon_localizer::Result<()> {
            let mut buf = [0u8; 4096];
            while running.load(Ordering::Relaxed) {
                let n = match driver.read_or_retry(&mut buf) {
                    Ok(0) => continue,
                    Ok(n) => n,
                    Err(e) => {
                        if matches!(e, Error::Disconnected) {
                            log::error!("LIDAR disconnected");
                        }
                        running.store(false, Ordering::Relaxed);
                        return Err(e);
                    }
                };
                for report in shared.ingest(&buf[..n])? {
                    log::debug!(
                        "pose ({:.0}, {:.0}, {:.1}°) beacons {}/{}",
                        report.pose.x,
                        report.pose.y,
                        report.pose.theta.to_degrees(),
                        report.applied,
                        report.visibility.len()
                    );
                }
            }
            driver.stop()
        })
    };

    // Odometry: one line per increment on stdin. Plain thread: a blocked
    // stdin read must not hold up runtime shutdown.
    let _odometry_handle = {
        let shared = shared.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let result = MotionInput::parse_line(&line).and_then(|m| shared.predict(&m));
                if let Err(e) = result {
                    log::warn!("Ignoring odometry line {:?}: {}", line, e);
                }
            }
        })
    };

    let start = Utc::now();
    let mut ticker = interval(Duration::from_secs(args.status_interval.max(1)));
    let status_path = format!("{}/live_status.json", args.output_dir);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
        if args.duration > 0 && uptime >= args.duration {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }

        let snap = shared.latest_pose();
        log::info!(
            "pose ({:.0}, {:.0}, {:.1}°) trace {:.1} visible {}",
            snap.pose.x,
            snap.pose.y,
            snap.pose.theta.to_degrees(),
            snap.covariance_trace,
            snap.visible_beacons
        );
        let status = shared.with(|l| LiveStatus::from_localizer(l, uptime))?;
        if let Err(e) = status.save(&status_path) {
            log::warn!("Could not write {}: {}", status_path, e);
        }
    }

    running.store(false, Ordering::Relaxed);
    if let Err(e) = lidar_handle.await? {
        log::warn!("LIDAR task ended with: {}", e);
    }

    let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
    let final_status = shared.with(|l| LiveStatus::from_localizer(l, uptime))?;
    let final_path = format!("{}/live_status_{}_final.json", args.output_dir, ts_now_clean());
    final_status.save(&final_path)?;

    let stats = final_status.stats;
    println!("\n=== Final Stats ===");
    println!("Frames decoded: {}", stats.frames_decoded);
    println!("Bytes skipped: {}", stats.bytes_skipped);
    println!("Scans: {} completed, {} discarded", stats.scans_completed, stats.scans_discarded);
    println!("Observations applied: {}", stats.observations_applied);
    println!(
        "Pose: ({:.1}, {:.1}) mm, {:.2}°",
        final_status.x_mm, final_status.y_mm, final_status.heading_deg
    );

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
