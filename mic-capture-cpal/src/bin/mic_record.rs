//! Record a microphone to a WAV file from the command line.
//!
//! ```text
//! mic-record --list-devices
//! mic-record --device 1 --sample-rate 48000 --gain 1.5 --output take.wav
//! ```
//!
//! Ctrl-C stops the recording and finalizes the file.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use mic_capture_core::{
    BitDepth, CaptureError, DeviceDescriptor, RecorderConfiguration, RecordingController, RecordingState, StreamFormat,
    COMMON_SAMPLE_RATES,
};
use mic_capture_cpal::CpalDeviceRegistry;

const METER_WIDTH: usize = 40;
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "mic-record", version, about = "Record a microphone to a WAV file")]
struct Args {
    /// List capture devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Device index from --list-devices [default: system default input]
    #[arg(short, long)]
    device: Option<usize>,

    /// Sample rate in Hz [default: from config, 44100]
    #[arg(short = 'r', long)]
    sample_rate: Option<u32>,

    /// Bits per sample: 8, 16, 24 or 32 [default: from config, 16]
    #[arg(short, long)]
    bit_depth: Option<u16>,

    /// 1 = mono, 2 = stereo [default: from config, 1]
    #[arg(short, long)]
    channels: Option<u16>,

    /// Linear gain applied before writing.
    #[arg(short, long, env = "MIC_RECORD_GAIN")]
    gain: Option<f64>,

    /// Destination file [default: <output_directory>/<prefix>_<timestamp>.wav]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    duration: Option<f64>,

    /// JSON recorder configuration file.
    #[arg(long, env = "MIC_RECORD_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("mic-record: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), CaptureError> {
    let config = load_config(args.config.as_ref())?;
    let format = resolve_format(&args, &config.default_format)?;
    let controller = RecordingController::new(CpalDeviceRegistry::new(), config)?;

    let devices = controller.enumerate_devices()?;
    if args.list_devices {
        print_devices(&devices);
        return Ok(());
    }

    let device = pick_device(&devices, args.device)?;
    if let Some(gain) = args.gain {
        controller.set_gain(gain)?;
    }
    if let Some(secs) = args.duration {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(CaptureError::Configuration(format!("invalid duration: {}", secs)));
        }
    }

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .map_err(|e| CaptureError::Configuration(format!("failed to install Ctrl-C handler: {}", e)))?;

    let path = controller.start(device.index, format, args.output)?;
    println!("Recording '{}' at {} to {}", device.name, format, path.display());
    if args.duration.is_none() {
        println!("Press Ctrl-C to stop.");
    }

    let started = Instant::now();
    let deadline = args.duration.map(Duration::from_secs_f64);
    loop {
        match stop_rx.recv_timeout(REFRESH_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let status = controller.current_status();
        if status.state == RecordingState::Idle {
            // Ended from the capture side.
            println!();
            return Err(status
                .last_error
                .unwrap_or_else(|| CaptureError::Device("recording ended unexpectedly".into())));
        }
        draw_meter(controller.current_level(), status.duration_secs);

        if deadline.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
    }
    println!();

    let result = controller.stop()?;
    let status = controller.current_status();
    if let Some(err) = status.last_error {
        log::warn!("Recording finished with error: {}", err);
    }
    println!(
        "Wrote {} ({} frames, {:.2}s, sha256 {})",
        result.file_path.display(),
        result.frames,
        result.duration_secs,
        result.checksum
    );
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<RecorderConfiguration, CaptureError> {
    let Some(path) = path else {
        return Ok(RecorderConfiguration::default());
    };
    let json = fs::read_to_string(path)
        .map_err(|e| CaptureError::Configuration(format!("failed to read {}: {}", path.display(), e)))?;
    let config: RecorderConfiguration = serde_json::from_str(&json)
        .map_err(|e| CaptureError::Configuration(format!("invalid config {}: {}", path.display(), e)))?;
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn resolve_format(args: &Args, defaults: &StreamFormat) -> Result<StreamFormat, CaptureError> {
    let bit_depth = match args.bit_depth {
        Some(bits) => BitDepth::try_from(bits)?,
        None => defaults.bit_depth,
    };
    let format = StreamFormat::new(
        args.sample_rate.unwrap_or(defaults.sample_rate),
        bit_depth,
        args.channels.unwrap_or(defaults.channels),
    );
    format.validate()?;
    if !COMMON_SAMPLE_RATES.contains(&format.sample_rate) {
        log::warn!("Uncommon sample rate {} Hz; the device may reject it", format.sample_rate);
    }
    Ok(format)
}

fn pick_device(devices: &[DeviceDescriptor], index: Option<usize>) -> Result<DeviceDescriptor, CaptureError> {
    let found = match index {
        Some(i) => devices.iter().find(|d| d.index == i),
        None => devices.iter().find(|d| d.is_default).or_else(|| devices.first()),
    };
    found.cloned().ok_or_else(|| match index {
        Some(i) => CaptureError::Configuration(format!("no capture device at index {}", i)),
        None => CaptureError::Configuration("no capture devices available".into()),
    })
}

fn print_devices(devices: &[DeviceDescriptor]) {
    if devices.is_empty() {
        println!("No capture devices found.");
        return;
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("[{}] {}{}", device.index, device.name, marker);
    }
}

fn draw_meter(level: f32, elapsed_secs: f64) {
    let filled = ((level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize).min(METER_WIDTH);
    let bar = format!("{}{}", "#".repeat(filled), " ".repeat(METER_WIDTH - filled));
    print!("\r[{}] {:>4.2} {:>8.1}s", bar, level, elapsed_secs);
    let _ = io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<DeviceDescriptor> {
        vec![
            DeviceDescriptor::new(0, "Line In", false),
            DeviceDescriptor::new(1, "Built-in Microphone", true),
        ]
    }

    #[test]
    fn picks_default_device_when_unspecified() {
        assert_eq!(pick_device(&devices(), None).unwrap().index, 1);
    }

    #[test]
    fn picks_requested_index() {
        assert_eq!(pick_device(&devices(), Some(0)).unwrap().name, "Line In");
        assert!(matches!(pick_device(&devices(), Some(9)), Err(CaptureError::Configuration(_))));
        assert!(matches!(pick_device(&[], None), Err(CaptureError::Configuration(_))));
    }

    #[test]
    fn flags_override_config_format() {
        let args = Args::parse_from(["mic-record", "--sample-rate", "48000", "--bit-depth", "24"]);
        let format = resolve_format(&args, &StreamFormat::default()).unwrap();
        assert_eq!(format, StreamFormat::new(48000, BitDepth::TwentyFour, 1));
    }

    #[test]
    fn invalid_bit_depth_is_rejected() {
        let args = Args::parse_from(["mic-record", "--bit-depth", "12"]);
        assert!(resolve_format(&args, &StreamFormat::default()).is_err());
    }

    #[test]
    fn config_file_is_loaded() {
        let dir = std::env::temp_dir().join(format!("mic-record-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        fs::write(&path, r#"{"file_prefix":"Take","initial_gain":2.0}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.file_prefix, "Take");
        assert_eq!(config.initial_gain, 2.0);
        assert_eq!(config.default_format, StreamFormat::default());

        fs::remove_dir_all(&dir).unwrap();
    }
}
