use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::{Level, info, warn};

use rawpcm::rt::{TRANSFER_PRIORITY, lock_memory, pin_to_cpu, set_realtime_priority};
use rawpcm::stream::{self, StreamError};
use rawpcm::{BlockingMode, Direction, Handle, PcmError, SampleFormat, StreamParameters, VirtualDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StreamKind {
    Play,
    Record,
    /// Record when invoked as `arecord`, play otherwise.
    Default,
}

#[derive(Parser, Debug)]
#[command(version, about = "Play raw PCM from a file or stdin, or record it to a file or stdout", long_about = None)]
struct Args {
    /// PCM device name; "virtual" uses the built-in virtual device
    #[arg(short = 'D', long, default_value = "default")]
    device: String,

    /// Direction of the stream
    #[arg(long, value_enum, default_value = "default")]
    stream: StreamKind,

    /// File to play or record; stdin for play and stdout for record by default
    #[arg(long)]
    file: Option<PathBuf>,

    /// Sample format, e.g. U8, S16_LE, S24_3LE
    #[arg(short, long, default_value = "U8")]
    format: SampleFormat,

    /// Sample rate (in Hz) of device
    #[arg(short, long, default_value_t = 8000)]
    rate: u32,

    /// Number of channels
    #[arg(short, long, default_value_t = 1)]
    channels: u32,

    /// Number of periods, 0 for the device default
    #[arg(long, default_value_t = 0)]
    periods: u32,

    /// Buffer size in frames, 0 for the device default
    #[arg(long, default_value_t = 0)]
    buffer_size: usize,

    /// Bytes moved per transfer
    #[arg(long, default_value_t = 1000)]
    chunk: usize,

    /// Stop recording after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Open the device in non-blocking mode
    #[arg(long)]
    nonblock: bool,

    /// Run the transfer loop with SCHED_FIFO priority and locked memory
    #[arg(long)]
    realtime: bool,

    /// The CPU core to pin the transfer thread to
    #[arg(long)]
    cpu: Option<usize>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Pcm(#[from] PcmError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("cannot open '{path}': {source}")]
    File { path: PathBuf, source: io::Error },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn direction(kind: StreamKind) -> Direction {
    match kind {
        StreamKind::Play => Direction::Playback,
        StreamKind::Record => Direction::Capture,
        StreamKind::Default => {
            let invoked_as = std::env::args().next().unwrap_or_default();
            let record = Path::new(&invoked_as)
                .file_name()
                .is_some_and(|name| name == "arecord");
            if record {
                Direction::Capture
            } else {
                Direction::Playback
            }
        }
    }
}

fn open_file(path: &Path, direction: Direction) -> Result<File, CliError> {
    let result = match direction {
        Direction::Playback => File::open(path),
        Direction::Capture => File::create(path),
    };
    result.map_err(|source| CliError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn setup_realtime(args: &Args) {
    if let Some(cpu) = args.cpu {
        if let Err(e) = pin_to_cpu(cpu) {
            warn!("failed to pin transfer thread to CPU {}: {}", cpu, e);
        }
    }
    if args.realtime {
        if let Err(e) = set_realtime_priority(TRANSFER_PRIORITY) {
            warn!("failed to set real-time priority: {}. Try running with sudo.", e);
        }
        if let Err(e) = lock_memory() {
            warn!("failed to lock memory: {}", e);
        }
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let direction = direction(args.stream);
    let mode = if args.nonblock {
        BlockingMode::Nonblock
    } else {
        BlockingMode::Block
    };

    let mut handle = Handle::new();
    if args.device == "virtual" {
        let device = VirtualDevice::default();
        handle.open_with(&device, &args.device, direction, mode)?;
    } else {
        handle.open(&args.device, direction, mode)?;
    }

    let desired = StreamParameters::new(args.format, args.rate, args.channels)
        .with_periods(args.periods)
        .with_buffer_frames(args.buffer_size);
    let actual = handle.configure(desired)?;
    if actual.rate != desired.rate {
        warn!("rate {} Hz is not available, using {} Hz", desired.rate, actual.rate);
    }
    info!(device = %args.device, ?actual, "device configured");

    setup_realtime(args);

    let name = match &args.file {
        Some(path) => path.display().to_string(),
        None if direction == Direction::Playback => "stdin".to_string(),
        None => "stdout".to_string(),
    };
    eprintln!("{}", stream::describe(&handle, &name));

    let stats = match direction {
        Direction::Playback => {
            let mut source: Box<dyn Read> = match &args.file {
                Some(path) => Box::new(open_file(path, direction)?),
                None => Box::new(io::stdin().lock()),
            };
            stream::play(&mut handle, &mut source, args.chunk)?
        }
        Direction::Capture => {
            let limit = args.duration.map(|secs| stream::bytes_for(secs, &actual));
            let mut sink: Box<dyn Write> = match &args.file {
                Some(path) => Box::new(open_file(path, direction)?),
                None => Box::new(io::stdout().lock()),
            };
            stream::record(&mut handle, &mut sink, args.chunk, limit)?
        }
    };
    info!(bytes = stats.bytes, short = stats.short_transfers, "done");

    handle.close();
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
