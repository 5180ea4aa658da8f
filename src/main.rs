use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tonpool_client::app::App;
use tonpool_client::client;
use tonpool_client::config::{parse_gpu_range, Config, LogLevel};
use tonpool_client::executor::TaskExecutor;

const DEFAULT_URL: &str = "server.tonguys.com";
const DEFAULT_MINER: &str = "pow-miner-cuda";
const DEFAULT_GPU_RANGE: &str = "[0-0]";
const DEFAULT_ITERATIONS: u64 = 100_000_000_000;

#[derive(Parser)]
#[command(name = "tonpool-client", version)]
#[command(about = "TON pool mining client - drives local GPU pow-miners against a pool server")]
struct Cli {
    /// Pool auth token (get one from the pool's registration bot)
    #[arg(short, long)]
    token: String,
    /// Pool server host or URL
    #[arg(short, long, default_value = DEFAULT_URL)]
    url: String,
    /// Log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Debug)]
    level: LogLevel,
    /// Path to the pow-miner executable (defaults to ./pow-miner-cuda)
    #[arg(short, long)]
    miner: Option<PathBuf>,
    /// GPU boost factor, passed through to the miner as -F
    #[arg(short = 'F', long, default_value_t = 64)]
    boost_factor: u32,
    /// Devices: [0-2,4,7-9] is #0,#1,#2,#4,#7,#8,#9; [0,3] is #0,#3; [0] is #0
    #[arg(short = 'G', long, default_value = DEFAULT_GPU_RANGE)]
    gpu_range: String,
    /// Per-attempt iteration cap handed to the miner
    #[arg(short, long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: u64,
    /// Directory for the rolling log file
    #[arg(long, default_value = "logs")]
    log_path: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let devices = match parse_gpu_range(&cli.gpu_range) {
        Ok(devices) => devices,
        Err(e) => {
            eprintln!("gpu range parsing error: {}", e);
            std::process::exit(1);
        }
    };

    let cfg = Config {
        token: cli.token,
        pool_url: cli.url,
        log_level: cli.level,
        log_path: cli.log_path,
        miner_path: cli.miner.unwrap_or_else(default_miner_path),
        boost_factor: cli.boost_factor,
        iterations: cli.iterations,
        devices,
    };

    // The guard flushes the file sink on drop; it must outlive the loop.
    let _log_guard = init_logging(&cfg);

    let executor = Arc::new(TaskExecutor::new(&cfg));
    let app = Arc::new(App::new(executor));

    let app_for_signal = app.clone();
    ctrlc::set_handler(move || {
        println!("\nshutting down gracefully...");
        app_for_signal.stop();
    })
    .expect("Ctrl-C");

    let rt = tokio::runtime::Runtime::new().unwrap();
    let client = client::build(&cfg);
    let code = rt.block_on(app.run(&cfg, client.as_ref()));
    std::process::exit(code);
}

fn default_miner_path() -> PathBuf {
    std::env::current_dir()
        .map(|dir| dir.join(DEFAULT_MINER))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_MINER))
}

/// One JSON line per event, to stdout and to a rolling file sink.
fn init_logging(cfg: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if let Err(e) = std::fs::create_dir_all(&cfg.log_path) {
        eprintln!("can't create log directory {}: {}", cfg.log_path.display(), e);
        std::process::exit(1);
    }
    let file_appender = tracing_appender::rolling::hourly(&cfg.log_path, "tonpool-client.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(cfg.log_level.as_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_thread_names(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}
