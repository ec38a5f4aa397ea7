use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use uno_worker::{
    build_pipeline,
    imaging::ImageFetcher,
    logger::{self, LogLevel, LoggerConfig},
    runtime::{self, local, JobQueueClient, RunMode, Worker},
    B2Storage, Config, Handler, Result, WorkerError,
};

#[derive(Parser, Debug)]
#[command(name = "uno-worker", version, about)]
struct Cli {
    /// Run a single job from this JSON document (`{"input": {...}}`) and print the result
    #[arg(long = "test-input", alias = "test_input", value_name = "JSON")]
    test_input: Option<String>,

    /// Serve the local development API instead of polling the job queue
    #[arg(long)]
    serve_api: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let dotenv_loaded = dotenv::dotenv().is_ok();

    let mut log_config = LoggerConfig::from_env();
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    if let Err(e) = logger::init_with_config(log_config) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if dotenv_loaded {
        log::info!("✅ .env file loaded");
    } else {
        log::debug!("No .env file found, using process environment");
    }

    if let Err(e) = run(cli).await {
        log::error!("❌ {}", e);
        log::Log::flush(log::logger());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    logger::log_startup_info(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    logger::log_config_info(&config);

    let test_input_file = local::read_test_input_file(Path::new(local::TEST_INPUT_FILE))?;
    let mode = runtime::select_mode(cli.test_input, cli.serve_api, &config.runtime, test_input_file)?;

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| WorkerError::ConfigError(format!("HTTP client: {}", e)))?;

    let storage = Arc::new(B2Storage::new(config.b2.clone(), http.clone()).await?);
    let pipeline = build_pipeline(&config.pipeline, http.clone()).await?;
    let handler = Arc::new(Handler::new(
        ImageFetcher::new(http.clone()),
        pipeline,
        storage,
        config.generation.clone(),
    ));

    match mode {
        RunMode::TestInput(raw) => {
            let output = local::run_test_input(&handler, &raw).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        RunMode::JobQueue => {
            let queue = JobQueueClient::new(&config.runtime, http)?;
            Worker::new(handler, queue, config.runtime.ping_interval)
                .run()
                .await
        }
        RunMode::ServeApi => serve_api(handler, config.runtime.port).await,
    }
}

#[cfg(feature = "server")]
async fn serve_api(handler: Arc<Handler>, port: u16) -> Result<()> {
    runtime::server::serve(handler, port).await
}

#[cfg(not(feature = "server"))]
async fn serve_api(_handler: Arc<Handler>, _port: u16) -> Result<()> {
    Err(WorkerError::ConfigError(
        "--serve-api requires the 'server' feature".into(),
    ))
}
