use std::{
    env,
    fs::OpenOptions,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use payroll_remit::{
    AppConfig, AppState, DEFAULT_MAX_UPLOAD_BYTES, StorageConfig, SynonymTable, build_router,
    graceful_shutdown, logging_middleware,
};

/// The REST API server for payroll remittances.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The directory processed files and remittance challans are written to.
    #[arg(long, default_value = ".")]
    storage_root: PathBuf,

    /// A JSON file of column synonyms replacing the built-in table.
    #[arg(long)]
    columns_path: Option<PathBuf>,

    /// The canonical name of the local timezone, e.g. "Asia/Kolkata".
    #[arg(long, default_value = "Etc/UTC")]
    timezone: String,

    /// How many minutes a session lasts without activity.
    #[arg(long, default_value_t = 30)]
    session_minutes: i64,

    /// The largest accepted request body in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// The address to serve the API from.
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let ip = args
        .address
        .parse()
        .expect("The address must be a valid IP address.");
    let addr = SocketAddr::new(ip, args.port);

    let secret = env::var("SECRET").expect("The environment variable 'SECRET' must be set");

    let storage = StorageConfig::new(&args.storage_root).expect("Could not resolve storage root.");
    let mut config = AppConfig::new(&secret, storage);
    config.local_timezone = args.timezone;
    config.session_duration = Duration::minutes(args.session_minutes);
    config.max_upload_bytes = args.max_upload_bytes;

    if let Some(columns_path) = &args.columns_path {
        config.column_synonyms =
            SynonymTable::from_json_file(columns_path).expect("Could not load column synonyms.");
    }

    let connection = Connection::open(&args.db_path).expect("Could not open the database.");
    let state = AppState::new(connection, config).unwrap_or_else(|error| {
        tracing::error!("could not start the server: {error}");
        std::process::exit(1);
    });

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = build_router(state).layer(middleware::from_fn(logging_middleware));
    let router = add_tracing_layer(router);

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("The server stopped unexpectedly.");
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_ansi(false)
        .with_writer(Arc::new(log_file));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are rendered, not by the trace layer.
        .on_failure(());

    router.layer(tracing_layer)
}
