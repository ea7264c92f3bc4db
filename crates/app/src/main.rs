use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use courtbook_config::Config;
use courtbook_engine::{BookingEngine, BookingError, RecordingSink};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::OffsetTime;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = env!("COURTBOOK_GIT_HASH");

type Engine = BookingEngine<RecordingSink>;

fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH})")
}

fn now() -> chrono::NaiveDateTime {
    Local::now().naive_local()
}

// --- CLI definition ---

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "courtbook")]
#[command(about = "Gym court booking manager")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("COURTBOOK_GIT_HASH"), ")"))]
struct Cli {
    /// Log level (default from config)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Display log timestamps in UTC (default: local time)
    #[arg(long, global = true)]
    utc: bool,

    /// Database URL (default from config)
    #[arg(long, global = true)]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and the periodic late-arrival sweep
    Serve {
        /// Port to listen on (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Register a new player
    RegisterPlayer {
        /// Display name
        #[arg(long)]
        name: String,
        /// Contact email (unique)
        #[arg(long)]
        email: String,
    },
    /// Book a court session
    Book {
        /// Player id
        #[arg(long)]
        player: i64,
        /// Court number (1-6)
        #[arg(long)]
        court: i64,
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        /// Start time (HH:MM); sessions run two hours
        #[arg(long)]
        time: String,
    },
    /// Confirm a promoted waiting-list booking
    Confirm {
        /// Booking id
        #[arg(long)]
        booking: i64,
    },
    /// List sessions and seat counts for a date
    ListSessions {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
    /// List a player's bookings
    Bookings {
        /// Player id
        #[arg(long)]
        player: i64,
    },
    /// Show a player's warnings and fines
    Penalties {
        /// Player id
        #[arg(long)]
        player: i64,
    },
    /// Run one late-arrival sweep now
    Sweep,
}

// --- Logging ---

fn init_logging(level: &str, utc: bool) {
    let filter = EnvFilter::new(level.to_string());

    if utc {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(OffsetTime::new(
                time::UtcOffset::UTC,
                time::macros::format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
                ),
            ))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTimer)
            .init();
    }
}

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

// --- Server ---

fn http_error(e: BookingError) -> (StatusCode, String) {
    let status = match &e {
        BookingError::Validation(_) => StatusCode::BAD_REQUEST,
        BookingError::AlreadyBooked => StatusCode::CONFLICT,
        BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": version_string()
    }))
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
}

async fn api_register_player(
    State(engine): State<Engine>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<courtbook_models::Player>, (StatusCode, String)> {
    courtbook_db::add_player(engine.pool(), &body.name, &body.email)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))
}

#[derive(Deserialize)]
struct BookRequest {
    player_id: i64,
    court_number: i64,
    date: String,
    start_time: String,
}

async fn api_book(
    State(engine): State<Engine>,
    Json(body): Json<BookRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let admission = engine
        .book_session(
            body.player_id,
            body.court_number,
            &body.date,
            &body.start_time,
            now(),
        )
        .await
        .map_err(http_error)?;
    Ok(Json(json!({
        "message": admission.message(),
        "admission": admission,
    })))
}

async fn api_confirm(
    State(engine): State<Engine>,
    Path(booking_id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    engine
        .confirm_booking(booking_id, now())
        .await
        .map_err(http_error)?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct SessionsQuery {
    date: String,
}

async fn api_sessions(
    State(engine): State<Engine>,
    Query(params): Query<SessionsQuery>,
) -> Result<Json<Vec<courtbook_models::AvailableSession>>, (StatusCode, String)> {
    engine
        .available_sessions(&params.date)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn api_player_bookings(
    State(engine): State<Engine>,
    Path(player_id): Path<i64>,
) -> Result<Json<Vec<courtbook_models::BookingDetail>>, (StatusCode, String)> {
    engine
        .player_bookings(player_id)
        .await
        .map(Json)
        .map_err(http_error)
}

async fn api_player_penalties(
    State(engine): State<Engine>,
    Path(player_id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let player = engine
        .player_penalties(player_id)
        .await
        .map_err(|e| match e {
            BookingError::Validation(msg) => (StatusCode::NOT_FOUND, msg),
            other => http_error(other),
        })?;
    Ok(Json(json!({
        "player_id": player.id,
        "warnings": player.warnings,
        "fines": player.fines,
    })))
}

async fn api_player_notifications(
    State(engine): State<Engine>,
    Path(player_id): Path<i64>,
) -> Result<Json<Vec<courtbook_models::Notification>>, (StatusCode, String)> {
    courtbook_db::list_notifications(engine.pool(), player_id)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn run_server(port: u16, sweep_interval_secs: u64, engine: Engine) -> anyhow::Result<()> {
    info!("courtbook v{}", version_string());

    let sweeper = engine.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(sweep_interval_secs));
        loop {
            tick.tick().await;
            if let Err(e) = sweeper.run_late_arrival_sweep(now()).await {
                error!("Late-arrival sweep failed: {e:#}");
            }
        }
    });

    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/players", post(api_register_player))
        .route("/players/{id}/bookings", get(api_player_bookings))
        .route("/players/{id}/penalties", get(api_player_penalties))
        .route("/players/{id}/notifications", get(api_player_notifications))
        .route("/bookings", post(api_book))
        .route("/bookings/{id}/confirm", post(api_confirm))
        .route("/sessions", get(api_sessions));

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(engine);

    let addr = format!("0.0.0.0:{port}");
    info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .as_ref()
        .map(|l| l.to_string())
        .unwrap_or_else(|| config.log_level.clone());
    init_logging(&log_level, cli.utc || config.utc);

    let db_url = cli.db_url.clone().unwrap_or_else(|| config.db_url.clone());
    let pool = courtbook_db::connect(&db_url).await?;
    courtbook_db::migrate(&pool).await?;
    let engine = BookingEngine::new(pool.clone(), RecordingSink::new(pool.clone()));

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            run_server(port, config.sweep_interval_secs, engine).await?;
        }
        Commands::RegisterPlayer { name, email } => {
            let player = courtbook_db::add_player(&pool, &name, &email).await?;
            println!("Registered {} <{}> (id={})", player.name, player.email, player.id);
        }
        Commands::Book { player, court, date, time } => {
            match engine.book_session(player, court, &date, &time, now()).await {
                Ok(admission) => println!("{}", admission.message()),
                Err(e) => {
                    println!("Booking failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Confirm { booking } => {
            match engine.confirm_booking(booking, now()).await {
                Ok(()) => println!("Booking {booking} confirmed"),
                Err(e) => {
                    println!("Confirmation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::ListSessions { date } => {
            let sessions = engine.available_sessions(&date).await?;
            if sessions.is_empty() {
                println!("No sessions booked for {date} yet.");
            } else {
                println!("{:<8} {:<8} {:<14} {}", "Session", "Court", "Time", "Seats");
                println!("{}", "-".repeat(44));
                for s in &sessions {
                    println!(
                        "{:<8} {:<8} {:<14} {}/6",
                        s.session_id,
                        s.court_number,
                        format!("{}-{}", s.start_time, s.end_time),
                        s.booked,
                    );
                }
                println!("\n{} session(s) on {date}", sessions.len());
            }
        }
        Commands::Bookings { player } => {
            let bookings = engine.player_bookings(player).await?;
            if bookings.is_empty() {
                println!("No bookings for player {player}.");
            } else {
                println!("{:<8} {:<8} {:<12} {:<14} {}", "Booking", "Court", "Date", "Time", "Status");
                println!("{}", "-".repeat(60));
                for b in &bookings {
                    println!(
                        "{:<8} {:<8} {:<12} {:<14} {}",
                        b.booking_id,
                        b.court_number,
                        b.date,
                        format!("{}-{}", b.start_time, b.end_time),
                        serde_json::to_value(b.status)?.as_str().unwrap_or("?"),
                    );
                }
            }
        }
        Commands::Penalties { player } => {
            let p = engine.player_penalties(player).await?;
            println!("Player {} ({}): {} warning(s), ${:.2} in fines", p.id, p.name, p.warnings, p.fines);
        }
        Commands::Sweep => {
            let report = engine.run_late_arrival_sweep(now()).await?;
            println!(
                "Sweep done: {} late, {} no-shows, {} promoted, {} promotions expired",
                report.late, report.no_shows, report.promoted, report.expired
            );
        }
    }

    Ok(())
}
