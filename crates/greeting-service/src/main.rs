use clap::{Parser, ValueEnum};
use greeting_core::StoreConfig;
use greeting_service::{build_router, PaymentLedgerConfig, ServiceConfig, ServiceState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreMode {
    Auto,
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PaymentLedgerMode {
    /// Every publish payment waits for a human reviewer.
    Manual,
    /// Development only: every code is confirmed.
    AcceptAll,
    /// Confirm the codes listed in --confirmed-codes, queue the rest.
    ConfirmedCodes,
}

#[derive(Debug, Parser)]
#[command(name = "greetingd", version, about = "Greeting lifecycle REST service")]
struct Cli {
    /// REST socket address to bind, e.g. 127.0.0.1:8092
    #[arg(long, default_value = "127.0.0.1:8092", env = "GREETING_LISTEN")]
    listen: SocketAddr,
    /// File used to persist payments awaiting manual review.
    #[arg(long, default_value = "data/reviews.json", env = "GREETING_REVIEW_QUEUE")]
    review_queue: PathBuf,
    /// Greeting store backend. `auto` picks postgres when a database url is configured.
    #[arg(long, value_enum, default_value_t = StoreMode::Auto, env = "GREETING_STORE")]
    store: StoreMode,
    /// PostgreSQL url for greetings and the payment ledger.
    #[arg(long, env = "GREETING_DATABASE_URL")]
    database_url: Option<String>,
    /// Max PostgreSQL pool connections.
    #[arg(long, default_value_t = 5, env = "GREETING_PG_MAX_CONNECTIONS")]
    pg_max_connections: u32,
    /// Where submitted payment codes are checked.
    #[arg(long, value_enum, default_value_t = PaymentLedgerMode::Manual, env = "GREETING_PAYMENT_LEDGER")]
    payment_ledger: PaymentLedgerMode,
    /// Comma-separated codes for `--payment-ledger confirmed-codes`.
    #[arg(long, env = "GREETING_CONFIRMED_CODES", default_value = "")]
    confirmed_codes: String,
    /// Credential required on review and ledger routes. Unset disables those routes.
    #[arg(long, env = "GREETING_OPERATOR_TOKEN", hide_env_values = true)]
    operator_token: Option<String>,
    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false, env = "GREETING_LOG_JSON")]
    log_json: bool,
}

fn resolve_store(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let resolved_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let store = match cli.store {
        StoreMode::Memory => StoreConfig::Memory,
        StoreMode::Postgres => {
            let database_url = resolved_url.ok_or_else(|| {
                anyhow::anyhow!("store=postgres requires --database-url or DATABASE_URL")
            })?;
            StoreConfig::postgres(database_url, cli.pg_max_connections)
        }
        StoreMode::Auto => {
            if let Some(database_url) = resolved_url {
                StoreConfig::postgres(database_url, cli.pg_max_connections)
            } else {
                StoreConfig::Memory
            }
        }
    };

    Ok(store)
}

fn resolve_payment_ledger(cli: &Cli) -> anyhow::Result<PaymentLedgerConfig> {
    let ledger = match cli.payment_ledger {
        PaymentLedgerMode::Manual => PaymentLedgerConfig::Manual,
        PaymentLedgerMode::AcceptAll => PaymentLedgerConfig::AcceptAll,
        PaymentLedgerMode::ConfirmedCodes => {
            let codes: Vec<String> = cli
                .confirmed_codes
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect();
            if codes.is_empty() {
                anyhow::bail!(
                    "payment_ledger=confirmed-codes requires --confirmed-codes or GREETING_CONFIRMED_CODES"
                );
            }
            PaymentLedgerConfig::ConfirmedCodes(codes)
        }
    };

    Ok(ledger)
}

fn init_tracing(json: bool) {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "greeting_service=info,info".to_string());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = ServiceConfig {
        review_queue_path: cli.review_queue.clone(),
        store: resolve_store(&cli)?,
        payment_ledger: resolve_payment_ledger(&cli)?,
        operator_token: cli.operator_token.clone(),
    };
    info!(
        store = config.store.label(),
        queue = %config.review_queue_path.display(),
        operator_routes = config.operator_token.is_some(),
        "Starting greeting-service"
    );

    let state = ServiceState::bootstrap(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("greeting-service REST listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
