//! Doctor's Workspace API server binary.
//!
//! Wires configuration, the database, the core services and the background
//! refresher/housekeeper behind the HTTP router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dws_api::config::ApiConfig;
use dws_core::audit::{AuditStore, Auditor, PgAuditStore};
use dws_core::auth::AuthPolicy;
use dws_core::auth::jwt::TokenMint;
use dws_core::auth::password::Hasher;
use dws_core::auth::queries::{PgSessionStore, PgUserStore};
use dws_core::auth::service::AuthCore;
use dws_core::auth::store::{SessionStore, UserStore};
use dws_core::bootstrap::bootstrap_super_admin;
use dws_core::clock::{Clock, SystemClock};
use dws_core::crypto::CryptoBox;
use dws_core::dropbox::manager::TokenManager;
use dws_core::dropbox::oauth::DropboxOAuthClient;
use dws_core::dropbox::refresh::{RefreshScheduler, RefreshSchedulerConfig};
use dws_core::dropbox::store::{ConfigStore, PgConfigStore};
use dws_core::housekeeping::Housekeeper;
use dws_core::mail::smtp::{PgSmtpConfigStore, SmtpConfigStore, SmtpMailer, SmtpSettings};
use dws_core::memory::{
    MemoryAuditStore, MemoryConfigStore, MemoryResetStore, MemorySessionStore,
    MemorySmtpConfigStore, MemoryUserStore,
};
use dws_core::reset::ResetPolicy;
use dws_core::reset::flow::ResetFlow;
use dws_core::reset::store::{PgResetStore, ResetStore};
use dws_core::db;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "dws_api_server", about = "Doctor's Workspace API server")]
struct Args {
    /// Port to listen on. Overrides the port in `BIND_ADDR`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/dws"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Seconds between background Dropbox token refreshes.
    #[arg(long, default_value_t = 10_800)]
    refresh_interval_secs: u64,

    /// Seconds between sweeps of expired sessions and reset tickets.
    #[arg(long, default_value_t = 900)]
    sweep_interval_secs: u64,

    /// Keep all state in process memory instead of PostgreSQL. Development only.
    #[arg(long, default_value_t = false)]
    in_memory: bool,
}

/// One handle per persisted collection.
struct Stores {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditStore>,
    dropbox: Arc<dyn ConfigStore>,
    tickets: Arc<dyn ResetStore>,
    smtp: Arc<dyn SmtpConfigStore>,
}

impl Stores {
    async fn postgres(args: &Args) -> Result<Self, db::DbError> {
        info!(max_connections = args.max_connections, "configuring connection pool");
        let pool = db::connect(&args.database_url, args.max_connections).await?;

        info!("running database migrations");
        db::migrate(&pool).await?;

        Ok(Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            sessions: Arc::new(PgSessionStore::new(pool.clone())),
            audit: Arc::new(PgAuditStore::new(pool.clone())),
            dropbox: Arc::new(PgConfigStore::new(pool.clone())),
            tickets: Arc::new(PgResetStore::new(pool.clone())),
            smtp: Arc::new(PgSmtpConfigStore::new(pool)),
        })
    }

    fn memory() -> Self {
        warn!("in-memory mode: nothing survives a restart");
        Self {
            users: Arc::new(MemoryUserStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            audit: Arc::new(MemoryAuditStore::new()),
            dropbox: Arc::new(MemoryConfigStore::new()),
            tickets: Arc::new(MemoryResetStore::new()),
            smtp: Arc::new(MemorySmtpConfigStore::new()),
        }
    }
}

fn bind_addr(config: &ApiConfig, port: Option<u16>) -> String {
    match port {
        Some(port) => {
            let host = config
                .bind_addr
                .rsplit_once(':')
                .map(|(host, _)| host)
                .unwrap_or("127.0.0.1");
            format!("{host}:{port}")
        }
        None => config.bind_addr.clone(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dws_api=debug,dws_core=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = ApiConfig::from_env();

    info!(port = ?args.port, in_memory = args.in_memory, "starting dws_api_server");

    let stores = if args.in_memory {
        Stores::memory()
    } else {
        Stores::postgres(&args).await?
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let crypto = Arc::new(CryptoBox::from_env_value(config.encryption_key.as_deref())?);
    let auditor = Auditor::new(stores.audit.clone(), clock.clone());
    let mint = Arc::new(TokenMint::new(config.jwt_secret.as_bytes(), clock.clone()));
    let hasher = Hasher::default();
    let reset_policy = ResetPolicy::default();

    let auth = Arc::new(AuthCore::new(
        stores.users.clone(),
        stores.sessions.clone(),
        mint.clone(),
        hasher,
        auditor.clone(),
        clock.clone(),
        AuthPolicy::default(),
    ));

    let mailer = Arc::new(SmtpMailer::new(stores.smtp.clone(), crypto.clone()));
    let reset = Arc::new(ResetFlow::new(
        stores.users.clone(),
        stores.tickets.clone(),
        stores.sessions.clone(),
        mint,
        hasher,
        mailer,
        auditor.clone(),
        clock.clone(),
        reset_policy.clone(),
    ));

    let dropbox = Arc::new(TokenManager::new(
        stores.dropbox.clone(),
        Arc::new(DropboxOAuthClient::new()?),
        crypto.clone(),
        auditor.clone(),
        clock.clone(),
    ));
    let smtp = Arc::new(SmtpSettings::new(
        stores.smtp.clone(),
        crypto,
        auditor,
        clock.clone(),
    ));

    if let Some(seed) = ApiConfig::super_admin_seed() {
        match bootstrap_super_admin(&auth, seed).await? {
            Some(user) => info!(user_id = %user.id, "super admin created"),
            None => info!("super admin already present"),
        }
    }

    let refresher = RefreshScheduler::new(
        dropbox.clone(),
        RefreshSchedulerConfig {
            interval: Duration::from_secs(args.refresh_interval_secs),
        },
    );
    refresher.start().await?;

    let housekeeper = Housekeeper::new(
        stores.sessions.clone(),
        stores.tickets.clone(),
        clock,
        Duration::from_secs(args.sweep_interval_secs),
    )
    .with_ticket_retention(reset_policy.window);
    housekeeper.start().await?;

    let state = dws_api::AppState {
        auth,
        reset,
        dropbox,
        smtp,
        config: config.clone(),
    };
    let app = dws_api::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr(&config, args.port)).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    // Stop background work before reporting how the server ended.
    if let Err(e) = refresher.stop().await {
        warn!(error = %e, "dropbox refresher did not stop cleanly");
    }
    if let Err(e) = housekeeper.stop().await {
        warn!(error = %e, "housekeeper did not stop cleanly");
    }

    served?;
    info!("server stopped");
    Ok(())
}
