use crate::server::{ServerState, Settings, cache::PageCache, mail::Outbox, media::MediaStore};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yatube_common::{
    model::group::{CreateGroup, InvalidSlugError, Slug},
    paginate::Paginator,
    util::PositiveDuration,
};
use yatube_db::client::{DbClient, DbError};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error(transparent)]
    InvalidSlug(#[from] InvalidSlugError),
    #[error("POSTS_PER_PAGE must be at least 1")]
    ZeroPageSize,
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    #[serde(default = "default_server_address")]
    server_address: IpAddr,
    #[serde(default = "default_server_port")]
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_media_root")]
    media_root: PathBuf,
    #[serde(default = "default_sent_emails_dir")]
    sent_emails_dir: PathBuf,
    #[serde(default = "default_posts_per_page")]
    posts_per_page: usize,
    #[serde(default = "default_index_cache_seconds")]
    index_cache_seconds: u64,
    /// Zero keeps sessions until logout.
    #[serde(default = "default_session_age_seconds")]
    session_age_seconds: u64,
    #[serde(default = "default_site_url")]
    site_url: String,
}

fn default_server_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_server_port() -> u16 {
    8000
}

fn default_database_url() -> String {
    "sqlite://yatube.db".to_owned()
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_sent_emails_dir() -> PathBuf {
    PathBuf::from("sent_emails")
}

fn default_posts_per_page() -> usize {
    10
}

fn default_index_cache_seconds() -> u64 {
    20
}

fn default_session_age_seconds() -> u64 {
    14 * 24 * 60 * 60
}

fn default_site_url() -> String {
    "http://127.0.0.1:8000".to_owned()
}

/// Yatube blog server.
#[derive(Parser, Debug)]
#[command(name = "yatube", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the site (the default).
    Serve,
    /// Add a community group. Groups have no web form.
    CreateGroup {
        #[arg(long)]
        title: String,
        #[arg(long)]
        slug: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "yatube_api=debug,\
                yatube_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    let cli = Cli::parse();

    install_tracing();
    let env = get_env()?;

    let db_client = DbClient::connect(&env.database_url).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(env, db_client).await,
        Command::CreateGroup {
            title,
            slug,
            description,
        } => {
            let group = CreateGroup {
                title,
                slug: Slug::new(slug)?,
                description,
            };
            let group_id = db_client.create_group(&group).await?;
            info!(%group_id, slug = group.slug.get(), "Created group");

            Ok(())
        }
    }
}

async fn serve(env: Env, db_client: DbClient) -> Result<(), InitError> {
    let per_page = NonZeroUsize::new(env.posts_per_page).ok_or(InitError::ZeroPageSize)?;

    let state = ServerState {
        db_client: Arc::new(db_client),
        settings: Arc::new(Settings {
            paginator: Paginator::new(per_page),
            session_age: PositiveDuration::from_seconds(env.session_age_seconds),
            site_url: env.site_url.trim_end_matches('/').to_owned(),
        }),
        page_cache: PageCache::new(Duration::from_secs(env.index_cache_seconds)),
        media: Arc::new(MediaStore::new(env.media_root)),
        outbox: Arc::new(Outbox::new(env.sent_emails_dir)),
    };

    let app = server::app(state);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "Listening for Ctrl-C failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(%err, "Listening for SIGTERM failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
