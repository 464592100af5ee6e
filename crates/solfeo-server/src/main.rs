use anyhow::Result;
use rand::Rng;
use solfeo_common::types::ActorRole;
use solfeo_notify::plugin::TransportRegistry;
use solfeo_storage::{ActorDirectory, SqliteDirectory, StudentDirectory};
use std::fmt::Write;
use std::net::SocketAddr;
use std::path::Path;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use solfeo_server::app;
use solfeo_server::auth;
use solfeo_server::config::{DirectorySeedFile, ServerConfig};
use solfeo_server::seed;
use solfeo_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  solfeo-server [serve] [config.toml]                         Start the server");
    eprintln!("  solfeo-server init-directory <config.toml> <seed.json>      Load students, actors and classes");
    eprintln!("  solfeo-server issue-token <config.toml> <id>                Print a bearer token for an actor or student");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    solfeo_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("solfeo=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("init-directory") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-directory requires <config.toml> and <seed.json> arguments")
            })?;
            let seed_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("init-directory requires <seed.json> argument")
            })?;
            run_init_directory(config_path, seed_path)
        }
        Some("issue-token") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("issue-token requires <config.toml> and <id> arguments")
            })?;
            let subject = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("issue-token requires <id> argument")
            })?;
            run_issue_token(config_path, subject)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        Some("serve") => {
            let config_path = args.get(2).map(String::as_str).unwrap_or("config/server.toml");
            run_server(config_path).await
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn open_directory(config: &ServerConfig) -> Result<SqliteDirectory> {
    let data_dir = Path::new(&config.data_dir);
    std::fs::create_dir_all(data_dir)?;
    Ok(SqliteDirectory::new(data_dir)?)
}

/// Loads students, actors and classes from a JSON seed file.
fn run_init_directory(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let directory = open_directory(&config)?;

    let seed_content = std::fs::read_to_string(seed_path)
        .map_err(|e| anyhow::anyhow!("Failed to read seed file '{}': {}", seed_path, e))?;
    let seed: DirectorySeedFile = serde_json::from_str(&seed_content)
        .map_err(|e| anyhow::anyhow!("Failed to parse seed file '{}': {}", seed_path, e))?;

    let summary = seed::apply_directory_seed(&directory, &seed);
    tracing::info!(
        students = summary.students,
        actors = summary.actors,
        classes = summary.classes,
        failed = summary.failed,
        "init-directory completed"
    );
    if summary.failed > 0 {
        anyhow::bail!("{} seed entries could not be written", summary.failed);
    }
    Ok(())
}

/// Prints a token for a directory entry. Requires a configured secret.
#[allow(clippy::print_stdout)]
fn run_issue_token(config_path: &str, subject: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let secret = config
        .auth
        .jwt_secret
        .clone()
        .ok_or_else(|| anyhow::anyhow!("issue-token requires auth.jwt_secret in {config_path}"))?;
    let directory = open_directory(&config)?;

    let (name, role) = if let Some(actor) = directory.find_actor(subject)? {
        (actor.display_name, actor.role)
    } else if let Some(student) = directory.find_student(subject)? {
        (student.display_name, ActorRole::Student)
    } else {
        anyhow::bail!("'{subject}' is neither an actor nor a student");
    };

    let token = auth::create_token(&secret, subject, &name, role, config.auth.token_expire_secs)?;
    tracing::info!(sub = %subject, role = %role, "Token issued");
    println!("{token}");
    Ok(())
}

fn random_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        data_dir = %config.data_dir,
        locale = %config.notify.locale,
        transports = config.transports.len(),
        "solfeo-server starting"
    );

    let jwt_secret = match config.auth.jwt_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!("auth.jwt_secret not set, tokens will not survive a restart");
            random_secret()
        }
    };

    let shutdown = CancellationToken::new();
    let registry = TransportRegistry::default();
    let http_port = config.http_port;
    let state = AppState::build(config, &registry, jwt_secret, shutdown.clone())?;
    let app = app::build_http_app(state);

    let http_addr: SocketAddr = ([0, 0, 0, 0], http_port).into();
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "Server started");

    let http_server = axum::serve(listener, app).with_graceful_shutdown(async move {
        signal::ctrl_c().await.ok();
        tracing::info!("Shutting down gracefully");
        shutdown.cancel();
    });
    if let Err(e) = http_server.await {
        tracing::error!(error = %e, "HTTP server error");
    }

    tracing::info!("Server stopped");
    Ok(())
}
