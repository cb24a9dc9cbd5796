use anyhow::Context;
use clap::Parser;
use latchkey_config::{ConfigLoad, ConfigLoader};
use latchkey_core::{
    MemoryUser, MemoryUserStore, RecordAccessor, SessionPipeline,
};
use latchkey_server::{AppState, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "latchkey-server", version, about = "Latchkey session host")]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "LATCHKEY_CONFIG")]
    config: Option<PathBuf>,

    /// Env file applied before reading the environment
    #[arg(long, env = "LATCHKEY_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Override the configured bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,

    /// Seed a user, may be repeated
    #[arg(long = "user", value_name = "LOGIN:PASSWORD", value_parser = parse_seed)]
    users: Vec<UserSeed>,
}

#[derive(Debug, Clone)]
struct UserSeed {
    login: String,
    password: String,
}

fn parse_seed(raw: &str) -> Result<UserSeed, String> {
    match raw.split_once(':') {
        Some((login, password)) if !login.trim().is_empty() => Ok(UserSeed {
            login: login.trim().to_string(),
            password: password.to_string(),
        }),
        _ => Err(format!("expected LOGIN:PASSWORD, got `{raw}`")),
    }
}

fn load_runtime_config(cli: &Cli) -> anyhow::Result<ConfigLoad> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path.clone());
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path.clone());
    }
    let load = loader.load().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,latchkey=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    for warning in load.warnings.iter() {
        match &warning.hint {
            Some(hint) => warn!(
                message = %warning.message,
                hint = %hint,
                "configuration warning"
            ),
            None => warn!(message = %warning.message, "configuration warning"),
        }
    }

    Ok(load)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ConfigLoad { config, .. } = load_runtime_config(&cli)?;

    let crypto = Arc::new(
        config
            .build_crypto()
            .context("failed to initialise password hashing")?,
    );
    let registry = Arc::new(
        config
            .build_registry()
            .context("failed to build session scopes")?,
    );
    let users = Arc::new(MemoryUserStore::new(Arc::clone(&crypto)));
    for seed in &cli.users {
        let user = users
            .insert_user(&seed.login, &seed.password)
            .with_context(|| format!("failed to seed user `{}`", seed.login))?;
        info!(login = %user.login, record_id = %user.id, "seeded user");
    }

    let pipeline = SessionPipeline::<MemoryUser>::builder(
        registry,
        Arc::clone(&users) as Arc<dyn RecordAccessor<MemoryUser>>,
        crypto,
    )
    .build();
    info!(scopes = ?pipeline.registry().scope_names(), "session scopes ready");

    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;

    let app = router(AppState::new(pipeline, users));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "latchkey server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
