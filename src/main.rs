use cardkeep::{AppState, auth, cli::{self, Args}, config::Config, db};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    args.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let db_pool = db::connect(&config).await?;

    if let Some(command) = &args.command {
        if cli::run_command(&db_pool, command).await? {
            db_pool.close().await;
            return Ok(());
        }
    }

    let clients = auth::Clients::from_config(config.discord.as_ref())
        .map_err(|err| anyhow::anyhow!("invalid discord settings: {err:?}"))?;
    if config.discord.is_none() {
        info!("DISCORD_CLIENT_ID not set, discord login is disabled");
    }

    let app = cardkeep::app(AppState {
        db_pool: db_pool.clone(),
        clients,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => tracing::error!(%err, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
