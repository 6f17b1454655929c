use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use sqlx::SqlitePool;

use crate::{config::Config, identity};

#[derive(Debug, Parser)]
#[command(version, about = "Card registry service")]
pub struct Args {
    /// Overrides DATABASE_URL.
    #[arg(long)]
    pub database_url: Option<String>,
    /// Overrides BIND_ADDR.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API (the default).
    Serve,
    /// Issue an API key for a managed account, creating the account if needed.
    CreateApiKey {
        #[arg(short, long, default_value = "cardkeep")]
        name: String,
    },
}

impl Args {
    pub fn apply(&self, config: &mut Config) {
        if let Some(database_url) = &self.database_url {
            config.database_url = database_url.clone();
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
    }
}

/// Runs a one-shot command. Returns `false` when the server should start.
pub async fn run_command(db_pool: &SqlitePool, command: &Command) -> anyhow::Result<bool> {
    match command {
        Command::Serve => Ok(false),
        Command::CreateApiKey { name } => {
            let user = identity::managed_user(db_pool, name).await?;
            let key = identity::issue_api_key(db_pool, user.id).await?;
            println!("{key}");
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db,
        identity::{AuthMethod, hash_key},
    };

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from(["cardkeep", "--database-url", "sqlite::memory:", "--bind", "127.0.0.1:9000"]);
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert!(args.command.is_none());
    }

    #[tokio::test]
    async fn created_keys_belong_to_a_managed_user() {
        let db_pool = db::memory().await.unwrap();
        let args = Args::parse_from(["cardkeep", "create-api-key", "--name", "dealer"]);

        let done = run_command(&db_pool, args.command.as_ref().unwrap()).await.unwrap();
        assert!(done);

        let managed = identity::managed_user(&db_pool, "dealer").await.unwrap();
        let (hash,): (String,) = sqlx::query_as("SELECT hash FROM api_auth WHERE user_id = ?")
            .bind(managed.id)
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(hash.len(), 64);

        let issued = identity::issue_api_key(&db_pool, managed.id).await.unwrap();
        let found = identity::find(&db_pool, AuthMethod::ApiKey(hash_key(&issued))).await.unwrap();
        assert_eq!(found.map(|user| user.id), Some(managed.id));
    }
}
