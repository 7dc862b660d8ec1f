use anyhow::Result;
use clap::Parser;
use quay_cli::{Cli, Command, ProtocolArg};
use quay_config::{AppConfig, AppPaths, ConfigManager};
use quay_core::{
    ConnectionConfig, ConnectionManager, DirCache, EventBus, FileManager, Protocol, Side,
    TransferQueue,
};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use zeroize::Zeroizing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = AppPaths::new()?;
    let config_manager = ConfigManager::new(paths.clone());
    let config = config_manager.load(std::env::current_dir().ok().as_deref(), None)?;
    let _log_guard = init_logging(&config, &paths)?;

    match cli.command {
        Command::Config { init } => {
            if init {
                config_manager.save_default()?;
                println!("config initialized at {}", paths.config_file.display());
            }
        }
        Command::Connect {
            target,
            protocol,
            path,
            simulate,
        } => {
            run_connect(&config, &target, protocol, &path, simulate).await?;
        }
    }

    Ok(())
}

async fn run_connect(
    config: &AppConfig,
    target: &str,
    protocol: ProtocolArg,
    remote_path: &str,
    simulate: bool,
) -> Result<()> {
    let bus = EventBus::new(256);
    let conn = Arc::new(ConnectionManager::new(config.remote.clone(), bus.clone()));
    let local_path = std::env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "/".to_string());
    let cache = Arc::new(DirCache::new(
        conn.clone(),
        local_path,
        config.ui.show_hidden_files,
    ));
    let queue = TransferQueue::new(
        conn.clone(),
        cache.clone(),
        bus,
        config.transfer.refresh_listings,
    );
    let manager = FileManager::new(conn, cache, queue);

    if simulate {
        let info = manager.connect_simulated().await;
        println!("{}", info.message);
    } else {
        let protocol = match protocol {
            ProtocolArg::Ftp => Protocol::Ftp,
            ProtocolArg::Sftp => Protocol::Sftp,
        };
        let default_port = match protocol {
            Protocol::Ftp => config.remote.ftp_port,
            Protocol::Sftp => config.remote.sftp_port,
        };
        let (username, host, port) = parse_target(target, default_port);
        let password = Zeroizing::new(std::env::var("QUAY_PASSWORD").unwrap_or_default());
        let info = manager
            .connect(ConnectionConfig {
                protocol,
                host,
                port,
                username,
                password,
            })
            .await?;
        println!("{}", info.message);
    }

    let entries = manager.load_remote_at(remote_path.to_string()).await?;
    println!("{}:", manager.remote_path());
    for entry in &entries {
        let kind = if entry.is_dir { "d" } else { "-" };
        let modified = entry
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{kind} {:>10}  {modified}  {}", entry.size, entry.name);
    }
    manager.load_local().await?;
    println!(
        "local pane: {} ({} entries)",
        manager.local_path(),
        manager.entries(Side::Local).len()
    );

    manager.disconnect().await?;
    Ok(())
}

fn init_logging(
    config: &AppConfig,
    paths: &AppPaths,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(&paths.log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&paths.log_dir, "quay.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let file_layer = if config.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed()
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if config.logging.stdout {
        let stdout_layer = if config.logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed()
        };
        tracing::subscriber::set_global_default(subscriber.with(stdout_layer))?;
    } else {
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(guard)
}

fn parse_target(target: &str, default_port: u16) -> (String, String, u16) {
    let mut user_host = target;
    let mut user = whoami::username();
    let mut port = default_port;

    if let Some(at) = target.find('@') {
        user = target[..at].to_string();
        user_host = &target[at + 1..];
    }
    let host = if let Some(colon) = user_host.rfind(':') {
        if let Ok(p) = user_host[colon + 1..].parse::<u16>() {
            port = p;
            &user_host[..colon]
        } else {
            user_host
        }
    } else {
        user_host
    };
    (user, host.to_string(), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_target_forms() {
        assert_eq!(
            parse_target("alice@files.example.com:2222", 22),
            ("alice".to_string(), "files.example.com".to_string(), 2222)
        );
        let (_, host, port) = parse_target("files.example.com", 21);
        assert_eq!(host, "files.example.com");
        assert_eq!(port, 21);
    }
}
