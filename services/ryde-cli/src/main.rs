//! Ryde fleet CLI
//!
//! One-shot commands against the Ryde API with a session that persists
//! between invocations. Sign in once with `ryde login --remember`; every
//! later command reuses the stored session and refreshes it when the
//! access token expires.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ryde_client::{
    AuthEvent, BookingFilters, DEFAULT_KEEPALIVE_INTERVAL, LoginRequest, RydeClient, SessionStore,
    VehicleFilters, spawn_keepalive_task,
};

use crate::config::Config;

const USAGE: &str = "\
Usage: ryde [--config <path>] <command>

Commands:
  login --email <email> [--remember]        Sign in; password from RYDE_PASSWORD or password_file
  logout                                    Sign out and clear local session state
  whoami                                    Show the signed-in profile
  vehicles [--status <s>] [--page <n>]      List fleet vehicles
  bookings [--status <s>] [--vehicle <id>]  List bookings
  refresh                                   Force a session refresh
  watch [--interval-secs <n>]               Keep the session alive until interrupted";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = command_arg(&args).map(str::to_owned) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config_path = Config::resolve_path(flag_value(&args, "--config").as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        path = %config_path.display(),
        base_url = %config.api.base_url,
        session_file = %config.session.file.display(),
        "configuration loaded"
    );

    let store = SessionStore::load(config.session.file.clone())
        .await
        .context("loading session state")?;
    let client = RydeClient::builder()
        .base_url(config.api.base_url.clone())
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .session_store(Arc::new(store))
        .build()
        .context("building API client")?;

    match command.as_str() {
        "login" => login(&client, &config, &args).await,
        "logout" => logout(&client).await,
        "whoami" => whoami(&client).await,
        "vehicles" => vehicles(&client, &args).await,
        "bookings" => bookings(&client, &args).await,
        "refresh" => refresh(&client).await,
        "watch" => watch(&client, &args).await,
        other => {
            eprintln!("unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }
}

async fn login(client: &RydeClient, config: &Config, args: &[String]) -> Result<()> {
    let email = flag_value(args, "--email").context("login requires --email <email>")?;
    let password = config
        .password
        .as_ref()
        .context("no password configured; set RYDE_PASSWORD or password_file")?;
    let remember = has_flag(args, "--remember");

    let request = LoginRequest {
        email,
        password: password.as_str().to_owned(),
    };
    let payload = client.auth().login(&request, remember).await?;
    println!(
        "signed in as {} {} <{}>",
        payload.user.first_name, payload.user.last_name, payload.user.email
    );
    if remember {
        println!("session saved; it will survive restarts");
    }
    Ok(())
}

async fn logout(client: &RydeClient) -> Result<()> {
    client.auth().logout().await?;
    println!("signed out");
    Ok(())
}

async fn whoami(client: &RydeClient) -> Result<()> {
    let profile = client.auth().profile().await?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

async fn vehicles(client: &RydeClient, args: &[String]) -> Result<()> {
    let filters = VehicleFilters {
        status: flag_value(args, "--status"),
        page: parse_flag(args, "--page")?,
        limit: parse_flag(args, "--limit")?,
    };
    let page = client.vehicles().list(&filters).await?;
    for vehicle in &page.data {
        println!("#{:<6} {:<12} {}", vehicle.id, vehicle.status, vehicle.name);
    }
    println!(
        "page {}/{} ({} total)",
        page.pagination.page, page.pagination.total_pages, page.pagination.total
    );
    Ok(())
}

async fn bookings(client: &RydeClient, args: &[String]) -> Result<()> {
    let filters = BookingFilters {
        status: flag_value(args, "--status"),
        vehicle_id: parse_flag(args, "--vehicle")?,
        start_date: flag_value(args, "--from"),
        end_date: flag_value(args, "--to"),
        page: parse_flag(args, "--page")?,
        limit: parse_flag(args, "--limit")?,
    };
    let page = client.bookings().list(&filters).await?;
    for booking in &page.data {
        println!(
            "#{:<6} {:<10} {} to {}  {:>9.2}  {}",
            booking.id,
            booking.status,
            booking.start_date,
            booking.end_date,
            booking.total_price,
            booking.vehicle_name.as_deref().unwrap_or("-"),
        );
    }
    println!(
        "page {}/{} ({} total)",
        page.pagination.page, page.pagination.total_pages, page.pagination.total
    );
    Ok(())
}

async fn refresh(client: &RydeClient) -> Result<()> {
    client.refresh_session().await?;
    println!("session refreshed");
    Ok(())
}

async fn watch(client: &RydeClient, args: &[String]) -> Result<()> {
    let interval = parse_flag(args, "--interval-secs")?
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL);
    let mut events = client.subscribe_auth_events();
    let keepalive = spawn_keepalive_task(client.clone(), interval);

    println!("keeping session alive; press Ctrl-C to stop");
    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("stopping");
            Ok(())
        }
        event = events.recv() => match event {
            Ok(AuthEvent::Unauthorized) => {
                Err(anyhow::anyhow!("session expired; run `ryde login` again"))
            }
            Err(_) => Ok(()),
        },
    };
    keepalive.abort();
    outcome
}

/// First non-flag argument, skipping over `--config <path>`.
fn command_arg(args: &[String]) -> Option<&str> {
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 2,
            arg if !arg.starts_with("--") => return Some(arg),
            _ => i += 1,
        }
    }
    None
}

/// Value following `name` in the argument list, if any.
fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match flag_value(args, name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_returns_the_following_argument() {
        let args = args(&["vehicles", "--status", "active", "--page", "2"]);
        assert_eq!(flag_value(&args, "--status").as_deref(), Some("active"));
        assert_eq!(flag_value(&args, "--page").as_deref(), Some("2"));
        assert!(flag_value(&args, "--limit").is_none());
    }

    #[test]
    fn flag_value_at_end_of_args_is_none() {
        let args = args(&["vehicles", "--status"]);
        assert!(flag_value(&args, "--status").is_none());
    }

    #[test]
    fn parse_flag_rejects_non_numeric_values() {
        let args = args(&["vehicles", "--page", "two"]);
        let result: Result<Option<u32>> = parse_flag(&args, "--page");
        assert!(result.is_err());
    }

    #[test]
    fn command_arg_skips_config_flag_and_value() {
        let full = args(&["--config", "/etc/ryde.toml", "vehicles", "--page", "2"]);
        assert_eq!(command_arg(&full), Some("vehicles"));
        assert_eq!(command_arg(&[]), None);
        assert_eq!(command_arg(&args(&["--config", "x.toml"])), None);
    }

    #[test]
    fn has_flag_matches_exact_arguments() {
        let args = args(&["login", "--email", "a@b.c", "--remember"]);
        assert!(has_flag(&args, "--remember"));
        assert!(!has_flag(&args, "--rem"));
    }
}
