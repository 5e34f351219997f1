// CLI module - command-line argument parsing and config handlers
//
// Subcommands:
// - config --show|--path|--reset: inspect or regenerate configuration
// - mock: run a mock server tab with its log on stdout
// - save: render a file as an HTTP response tab, persisting it to history

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use httpdash::config::{Config, VERSION};
use std::path::PathBuf;

/// httpdash - HTTP/WebSocket client dashboard core
#[derive(Parser)]
#[command(name = "httpdash")]
#[command(version = VERSION)]
#[command(about = "Session and rendering core for an HTTP/WebSocket client dashboard", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Run a local mock server and follow its log
    Mock {
        /// Port to listen on (0 picks a free port)
        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Path that gets the configured response
        #[arg(long, default_value = "/")]
        path: String,

        /// Response status code
        #[arg(long, default_value_t = 200)]
        status: u16,

        /// Response header as NAME:VALUE (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Response body
        #[arg(long)]
        body: Option<String>,

        /// Tab name for the mock server log
        #[arg(long, default_value = "mock")]
        tab: String,
    },

    /// Render a file as a response and persist it to history
    Save {
        /// Tab name the response belongs to
        #[arg(long)]
        tab: String,

        /// Content-Type of the file
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,

        /// Keep the body in memory instead of writing it to history
        #[arg(long)]
        no_log: bool,

        /// File to use as the response body
        file: PathBuf,
    },
}

/// Parse `NAME:VALUE` into a header pair
pub fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in '{}'", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Handle `config` subcommand flags
pub fn handle_config(show: bool, reset: bool, path: bool) -> Result<()> {
    if path {
        handle_config_path()
    } else if show {
        handle_config_show()
    } else if reset {
        handle_config_reset()
    } else {
        println!("Usage: httpdash config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
        Ok(())
    }
}

fn handle_config_path() -> Result<()> {
    match Config::config_path() {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => bail!("Could not determine config path"),
    }
}

fn handle_config_show() -> Result<()> {
    let config = Config::from_env()?;

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());
    Ok(())
}

fn handle_config_reset() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;

    if path.exists() {
        let backup = path.with_extension("toml.bak");
        std::fs::copy(&path, &backup)
            .with_context(|| format!("Failed to back up {}", path.display()))?;
        println!("Backed up existing config to {}", backup.display());
    }

    Config::default()
        .save()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Config reset to defaults: {}", path.display());
    Ok(())
}
