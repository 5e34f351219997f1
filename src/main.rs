// httpdash - host binary for the dashboard core
//
// Wires the library together the way an embedding application would:
// - Config: env > ~/.config/httpdash/config.toml > defaults
// - Logging: tracing to stderr, optional JSON file output
// - Composer: one session registry, dated history persistence and in-memory
//   views whose live logs are mirrored to stdout

mod cli;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use httpdash::config::Config;
use httpdash::mock::{MockConfig, MockServer};
use httpdash::view::memory::MemoryViews;
use httpdash::view::ViewFactory;
use httpdash::{
    DatedHistoryRoot, HttpInfo, RenderMode, ResponsePersistence, SessionRegistry, SimpleType,
    StreamSource, ViewComposer,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands run before anything touches the config file
    if let Some(Commands::Config { show, reset, path }) = &cli.command {
        return cli::handle_config(*show, *reset, *path);
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n{}\n", e);
            std::process::exit(1);
        }
    };

    // Keep the guard alive so file logs flush on exit
    let _file_guard = httpdash::logging::init(&config.logging);

    tracing::debug!(
        history_dir = %config.history_dir.display(),
        no_log = config.no_log,
        "Configuration loaded"
    );

    match cli.command {
        Some(Commands::Mock {
            port,
            path,
            status,
            headers,
            body,
            tab,
        }) => {
            let mock = MockConfig {
                port,
                path,
                status,
                headers,
                body,
            };
            run_mock(&config, &tab, mock).await
        }
        Some(Commands::Save {
            tab,
            content_type,
            no_log,
            file,
        }) => run_save(&config, &tab, &content_type, no_log || config.no_log, &file),
        Some(Commands::Config { .. }) => Ok(()),
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn build_composer(config: &Config, views: Arc<dyn ViewFactory>) -> ViewComposer {
    let persistence = ResponsePersistence::new(Arc::new(DatedHistoryRoot::new(
        &config.history_dir,
    )));

    ViewComposer::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(persistence),
        views,
        tokio::runtime::Handle::current(),
    )
    .with_preview_height(config.preview_height)
}

/// Serve a mock tab until Ctrl+C
async fn run_mock(config: &Config, tab: &str, mock: MockConfig) -> Result<()> {
    let composer = build_composer(config, Arc::new(MemoryViews::mirroring_logs()));

    let port = mock.port;
    let server = Arc::new(
        MockServer::bind(mock)
            .await
            .with_context(|| format!("Failed to bind mock server on port {}", port))?,
    );

    let mock_tab =
        composer.compose_mock_server(tab, Arc::clone(&server) as Arc<dyn StreamSource>)?;
    tracing::info!(tab = %tab, addr = %server.local_addr(), "Mock tab running, Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    server.shutdown();
    mock_tab.appender().settled().await;
    composer.registry().release_all();
    Ok(())
}

/// Render a file as a successful exchange and print the response text
fn run_save(config: &Config, tab: &str, content_type: &str, no_log: bool, file: &Path) -> Result<()> {
    let composer = build_composer(config, Arc::new(MemoryViews::new()));

    let body = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let simple_type = SimpleType::from_content_type(content_type);

    let mut response_desc = vec![format!("Content-Type: {}\r\n", content_type)];
    if simple_type.is_text_like() {
        response_desc.push("\r\n".to_string());
        response_desc.push(String::from_utf8_lossy(&body).into_owned());
    }

    let info = HttpInfo::success(
        vec![format!("# {}\r\n", file.display())],
        response_desc,
        Bytes::from(body),
        simple_type,
        content_type,
    );

    let composed = composer.compose_http(tab, &info, no_log)?;

    println!("{}", composed.rendered.replace("\r\n", "\n"));
    if let RenderMode::Previewable(hint) = composed.mode {
        println!("(preview: {:?}, {}px)", hint, config.preview_height);
    }

    composer.registry().release_all();
    Ok(())
}
