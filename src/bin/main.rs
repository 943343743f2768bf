use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use editor_lsp_bridge::cache::{FileCacheStorage, MetadataCache};
use editor_lsp_bridge::config::{SettingsEventKind, load_settings};
use editor_lsp_bridge::lsp::Diagnostic;
use editor_lsp_bridge::{BridgeSettings, EditorBridge, MemorySurface, WebSocketConnector};

/// Exercise a language server through the editor bridge from the command line
#[derive(Parser)]
#[command(name = "lsp-bridge-probe")]
#[command(version)]
#[command(about = "Exercise a language server through the editor bridge from the command line")]
struct Cli {
    /// Project root holding editor-lsp-bridge.toml (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Override the server base url (e.g. ws://localhost:3001)
    #[arg(long, global = true)]
    server_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a file against its language server and print what comes back
    Probe {
        /// Language id used for the connection (e.g. javascript, python)
        #[arg(long)]
        language: String,

        /// File to open
        file: PathBuf,

        /// Request formatting and print the formatted text
        #[arg(long)]
        format: bool,

        /// How long to wait for diagnostics, in milliseconds
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },
    /// Inspect the project metadata cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cached metadata of a project as JSON
    Show {
        #[arg(long)]
        project: String,
    },
    /// Delete the cached metadata of a project
    Clear {
        #[arg(long)]
        project: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let root = cli
        .root
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let override_settings = cli
        .server_url
        .map(|url| serde_json::json!({ "serverUrl": url }));
    let outcome = load_settings(Some(&root), override_settings);
    for event in &outcome.events {
        match event.kind {
            SettingsEventKind::Warning => log::warn!("{}", event.message),
            SettingsEventKind::Info => log::info!("{}", event.message),
        }
    }
    let settings = outcome.settings;

    let result = match cli.command {
        Commands::Probe {
            language,
            file,
            format,
            wait_ms,
        } => probe(settings, &language, &file, format, Duration::from_millis(wait_ms)).await,
        Commands::Cache { action } => run_cache_action(&settings, action),
    };

    if let Err(message) = result {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}

fn open_cache(settings: &BridgeSettings) -> MetadataCache {
    match settings.cache_dir.as_deref() {
        Some(dir) => MetadataCache::new(Box::new(FileCacheStorage::new(dir))),
        None => {
            log::warn!("No cache directory available, using an in-memory cache");
            MetadataCache::in_memory()
        }
    }
}

async fn probe(
    settings: BridgeSettings,
    language: &str,
    file: &Path,
    format: bool,
    wait: Duration,
) -> Result<(), String> {
    let content = std::fs::read_to_string(file)
        .map_err(|err| format!("cannot read {}: {}", file.display(), err))?;
    let absolute = std::fs::canonicalize(file)
        .map_err(|err| format!("cannot resolve {}: {}", file.display(), err))?;
    let uri = url::Url::from_file_path(&absolute)
        .map_err(|()| format!("cannot build a file uri for {}", absolute.display()))?
        .to_string();

    let bridge = EditorBridge::new(
        settings,
        Arc::new(MemorySurface::new()),
        Arc::new(WebSocketConnector::new()),
        // The probe never writes project metadata
        MetadataCache::in_memory(),
    )
    .map_err(|err| err.to_string())?;

    let _printer = bridge
        .diagnostics()
        .subscribe(Arc::new(|uri: &str, diagnostics: &[Diagnostic]| {
            println!("diagnostics for {} ({}):", uri, diagnostics.len());
            for diagnostic in diagnostics {
                println!(
                    "  {}:{} {:?} {}",
                    diagnostic.range.start_line + 1,
                    diagnostic.range.start_col + 1,
                    diagnostic.severity,
                    diagnostic.message
                );
            }
        }));

    bridge
        .open(&uri, language, &content)
        .map_err(|err| err.to_string())?;
    bridge
        .set_active(Some(&uri))
        .map_err(|err| err.to_string())?;

    let outcome = if format {
        match bridge.format_active().await {
            Ok(document) => {
                println!("{}", document.text());
                Ok(())
            }
            Err(err) => Err(format!("formatting failed: {}", err)),
        }
    } else {
        Ok(())
    };

    tokio::time::sleep(wait).await;
    if let Some(state) = bridge.connection_state(language) {
        log::info!("{} connection is {}", language, state);
    }
    bridge.shutdown().await;
    outcome
}

fn run_cache_action(settings: &BridgeSettings, action: CacheAction) -> Result<(), String> {
    let cache = open_cache(settings);
    match action {
        CacheAction::Show { project } => match cache.load(&project) {
            Some(project_cache) => {
                let json = serde_json::to_string_pretty(&project_cache)
                    .map_err(|err| err.to_string())?;
                println!("{}", json);
                Ok(())
            }
            None => {
                eprintln!("No cached metadata for project {}", project);
                Ok(())
            }
        },
        CacheAction::Clear { project } => {
            cache.load(&project);
            cache.clear().map_err(|err| err.to_string())?;
            eprintln!("Cleared cached metadata for project {}", project);
            Ok(())
        }
    }
}
