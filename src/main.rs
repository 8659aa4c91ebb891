mod app;
mod backend;
mod error;
mod fields;
mod geometry;
mod interaction;
mod model;
mod store;
mod sync;
mod viewer;
mod workflow;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use workflow::Mode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Place and fill signature fields on document pages")]
struct Cli {
    /// Settings file (defaults to ~/.config/fieldsign.toml or ./settings.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lay out fields or fill them in
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Signature request record id
    #[arg(long)]
    record: Option<u64>,

    /// Base URL of the document server
    #[arg(long)]
    url: Option<String>,

    /// Directory of pre-rendered page images
    #[arg(long)]
    pages: Option<String>,

    /// Serve the document from a JSON file instead of the server
    #[arg(long)]
    fixture: Option<String>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fieldsign=info")),
        )
        .init();

    let cli = Cli::parse();
    let overrides = app::Overrides {
        mode: cli.mode,
        record_id: cli.record,
        backend_url: cli.url,
        pages_dir: cli.pages,
        fixture: cli.fixture,
    };
    let config = cli.config;

    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "Field Sign",
        native_options,
        Box::new(move |cc| Ok(Box::new(app::SignApp::new(cc, config, overrides)))),
    )
}
