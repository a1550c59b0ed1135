//! Canvas lifecycle harness
//!
//! Replays a script of host lifecycle events (from a config file, or the
//! built-in open/resize/close script) through a `RenderBinding` backed by
//! the native context registry, then prints every foreign call it made.
//! Exits non-zero if the native library cannot be staged or any context
//! outlives the binding.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use jawt_canvas::harness::{replay, ScriptedHost, TracingBackend};
use jawt_canvas::library::{FileCheckLoader, NATIVE_LIBRARY};
use jawt_canvas::platform::ResourcePrefix;
use jawt_canvas::{init_logging, CanvasConfig, ContextRegistry, FrameCounterFactory, RenderBinding};

#[derive(Parser, Debug)]
#[command(name = "canvas-harness", about = "Replay canvas lifecycle events against native render contexts")]
struct Cli {
    /// Config file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the `{os}-{arch}/` library resources
    #[arg(long)]
    resource_root: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("canvas-harness: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => CanvasConfig::load(path)?,
        None => CanvasConfig::default(),
    };
    if let Some(root) = cli.resource_root {
        config.library.resource_root = Some(root);
    }

    init_logging(config.log_filter.as_deref().unwrap_or("info"));

    // Unsupported platforms and missing resources stop here, before any
    // context is created
    if let Some(root) = &config.library.resource_root {
        let prefix = ResourcePrefix::current()?;
        let library = NATIVE_LIBRARY.load_once(&FileCheckLoader, root, prefix, &config.library.name)?;
        info!("native library for {} staged at {}", prefix, library.path().display());
    }

    let host = ScriptedHost::new(config.canvas.size());
    let backend = TracingBackend::new(ContextRegistry::new(FrameCounterFactory));
    {
        let binding = RenderBinding::new(&host, &backend);
        replay(&binding, &config.script);
        // Dropping the binding closes whatever the script left open
    }

    for call in backend.calls() {
        println!("{}", call);
    }

    let leaked = backend.inner().len();
    println!(
        "{} created, {} destroyed, {} repaint requests, {} live",
        backend.created().len(),
        backend.destroyed().len(),
        host.repaint_requests(),
        leaked,
    );

    if leaked > 0 {
        return Err(format!("{} render contexts outlived the binding", leaked).into());
    }
    Ok(())
}
