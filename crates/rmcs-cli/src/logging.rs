use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use rmcs_core::{Result, RmcsError};

pub const LOG_FILE: &str = "rmcs-bot.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level`. With a `directory`, everything is also
/// appended to `<directory>/rmcs-bot.log` without ANSI colours.
pub fn init_tracing(level: &str, format: &str, directory: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = vec![console_layer(format)];
    if let Some(dir) = directory {
        layers.push(file_layer(dir, format)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| RmcsError::Config(format!("logging already initialised: {e}")))
}

fn console_layer(format: &str) -> BoxedLayer {
    match format {
        "json" => fmt::layer().json().with_target(true).boxed(),
        "compact" => fmt::layer().compact().with_target(false).boxed(),
        _ => fmt::layer().with_target(false).boxed(),
    }
}

fn file_layer(dir: &Path, format: &str) -> Result<BoxedLayer> {
    std::fs::create_dir_all(dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))?;
    let writer = Mutex::new(file);

    Ok(match format {
        "json" => fmt::layer().json().with_writer(writer).boxed(),
        _ => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
    })
}
