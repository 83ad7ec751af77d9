//! cuecast server - standalone daemon
//!
//! Runs the distribution server outside a host application, serving
//! whatever snapshot was last installed (empty until then). Useful for
//! network bring-up and front-of-house testing.

use std::path::PathBuf;

use tracing::info;

use cuecast_server::{ConfigLoader, CueServer, ServerConfig};
use cuecast_utils::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cuecast_utils::init_logging()?;

    let config = match config_path_from_args() {
        Some(path) => ConfigLoader::load_and_validate(&path)?,
        None => ServerConfig::default(),
    };

    let port = config.port;
    let server = CueServer::new(config);
    let addr = server.start(port).await?;
    info!("Cue server ready on http://{}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, shutting down");
    server.stop();

    Ok(())
}

/// Accepts `--config <path>`; everything else falls back to defaults
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
