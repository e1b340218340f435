//! Geomarker AppView entry point.
//!
//! Serves `community.atprotocol.geomarker.getMarkers` and the service's
//! `did:web` document.

use atgeo_marker::{appview, bootstrap, error::AppError};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let Some((config, shutdown)) = bootstrap::start("atgeo-appview")? else {
        return Ok(());
    };
    appview::serve(&config, shutdown).await
}
