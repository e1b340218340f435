//! ATGeo Marker: web backend entry point.
//!
//! Serves OAuth login, marker creation and place search for the browser
//! client. See [`atgeo_marker::web`] for the URL layout.

use atgeo_marker::{bootstrap, error::AppError, web};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let Some((config, shutdown)) = bootstrap::start("atgeo-marker")? else {
        return Ok(());
    };
    web::serve(&config, shutdown).await
}
