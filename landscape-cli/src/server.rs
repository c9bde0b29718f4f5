//! HTTP endpoint for displays that poll for a fresh landscape.
//!
//! - `/` and `/index.html`: a small page showing the image
//! - `/<user_file>` and `/<eink_file>`: the images, redrawn when stale

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use landscape_core::{
    Config, WeatherProvider, WeatherSeries,
    canvas::{eink_variant, save_image},
    provider::cache::is_stale,
    provider_from_config, render_landscape,
};

struct AppState {
    config: Config,
    provider: Box<dyn WeatherProvider>,
    // Held for the whole fetch-and-draw so concurrent requests redraw once.
    refresh: Mutex<()>,
}

impl AppState {
    fn output_path(&self, file: &str) -> PathBuf {
        self.config.paths.cache_dir.join(file)
    }

    async fn refresh_if_stale(&self) -> Result<()> {
        let _guard = self.refresh.lock().await;

        let server = &self.config.server;
        let user = self.output_path(&server.user_file);
        if !is_stale(&user, Duration::from_secs(server.refresh_secs)) {
            return Ok(());
        }

        let series = self.provider.fetch_series().await?;
        write_images(&self.config, &series, &user, &self.output_path(&server.eink_file))
    }
}

fn write_images(config: &Config, series: &WeatherSeries, user: &std::path::Path, eink: &std::path::Path) -> Result<()> {
    let (img, summary) = render_landscape(config, series)?;
    save_image(&img, user)?;
    save_image(&eink_variant(&img), eink)?;

    info!(
        user = %user.display(),
        eink = %eink.display(),
        slots = summary.slots_drawn,
        "landscape images refreshed"
    );
    Ok(())
}

pub async fn run(config: Config, listen: Option<String>) -> Result<()> {
    let provider = provider_from_config(&config)?;
    let addr = listen.unwrap_or_else(|| config.server.listen.clone());

    let state = Arc::new(AppState { config, provider, refresh: Mutex::new(()) });
    let app = create_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "serving weather landscape");

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/:file", get(image_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(index_page(&state.config))
}

async fn image_handler(State(state): State<Arc<AppState>>, Path(file): Path<String>) -> Response {
    let server = &state.config.server;
    if file != server.user_file && file != server.eink_file {
        return StatusCode::NOT_FOUND.into_response();
    }

    if let Err(e) = state.refresh_if_stale().await {
        error!("failed to refresh landscape: {e:#}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to refresh landscape").into_response();
    }

    let path = state.output_path(&file);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&file))], bytes).into_response(),
        Err(e) => {
            error!(path = %path.display(), "failed to read image: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn index_page(config: &Config) -> String {
    let loc = config.location;
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Weather landscape</title></head>\n<body>\n\
         <p>{:.4}, {:.4}</p>\n\
         <img src=\"/{}\" alt=\"weather landscape\">\n\
         <p><a href=\"/{}\">e-ink image</a></p>\n\
         </body>\n</html>\n",
        loc.latitude, loc.longitude, config.server.user_file, config.server.eink_file,
    )
}

fn content_type(file: &str) -> &'static str {
    let ext = file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("bmp") => "image/bmp",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type("landscape.bmp"), "image/bmp");
        assert_eq!(content_type("eink.PNG"), "image/png");
        assert_eq!(content_type("a.b.jpeg"), "image/jpeg");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }

    #[test]
    fn index_links_both_images() {
        let mut config = Config::default();
        config.server.user_file = "view.png".into();
        config.server.eink_file = "panel.bmp".into();

        let page = index_page(&config);
        assert!(page.contains("src=\"/view.png\""));
        assert!(page.contains("href=\"/panel.bmp\""));
        assert!(page.contains("52.1961, 21.0080"));
    }
}
