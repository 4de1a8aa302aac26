use crate::config::AppConfig;
use crate::services::imagery::{HttpTileSource, TileSource};
use std::sync::Arc;
use tracing::info;

pub fn setup_tile_source(config: &AppConfig) -> anyhow::Result<Arc<dyn TileSource>> {
    let source = HttpTileSource::new(&config.tile_url_template, config.tile_timeout)?;
    info!(
        "🛰️  Tile source: {} (zoom {}, max {} tiles)",
        config.tile_url_template, config.tile_zoom, config.max_tiles
    );
    Ok(Arc::new(source))
}
