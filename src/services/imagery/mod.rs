pub mod geotiff;
pub mod tiles;

use crate::models::BoundingBox;
use crate::services::storage::{StorageError, StorageService};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use geotiff::{EPSG_WEB_MERCATOR, GeoReference, encode_geotiff};
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tiles::{PixelWindow, TILE_SIZE, TileRange};
use uuid::Uuid;

/// Concurrent tile downloads per imagery request
const TILE_FETCH_CONCURRENCY: usize = 8;
const USER_AGENT: &str = concat!("building-detector/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum ImageryError {
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Bounding box covers {count} tiles at zoom {zoom}, the limit is {max}")]
    TooManyTiles { count: usize, zoom: u8, max: usize },

    #[error("Failed to fetch tile {z}/{x}/{y}: {reason}")]
    TileFetch { z: u8, x: u32, y: u32, reason: String },

    #[error("Failed to decode tile: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to encode GeoTIFF: {0}")]
    Encode(#[from] tiff::TiffError),

    #[error("Tile source misconfigured: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Source of encoded (PNG or JPEG) XYZ tiles
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn fetch_tile(&self, z: u8, x: u32, y: u32) -> Result<Bytes, ImageryError>;
}

/// Tile server reached over HTTP through a URL template such as
/// `https://host/tile/{z}/{y}/{x}`
pub struct HttpTileSource {
    client: reqwest::Client,
    url_template: String,
}

impl HttpTileSource {
    pub fn new(url_template: &str, timeout: Duration) -> Result<Self, ImageryError> {
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !url_template.contains(placeholder) {
                return Err(ImageryError::Config(format!(
                    "tile URL template is missing {}",
                    placeholder
                )));
            }
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ImageryError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    pub fn tile_url(&self, z: u8, x: u32, y: u32) -> String {
        self.url_template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string())
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn fetch_tile(&self, z: u8, x: u32, y: u32) -> Result<Bytes, ImageryError> {
        let url = self.tile_url(z, x, y);
        let fail = |reason: String| ImageryError::TileFetch { z, x, y, reason };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("tile server returned {}", status)));
        }

        response.bytes().await.map_err(|e| fail(e.to_string()))
    }
}

/// A raster written to storage by [`ImageryService::acquire`]
#[derive(Debug, Clone)]
pub struct AcquiredRaster {
    pub image_id: Uuid,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

/// Turns a bounding box into a georeferenced mosaic on disk
pub struct ImageryService {
    tiles: Arc<dyn TileSource>,
    storage: Arc<StorageService>,
    zoom: u8,
    max_tiles: usize,
}

impl ImageryService {
    pub fn new(
        tiles: Arc<dyn TileSource>,
        storage: Arc<StorageService>,
        zoom: u8,
        max_tiles: usize,
    ) -> Self {
        Self {
            tiles,
            storage,
            zoom: zoom.min(tiles::MAX_ZOOM),
            max_tiles,
        }
    }

    pub async fn acquire(&self, bbox: &BoundingBox) -> Result<AcquiredRaster, ImageryError> {
        tiles::check_bbox(bbox)?;

        let window = PixelWindow::for_bbox(bbox, self.zoom);
        let range = window.tile_range(self.zoom);
        if range.count() > self.max_tiles {
            return Err(ImageryError::TooManyTiles {
                count: range.count(),
                zoom: self.zoom,
                max: self.max_tiles,
            });
        }

        tracing::info!(
            "Fetching {} tiles at zoom {} for {}x{} px window",
            range.count(),
            self.zoom,
            window.width,
            window.height
        );

        let fetched = self.fetch_range(&range).await?;

        let zoom = self.zoom;
        let (encoded, width, height) =
            tokio::task::spawn_blocking(move || render_geotiff(fetched, window, zoom))
                .await
                .map_err(|e| ImageryError::Config(format!("mosaic task failed: {}", e)))??;

        let image_id = Uuid::new_v4();
        let filename = StorageService::raster_name(&image_id);
        let size = encoded.len();
        self.storage.write_atomic(&filename, encoded).await?;

        tracing::info!("Raster {} written ({} bytes)", filename, size);
        Ok(AcquiredRaster {
            image_id,
            filename,
            width,
            height,
            size,
        })
    }

    async fn fetch_range(&self, range: &TileRange) -> Result<Vec<(u32, u32, Bytes)>, ImageryError> {
        let zoom = range.zoom;
        let coords: Vec<(u32, u32)> = range.tiles().collect();

        futures::stream::iter(coords)
            .map(|(x, y)| {
                let tiles = self.tiles.clone();
                async move {
                    let data = tiles.fetch_tile(zoom, x, y).await?;
                    Ok::<_, ImageryError>((x, y, data))
                }
            })
            .buffer_unordered(TILE_FETCH_CONCURRENCY)
            .try_collect()
            .await
    }
}

/// Pastes the fetched tiles into a canvas the size of `window`, clipping
/// whatever falls outside, and encodes the result.
fn render_geotiff(
    fetched: Vec<(u32, u32, Bytes)>,
    window: PixelWindow,
    zoom: u8,
) -> Result<(Vec<u8>, u32, u32), ImageryError> {
    let mut canvas = RgbImage::new(window.width, window.height);

    for (x, y, data) in fetched {
        let tile = image::load_from_memory(&data)?.to_rgb8();
        let dx = x as i64 * TILE_SIZE as i64 - window.x0 as i64;
        let dy = y as i64 * TILE_SIZE as i64 - window.y0 as i64;
        image::imageops::replace(&mut canvas, &tile, dx, dy);
    }

    let (origin_x, origin_y) = tiles::pixel_to_mercator(window.x0 as f64, window.y0 as f64, zoom);
    let resolution = tiles::resolution(zoom);
    let georef = GeoReference {
        origin_x,
        origin_y,
        pixel_width: resolution,
        pixel_height: resolution,
        epsg: EPSG_WEB_MERCATOR,
    };

    let encoded = encode_geotiff(&canvas, &georef)?;
    Ok((encoded, window.width, window.height))
}
