//! Web Mercator tile math for 256 px XYZ tiles.

use super::ImageryError;
use crate::models::BoundingBox;
use std::f64::consts::PI;

pub const TILE_SIZE: u32 = 256;
pub const MAX_ZOOM: u8 = 22;
/// Latitude where Web Mercator becomes a square world
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Side length of the world in pixels at `zoom`
pub fn world_size(zoom: u8) -> f64 {
    TILE_SIZE as f64 * 2f64.powi(zoom as i32)
}

/// Ground size of one pixel in Web Mercator metres
pub fn resolution(zoom: u8) -> f64 {
    2.0 * PI * EARTH_RADIUS / world_size(zoom)
}

/// Global pixel coordinate of a WGS84 position
pub fn lonlat_to_pixel(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let n = world_size(zoom);
    let x = (lon + 180.0) / 360.0 * n;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Web Mercator (EPSG:3857) metres of a global pixel corner
pub fn pixel_to_mercator(px: f64, py: f64, zoom: u8) -> (f64, f64) {
    let res = resolution(zoom);
    let half = PI * EARTH_RADIUS;
    (px * res - half, half - py * res)
}

pub fn check_bbox(bbox: &BoundingBox) -> Result<(), ImageryError> {
    let BoundingBox {
        west,
        south,
        east,
        north,
    } = *bbox;

    if ![west, south, east, north].iter().all(|v| v.is_finite()) {
        return Err(ImageryError::InvalidBoundingBox(
            "coordinates must be finite numbers".to_string(),
        ));
    }
    if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
        return Err(ImageryError::InvalidBoundingBox(format!(
            "longitude out of range: west={}, east={}",
            west, east
        )));
    }
    if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&south)
        || !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&north)
    {
        return Err(ImageryError::InvalidBoundingBox(format!(
            "latitude out of range: south={}, north={}",
            south, north
        )));
    }
    if west >= east || south >= north {
        return Err(ImageryError::InvalidBoundingBox(format!(
            "empty or inverted extent: [{}, {}, {}, {}]",
            west, south, east, north
        )));
    }
    Ok(())
}

/// Pixel rectangle, in global pixel coordinates, covering a bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub x0: u64,
    pub y0: u64,
    pub width: u32,
    pub height: u32,
}

impl PixelWindow {
    pub fn for_bbox(bbox: &BoundingBox, zoom: u8) -> Self {
        let (left, top) = lonlat_to_pixel(bbox.west, bbox.north, zoom);
        let (right, bottom) = lonlat_to_pixel(bbox.east, bbox.south, zoom);
        let n = world_size(zoom);

        let x0 = left.floor().clamp(0.0, n - 1.0) as u64;
        let y0 = top.floor().clamp(0.0, n - 1.0) as u64;
        let x1 = right.ceil().clamp(0.0, n) as u64;
        let y1 = bottom.ceil().clamp(0.0, n) as u64;

        Self {
            x0,
            y0,
            width: x1.saturating_sub(x0).max(1) as u32,
            height: y1.saturating_sub(y0).max(1) as u32,
        }
    }

    pub fn tile_range(&self, zoom: u8) -> TileRange {
        let tile = TILE_SIZE as u64;
        let last = (1u64 << zoom) - 1;
        TileRange {
            zoom,
            x_min: (self.x0 / tile) as u32,
            x_max: ((self.x0 + self.width as u64 - 1) / tile).min(last) as u32,
            y_min: (self.y0 / tile) as u32,
            y_max: ((self.y0 + self.height as u64 - 1) / tile).min(last) as u32,
        }
    }
}

/// Inclusive range of tile indices at one zoom level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl TileRange {
    pub fn count(&self) -> usize {
        (self.x_max - self.x_min + 1) as usize * (self.y_max - self.y_min + 1) as usize
    }

    pub fn tiles(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y_min..=self.y_max).flat_map(move |y| (self.x_min..=self.x_max).map(move |x| (x, y)))
    }
}
