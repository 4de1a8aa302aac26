use image::RgbImage;
use std::io::Cursor;
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

pub const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
pub const MODEL_TIEPOINT_TAG: u16 = 33922;
pub const GEO_KEY_DIRECTORY_TAG: u16 = 34735;

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const RASTER_PIXEL_IS_AREA: u16 = 1;

pub const EPSG_WEB_MERCATOR: u16 = 3857;

/// Affine placement of a north-up raster: the model coordinate of the
/// top-left pixel corner and the ground size of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoReference {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub epsg: u16,
}

impl GeoReference {
    fn geo_key_directory(&self) -> [u16; 16] {
        [
            // version, revision, minor revision, number of keys
            1, 1, 0, 3,
            GT_MODEL_TYPE_GEO_KEY, 0, 1, MODEL_TYPE_PROJECTED,
            GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
            PROJECTED_CS_TYPE_GEO_KEY, 0, 1, self.epsg,
        ]
    }
}

/// Encodes an RGB raster as an uncompressed GeoTIFF
pub fn encode_geotiff(image: &RgbImage, georef: &GeoReference) -> Result<Vec<u8>, tiff::TiffError> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buf)?;
        let mut tiff_image = encoder.new_image::<colortype::RGB8>(image.width(), image.height())?;

        let pixel_scale = [georef.pixel_width, georef.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, georef.origin_x, georef.origin_y, 0.0];
        let geo_keys = georef.geo_key_directory();

        let dir = tiff_image.encoder();
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE_TAG), &pixel_scale[..])?;
        dir.write_tag(Tag::Unknown(MODEL_TIEPOINT_TAG), &tiepoint[..])?;
        dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY_TAG), &geo_keys[..])?;

        tiff_image.write_data(image.as_raw())?;
    }
    Ok(buf.into_inner())
}
