//! Image encoding names as used in `sensor_msgs/msg/Image::encoding`, and
//! the mapping from simulator pixel formats onto them.

pub const MONO8: &str = "mono8";
pub const MONO16: &str = "mono16";
pub const RGB8: &str = "rgb8";
pub const BGR8: &str = "bgr8";
pub const RGB16: &str = "rgb16";
pub const BAYER_RGGB8: &str = "bayer_rggb8";
pub const BAYER_BGGR8: &str = "bayer_bggr8";
pub const BAYER_GBRG8: &str = "bayer_gbrg8";
pub const BAYER_GRBG8: &str = "bayer_grbg8";

/// Encoding and bytes-per-pixel for a simulator image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub encoding: &'static str,
    pub bytes_per_pixel: u32,
}

/// Layout used when the simulator reports a format we do not recognise.
pub const FALLBACK_LAYOUT: PixelLayout = PixelLayout {
    encoding: BGR8,
    bytes_per_pixel: 3,
};

/// Map a simulator format string (e.g. `"R8G8B8"`) onto its encoding.
///
/// Returns `None` for unsupported formats; callers decide whether to fall
/// back to [`FALLBACK_LAYOUT`].
pub fn pixel_layout(format: &str) -> Option<PixelLayout> {
    let (encoding, bytes_per_pixel) = match format {
        "L8" => (MONO8, 1),
        "L16" | "L_INT16" => (MONO16, 2),
        "R8G8B8" => (RGB8, 3),
        "B8G8R8" => (BGR8, 3),
        "R16G16B16" => (RGB16, 6),
        "BAYER_RGGB8" => (BAYER_RGGB8, 1),
        "BAYER_BGGR8" => (BAYER_BGGR8, 1),
        "BAYER_GBRG8" => (BAYER_GBRG8, 1),
        "BAYER_GRBG8" => (BAYER_GRBG8, 1),
        _ => return None,
    };
    Some(PixelLayout {
        encoding,
        bytes_per_pixel,
    })
}
