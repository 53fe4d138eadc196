//! Generic `RenderCamera` trait for the rendering side of a camera sensor.

/// One rendering camera inside a camera sensor.
///
/// A plain camera sensor owns exactly one; a multi-camera (e.g. stereo)
/// sensor owns several that share the sensor's activation and update rate.
///
/// Setters take `&self`: the camera is shared between the simulator update
/// thread and the bridge's callback thread, so implementations use interior
/// mutability.
pub trait RenderCamera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"left"`.
    fn name(&self) -> &str;

    /// Image width in pixels.
    fn image_width(&self) -> u32;

    /// Image height in pixels.
    fn image_height(&self) -> u32;

    /// Bytes per pixel of the rendered buffer.
    fn image_depth(&self) -> u32;

    /// Simulator pixel format, e.g. `"R8G8B8"` or `"L8"`.
    fn image_format(&self) -> String;

    /// Horizontal field of view in radians.
    fn hfov(&self) -> f64;

    /// Change the horizontal field of view (radians).
    fn set_hfov(&self, hfov_rad: f64);
}
