//! Camera calibration: the pinhole + `plumb_bob` parameters published as
//! `CameraInfo`.
//!
//! Values come from the plugin description. Zero means "derive it":
//! principal point offsets default to the image centre and the focal length
//! to `width / (2 * tan(hfov / 2))`.

use simcam_hal::PluginParams;
use simcam_types::{CameraInfo, Header};
use tracing::warn;

/// Distortion model reported in every `CameraInfo`.
pub const DISTORTION_MODEL: &str = "plumb_bob";

/// Tolerance when comparing a configured focal length with the one implied
/// by the field of view.
const FOCAL_LENGTH_TOLERANCE: f64 = 1e-8;

/// Radial (`k1..k3`) and tangential (`t1`, `t2`) distortion coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub t1: f64,
    pub t2: f64,
}

impl Distortion {
    /// Coefficients in `plumb_bob` order: `[k1, k2, t1, t2, k3]`.
    pub fn plumb_bob(&self) -> Vec<f64> {
        vec![self.k1, self.k2, self.t1, self.t2, self.k3]
    }
}

/// Focal length in pixels implied by a horizontal field of view.
pub fn focal_length_from_hfov(width: u32, hfov_rad: f64) -> f64 {
    f64::from(width) / (2.0 * (hfov_rad / 2.0).tan())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    pub cx_prime: f64,
    pub cx: f64,
    pub cy: f64,
    pub focal_length: f64,
    /// Stereo baseline in metres, folded into `P[3]`.
    pub hack_baseline: f64,
    pub distortion: Distortion,
    focal_length_pinned: bool,
}

impl CameraCalibration {
    /// Take the raw description values. `baseline` overrides
    /// `params.hack_baseline` when given.
    pub fn from_params(params: &PluginParams, baseline: Option<f64>) -> Self {
        Self {
            cx_prime: params.cx_prime,
            cx: params.cx,
            cy: params.cy,
            focal_length: params.focal_length,
            hack_baseline: baseline.unwrap_or(params.hack_baseline),
            distortion: Distortion {
                k1: params.distortion_k1,
                k2: params.distortion_k2,
                k3: params.distortion_k3,
                t1: params.distortion_t1,
                t2: params.distortion_t2,
            },
            focal_length_pinned: params.focal_length != 0.0,
        }
    }

    /// Fill in derived values for an image of `width` x `height` pixels.
    pub fn resolve(&mut self, camera_name: &str, width: u32, height: u32, hfov_rad: f64) {
        let centre_x = (f64::from(width) + 1.0) / 2.0;
        let centre_y = (f64::from(height) + 1.0) / 2.0;
        if self.cx_prime == 0.0 {
            self.cx_prime = centre_x;
        }
        if self.cx == 0.0 {
            self.cx = centre_x;
        }
        if self.cy == 0.0 {
            self.cy = centre_y;
        }

        let computed = focal_length_from_hfov(width, hfov_rad);
        if !self.focal_length_pinned {
            self.focal_length = computed;
        } else if (self.focal_length - computed).abs() > FOCAL_LENGTH_TOLERANCE {
            warn!(
                camera = camera_name,
                configured = self.focal_length,
                expected = computed,
                width,
                hfov_rad,
                "configured focal_length is inconsistent with image width and hfov; \
                 expected focal_length = width / (2 * tan(hfov / 2))"
            );
        }
    }

    /// Recompute the focal length after a field-of-view change.
    ///
    /// Returns `false` (and changes nothing) when the focal length was pinned
    /// by the description.
    pub fn update_hfov(&mut self, width: u32, hfov_rad: f64) -> bool {
        if self.focal_length_pinned {
            return false;
        }
        self.focal_length = focal_length_from_hfov(width, hfov_rad);
        true
    }

    pub fn focal_length_pinned(&self) -> bool {
        self.focal_length_pinned
    }

    /// Build the `CameraInfo` message for this calibration.
    pub fn camera_info(&self, frame_id: &str, width: u32, height: u32) -> CameraInfo {
        let f = self.focal_length;
        CameraInfo {
            header: Header {
                frame_id: frame_id.to_string(),
                ..Header::default()
            },
            height,
            width,
            distortion_model: DISTORTION_MODEL.to_string(),
            d: self.distortion.plumb_bob(),
            k: [f, 0.0, self.cx, 0.0, f, self.cy, 0.0, 0.0, 1.0],
            r: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            p: [
                f,
                0.0,
                self.cx,
                -f * self.hack_baseline,
                0.0,
                f,
                self.cy,
                0.0,
                0.0,
                0.0,
                1.0,
                0.0,
            ],
            binning_x: 0,
            binning_y: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn derives_centre_and_focal_length() {
        let mut cal = CameraCalibration::from_params(&PluginParams::default(), None);
        cal.resolve("cam", 640, 480, FRAC_PI_2);
        assert!((cal.cx - 320.5).abs() < 1e-12);
        assert!((cal.cx_prime - 320.5).abs() < 1e-12);
        assert!((cal.cy - 240.5).abs() < 1e-12);
        // tan(pi/4) = 1, so f = width / 2.
        assert!((cal.focal_length - 320.0).abs() < 1e-9);
    }

    #[test]
    fn configured_values_are_kept() {
        let params = PluginParams {
            cx: 300.0,
            cy: 200.0,
            focal_length: 500.0,
            ..PluginParams::default()
        };
        let mut cal = CameraCalibration::from_params(&params, None);
        cal.resolve("cam", 640, 480, FRAC_PI_2);
        assert!((cal.cx - 300.0).abs() < f64::EPSILON);
        assert!((cal.cy - 200.0).abs() < f64::EPSILON);
        assert!((cal.focal_length - 500.0).abs() < f64::EPSILON, "pinned focal length wins");
    }

    #[test]
    fn baseline_override_replaces_description_value() {
        let params = PluginParams {
            hack_baseline: 0.1,
            ..PluginParams::default()
        };
        assert!((CameraCalibration::from_params(&params, None).hack_baseline - 0.1).abs() < f64::EPSILON);
        assert!((CameraCalibration::from_params(&params, Some(0.07)).hack_baseline - 0.07).abs() < f64::EPSILON);
    }

    #[test]
    fn camera_info_matrices() {
        let params = PluginParams {
            hack_baseline: 0.07,
            distortion_k1: 0.1,
            distortion_k2: 0.2,
            distortion_k3: 0.3,
            distortion_t1: 0.4,
            distortion_t2: 0.5,
            ..PluginParams::default()
        };
        let mut cal = CameraCalibration::from_params(&params, None);
        cal.resolve("cam", 640, 480, FRAC_PI_2);
        let info = cal.camera_info("camera_optical", 640, 480);

        assert_eq!(info.header.frame_id, "camera_optical");
        assert_eq!(info.distortion_model, "plumb_bob");
        assert_eq!(info.d, vec![0.1, 0.2, 0.4, 0.5, 0.3]);
        assert_eq!(info.k[2], cal.cx);
        assert_eq!(info.k[5], cal.cy);
        assert_eq!(info.r, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert!((info.p[3] + 320.0 * 0.07).abs() < 1e-9);
        assert!((info.baseline() - 0.07).abs() < 1e-9);
        assert_eq!(info.p[10], 1.0);
    }

    #[test]
    fn hfov_update_only_moves_derived_focal_length() {
        let mut derived = CameraCalibration::from_params(&PluginParams::default(), None);
        derived.resolve("cam", 640, 480, FRAC_PI_2);
        assert!(derived.update_hfov(640, 2.0 * (0.5f64).atan()));
        assert!((derived.focal_length - 640.0).abs() < 1e-9);

        let pinned_params = PluginParams {
            focal_length: 500.0,
            ..PluginParams::default()
        };
        let mut pinned = CameraCalibration::from_params(&pinned_params, None);
        assert!(!pinned.update_hfov(640, 1.0));
        assert!((pinned.focal_length - 500.0).abs() < f64::EPSILON);
    }
}
