//! Middleware-native camera messages.
//!
//! Field layout follows `sensor_msgs/msg/Image` and
//! `sensor_msgs/msg/CameraInfo` so a real transport can map them 1:1.

use serde::{Deserialize, Serialize};

use crate::{SimTime, SimcamError};

/// `std_msgs/msg/Header`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: SimTime,
    pub frame_id: String,
}

/// `sensor_msgs/msg/Image`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    /// Full row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Copy `height * step` bytes of `src` into this message and set the
    /// geometry fields.
    ///
    /// # Errors
    ///
    /// Returns [`SimcamError::InvalidFrame`] if `src` is shorter than
    /// `height * step`; the message is left untouched in that case.
    pub fn fill(
        &mut self,
        encoding: &str,
        height: u32,
        width: u32,
        step: u32,
        src: &[u8],
    ) -> Result<(), SimcamError> {
        let len = height as usize * step as usize;
        let Some(pixels) = src.get(..len) else {
            return Err(SimcamError::InvalidFrame(format!(
                "buffer holds {} bytes, {height} rows of {step} bytes need {len}",
                src.len()
            )));
        };
        self.encoding = encoding.to_string();
        self.height = height;
        self.width = width;
        self.step = step;
        self.is_bigendian = 0;
        self.data.clear();
        self.data.extend_from_slice(pixels);
        Ok(())
    }
}

/// `sensor_msgs/msg/CameraInfo`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,
    /// Distortion parameters, `[k1, k2, t1, t2, k3]` for `plumb_bob`.
    pub d: Vec<f64>,
    /// Intrinsic matrix, row-major 3x3.
    pub k: [f64; 9],
    /// Rectification matrix, row-major 3x3.
    pub r: [f64; 9],
    /// Projection matrix, row-major 3x4.
    pub p: [f64; 12],
    pub binning_x: u32,
    pub binning_y: u32,
}

impl CameraInfo {
    pub fn focal_length_x(&self) -> f64 {
        self.k[0]
    }

    pub fn principal_point(&self) -> (f64, f64) {
        (self.k[2], self.k[5])
    }

    /// Stereo baseline encoded in the projection matrix (`-Tx / fx`).
    pub fn baseline(&self) -> f64 {
        if self.p[0] == 0.0 {
            return 0.0;
        }
        -self.p[3] / self.p[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodings;

    #[test]
    fn fill_copies_exactly_height_times_step() {
        let mut img = Image::default();
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8, 99, 99];
        img.fill(encodings::RGB8, 1, 2, 6, &src).unwrap();
        assert_eq!(img.data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(img.step, 6);
        assert_eq!(img.encoding, "rgb8");
    }

    #[test]
    fn fill_rejects_short_buffer() {
        let mut img = Image::default();
        let err = img.fill(encodings::MONO8, 4, 4, 4, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, SimcamError::InvalidFrame(_)));
        assert!(img.data.is_empty(), "failed fill must not touch the message");
    }

    #[test]
    fn baseline_is_recovered_from_projection() {
        let mut info = CameraInfo::default();
        info.p[0] = 500.0;
        info.p[3] = -500.0 * 0.07;
        assert!((info.baseline() - 0.07).abs() < 1e-12);
        assert!((CameraInfo::default().baseline()).abs() < f64::EPSILON);
    }
}
