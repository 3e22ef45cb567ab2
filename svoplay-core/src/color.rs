//! Channel-order correction applied before a view is presented.
//!
//! Capture backends disagree about channel order (BGRA vs RGBA is the
//! usual culprit). Each correction is one of the six fixed permutations of
//! the colour channels; alpha is never touched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::ViewBuffer;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown colour correction mode {0} (expected 0..=5)")]
pub struct UnknownCorrection(pub u8);

/// Output channel order, named by which input channel lands in R, G, B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ColorCorrection {
    #[default]
    Rgb = 0,
    Rbg = 1,
    Grb = 2,
    Gbr = 3,
    Brg = 4,
    /// Red/blue swap
    Bgr = 5,
}

impl ColorCorrection {
    /// Source channel index for each of the R, G, B outputs
    pub fn permutation(&self) -> [usize; 3] {
        match self {
            ColorCorrection::Rgb => [0, 1, 2],
            ColorCorrection::Rbg => [0, 2, 1],
            ColorCorrection::Grb => [1, 0, 2],
            ColorCorrection::Gbr => [1, 2, 0],
            ColorCorrection::Brg => [2, 0, 1],
            ColorCorrection::Bgr => [2, 1, 0],
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == ColorCorrection::Rgb
    }

    /// Pure transform: returns a new buffer, the input is left untouched.
    /// Identity hands back a clone that shares the original pixels.
    pub fn apply(&self, buffer: &ViewBuffer) -> ViewBuffer {
        if self.is_identity() {
            return buffer.clone();
        }

        let [r, g, b] = self.permutation();
        let mut out = Vec::with_capacity(buffer.data.len());
        for px in buffer.data.chunks_exact(ViewBuffer::BYTES_PER_PIXEL) {
            out.extend_from_slice(&[px[r], px[g], px[b], px[3]]);
        }

        ViewBuffer {
            data: out.into(),
            ..buffer.clone()
        }
    }
}

impl TryFrom<u8> for ColorCorrection {
    type Error = UnknownCorrection;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => ColorCorrection::Rgb,
            1 => ColorCorrection::Rbg,
            2 => ColorCorrection::Grb,
            3 => ColorCorrection::Gbr,
            4 => ColorCorrection::Brg,
            5 => ColorCorrection::Bgr,
            other => return Err(UnknownCorrection(other)),
        })
    }
}

impl From<ColorCorrection> for u8 {
    fn from(value: ColorCorrection) -> Self {
        value as u8
    }
}
