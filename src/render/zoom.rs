//! Viewer zoom state
//!
//! Zoom moves in 10% steps between 50% and 300%. The factor is kept in whole
//! tenths so that stepping never drifts past a bound through float error.

use serde::{Deserialize, Serialize};

/// Zoom step direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomDirection {
    In,
    Out,
}

/// Display zoom for a viewer session (1.0 = 100%)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "f32")]
pub struct Zoom {
    tenths: u8,
}

impl Default for Zoom {
    fn default() -> Self {
        Self { tenths: 10 }
    }
}

impl From<Zoom> for f32 {
    fn from(zoom: Zoom) -> Self {
        zoom.factor()
    }
}

impl Zoom {
    /// Smallest zoom, in tenths (50%)
    pub const MIN_TENTHS: u8 = 5;
    /// Largest zoom, in tenths (300%)
    pub const MAX_TENTHS: u8 = 30;

    /// Zoom factor (1.0 = 100%)
    pub fn factor(&self) -> f32 {
        f32::from(self.tenths) / 10.0
    }

    /// Zoom as a whole percentage
    pub fn percent(&self) -> u32 {
        u32::from(self.tenths) * 10
    }

    /// Step once; returns `false` when already at the bound
    pub fn step(&mut self, direction: ZoomDirection) -> bool {
        match direction {
            ZoomDirection::In => self.step_in(),
            ZoomDirection::Out => self.step_out(),
        }
    }

    /// Zoom in by 0.1; no-op at 3.0
    pub fn step_in(&mut self) -> bool {
        if self.tenths >= Self::MAX_TENTHS {
            return false;
        }
        self.tenths += 1;
        true
    }

    /// Zoom out by 0.1; no-op at 0.5
    pub fn step_out(&mut self) -> bool {
        if self.tenths <= Self::MIN_TENTHS {
            return false;
        }
        self.tenths -= 1;
        true
    }

    pub fn at_min(&self) -> bool {
        self.tenths == Self::MIN_TENTHS
    }

    pub fn at_max(&self) -> bool {
        self.tenths == Self::MAX_TENTHS
    }
}
