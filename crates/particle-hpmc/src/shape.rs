//! Per-particle shape values handed to external fields
//!
//! Overlap checks live elsewhere; fields only need a shape's orientation
//! and extent.

use glam::DQuat;

pub trait Shape: Clone + std::fmt::Debug {
    /// Per-type shape parameters
    type Params: Clone + std::fmt::Debug;

    fn new(orientation: DQuat, params: &Self::Params) -> Self;

    fn orientation(&self) -> DQuat;

    /// Whether rotating the shape changes anything
    fn has_orientation(&self) -> bool;

    /// Diameter of the smallest sphere enclosing the shape
    fn circumsphere_diameter(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereParams {
    pub radius: f64,
    /// Track orientation even though the shape is isotropic (patchy spheres)
    pub orientable: bool,
}

impl Default for SphereParams {
    fn default() -> Self {
        Self {
            radius: 0.5,
            orientable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub orientation: DQuat,
    pub params: SphereParams,
}

impl Shape for Sphere {
    type Params = SphereParams;

    fn new(orientation: DQuat, params: &SphereParams) -> Self {
        Self {
            orientation,
            params: *params,
        }
    }

    fn orientation(&self) -> DQuat {
        self.orientation
    }

    fn has_orientation(&self) -> bool {
        self.params.orientable
    }

    fn circumsphere_diameter(&self) -> f64 {
        2.0 * self.params.radius
    }
}
