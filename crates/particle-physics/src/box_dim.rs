//! Triclinic periodic simulation box
//!
//! The box is described by edge lengths `L = (Lx, Ly, Lz)` and tilt factors
//! `xy`, `xz`, `yz`. Its lattice vectors are
//!
//! ```text
//! a = (Lx,       0,       0 )
//! b = (xy * Ly,  Ly,      0 )
//! c = (xz * Lz,  yz * Lz, Lz)
//! ```
//!
//! A box with `Lz == 0` is two-dimensional; `xz` and `yz` are kept but
//! ignored until `Lz` becomes positive again. The box is centered on the
//! origin, so fractional coordinates run from the corner `-L/2`. Each axis
//! is periodic unless cleared with [`BoxDim::set_periodic`].

use crate::PhysicsError;
use glam::{DMat3, DVec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDim {
    lengths: DVec3,
    xy: f64,
    xz: f64,
    yz: f64,
    periodic: [bool; 3],
}

fn validate(lengths: DVec3, tilts: DVec3) -> Result<(), PhysicsError> {
    if !(lengths.is_finite() && tilts.is_finite()) {
        return Err(PhysicsError::InvalidBox(format!(
            "non-finite box parameters L={lengths}, tilts={tilts}"
        )));
    }
    if lengths.x <= 0.0 || lengths.y <= 0.0 {
        return Err(PhysicsError::InvalidBox(format!(
            "Lx and Ly must be positive, got Lx={}, Ly={}",
            lengths.x, lengths.y
        )));
    }
    if lengths.z < 0.0 {
        return Err(PhysicsError::InvalidBox(format!(
            "Lz must not be negative, got {}",
            lengths.z
        )));
    }
    Ok(())
}

impl BoxDim {
    /// Create a periodic triclinic box from edge lengths and tilt factors
    pub fn new(lx: f64, ly: f64, lz: f64, xy: f64, xz: f64, yz: f64) -> Result<Self, PhysicsError> {
        let lengths = DVec3::new(lx, ly, lz);
        validate(lengths, DVec3::new(xy, xz, yz))?;
        Ok(Self {
            lengths,
            xy,
            xz,
            yz,
            periodic: [true; 3],
        })
    }

    /// Orthorhombic box
    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Result<Self, PhysicsError> {
        Self::new(lx, ly, lz, 0.0, 0.0, 0.0)
    }

    /// Cubic box with edge length `l`
    pub fn cube(l: f64) -> Result<Self, PhysicsError> {
        Self::new(l, l, l, 0.0, 0.0, 0.0)
    }

    /// Square two-dimensional box with edge length `l`
    pub fn square(l: f64) -> Result<Self, PhysicsError> {
        Self::new(l, l, 0.0, 0.0, 0.0, 0.0)
    }

    /// Build a box from an upper triangular matrix whose columns are the
    /// lattice vectors.
    pub fn from_matrix(matrix: DMat3) -> Result<Self, PhysicsError> {
        let lx = matrix.x_axis.x;
        let ly = matrix.y_axis.y;
        let lz = matrix.z_axis.z;

        if matrix.x_axis.y != 0.0 || matrix.x_axis.z != 0.0 || matrix.y_axis.z != 0.0 {
            return Err(PhysicsError::InvalidBox(
                "box matrix must be upper triangular".to_string(),
            ));
        }
        if ly == 0.0 {
            return Err(PhysicsError::InvalidBox("Ly must be positive".to_string()));
        }

        let xy = matrix.y_axis.x / ly;
        let (xz, yz) = if lz == 0.0 {
            (0.0, 0.0)
        } else {
            (matrix.z_axis.x / lz, matrix.z_axis.y / lz)
        };

        Self::new(lx, ly, lz, xy, xz, yz)
    }

    pub fn lengths(&self) -> DVec3 {
        self.lengths
    }

    /// Replace the edge lengths, keeping tilts and periodicity. The box is
    /// unchanged on error.
    pub fn set_lengths(&mut self, lengths: DVec3) -> Result<(), PhysicsError> {
        validate(lengths, self.tilts())?;
        self.lengths = lengths;
        Ok(())
    }

    /// Tilt factors `(xy, xz, yz)`
    pub fn tilts(&self) -> DVec3 {
        DVec3::new(self.xy, self.xz, self.yz)
    }

    /// Replace the tilt factors `(xy, xz, yz)`. The box is unchanged on error.
    pub fn set_tilts(&mut self, tilts: DVec3) -> Result<(), PhysicsError> {
        validate(self.lengths, tilts)?;
        self.xy = tilts.x;
        self.xz = tilts.y;
        self.yz = tilts.z;
        Ok(())
    }

    /// Take lengths and tilts from a box matrix, keeping periodicity. A 2D
    /// matrix leaves `xz` and `yz` as they were.
    pub fn set_matrix(&mut self, matrix: DMat3) -> Result<(), PhysicsError> {
        let parsed = Self::from_matrix(matrix)?;
        let (xz, yz) = if parsed.is_2d() {
            (self.xz, self.yz)
        } else {
            (parsed.xz, parsed.yz)
        };
        *self = Self {
            xz,
            yz,
            periodic: self.periodic,
            ..parsed
        };
        Ok(())
    }

    /// Periodicity along x, y and z
    pub fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    pub fn set_periodic(&mut self, periodic: [bool; 3]) {
        self.periodic = periodic;
    }

    /// `(xz, yz)` as they act on coordinates; zero for a 2D box
    fn z_tilts(&self) -> (f64, f64) {
        if self.is_2d() {
            (0.0, 0.0)
        } else {
            (self.xz, self.yz)
        }
    }

    pub fn is_2d(&self) -> bool {
        self.lengths.z == 0.0
    }

    pub fn dimensions(&self) -> u32 {
        if self.is_2d() {
            2
        } else {
            3
        }
    }

    /// Lattice vectors `[a, b, c]`
    pub fn lattice_vectors(&self) -> [DVec3; 3] {
        let l = self.lengths;
        let (xz, yz) = self.z_tilts();
        [
            DVec3::new(l.x, 0.0, 0.0),
            DVec3::new(self.xy * l.y, l.y, 0.0),
            DVec3::new(xz * l.z, yz * l.z, l.z),
        ]
    }

    /// Box matrix with the lattice vectors as columns
    pub fn matrix(&self) -> DMat3 {
        let [a, b, c] = self.lattice_vectors();
        DMat3::from_cols(a, b, c)
    }

    /// Volume of the box (area for a 2D box). Tilts do not change it.
    pub fn volume(&self) -> f64 {
        let l = self.lengths;
        if self.is_2d() {
            l.x * l.y
        } else {
            l.x * l.y * l.z
        }
    }

    /// Rescale the box isotropically to the given volume, preserving aspect
    /// ratios and tilts.
    pub fn set_volume(&mut self, volume: f64) -> Result<(), PhysicsError> {
        if !(volume.is_finite() && volume > 0.0) {
            return Err(PhysicsError::InvalidBox(format!(
                "volume must be positive, got {volume}"
            )));
        }
        let s = (volume / self.volume()).powf(1.0 / self.dimensions() as f64);
        self.scale(s)
    }

    /// Scale all edge lengths by `s`
    pub fn scale(&mut self, s: f64) -> Result<(), PhysicsError> {
        self.scale_by(DVec3::splat(s))
    }

    /// Scale the edge lengths component-wise
    pub fn scale_by(&mut self, s: DVec3) -> Result<(), PhysicsError> {
        self.set_lengths(self.lengths * s)
    }

    /// Low corner of the box
    pub fn lo(&self) -> DVec3 {
        -0.5 * self.lengths
    }

    /// Fractional coordinates of `r` (0..1 inside the box)
    pub fn make_fraction(&self, r: DVec3) -> DVec3 {
        let (xz, yz) = self.z_tilts();
        let mut delta = r - self.lo();
        delta.x -= (xz - yz * self.xy) * r.z;
        delta.y -= yz * r.z;
        delta.x -= self.xy * r.y;

        let l = self.lengths;
        DVec3::new(
            delta.x / l.x,
            delta.y / l.y,
            if self.is_2d() { 0.0 } else { delta.z / l.z },
        )
    }

    /// Inverse of [`BoxDim::make_fraction`]
    pub fn make_absolute(&self, f: DVec3) -> DVec3 {
        let (xz, yz) = self.z_tilts();
        let mut v = f * self.lengths + self.lo();
        v.x += self.xy * v.y + xz * v.z;
        v.y += yz * v.z;
        v
    }

    /// Minimum image of a separation vector along the periodic axes
    pub fn min_image(&self, mut v: DVec3) -> DVec3 {
        let l = self.lengths;
        let [px, py, pz] = self.periodic;

        if pz && !self.is_2d() {
            let img = (v.z / l.z).round_ties_even();
            v.z -= l.z * img;
            v.y -= l.z * self.yz * img;
            v.x -= l.z * self.xz * img;
        }

        if py {
            let img = (v.y / l.y).round_ties_even();
            v.y -= l.y * img;
            v.x -= l.y * self.xy * img;
        }

        if px {
            let img = (v.x / l.x).round_ties_even();
            v.x -= l.x * img;
        }

        v
    }

    /// Wrap a position back into the primary cell along the periodic axes
    pub fn wrap(&self, r: DVec3) -> DVec3 {
        let [px, py, pz] = self.periodic;
        let mut f = self.make_fraction(r);
        if px {
            f.x -= f.x.floor();
        }
        if py {
            f.y -= f.y.floor();
        }
        if pz && !self.is_2d() {
            f.z -= f.z.floor();
        }
        self.make_absolute(f)
    }
}
