//! Harmonic dihedral parameters and reference evaluation
//!
//! `V(φ) = ½ K [1 + d cos(n φ − φ₀)]`
//!
//! The evaluation follows the usual four-body formulation: with
//! `dab = ra − rb`, `dcb = rc − rb`, `ddc = rd − rc`, the angle is measured
//! between the planes spanned by `(dab, −dcb)` and `(ddc, −dcb)`. The same
//! arithmetic runs in the WGSL kernel in single precision.

use crate::{BoxDim, PhysicsError};
use glam::DVec3;

/// Coefficients of one dihedral type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicDihedralParams {
    /// Spring constant
    pub k: f64,
    /// Sign factor `d`, either +1 or -1
    pub sign: f64,
    /// Multiplicity `n`
    pub multiplicity: u32,
    /// Phase shift in radians
    pub phi_0: f64,
}

impl Default for HarmonicDihedralParams {
    /// Inert record: zero spring constant
    fn default() -> Self {
        Self {
            k: 0.0,
            sign: 1.0,
            multiplicity: 1,
            phi_0: 0.0,
        }
    }
}

impl HarmonicDihedralParams {
    pub fn new(k: f64, sign: f64, multiplicity: u32, phi_0: f64) -> Self {
        Self {
            k,
            sign,
            multiplicity,
            phi_0,
        }
    }

    /// Reject records that cannot be evaluated
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.k.is_finite() {
            return Err(PhysicsError::InvalidParams(format!(
                "spring constant must be finite, got {}",
                self.k
            )));
        }
        if self.sign != 1.0 && self.sign != -1.0 {
            return Err(PhysicsError::InvalidParams(format!(
                "sign must be +1 or -1, got {}",
                self.sign
            )));
        }
        if !self.phi_0.is_finite() {
            return Err(PhysicsError::InvalidParams(format!(
                "phase shift must be finite, got {}",
                self.phi_0
            )));
        }
        Ok(())
    }

    /// Packed device record `(K, sign, multiplicity, phi_0)`
    pub fn to_gpu(&self) -> [f32; 4] {
        [
            self.k as f32,
            self.sign as f32,
            self.multiplicity as f32,
            self.phi_0 as f32,
        ]
    }
}

/// Forces on the four members, energy and virial of one dihedral
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DihedralEvaluation {
    pub forces: [DVec3; 4],
    pub energy: f64,
    /// Virial components `xx, xy, xz, yy, yz, zz`
    pub virial: [f64; 6],
}

pub fn evaluate_harmonic_dihedral(
    params: &HarmonicDihedralParams,
    positions: [DVec3; 4],
    box_dim: &BoxDim,
) -> DihedralEvaluation {
    let [xa, xb, xc, xd] = positions;

    let dab = box_dim.min_image(xa - xb);
    let dcb = box_dim.min_image(xc - xb);
    let ddc = box_dim.min_image(xd - xc);
    let dcbm = box_dim.min_image(-dcb);

    let a = dab.cross(dcbm);
    let b = ddc.cross(dcbm);

    let raasq = a.length_squared();
    let rbbsq = b.length_squared();
    let rgsq = dcbm.length_squared();
    let rg = rgsq.sqrt();

    // Collinear members give zero-length normals; their inverses stay zero
    let rginv = if rg > 0.0 { 1.0 / rg } else { 0.0 };
    let raa2inv = if raasq > 0.0 { 1.0 / raasq } else { 0.0 };
    let rbb2inv = if rbbsq > 0.0 { 1.0 / rbbsq } else { 0.0 };
    let rabinv = (raa2inv * rbb2inv).sqrt();

    let c_abcd = (a.dot(b) * rabinv).clamp(-1.0, 1.0);
    let s_abcd = rg * rabinv * a.dot(ddc);

    let (sin_phi_0, cos_phi_0) = params.phi_0.sin_cos();
    let multi = params.multiplicity;

    // cos(nφ) and sin(nφ) by recurrence
    let mut p = 1.0;
    let mut dfab = 0.0;
    let mut ddfab = 0.0;
    for _ in 0..multi {
        ddfab = p * c_abcd - dfab * s_abcd;
        dfab = p * s_abcd + dfab * c_abcd;
        p = ddfab;
    }

    p = (p * cos_phi_0 + dfab * sin_phi_0) * params.sign;
    dfab = (dfab * cos_phi_0 - ddfab * sin_phi_0) * params.sign * -(multi as f64);
    p += 1.0;

    if multi == 0 {
        p = 1.0 + params.sign;
        dfab = 0.0;
    }

    let fg = dab.dot(dcbm);
    let hg = ddc.dot(dcbm);
    let fga = fg * raa2inv * rginv;
    let hgb = hg * rbb2inv * rginv;
    let gaa = -raa2inv * rg;
    let gbb = rbb2inv * rg;

    let dtf = gaa * a;
    let dtg = fga * a - hgb * b;
    let dth = gbb * b;

    let df = -params.k * dfab * 0.5;
    let sx2 = df * dtg;

    let ffa = df * dtf;
    let ffb = sx2 - ffa;
    let ffd = df * dth;
    let ffc = -sx2 - ffd;

    // Positions relative to b: a -> dab, c -> dcb, d -> ddc + dcb
    let rd = ddc + dcb;
    let virial = [
        dab.x * ffa.x + dcb.x * ffc.x + rd.x * ffd.x,
        dab.y * ffa.x + dcb.y * ffc.x + rd.y * ffd.x,
        dab.z * ffa.x + dcb.z * ffc.x + rd.z * ffd.x,
        dab.y * ffa.y + dcb.y * ffc.y + rd.y * ffd.y,
        dab.z * ffa.y + dcb.z * ffc.y + rd.z * ffd.y,
        dab.z * ffa.z + dcb.z * ffc.z + rd.z * ffd.z,
    ];

    DihedralEvaluation {
        forces: [ffa, ffb, ffc, ffd],
        energy: 0.5 * params.k * p,
        virial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn big_box() -> BoxDim {
        BoxDim::cube(50.0).unwrap()
    }

    fn random_dihedral(rng: &mut StdRng) -> [DVec3; 4] {
        let mut jitter = || {
            DVec3::new(
                rng.random_range(-0.4..0.4),
                rng.random_range(-0.4..0.4),
                rng.random_range(-0.4..0.4),
            )
        };
        [
            DVec3::new(0.0, 1.0, 0.0) + jitter(),
            DVec3::new(0.0, 0.0, 0.0) + jitter(),
            DVec3::new(1.0, 0.0, 0.0) + jitter(),
            DVec3::new(1.0, 0.5, 1.0) + jitter(),
        ]
    }

    /// Dihedral angle by the IUPAC convention, for checking the energy form
    fn dihedral_angle(r: [DVec3; 4]) -> f64 {
        let b1 = r[1] - r[0];
        let b2 = r[2] - r[1];
        let b3 = r[3] - r[2];
        let n1 = b1.cross(b2);
        let n2 = b2.cross(b3);
        let m1 = n1.cross(b2.normalize());
        let x = n1.dot(n2);
        let y = m1.dot(n2);
        y.atan2(x)
    }

    #[test]
    fn test_validate() {
        assert!(HarmonicDihedralParams::new(10.0, 1.0, 3, 0.0).validate().is_ok());
        assert!(HarmonicDihedralParams::new(10.0, 0.5, 3, 0.0).validate().is_err());
        assert!(HarmonicDihedralParams::new(f64::INFINITY, 1.0, 3, 0.0)
            .validate()
            .is_err());
        assert!(HarmonicDihedralParams::new(1.0, -1.0, 1, f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_energy_matches_functional_form() {
        let mut rng = StdRng::seed_from_u64(7);
        let params = HarmonicDihedralParams::new(3.0, -1.0, 2, 0.4);
        for _ in 0..20 {
            let r = random_dihedral(&mut rng);
            let eval = evaluate_harmonic_dihedral(&params, r, &big_box());
            let phi = dihedral_angle(r);
            // The formulation measures φ with the opposite orientation
            let v = |angle: f64| 0.5 * params.k * (1.0 + params.sign * angle.cos());
            let expected_a = v(2.0 * phi - params.phi_0);
            let expected_b = v(-2.0 * phi - params.phi_0);
            let close = |e: f64| (eval.energy - e).abs() < 1e-9;
            assert!(
                close(expected_a) || close(expected_b),
                "energy {} matches neither {} nor {}",
                eval.energy,
                expected_a,
                expected_b
            );
        }
    }

    #[test]
    fn test_forces_are_negative_gradient() {
        let mut rng = StdRng::seed_from_u64(11);
        let params = HarmonicDihedralParams::new(5.0, 1.0, 3, 0.7);
        let h = 1e-6;
        for _ in 0..10 {
            let r = random_dihedral(&mut rng);
            let eval = evaluate_harmonic_dihedral(&params, r, &big_box());
            for member in 0..4 {
                for axis in 0..3 {
                    let mut plus = r;
                    let mut minus = r;
                    plus[member][axis] += h;
                    minus[member][axis] -= h;
                    let e_plus = evaluate_harmonic_dihedral(&params, plus, &big_box()).energy;
                    let e_minus = evaluate_harmonic_dihedral(&params, minus, &big_box()).energy;
                    let numeric = -(e_plus - e_minus) / (2.0 * h);
                    assert_relative_eq!(eval.forces[member][axis], numeric, epsilon = 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_forces_sum_to_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = HarmonicDihedralParams::new(2.0, 1.0, 1, 0.0);
        let r = random_dihedral(&mut rng);
        let eval = evaluate_harmonic_dihedral(&params, r, &big_box());
        let net: DVec3 = eval.forces.iter().copied().sum();
        assert!(net.length() < 1e-10);
    }

    #[test]
    fn test_virial_is_strain_derivative() {
        let mut rng = StdRng::seed_from_u64(5);
        let params = HarmonicDihedralParams::new(4.0, 1.0, 2, 0.3);
        let r = random_dihedral(&mut rng);
        let eval = evaluate_harmonic_dihedral(&params, r, &big_box());

        // dE/dε for r -> (1 + ε e_x e_x) r equals -W_xx
        let eps = 1e-6;
        let strain = |e: f64| r.map(|p| DVec3::new(p.x * (1.0 + e), p.y, p.z));
        let e_plus = evaluate_harmonic_dihedral(&params, strain(eps), &big_box()).energy;
        let e_minus = evaluate_harmonic_dihedral(&params, strain(-eps), &big_box()).energy;
        let de = (e_plus - e_minus) / (2.0 * eps);
        assert_relative_eq!(-de, eval.virial[0], epsilon = 1e-5);

        // Trace equals the sum of r . F over members
        let rf: f64 = (0..4).map(|m| (r[m] - r[1]).dot(eval.forces[m])).sum();
        assert_relative_eq!(eval.virial[0] + eval.virial[3] + eval.virial[5], rf, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_multiplicity_is_constant() {
        let mut rng = StdRng::seed_from_u64(9);
        let params = HarmonicDihedralParams::new(2.0, 1.0, 0, 0.0);
        let eval = evaluate_harmonic_dihedral(&params, random_dihedral(&mut rng), &big_box());
        assert_relative_eq!(eval.energy, 2.0);
        assert!(eval.forces.iter().all(|f| f.length() == 0.0));
    }

    #[test]
    fn test_collinear_members_stay_finite() {
        let params = HarmonicDihedralParams::new(2.0, 1.0, 3, 0.0);
        let r = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(3.0, 0.0, 0.0),
        ];
        let eval = evaluate_harmonic_dihedral(&params, r, &big_box());
        assert!(eval.energy.is_finite());
        assert!(eval.forces.iter().all(|f| f.is_finite()));
    }
}
