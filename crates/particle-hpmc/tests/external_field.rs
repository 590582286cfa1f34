use approx::assert_relative_eq;
use glam::{DQuat, DVec3};
use particle_hpmc::{
    acceptance_from_delta_e, acceptance_from_log_weights, acceptance_from_weights, BoxMoveCriterion,
    ExternalField, ExternalFieldMono, HarmonicLattice, MetropolisDriver, MoveKind, NullField, Shape,
    Sphere, SphereParams, SphericalWall, TrialMove,
};
use particle_physics::{BoxDim, ParticleData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Field that overrides nothing
struct Inert;

impl ExternalField for Inert {}

impl ExternalFieldMono<Sphere> for Inert {}

fn random_unit_quat(rng: &mut StdRng) -> DQuat {
    let q = DQuat::from_xyzw(
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
        rng.random_range(-1.0..1.0),
    );
    if q.length_squared() < 1e-6 {
        DQuat::IDENTITY
    } else {
        q.normalize()
    }
}

fn random_particles(rng: &mut StdRng, n: usize) -> ParticleData {
    let box_dim = BoxDim::new(8.0, 9.0, 7.0, 0.2, 0.1, -0.3).unwrap();
    let mut pdata = ParticleData::new(box_dim, 2);
    for i in 0..n {
        let r = DVec3::new(
            rng.random_range(-4.0..4.0),
            rng.random_range(-4.5..4.5),
            rng.random_range(-3.5..3.5),
        );
        let q = random_unit_quat(rng);
        pdata.add_particle(box_dim.wrap(r), q, (i % 2) as u32).unwrap();
    }
    pdata
}

fn jiggle(rng: &mut StdRng, pdata: &mut ParticleData, amount: f64) {
    for i in 0..pdata.len() {
        let r = pdata.positions()[i]
            + DVec3::new(
                rng.random_range(-amount..amount),
                rng.random_range(-amount..amount),
                rng.random_range(-amount..amount),
            );
        pdata.set_position(i, r).unwrap();
        let q = pdata.orientations()[i] * DQuat::from_rotation_y(rng.random_range(-amount..amount));
        pdata.set_orientation(i, q).unwrap();
    }
}

#[test]
fn test_default_methods_are_neutral() {
    let mut rng = StdRng::seed_from_u64(42);
    let fields: [&dyn ExternalFieldMono<Sphere>; 2] = [&NullField, &Inert];

    for _ in 0..20 {
        let pdata = random_particles(&mut rng, 6);
        let old = random_particles(&mut rng, 6);
        let params = SphereParams {
            radius: rng.random_range(0.1..2.0),
            orientable: rng.random(),
        };
        let index = rng.random_range(0..6);
        let old_shape = Sphere::new(random_unit_quat(&mut rng), &params);
        let new_shape = Sphere::new(random_unit_quat(&mut rng), &params);
        let timestep = rng.random_range(0..1_000_000);

        for field in fields {
            assert_eq!(field.calculate_boltzmann_weight(timestep, &pdata), 0.0);
            assert_eq!(field.calculate_log_boltzmann_weight(timestep, &pdata), None);
            let delta_e = field.calculate_delta_e(
                timestep,
                &pdata,
                old.positions(),
                old.orientations(),
                old.box_dim(),
            );
            assert_eq!(delta_e, 0.0);
            assert_eq!(
                field.energy_difference(
                    timestep,
                    &pdata,
                    index,
                    pdata.positions()[index],
                    &old_shape,
                    old.positions()[index],
                    &new_shape,
                ),
                0.0
            );
            assert!(!field.has_volume());
            assert_eq!(field.volume(), 0.0);
        }
    }
}

#[test]
fn test_neutral_weights_never_block_a_move() {
    let mut rng = StdRng::seed_from_u64(3);
    let criterion = BoxMoveCriterion::WeightRatio;
    let mut pdata = random_particles(&mut rng, 10);
    let mut driver = MetropolisDriver::new(1.0).unwrap();

    for step in 0..10 {
        let mut new_box = *pdata.box_dim();
        new_box.scale(rng.random_range(0.9..1.1)).unwrap();
        let accepted = driver
            .attempt_box_move(step, &mut pdata, &Inert, new_box, criterion, &mut rng)
            .unwrap();
        assert!(accepted);
    }
    assert_eq!(driver.counters().box_acceptance(), 1.0);
}

#[test]
fn test_rejected_trial_leaves_no_residual_state() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut pdata = random_particles(&mut rng, 12);
    let mut lattice = HarmonicLattice::from_current(&pdata, 50.0, 5.0, 1.0).unwrap();
    jiggle(&mut rng, &mut pdata, 0.2);
    lattice.reset(0, &pdata);

    let params = [
        SphereParams {
            radius: 0.5,
            orientable: true,
        },
        SphereParams {
            radius: 0.3,
            orientable: false,
        },
    ];
    let index = 5;
    let shape_of =
        |pdata: &ParticleData, q: DQuat| Sphere::new(q, &params[pdata.types()[index] as usize]);
    let trial_position = pdata.positions()[index] + DVec3::new(0.05, -0.02, 0.01);
    let trial_q = DQuat::from_rotation_x(0.1) * pdata.orientations()[index];

    let query = |pdata: &ParticleData| {
        lattice.energy_difference(
            1,
            pdata,
            index,
            pdata.positions()[index],
            &shape_of(pdata, pdata.orientations()[index]),
            trial_position,
            &shape_of(pdata, trial_q),
        )
    };
    let before = query(&pdata);
    let committed = pdata.clone();

    // A far jump costs ~50 * 3² / 2 kT and is rejected
    let mut driver = MetropolisDriver::new(1.0).unwrap();
    let trial = TrialMove {
        index,
        position: pdata.positions()[index] + DVec3::new(3.0, 0.0, 0.0),
        orientation: pdata.orientations()[index],
        kind: MoveKind::Translate,
    };
    let accepted = driver
        .attempt_move::<Sphere, _, _>(1, &mut pdata, &lattice, &params, &trial, &mut rng)
        .unwrap();
    assert!(!accepted);
    assert_eq!(pdata, committed);

    assert_eq!(query(&pdata), before);
}

#[test]
fn test_delta_e_consistent_with_weight_ratio() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut pdata = random_particles(&mut rng, 16);
    let kt = 1.7;
    let lattice = HarmonicLattice::from_current(&pdata, 3.0, 1.5, kt).unwrap();
    jiggle(&mut rng, &mut pdata, 0.15);

    for _ in 0..10 {
        let old = pdata.clone();
        let mut new_box = *pdata.box_dim();
        new_box
            .scale_by(DVec3::new(
                rng.random_range(0.97..1.03),
                rng.random_range(0.97..1.03),
                rng.random_range(0.97..1.03),
            ))
            .unwrap();
        pdata.rescale_box(new_box);
        jiggle(&mut rng, &mut pdata, 0.05);

        let delta_e = lattice.calculate_delta_e(
            0,
            &pdata,
            old.positions(),
            old.orientations(),
            old.box_dim(),
        );
        let w_before = lattice.calculate_boltzmann_weight(0, &old);
        let w_after = lattice.calculate_boltzmann_weight(0, &pdata);
        let ln_before = lattice.calculate_log_boltzmann_weight(0, &old).unwrap();
        let ln_after = lattice.calculate_log_boltzmann_weight(0, &pdata).unwrap();

        let from_ratio = -kt * (w_after / w_before).ln();
        assert_relative_eq!(delta_e, from_ratio, epsilon = 1e-9, max_relative = 1e-9);
        let from_log = -kt * (ln_after - ln_before);
        assert_relative_eq!(delta_e, from_log, epsilon = 1e-9, max_relative = 1e-9);
        assert_relative_eq!(
            acceptance_from_delta_e(delta_e, kt),
            acceptance_from_weights(w_before, w_after),
            epsilon = 1e-9
        );
        assert_relative_eq!(
            acceptance_from_delta_e(delta_e, kt),
            acceptance_from_log_weights(ln_before, ln_after),
            epsilon = 1e-9
        );
    }
}

#[test]
fn test_rejected_box_move_restores_state() {
    let mut rng = StdRng::seed_from_u64(19);
    let mut pdata = ParticleData::new(BoxDim::cube(10.0).unwrap(), 1);
    for r in [DVec3::new(1.5, 0.0, 0.0), DVec3::new(-1.0, 1.0, 0.5)] {
        pdata.add_particle(r, DQuat::IDENTITY, 0).unwrap();
    }
    let mut wall = SphericalWall::new(DVec3::ZERO, 2.0, 1).unwrap();
    wall.set_diameter(0, 0.5).unwrap();
    let committed = pdata.clone();

    let mut driver = MetropolisDriver::new(1.0).unwrap();
    let mut bigger = *pdata.box_dim();
    bigger.scale(1.5).unwrap();

    for criterion in [BoxMoveCriterion::DeltaE, BoxMoveCriterion::WeightRatio] {
        let accepted = driver
            .attempt_box_move(0, &mut pdata, &wall, bigger, criterion, &mut rng)
            .unwrap();
        assert!(!accepted);
        assert_eq!(pdata, committed);
    }
    assert_eq!(driver.counters().box_reject, 2);
}

#[test]
fn test_box_move_criteria_agree_at_large_energies() {
    let mut pdata = ParticleData::new(BoxDim::cube(4.0).unwrap(), 1);
    for i in 0..2 {
        for j in 0..2 {
            for k in 0..2 {
                let r = DVec3::new(i as f64, j as f64, k as f64) * 2.0 - DVec3::splat(1.0);
                pdata.add_particle(r, DQuat::IDENTITY, 0).unwrap();
            }
        }
    }
    let lattice = HarmonicLattice::from_current(&pdata, 1000.0, 0.0, 1.0).unwrap();
    for i in 0..pdata.len() {
        let r = pdata.positions()[i] + DVec3::new(0.5, 0.0, 0.0);
        pdata.set_position(i, r).unwrap();
    }
    let committed = pdata.clone();

    // Both weights underflow to 0, yet the move costs ~690 kT
    let mut bigger = *pdata.box_dim();
    bigger.scale(1.3).unwrap();
    let mut trial = pdata.clone();
    trial.rescale_box(bigger);
    assert_eq!(lattice.calculate_boltzmann_weight(0, &pdata), 0.0);
    assert_eq!(lattice.calculate_boltzmann_weight(0, &trial), 0.0);
    let delta_e = lattice.calculate_delta_e(
        0,
        &trial,
        pdata.positions(),
        pdata.orientations(),
        pdata.box_dim(),
    );
    assert!(delta_e > 600.0);

    let mut rng = StdRng::seed_from_u64(23);
    let mut driver = MetropolisDriver::new(1.0).unwrap();
    for criterion in [BoxMoveCriterion::WeightRatio, BoxMoveCriterion::DeltaE] {
        for step in 0..20 {
            let accepted = driver
                .attempt_box_move(step, &mut pdata, &lattice, bigger, criterion, &mut rng)
                .unwrap();
            assert!(!accepted, "{criterion:?} accepted a move costing {delta_e} kT");
            assert_eq!(pdata, committed);
        }
    }
    assert_eq!(driver.counters().box_accept, 0);
}

#[test]
fn test_committed_move_changes_energy_by_scored_difference() {
    let mut rng = StdRng::seed_from_u64(29);
    let mut pdata = random_particles(&mut rng, 10);
    let lattice = HarmonicLattice::from_current(&pdata, 4.0, 5.0, 1.0).unwrap();
    jiggle(&mut rng, &mut pdata, 0.3);

    // Type 0 tracks orientation, type 1 is isotropic
    let params = [
        SphereParams {
            radius: 0.5,
            orientable: true,
        },
        SphereParams {
            radius: 0.5,
            orientable: false,
        },
    ];
    let reference = random_particles(&mut StdRng::seed_from_u64(29), 10);
    let mut driver = MetropolisDriver::new(1.0).unwrap();

    let energy = |p: &ParticleData| lattice.energy(p.positions(), p.orientations(), p.box_dim());
    for index in 0..pdata.len() {
        let before = energy(&pdata);

        // Back onto the site, with a large rotation on top for isotropic particles
        let orientation = if params[pdata.types()[index] as usize].orientable {
            reference.orientations()[index]
        } else {
            DQuat::from_rotation_x(1.0) * pdata.orientations()[index]
        };
        let trial = TrialMove {
            index,
            position: reference.positions()[index],
            orientation,
            kind: MoveKind::Translate,
        };
        let shape = &params[pdata.types()[index] as usize];
        let scored = lattice.energy_difference(
            0,
            &pdata,
            index,
            pdata.positions()[index],
            &Sphere::new(pdata.orientations()[index], shape),
            pdata.box_dim().wrap(trial.position),
            &Sphere::new(
                if shape.orientable {
                    orientation.normalize()
                } else {
                    pdata.orientations()[index]
                },
                shape,
            ),
        );
        assert!(scored <= 1e-12);

        let accepted = driver
            .attempt_move::<Sphere, _, _>(0, &mut pdata, &lattice, &params, &trial, &mut rng)
            .unwrap();
        assert!(accepted);
        assert_relative_eq!(energy(&pdata) - before, scored, epsilon = 1e-9);
    }
}
