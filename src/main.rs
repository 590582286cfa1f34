//! Potential evaluation demo
//!
//! Relaxes random polymer chains under harmonic dihedral forces (CPU or GPU,
//! see `PARTICLES_BACKEND`), then runs Monte Carlo sweeps of a crystal held
//! by lattice springs inside a spherical wall.

use glam::{DQuat, DVec3};
use particle_hpmc::{
    BoxMoveCriterion, ExternalField, ExternalFieldMono, HarmonicLattice, MetropolisDriver, MoveKind,
    Shape, Sphere, SphereParams, SphericalWall, TrialMove,
};
use particle_physics::{
    BoxDim, DihedralData, HarmonicDihedralParams, ParticleData, SystemDefinition,
};
use particle_simulation::{
    ExecutionTarget, ForceAccumulator, ForceSet, HarmonicDihedralForceCompute, SimulationConfig,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::error::Error;

const N_CHAINS: usize = 64;
const CHAIN_LENGTH: usize = 32;
const MD_STEPS: u64 = 500;
const RELAX_RATE: f64 = 1e-3;

const LATTICE_CELLS: usize = 4;
const MC_SWEEPS: u64 = 200;
const KT: f64 = 1.0;

fn build_chains(rng: &mut StdRng) -> Result<SystemDefinition, Box<dyn Error>> {
    let box_dim = BoxDim::new(40.0, 40.0, 40.0, 0.1, 0.0, 0.0)?;
    let mut pdata = ParticleData::new(box_dim, 1);

    for _ in 0..N_CHAINS {
        let mut r = DVec3::new(
            rng.random_range(-20.0..20.0),
            rng.random_range(-20.0..20.0),
            rng.random_range(-20.0..20.0),
        );
        for _ in 0..CHAIN_LENGTH {
            pdata.add_particle(box_dim.wrap(r), DQuat::IDENTITY, 0)?;
            let step = DVec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            );
            r += step.normalize_or(DVec3::Z);
        }
    }

    let types = vec!["backbone".to_string(), "branch".to_string()];
    let mut sysdef = SystemDefinition::new(pdata, DihedralData::new(types));
    for chain in 0..N_CHAINS {
        let first = (chain * CHAIN_LENGTH) as u32;
        for k in 0..(CHAIN_LENGTH as u32 - 3) {
            let m = first + k;
            sysdef.add_dihedral([m, m + 1, m + 2, m + 3], if k % 4 == 0 { 1 } else { 0 })?;
        }
    }
    Ok(sysdef)
}

fn run_dynamics(config: &SimulationConfig, rng: &mut StdRng) -> Result<(), Box<dyn Error>> {
    let mut sysdef = build_chains(rng)?;
    let target = ExecutionTarget::from_config(config)?;
    log::info!("Execution target: {}", target.describe());

    let mut dihedrals = HarmonicDihedralForceCompute::new(&target, &sysdef, &config.tuner)?;
    dihedrals.set_params_by_name("backbone", HarmonicDihedralParams::new(10.0, 1.0, 3, 0.0))?;
    dihedrals.set_params_by_name("branch", HarmonicDihedralParams::new(4.0, -1.0, 1, 0.5))?;

    let mut forces = ForceSet::new();
    forces.add(Box::new(dihedrals));
    forces.set_autotuner_params(config.tuner.enabled, config.tuner.period)?;

    let mut accumulator = ForceAccumulator::new(sysdef.particles().len());
    for step in 0..MD_STEPS {
        forces.compute(step, &sysdef, &mut accumulator)?;

        if step % 100 == 0 || step + 1 == MD_STEPS {
            let w = accumulator.total_virial();
            log::info!(
                "step {:>4}: E = {:>12.5}  W = {:>10.5}  |ΣF| = {:.2e}",
                step,
                accumulator.total_energy(),
                (w[0] + w[3] + w[5]) / 3.0,
                accumulator.net_force().length()
            );
        }

        // Overdamped relaxation along the forces
        let particles = sysdef.particles_mut();
        for (i, f) in accumulator.forces().iter().enumerate() {
            let r = particles.positions()[i] + RELAX_RATE * *f;
            particles.set_position(i, r)?;
        }
    }
    Ok(())
}

fn build_crystal() -> Result<ParticleData, Box<dyn Error>> {
    let spacing = 1.5;
    let box_dim = BoxDim::cube(spacing * LATTICE_CELLS as f64)?;
    let mut pdata = ParticleData::new(box_dim, 1);
    let offset = DVec3::splat(0.5 * spacing * (LATTICE_CELLS as f64 - 1.0));
    for i in 0..LATTICE_CELLS {
        for j in 0..LATTICE_CELLS {
            for k in 0..LATTICE_CELLS {
                let r = DVec3::new(i as f64, j as f64, k as f64) * spacing - offset;
                pdata.add_particle(r, DQuat::IDENTITY, 0)?;
            }
        }
    }
    Ok(pdata)
}

fn run_monte_carlo(rng: &mut StdRng) -> Result<(), Box<dyn Error>> {
    let mut pdata = build_crystal()?;
    let shapes = [SphereParams {
        radius: 0.5,
        orientable: true,
    }];

    let mut lattice = HarmonicLattice::from_current(&pdata, 20.0, 5.0, KT)?;
    let wall = SphericalWall::for_shapes::<Sphere>(DVec3::ZERO, 4.5, &shapes)?;
    log::info!("Spherical wall encloses volume {:.3}", wall.volume());

    let mut driver = MetropolisDriver::new(KT)?;
    let max_displacement = 0.1;
    let max_rotation = 0.1;

    for sweep in 0..MC_SWEEPS {
        lattice.reset(sweep, &pdata);
        let before = *driver.counters();

        for index in 0..pdata.len() {
            let trial = if rng.random_bool(0.5) {
                let delta = DVec3::new(
                    rng.random_range(-max_displacement..max_displacement),
                    rng.random_range(-max_displacement..max_displacement),
                    rng.random_range(-max_displacement..max_displacement),
                );
                TrialMove {
                    index,
                    position: pdata.positions()[index] + delta,
                    orientation: pdata.orientations()[index],
                    kind: MoveKind::Translate,
                }
            } else {
                let axis = DVec3::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                )
                .normalize_or(DVec3::X);
                let angle = rng.random_range(-max_rotation..max_rotation);
                TrialMove {
                    index,
                    position: pdata.positions()[index],
                    orientation: DQuat::from_axis_angle(axis, angle) * pdata.orientations()[index],
                    kind: MoveKind::Rotate,
                }
            };

            // The wall vetoes first; the lattice springs score what's left
            let inside = ExternalFieldMono::<Sphere>::energy_difference(
                &wall,
                sweep,
                &pdata,
                index,
                pdata.positions()[index],
                &Sphere::new(pdata.orientations()[index], &shapes[0]),
                pdata.box_dim().wrap(trial.position),
                &Sphere::new(trial.orientation, &shapes[0]),
            ) == 0.0;
            if inside {
                driver.attempt_move::<Sphere, _, _>(
                    sweep, &mut pdata, &lattice, &shapes, &trial, rng,
                )?;
            }
        }

        let mut new_box = *pdata.box_dim();
        new_box.scale(1.0 + rng.random_range(-0.01..0.01))?;
        let criterion = BoxMoveCriterion::DeltaE;
        driver.attempt_box_move(sweep, &mut pdata, &lattice, new_box, criterion, rng)?;

        lattice.compute(sweep, &pdata);
        if sweep % 50 == 0 || sweep + 1 == MC_SWEEPS {
            let delta = *driver.counters() - before;
            log::info!(
                "sweep {:>4}: E_lattice = {:>9.4}  acc(trans) = {:.3}  acc(rot) = {:.3}  V = {:.3}",
                sweep,
                lattice.last_energy(),
                delta.translate_acceptance(),
                delta.rotate_acceptance(),
                pdata.box_dim().volume()
            );
        }
    }

    let counters = driver.counters();
    log::info!(
        "Monte Carlo done: {} particle moves, box acceptance {:.3}",
        counters.particle_moves(),
        counters.box_acceptance()
    );
    Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = SimulationConfig::from_env()?;
    let mut rng = StdRng::seed_from_u64(2024);

    run_dynamics(&config, &mut rng)?;
    run_monte_carlo(&mut rng)?;
    Ok(())
}

fn main() {
    // Initialize logger (RUST_LOG=debug for autotuner output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting potential evaluation demo...");

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}
