//! End-to-end scenarios exercising the whole tick pipeline.

use ember_engine::elements::{
    PT_DUST, PT_FILT, PT_FIRE, PT_GLAS, PT_PHOT, PT_PSCN, PT_SPRK, PT_WATR,
};
use ember_engine::parts::pmap_id;
use ember_engine::save::Codec;
use ember_engine::settings::{GravityMode, SimulationSettings};
use ember_engine::{History, Simulation, SimulationConfig, Snapshot};

fn sim() -> Simulation {
    Simulation::new(SimulationConfig { cell: 4, cells: (153, 96) }).unwrap()
}

#[test]
fn dust_falls_off_the_bottom_of_a_void_world() {
    let mut sim = sim();
    assert!(sim.create_part(-2, 80, 60, PT_DUST) >= 0);
    assert_eq!(sim.element_count[PT_DUST as usize], 1);
    for _ in 0..1000 {
        sim.tick();
    }
    assert_eq!(sim.element_count[PT_DUST as usize], 0);
    assert_eq!(sim.num_parts, 0);
}

#[test]
fn fire_boils_water_away_and_builds_pressure() {
    let mut sim = sim();
    for x in 40..=120 {
        assert!(sim.create_part(-2, x, 20, PT_WATR) >= 0);
    }
    for x in 40..=120 {
        assert!(sim.create_part(-2, x, 40, PT_FIRE) >= 0);
    }
    let mut max_pressure = f32::MIN;
    for _ in 0..600 {
        sim.tick();
        for cy in 0..=10 {
            for cx in 0..sim.cfg.xcells {
                max_pressure = max_pressure.max(sim.pv[(cx, cy)]);
            }
        }
    }
    assert_eq!(
        sim.element_count[PT_WATR as usize], 0,
        "all water should have boiled or left the grid"
    );
    assert!(max_pressure > 10.0, "boiling should spike pressure, saw {max_pressure}");
}

#[test]
fn photon_refracts_through_glass_and_disperses() {
    let mut sim = sim();
    for y in 30..=40 {
        for x in 50..=80 {
            assert!(sim.create_part(-2, x, y, PT_GLAS) >= 0);
        }
    }
    let i = sim.create_part(-2, 10, 35, PT_PHOT) as usize;
    sim.parts.data[i].vx = 3.0;
    sim.parts.data[i].vy = 0.0;

    for _ in 0..60 {
        sim.tick();
    }

    let photons: Vec<_> = sim
        .parts
        .iter_live()
        .filter(|(_, p)| p.ptype == PT_PHOT)
        .map(|(_, p)| *p)
        .collect();
    assert!(photons.len() >= 2, "dispersion should split the ray, saw {}", photons.len());

    // The straight-through ray crossed the slab and kept its row.
    assert!(
        photons.iter().any(|p| p.x > 80.0 && (30.0..=40.0).contains(&p.y)),
        "a photon should exit the far side within the slab rows"
    );

    // Wavelength sets differ between split rays.
    let mut seen = std::collections::HashSet::new();
    for p in &photons {
        seen.insert(p.ctype);
    }
    assert!(seen.len() >= 2, "split photons should carry shifted wavelengths");
}

#[test]
fn undo_history_walks_back_to_the_initial_state() {
    let mut sim = sim();
    let mut history = History::new(3);

    history.push(&sim); // A: empty
    let a = Snapshot::from_sim(&sim).hash();
    sim.create_part(-2, 10, 10, PT_DUST);
    history.push(&sim); // B
    sim.create_part(-2, 20, 20, PT_WATR);
    history.push(&sim); // C
    let c = Snapshot::from_sim(&sim).hash();

    // First undo materializes the just-pushed state, the next two walk
    // back to A.
    history.undo(&mut sim).unwrap();
    history.undo(&mut sim).unwrap();
    history.undo(&mut sim).unwrap();
    assert_eq!(Snapshot::from_sim(&sim).hash(), a);

    // Redo all the way forward; the last redo consumes beforeRestore.
    history.redo(&mut sim).unwrap();
    history.redo(&mut sim).unwrap();
    history.redo(&mut sim).unwrap();
    assert_eq!(Snapshot::from_sim(&sim).hash(), c);
    assert!(!history.has_before_restore());
}

#[test]
fn filt_save_fields_are_bit_exact() {
    let mut a = sim();
    let i = a.create_part(-2, 5, 5, PT_FILT) as usize;
    a.parts.data[i].ctype = 0x3FFF_FFFF;
    a.parts.data[i].tmp = 2; // OR filter
    a.parts.data[i].dcolour = 0x80FF_0000;
    a.apply_settings(&SimulationSettings {
        gravity_mode: GravityMode::Custom { gx: 1.0, gy: 0.0 },
        ..SimulationSettings::default()
    });

    let bytes = Codec::default().encode(&a).unwrap();
    let mut b = sim();
    Codec::default().load(&mut b, &bytes).unwrap();

    let part = b.parts.data[pmap_id(b.pmap[(5, 5)])];
    assert_eq!(part.ptype, PT_FILT);
    assert_eq!(part.ctype, 0x3FFF_FFFF);
    assert_eq!(part.tmp, 2);
    assert_eq!(part.dcolour, 0x80FF_0000);
    assert_eq!(b.gravity_mode, GravityMode::Custom { gx: 1.0, gy: 0.0 });
}

#[test]
fn sparked_silicon_box_energizes_its_cells() {
    let mut sim = sim();
    // A 10x10-cell solid box of PSCN (40x40 pixels at cell size 4).
    for y in 20..60 {
        for x in 20..60 {
            assert!(sim.create_part(-2, x, y, PT_PSCN) >= 0);
        }
    }
    assert!(sim.create_part(-2, 20, 20, PT_SPRK) >= 0);

    for _ in 0..5 {
        sim.tick();
    }

    let (cx0, cy0) = sim.cell_of(20, 20);
    assert_ne!(sim.emap[(cx0, cy0)], 0, "sparked cell should be marked in emap");

    let mut wired = 0;
    for cy in 0..sim.cfg.ycells {
        for cx in 0..sim.cfg.xcells {
            if sim.is_wire(cx, cy) {
                wired += 1;
                assert!(
                    !sim.is_wire_off(cx, cy),
                    "wire cell ({cx}, {cy}) should still be energized"
                );
            }
        }
    }
    assert_eq!(wired, 100);
    // The spark has burned through and left conductors behind.
    let silicon = sim.element_count[PT_PSCN as usize] + sim.element_count[PT_SPRK as usize];
    assert_eq!(silicon, 1600);
}
