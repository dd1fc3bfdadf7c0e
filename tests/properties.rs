//! Testable properties: determinism, pool/pmap coherence, save and delta
//! round trips, history cursor behavior.

use ember_engine::elements::{PT_DUST, PT_FIRE, PT_GLAS, PT_STNE, PT_WATR};
use ember_engine::parts::{pmap_id, pmap_typ};
use ember_engine::save::Codec;
use ember_engine::signs::Justification;
use ember_engine::snapshot::SnapshotDelta;
use ember_engine::walls::WL_WALL;
use ember_engine::{History, Simulation, SimulationConfig, Snapshot};

fn seeded_sim() -> Simulation {
    let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
    sim.ensure_determinism = true;
    for x in 60..100 {
        sim.create_part(-2, x, 100, PT_STNE);
    }
    for x in 70..90 {
        sim.create_part(-2, x, 80, PT_WATR);
        sim.create_part(-2, x, 60, PT_DUST);
    }
    for x in 75..85 {
        sim.create_part(-2, x, 90, PT_FIRE);
    }
    sim
}

#[test]
fn identical_runs_produce_identical_hashes() {
    let mut a = seeded_sim();
    let mut b = seeded_sim();
    assert_eq!(Snapshot::from_sim(&a).hash(), Snapshot::from_sim(&b).hash());
    for _ in 0..100 {
        a.tick();
        b.tick();
    }
    assert_eq!(Snapshot::from_sim(&a).hash(), Snapshot::from_sim(&b).hash());
}

#[test]
fn restored_snapshots_replay_identically() {
    let mut a = seeded_sim();
    for _ in 0..20 {
        a.tick();
    }
    let snap = Snapshot::from_sim(&a);
    let mut replay_one = Vec::new();
    for _ in 0..30 {
        a.tick();
        replay_one.push(Snapshot::from_sim(&a).hash());
    }
    snap.restore_into(&mut a);
    let mut replay_two = Vec::new();
    for _ in 0..30 {
        a.tick();
        replay_two.push(Snapshot::from_sim(&a).hash());
    }
    assert_eq!(replay_one, replay_two);
}

#[test]
fn pool_and_pmap_stay_coherent_across_ticks() {
    let mut sim = seeded_sim();
    for _ in 0..50 {
        sim.tick();

        let mut live = 0;
        for i in 0..=sim.parts.last_active_index {
            let part = sim.parts.data[i];
            if part.is_vacant() {
                continue;
            }
            live += 1;
            let (x, y) = Simulation::part_pos(&part);
            let slot = if sim.elements.is_energy(part.ptype) {
                sim.photons[(x, y)]
            } else {
                sim.pmap[(x, y)]
            };
            assert_ne!(slot, 0, "live particle {i} missing from its index grid");
            assert_eq!(pmap_typ(slot), part.ptype);
        }
        assert_eq!(live, sim.num_parts);

        // Every non-zero index slot points back at a live particle.
        for (x, y, &slot) in sim.pmap.iter_coords() {
            if slot != 0 {
                let part = sim.parts.data[pmap_id(slot)];
                assert_eq!(part.ptype, pmap_typ(slot));
                assert_eq!(Simulation::part_pos(&part), (x, y));
            }
        }

        // The free list covers exactly the vacant slots.
        let mut free = 0;
        let mut cursor = sim.pfree;
        while cursor != -1 {
            free += 1;
            cursor = sim.parts.data[cursor as usize].life;
        }
        assert_eq!(free, sim.parts.capacity() - sim.parts.count_live());

        // Element counts match a linear scan.
        let mut counts = vec![0i32; sim.element_count.len()];
        for (_, part) in sim.parts.iter_live() {
            counts[part.ptype as usize] += 1;
        }
        assert_eq!(counts, sim.element_count);
    }
}

#[test]
fn save_round_trip_preserves_the_hash() {
    let mut a = seeded_sim();
    a.create_walls(200, 200, 8, 8, WL_WALL);
    a.add_sign(120, 40, Justification::Left, "temp {t}");
    a.apply_decoration(75, 80, (0, 255, 0, 200), ember_engine::DecoMode::Draw);
    for _ in 0..30 {
        a.tick();
    }

    // Loading renumbers pool slots into scan order, so compare against a
    // canonicalized state: one load, then a second full round trip.
    let codec = Codec::default();
    let mut canonical = Simulation::new(SimulationConfig::default()).unwrap();
    codec.load(&mut canonical, &codec.encode(&a).unwrap()).unwrap();

    let before = Snapshot::from_sim(&canonical);
    let bytes = codec.encode(&canonical).unwrap();
    let mut b = Simulation::new(SimulationConfig::default()).unwrap();
    codec.load(&mut b, &bytes).unwrap();
    let after = Snapshot::from_sim(&b);

    assert_eq!(before.block_map, after.block_map);
    assert_eq!(before.air_pressure, after.air_pressure);
    assert_eq!(before.signs, after.signs);
    assert_eq!(before.particles, after.particles);
    assert_eq!(before.hash(), after.hash());

    // And the load itself preserved the persisted surface of `a`.
    assert_eq!(Snapshot::from_sim(&a).block_map, before.block_map);
    assert_eq!(a.num_parts, canonical.num_parts);
}

#[test]
fn delta_round_trip_between_adjacent_ticks() {
    let mut sim = seeded_sim();
    for _ in 0..5 {
        sim.tick();
    }
    let a = Snapshot::from_sim(&sim);
    sim.tick();
    let b = Snapshot::from_sim(&sim);

    let d = SnapshotDelta::diff(&a, &b);
    assert_eq!(d.forward(&a).hash(), b.hash());
    assert_eq!(d.restore(&b).hash(), a.hash());
}

#[test]
fn history_of_k_pushes_unwinds_to_the_first() {
    let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
    let mut history = History::new(16);
    const K: usize = 6;

    let mut hashes = Vec::new();
    for n in 0..K {
        sim.create_part(-2, 10 + n as i32 * 5, 50, PT_GLAS);
        history.push(&sim);
        hashes.push(Snapshot::from_sim(&sim).hash());
    }

    // K undos end on the first pushed state.
    for _ in 0..K {
        history.undo(&mut sim).unwrap();
    }
    assert!(history.undo(&mut sim).is_err());
    assert_eq!(Snapshot::from_sim(&sim).hash(), hashes[0]);

    // Redoing all the way forward restores the last pushed state.
    while history.redo(&mut sim).is_ok() {}
    assert_eq!(Snapshot::from_sim(&sim).hash(), hashes[K - 1]);
}

#[test]
fn push_below_the_cursor_discards_the_tail() {
    let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
    let mut history = History::new(16);
    const K: usize = 5;
    for n in 0..K {
        sim.create_part(-2, 10 + n as i32 * 5, 50, PT_DUST);
        history.push(&sim);
    }
    // Undo three entries (position K-3+... cursor at K-3), then push:
    // everything above the cursor is dropped.
    history.undo(&mut sim).unwrap();
    history.undo(&mut sim).unwrap();
    history.undo(&mut sim).unwrap();
    let position = history.position();
    sim.create_part(-2, 100, 50, PT_WATR);
    history.push(&sim);
    assert_eq!(history.len(), position + 1);
    assert_eq!(history.position(), position + 1);
}
