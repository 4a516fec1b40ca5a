// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

mod common;

use common::{Step, system};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Four single-slot devices in a ring, every slot occupied, every component
/// rotating clockwise for many laps. No move can ever be admitted alone, so
/// every step of progress is a full cycle admission. Checks that physical
/// occupancy never exceeds capacity and that everything ends up back where it
/// started.
#[test]
fn fully_packed_ring_keeps_rotating() {
    const DEVICES: u64 = 4;
    const LAPS: u64 = 24;

    let system = system(
        &[(0, 1), (1, 1), (2, 1), (3, 1)],
        &[(0, 0), (1, 1), (2, 2), (3, 3)],
    );
    let occupancy: Arc<Vec<AtomicUsize>> =
        Arc::new((0..DEVICES).map(|_| AtomicUsize::new(1)).collect());

    let handles: Vec<_> = (0..DEVICES)
        .map(|id| {
            let system = Arc::clone(&system);
            let occupancy = Arc::clone(&occupancy);
            thread::spawn(move || {
                for lap in 0..LAPS {
                    let from = (id + lap) % DEVICES;
                    let to = (id + lap + 1) % DEVICES;
                    let step = Step::mv(id, from, to)
                        .on_prepare({
                            let occupancy = Arc::clone(&occupancy);
                            move || {
                                occupancy[usize::try_from(from).unwrap()]
                                    .fetch_sub(1, Ordering::SeqCst);
                            }
                        })
                        .on_perform({
                            let occupancy = Arc::clone(&occupancy);
                            move || {
                                let before = occupancy[usize::try_from(to).unwrap()]
                                    .fetch_add(1, Ordering::SeqCst);
                                assert!(before < 1, "single-slot device held two components");
                            }
                        });
                    system.execute(&step).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // LAPS is a multiple of the ring length, so every component is back on
    // its starting device.
    for id in 0..DEVICES {
        assert_eq!(system.execute(&Step::remove(id, id)), Ok(()));
    }
}

/// Many threads churning additions and removals of their own component
/// through a small set of devices. Removals never block, so every occupant is
/// eventually taken out again and every blocked addition is eventually
/// admitted; per-device occupancy counters check the capacity bound under
/// contention.
#[test]
fn addition_removal_churn_respects_capacities() {
    const DEVICES: u64 = 3;
    const CAPACITY: usize = 2;
    const THREADS: u64 = 8;
    const ITERATIONS: u32 = 25;

    // A lone resident keeps the placement non-empty; it never moves.
    let system = system(&[(0, CAPACITY), (1, CAPACITY), (2, CAPACITY)], &[(0, 0)]);
    let occupancy: Arc<Vec<AtomicUsize>> = Arc::new(
        (0..DEVICES)
            .map(|id| AtomicUsize::new(usize::from(id == 0)))
            .collect(),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let system = Arc::clone(&system);
            let occupancy = Arc::clone(&occupancy);
            thread::spawn(move || {
                let id = 100 + thread_id;
                let mut rng = rand::rng();
                for _ in 0..ITERATIONS {
                    let target = rng.random_range(0..DEVICES);
                    let slot = usize::try_from(target).unwrap();

                    let addition = Step::add(id, target).on_perform({
                        let occupancy = Arc::clone(&occupancy);
                        move || {
                            let before = occupancy[slot].fetch_add(1, Ordering::SeqCst);
                            assert!(before < CAPACITY, "device occupancy exceeded its capacity");
                        }
                    });
                    system.execute(&addition).unwrap();

                    let removal = Step::remove(id, target).on_prepare({
                        let occupancy = Arc::clone(&occupancy);
                        move || {
                            occupancy[slot].fetch_sub(1, Ordering::SeqCst);
                        }
                    });
                    system.execute(&removal).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(occupancy[0].load(Ordering::SeqCst), 1);
    assert_eq!(occupancy[1].load(Ordering::SeqCst), 0);
    assert_eq!(occupancy[2].load(Ordering::SeqCst), 0);
}
