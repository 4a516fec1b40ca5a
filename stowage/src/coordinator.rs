// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Admission, slot reservation, and progress coordination.
//!
//! Every decision the system makes — whether an arriving transfer may begin,
//! which departing component's slot it inherits, and when its two callback
//! phases may run — happens inside a single critical section guarded by one
//! fair FIFO semaphore. The critical section is ended in one of two ways:
//! the lock is released outright, or it is *handed over* by depositing a
//! permit in a specific blocked thread's signal without touching the lock.
//! The woken thread resumes inside the critical section, sees exactly the
//! state its waker left behind, and is itself responsible for ending the
//! section again. Threads block in three places only — the admission signal,
//! the vacancy signal, and the user callbacks — and the lock is held across
//! none of them.

use crate::error::TransferError;
use crate::registry::{ComponentState, Registry};
use crate::transfer::{ComponentId, DeviceId, TransferKind};
use crate::validate;
use core::cell::UnsafeCell;
use sema::Semaphore;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) struct Coordinator {
    /// The one lock in the system. One permit, FIFO, and — because it is a
    /// semaphore rather than a mutex — releasable by a thread that inherited
    /// the critical section instead of acquiring it.
    lock: Semaphore,
    registry: UnsafeCell<Registry>,
}

// Safety: `registry` is only ever accessed by the thread that currently owns
// the critical section, whether it acquired `lock` or inherited it through a
// signal handoff.
unsafe impl Sync for Coordinator {}

// === impl Coordinator ===

impl Coordinator {
    pub(crate) fn new(registry: Registry) -> Coordinator {
        Coordinator {
            lock: Semaphore::new(1),
            registry: UnsafeCell::new(registry),
        }
    }

    /// Validates a submitted transfer and reserves a slot for it, blocking
    /// until one is available. Returns with the critical section ended.
    ///
    /// On return the transfer is admitted: the component is marked in
    /// flight, its departure (if any) is visible to other transfers as a
    /// claimable slot, and its arrival (if any) holds a reservation on the
    /// destination.
    pub(crate) fn admit(
        &self,
        component: ComponentId,
        source: Option<DeviceId>,
        destination: Option<DeviceId>,
    ) -> Result<TransferKind, TransferError> {
        self.lock.acquire();
        // Safety: the coordinator lock was acquired above.
        let reg = unsafe { &mut *self.registry.get() };

        let kind = match validate::classify(reg, component, source, destination) {
            Ok(kind) => kind,
            Err(error) => {
                debug!(%component, %error, "transfer rejected");
                self.lock.release();
                return Err(error);
            }
        };

        match kind {
            TransferKind::Remove => {
                let source = source.expect("a removal names a source");
                reg.component_mut(component).in_flight = true;
                Self::begin_departure(reg, component, source);
                let next = Self::next_waiter(reg, source);
                self.unlock_or_handoff(next);
            }
            TransferKind::Add | TransferKind::Move => {
                let destination = destination.expect("an addition or move names a destination");
                if kind == TransferKind::Add {
                    reg.insert_component(component, ComponentState::incoming(destination));
                } else {
                    let state = reg.component_mut(component);
                    state.in_flight = true;
                    state.destination = Some(destination);
                }

                if Self::try_reserve(reg, component, destination) {
                    let next = Self::departure_wake(reg, component, source, kind);
                    self.unlock_or_handoff(next);
                } else if let Some(chain) = Self::find_cycle(reg, component, kind) {
                    let first = Self::admit_cycle(reg, &chain);
                    // Hand the critical section to the first queued member;
                    // it travels down the chain, and the last member ends it.
                    first.release();
                } else {
                    reg.device_mut(destination).waiting.push_back(component);
                    let signal = Arc::clone(&reg.component(component).admission);
                    trace!(%component, device = %destination, "no slot available, queueing");
                    self.lock.release();
                    signal.acquire();
                    self.admitted_from_queue(component, source, destination, kind);
                }
            }
        }

        Ok(kind)
    }

    /// Continuation of [`admit`] after a queued component is woken. The waker
    /// did not release the coordinator lock, so this thread owns the critical
    /// section from the moment it returns from the signal wait.
    ///
    /// [`admit`]: Coordinator::admit
    fn admitted_from_queue(
        &self,
        component: ComponentId,
        source: Option<DeviceId>,
        destination: DeviceId,
        kind: TransferKind,
    ) {
        // Safety: the critical section was inherited through the admission
        // signal.
        let reg = unsafe { &mut *self.registry.get() };

        let queue = &mut reg.device_mut(destination).waiting;
        let position = queue
            .iter()
            .position(|&queued| queued == component)
            .expect("woken component is queued on its destination");
        queue.remove(position);

        if let Some(mut chain) = reg.component_mut(component).cycle.take() {
            // Admitted as part of a cycle: all bookkeeping was done by the
            // admitting thread, this component only passes the wake along.
            let popped = chain.pop_front();
            debug_assert_eq!(popped, Some(component), "wake chain starts with the woken component");
            match chain.front().copied() {
                Some(next) => {
                    let signal = Arc::clone(&reg.component(next).admission);
                    reg.component_mut(next).cycle = Some(chain);
                    signal.release();
                }
                None => self.lock.release(),
            }
        } else {
            let reserved = Self::try_reserve(reg, component, destination);
            assert!(reserved, "woken component was guaranteed a slot by its waker");
            let next = Self::departure_wake(reg, component, source, kind);
            self.unlock_or_handoff(next);
        }
    }

    /// Settles the source side of a move or removal once `prepare` has
    /// returned: the component no longer occupies its old device.
    ///
    /// If an incoming component has claimed this slot and is already blocked
    /// waiting for it, the critical section is handed over so its `perform`
    /// phase starts with the bookkeeping it was promised.
    pub(crate) fn vacate(&self, component: ComponentId) {
        self.lock.acquire();
        // Safety: the coordinator lock was acquired above.
        let reg = unsafe { &mut *self.registry.get() };

        let source = reg
            .component(component)
            .current
            .expect("a vacating component has a residence");
        let device = reg.device_mut(source);
        device.present.remove(&component); // already absent if the slot was claimed
        let position = device
            .leaving
            .iter()
            .position(|&leaver| leaver == component)
            .expect("a vacating component is leaving its source");
        device.leaving.remove(position);
        trace!(%component, device = %source, "slot vacated");

        let handoff = match reg.component_mut(component).successor.take() {
            Some(successor) => {
                let state = reg.component_mut(successor);
                state.predecessor = None;
                if state.waiting_for_predecessor {
                    Some(Arc::clone(&state.vacancy))
                } else {
                    // The claimant has not reached its perform gate yet; it
                    // will see the broken link there and sail through.
                    None
                }
            }
            None => None,
        };
        self.unlock_or_handoff(handoff);
    }

    /// Blocks until the component whose slot this one inherits has finished
    /// its `prepare`, if it has not already.
    pub(crate) fn await_vacancy(&self, component: ComponentId) {
        self.lock.acquire();
        // Safety: the coordinator lock was acquired above.
        let reg = unsafe { &mut *self.registry.get() };

        if reg.component(component).predecessor.is_some() {
            let state = reg.component_mut(component);
            state.waiting_for_predecessor = true;
            let signal = Arc::clone(&state.vacancy);
            trace!(%component, "waiting for predecessor to vacate");
            self.lock.release();
            signal.acquire();

            // Safety: the critical section was inherited through the vacancy
            // signal.
            let reg = unsafe { &mut *self.registry.get() };
            let state = reg.component_mut(component);
            debug_assert!(state.predecessor.is_none(), "woken once the slot is vacated");
            state.waiting_for_predecessor = false;
        }
        self.lock.release();
    }

    /// Commits a finished transfer: the component now resides on its
    /// destination (or, for a removal, nowhere — its record is dropped).
    pub(crate) fn complete(&self, component: ComponentId, kind: TransferKind) {
        self.lock.acquire();
        // Safety: the coordinator lock was acquired above.
        let reg = unsafe { &mut *self.registry.get() };

        if kind == TransferKind::Remove {
            reg.remove_component(component);
        } else {
            let state = reg.component_mut(component);
            state.current = state.destination.take();
            state.in_flight = false;
            debug_assert!(state.predecessor.is_none());
            debug_assert!(state.successor.is_none());
            debug_assert!(state.cycle.is_none());
        }
        trace!(%component, "transfer complete");
        self.lock.release();
    }

    /// Ends the critical section: hands it to a waiter if there is one to
    /// admit, otherwise releases the lock.
    fn unlock_or_handoff(&self, next: Option<Arc<Semaphore>>) {
        match next {
            Some(signal) => signal.release(),
            None => self.lock.release(),
        }
    }

    /// Books the component as leaving `source`. Its slot stays occupied in
    /// `present` until an arrival claims it or the departure finishes, but
    /// no longer counts as committed.
    fn begin_departure(reg: &mut Registry, component: ComponentId, source: DeviceId) {
        let device = reg.device_mut(source);
        debug_assert!(device.present.contains(&component), "departing component is present");
        debug_assert!(!device.leaving.contains(&component), "departure admitted once");
        debug_assert!(device.reserved > 0);
        device.leaving.push_back(component);
        device.reserved -= 1;
        trace!(%component, device = %source, "departure admitted");
    }

    /// Source-side bookkeeping of an admitted move; returns the admission
    /// signal of a waiter the newly claimable slot should be offered to.
    fn departure_wake(
        reg: &mut Registry,
        component: ComponentId,
        source: Option<DeviceId>,
        kind: TransferKind,
    ) -> Option<Arc<Semaphore>> {
        if kind != TransferKind::Move {
            return None;
        }
        let source = source.expect("a move names a source");
        Self::begin_departure(reg, component, source);
        Self::next_waiter(reg, source)
    }

    /// Admission signal of the component at the head of `device`'s waiting
    /// queue, if any.
    fn next_waiter(reg: &Registry, device: DeviceId) -> Option<Arc<Semaphore>> {
        reg.device(device)
            .waiting
            .front()
            .map(|&waiter| Arc::clone(&reg.component(waiter).admission))
    }

    /// Tries to book a slot on `device` for an arriving component: either a
    /// genuinely free slot, or the slot of the oldest leaving component
    /// nobody has claimed yet. In the latter case the pair is linked and the
    /// leaver gives up its `present` entry to the claimant, so occupancy
    /// never exceeds capacity on paper or on disk.
    fn try_reserve(reg: &mut Registry, component: ComponentId, device: DeviceId) -> bool {
        let (capacity, occupied, reserved) = {
            let state = reg.device(device);
            (state.capacity, state.present.len(), state.reserved)
        };

        if occupied < capacity {
            let state = reg.device_mut(device);
            state.present.insert(component);
            state.reserved += 1;
            trace!(%component, %device, "took a free slot");
            return true;
        }

        if reserved < capacity {
            let leaver = reg
                .device(device)
                .leaving
                .iter()
                .copied()
                .find(|&leaver| reg.component(leaver).successor.is_none())
                .expect("a device with spare reservations has an unclaimed leaving component");
            reg.component_mut(leaver).successor = Some(component);
            reg.component_mut(component).predecessor = Some(leaver);
            let state = reg.device_mut(device);
            let vacating = state.present.remove(&leaver);
            debug_assert!(vacating, "an unclaimed leaving component is still present");
            state.present.insert(component);
            state.reserved += 1;
            debug_assert!(state.present.len() <= state.capacity);
            trace!(%component, predecessor = %leaver, %device, "claimed a vacating slot");
            return true;
        }

        false
    }

    /// Searches the wait-for graph for a chain of queued moves that, together
    /// with the arriving move, forms a closed ring of slot trades.
    ///
    /// Devices are the vertices; each queued move contributes an edge from
    /// the device it would vacate to the device it waits on. The search walks
    /// from the arriving component's residence, trying each device's waiters
    /// in queue order (so the choice among competing cycles is deterministic)
    /// and visiting every device at most once. The ring closes on a waiter
    /// that resides on the arriving component's destination.
    fn find_cycle(
        reg: &Registry,
        component: ComponentId,
        kind: TransferKind,
    ) -> Option<Vec<ComponentId>> {
        if kind != TransferKind::Move {
            return None;
        }
        let state = reg.component(component);
        let start = state.current.expect("a move has a residence");
        let target = state.destination.expect("a move has a destination");

        let mut visited = HashSet::from([start]);
        let mut chain = vec![component];
        if Self::extend_chain(reg, start, target, &mut visited, &mut chain) {
            debug!(?chain, "admitting move cycle");
            Some(chain)
        } else {
            None
        }
    }

    fn extend_chain(
        reg: &Registry,
        device: DeviceId,
        target: DeviceId,
        visited: &mut HashSet<DeviceId>,
        chain: &mut Vec<ComponentId>,
    ) -> bool {
        for &waiter in &reg.device(device).waiting {
            // Additions occupy no slot anywhere, so they trade nothing.
            let Some(residence) = reg.component(waiter).current else {
                continue;
            };
            if residence == target {
                chain.push(waiter);
                return true;
            }
            if visited.insert(residence) {
                chain.push(waiter);
                if Self::extend_chain(reg, residence, target, visited, chain) {
                    return true;
                }
                chain.pop();
            }
        }
        false
    }

    /// Admits every member of a closed ring at once: each becomes a leaver on
    /// its own device and each takes over the slot vacated by the member
    /// ahead of it in the ring, all within the current critical section.
    /// Returns the admission signal of the first queued member, which starts
    /// the wake chain.
    fn admit_cycle(reg: &mut Registry, chain: &[ComponentId]) -> Arc<Semaphore> {
        for &member in chain {
            let source = reg
                .component(member)
                .current
                .expect("cycle members are moves");
            Self::begin_departure(reg, member, source);
        }

        for (index, &member) in chain.iter().enumerate() {
            let ahead = chain[(index + chain.len() - 1) % chain.len()];
            reg.component_mut(member).predecessor = Some(ahead);
            reg.component_mut(ahead).successor = Some(member);

            let destination = reg
                .component(member)
                .destination
                .expect("cycle members are moves");
            debug_assert_eq!(reg.component(ahead).current, Some(destination));
            let device = reg.device_mut(destination);
            let vacating = device.present.remove(&ahead);
            debug_assert!(vacating);
            device.present.insert(member);
            device.reserved += 1;
        }

        let first = chain[1];
        reg.component_mut(first).cycle = Some(chain[1..].iter().copied().collect());
        Arc::clone(&reg.component(first).admission)
    }
}
