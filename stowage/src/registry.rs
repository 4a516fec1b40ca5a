// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Device and component tables.
//!
//! The registry is the single point of identity resolution: every lookup
//! elsewhere in the crate goes through it. It is not synchronized on its own;
//! all mutation happens inside the coordinator's critical section.

use crate::error::ConfigError;
use crate::transfer::{ComponentId, DeviceId};
use sema::Semaphore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

pub(crate) struct Registry {
    devices: HashMap<DeviceId, DeviceState>,
    components: HashMap<ComponentId, ComponentState>,
}

/// Per-device slot bookkeeping.
///
/// A component counts against `present` from the moment its arrival is
/// admitted until the moment its slot is taken over or it has finished
/// leaving, so `present.len() <= capacity` bounds physical occupancy at all
/// times. `reserved` counts the slots that are spoken for: it drops when a
/// departure is admitted and rises when an arrival takes a slot, so
/// `capacity - reserved` is the number of departures nobody has claimed yet.
#[derive(Debug)]
pub(crate) struct DeviceState {
    pub(crate) capacity: usize,
    pub(crate) reserved: usize,
    pub(crate) present: HashSet<ComponentId>,
    /// Components whose departure has been admitted but whose `prepare` has
    /// not finished, in admission order.
    pub(crate) leaving: VecDeque<ComponentId>,
    /// Components blocked until a slot on this device opens up, in arrival
    /// order. The head is always the next to be admitted.
    pub(crate) waiting: VecDeque<ComponentId>,
}

/// Per-component transfer state. Mutated only inside the coordinator's
/// critical section.
pub(crate) struct ComponentState {
    pub(crate) current: Option<DeviceId>,
    pub(crate) destination: Option<DeviceId>,
    /// Set from admission until completion of a transfer.
    pub(crate) in_flight: bool,
    /// The incoming component that takes over this component's slot once it
    /// has left. Inverse of `predecessor`.
    pub(crate) successor: Option<ComponentId>,
    /// The outgoing component whose slot this component takes over. Live
    /// until that component's `prepare` has finished.
    pub(crate) predecessor: Option<ComponentId>,
    /// Whether this component is currently blocked on `vacancy`.
    pub(crate) waiting_for_predecessor: bool,
    /// Remaining wake chain of a move cycle this component was admitted as
    /// part of, starting with this component itself.
    pub(crate) cycle: Option<VecDeque<ComponentId>>,
    /// Released (with the critical section handed over) to admit this
    /// component out of a device's waiting queue.
    pub(crate) admission: Arc<Semaphore>,
    /// Released (with the critical section handed over) once the slot this
    /// component inherits has been vacated.
    pub(crate) vacancy: Arc<Semaphore>,
}

// === impl Registry ===

impl Registry {
    /// Builds the tables from the declared capacities and the initial
    /// placement, rejecting configurations the coordinator could not keep
    /// consistent.
    pub(crate) fn new(
        capacities: HashMap<DeviceId, usize>,
        placement: HashMap<ComponentId, DeviceId>,
    ) -> Result<Registry, ConfigError> {
        if capacities.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if placement.is_empty() {
            return Err(ConfigError::NoComponents);
        }

        let mut devices = HashMap::with_capacity(capacities.len());
        for (device, capacity) in capacities {
            if capacity == 0 {
                return Err(ConfigError::ZeroCapacity { device });
            }
            devices.insert(device, DeviceState::empty(capacity));
        }

        let mut components = HashMap::with_capacity(placement.len());
        for (component, device) in placement {
            let Some(state) = devices.get_mut(&device) else {
                return Err(ConfigError::UnknownDevice { component, device });
            };
            if state.present.len() == state.capacity {
                return Err(ConfigError::Overfilled {
                    device,
                    capacity: state.capacity,
                });
            }
            state.present.insert(component);
            state.reserved += 1;
            components.insert(component, ComponentState::resident(device));
        }

        Ok(Registry {
            devices,
            components,
        })
    }

    pub(crate) fn has_device(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub(crate) fn device(&self, id: DeviceId) -> &DeviceState {
        self.devices
            .get(&id)
            .expect("device id was resolved during validation")
    }

    pub(crate) fn device_mut(&mut self, id: DeviceId) -> &mut DeviceState {
        self.devices
            .get_mut(&id)
            .expect("device id was resolved during validation")
    }

    pub(crate) fn try_component(&self, id: ComponentId) -> Option<&ComponentState> {
        self.components.get(&id)
    }

    pub(crate) fn component(&self, id: ComponentId) -> &ComponentState {
        self.components
            .get(&id)
            .expect("component id was resolved during validation")
    }

    pub(crate) fn component_mut(&mut self, id: ComponentId) -> &mut ComponentState {
        self.components
            .get_mut(&id)
            .expect("component id was resolved during validation")
    }

    pub(crate) fn insert_component(&mut self, id: ComponentId, state: ComponentState) {
        let previous = self.components.insert(id, state);
        debug_assert!(previous.is_none(), "component {id} inserted twice");
    }

    pub(crate) fn remove_component(&mut self, id: ComponentId) {
        self.components
            .remove(&id)
            .expect("removed component was registered");
    }
}

// === impl DeviceState ===

impl DeviceState {
    fn empty(capacity: usize) -> DeviceState {
        DeviceState {
            capacity,
            reserved: 0,
            present: HashSet::new(),
            leaving: VecDeque::new(),
            waiting: VecDeque::new(),
        }
    }
}

// === impl ComponentState ===

impl ComponentState {
    /// State of a component that sits idle on `device`.
    fn resident(device: DeviceId) -> ComponentState {
        ComponentState {
            current: Some(device),
            destination: None,
            in_flight: false,
            successor: None,
            predecessor: None,
            waiting_for_predecessor: false,
            cycle: None,
            admission: Arc::new(Semaphore::new(0)),
            vacancy: Arc::new(Semaphore::new(0)),
        }
    }

    /// State of a component whose addition has just been admitted: no
    /// residence yet, transfer in flight.
    pub(crate) fn incoming(destination: DeviceId) -> ComponentState {
        ComponentState {
            current: None,
            destination: Some(destination),
            in_flight: true,
            successor: None,
            predecessor: None,
            waiting_for_predecessor: false,
            cycle: None,
            admission: Arc::new(Semaphore::new(0)),
            vacancy: Arc::new(Semaphore::new(0)),
        }
    }
}
