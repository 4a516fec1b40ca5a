// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::coordinator::Coordinator;
use crate::error::{ConfigError, TransferError};
use crate::registry::Registry;
use crate::transfer::{ComponentId, DeviceId, Transfer, TransferKind};
use static_assertions::assert_impl_all;
use std::collections::HashMap;

/// A set of bounded-capacity devices and the components placed on them,
/// accepting concurrent transfers from any number of threads.
///
/// Each [`execute`] call runs the submitted transfer to completion on the
/// calling thread: it blocks until the transfer is admitted, drives the
/// user's `prepare` and `perform` callbacks in order, and returns once both
/// have finished. Admission guarantees that device capacities are never
/// exceeded, that a transfer inheriting a departing component's slot does not
/// `perform` before that component's `prepare` has returned, and that moves
/// whose destinations form a closed ring with no free slot anywhere are
/// admitted together instead of deadlocking.
///
/// [`execute`]: StorageSystem::execute
pub struct StorageSystem {
    coordinator: Coordinator,
}

assert_impl_all!(StorageSystem: Send, Sync);

// === impl StorageSystem ===

impl StorageSystem {
    /// Creates a system from device capacities and an initial placement of
    /// components.
    ///
    /// Both maps must be non-empty, capacities must be positive, and the
    /// placement must reference only declared devices and respect their
    /// capacities.
    pub fn new(
        capacities: HashMap<DeviceId, usize>,
        placement: HashMap<ComponentId, DeviceId>,
    ) -> Result<StorageSystem, ConfigError> {
        let registry = Registry::new(capacities, placement)?;
        Ok(StorageSystem {
            coordinator: Coordinator::new(registry),
        })
    }

    /// Carries out one transfer, blocking the calling thread until it is
    /// done.
    ///
    /// Rejected transfers return a [`TransferError`] before either callback
    /// has run and without any effect on the system. Admitted transfers may
    /// block for arbitrarily long — until a slot on the destination opens up,
    /// and again until the slot's previous occupant has left — but hold no
    /// lock while the user callbacks run.
    pub fn execute<T>(&self, transfer: &T) -> Result<(), TransferError>
    where
        T: Transfer + ?Sized,
    {
        let component = transfer.component_id();
        let kind = self.coordinator.admit(
            component,
            transfer.source_device_id(),
            transfer.destination_device_id(),
        )?;

        transfer.prepare();
        match kind {
            TransferKind::Add => {
                self.coordinator.await_vacancy(component);
                transfer.perform();
            }
            TransferKind::Move => {
                self.coordinator.vacate(component);
                self.coordinator.await_vacancy(component);
                transfer.perform();
            }
            TransferKind::Remove => {
                self.coordinator.vacate(component);
                transfer.perform();
            }
        }
        self.coordinator.complete(component, kind);

        Ok(())
    }
}
