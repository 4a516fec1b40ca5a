// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![allow(dead_code, reason = "shared between test binaries")]

use std::collections::HashMap;
use std::sync::Arc;
use stowage::{ComponentId, DeviceId, StorageSystem, Transfer};

pub fn device(raw: u64) -> DeviceId {
    DeviceId::new(raw)
}

pub fn component(raw: u64) -> ComponentId {
    ComponentId::new(raw)
}

pub fn system(capacities: &[(u64, usize)], placement: &[(u64, u64)]) -> Arc<StorageSystem> {
    let capacities: HashMap<_, _> = capacities
        .iter()
        .map(|&(id, capacity)| (device(id), capacity))
        .collect();
    let placement: HashMap<_, _> = placement
        .iter()
        .map(|&(c, d)| (component(c), device(d)))
        .collect();
    Arc::new(StorageSystem::new(capacities, placement).unwrap())
}

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Hook = Box<dyn Fn() + Send>;

/// A scriptable transfer: ids plus optional callback hooks, so tests can
/// observe and gate the two phases.
pub struct Step {
    component: ComponentId,
    source: Option<DeviceId>,
    destination: Option<DeviceId>,
    on_prepare: Option<Hook>,
    on_perform: Option<Hook>,
}

impl Step {
    pub fn add(component_id: u64, destination: u64) -> Step {
        Step {
            component: component(component_id),
            source: None,
            destination: Some(device(destination)),
            on_prepare: None,
            on_perform: None,
        }
    }

    pub fn mv(component_id: u64, source: u64, destination: u64) -> Step {
        Step {
            component: component(component_id),
            source: Some(device(source)),
            destination: Some(device(destination)),
            on_prepare: None,
            on_perform: None,
        }
    }

    pub fn remove(component_id: u64, source: u64) -> Step {
        Step {
            component: component(component_id),
            source: Some(device(source)),
            destination: None,
            on_prepare: None,
            on_perform: None,
        }
    }

    /// A transfer with no devices at all, for exercising validation.
    pub fn aimless(component_id: u64) -> Step {
        Step {
            component: component(component_id),
            source: None,
            destination: None,
            on_prepare: None,
            on_perform: None,
        }
    }

    pub fn on_prepare(mut self, hook: impl Fn() + Send + 'static) -> Step {
        self.on_prepare = Some(Box::new(hook));
        self
    }

    pub fn on_perform(mut self, hook: impl Fn() + Send + 'static) -> Step {
        self.on_perform = Some(Box::new(hook));
        self
    }
}

impl Transfer for Step {
    fn component_id(&self) -> ComponentId {
        self.component
    }

    fn source_device_id(&self) -> Option<DeviceId> {
        self.source
    }

    fn destination_device_id(&self) -> Option<DeviceId> {
        self.destination
    }

    fn prepare(&self) {
        if let Some(hook) = &self.on_prepare {
            hook();
        }
    }

    fn perform(&self) {
        if let Some(hook) = &self.on_perform {
            hook();
        }
    }
}
