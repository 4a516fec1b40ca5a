// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::transfer::{ComponentId, DeviceId};
use core::fmt;

/// Why a submitted transfer was rejected.
///
/// Every variant is raised during validation, before any bookkeeping has been
/// touched and before either callback has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// The transfer names neither a source nor a destination device.
    IllegalTransferType { component: ComponentId },
    /// A named device is not registered in the system.
    DeviceDoesNotExist { device: DeviceId },
    /// An addition names a component that is already in the system. `device`
    /// is where that component resides, if it has arrived anywhere yet.
    ComponentAlreadyExists {
        component: ComponentId,
        device: Option<DeviceId>,
    },
    /// The component is absent, or does not reside on the claimed source.
    ComponentDoesNotExist {
        component: ComponentId,
        device: DeviceId,
    },
    /// The component already resides on the requested destination.
    ComponentDoesNotNeedTransfer {
        component: ComponentId,
        device: DeviceId,
    },
    /// Another transfer of the same component is still in progress.
    ComponentIsBeingOperatedOn { component: ComponentId },
}

/// Why the system could not be constructed from the given configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The device map is empty.
    NoDevices,
    /// The initial placement map is empty.
    NoComponents,
    /// A device was declared with capacity zero.
    ZeroCapacity { device: DeviceId },
    /// The initial placement references an unregistered device.
    UnknownDevice {
        component: ComponentId,
        device: DeviceId,
    },
    /// The initial placement assigns more components to a device than it can
    /// hold.
    Overfilled { device: DeviceId, capacity: usize },
}

// === impl TransferError ===

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::IllegalTransferType { component } => write!(
                f,
                "transfer of component {component} names neither a source nor a destination"
            ),
            TransferError::DeviceDoesNotExist { device } => {
                write!(f, "device {device} is not registered")
            }
            TransferError::ComponentAlreadyExists {
                component,
                device: Some(device),
            } => write!(f, "component {component} already exists on device {device}"),
            TransferError::ComponentAlreadyExists {
                component,
                device: None,
            } => write!(f, "component {component} already exists"),
            TransferError::ComponentDoesNotExist { component, device } => {
                write!(f, "component {component} does not reside on device {device}")
            }
            TransferError::ComponentDoesNotNeedTransfer { component, device } => {
                write!(f, "component {component} already resides on device {device}")
            }
            TransferError::ComponentIsBeingOperatedOn { component } => write!(
                f,
                "component {component} is part of another transfer in progress"
            ),
        }
    }
}

impl core::error::Error for TransferError {}

// === impl ConfigError ===

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoDevices => f.write_str("no devices were declared"),
            ConfigError::NoComponents => f.write_str("no initial component placement was declared"),
            ConfigError::ZeroCapacity { device } => {
                write!(f, "device {device} was declared with capacity zero")
            }
            ConfigError::UnknownDevice { component, device } => write!(
                f,
                "component {component} is placed on unregistered device {device}"
            ),
            ConfigError::Overfilled { device, capacity } => write!(
                f,
                "placement assigns more than {capacity} components to device {device}"
            ),
        }
    }
}

impl core::error::Error for ConfigError {}
