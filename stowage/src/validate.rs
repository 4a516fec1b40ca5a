// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::TransferError;
use crate::registry::Registry;
use crate::transfer::{ComponentId, DeviceId, TransferKind};

/// Classifies a submitted transfer as an addition, move, or removal, or
/// rejects it.
///
/// Runs inside the coordinator's critical section, before any bookkeeping is
/// touched; a rejection therefore has no side effects. The checks are
/// ordered: transfer shape, device existence, component existence and
/// residence, redundancy, and finally whether the component is already part
/// of a transfer in flight.
pub(crate) fn classify(
    registry: &Registry,
    component: ComponentId,
    source: Option<DeviceId>,
    destination: Option<DeviceId>,
) -> Result<TransferKind, TransferError> {
    let kind = match (source, destination) {
        (None, None) => return Err(TransferError::IllegalTransferType { component }),
        (None, Some(_)) => TransferKind::Add,
        (Some(_), None) => TransferKind::Remove,
        (Some(_), Some(_)) => TransferKind::Move,
    };

    for device in [source, destination].into_iter().flatten() {
        if !registry.has_device(device) {
            return Err(TransferError::DeviceDoesNotExist { device });
        }
    }

    let state = registry.try_component(component);
    match source {
        None => {
            if let Some(state) = state {
                return Err(TransferError::ComponentAlreadyExists {
                    component,
                    device: state.current,
                });
            }
        }
        Some(source) => match state {
            None => {
                return Err(TransferError::ComponentDoesNotExist {
                    component,
                    device: source,
                });
            }
            Some(state) if state.current != Some(source) => {
                return Err(TransferError::ComponentDoesNotExist {
                    component,
                    device: source,
                });
            }
            Some(_) => {}
        },
    }

    if let (Some(state), Some(destination)) = (state, destination) {
        if state.current == Some(destination) {
            return Err(TransferError::ComponentDoesNotNeedTransfer {
                component,
                device: destination,
            });
        }
    }

    if state.is_some_and(|state| state.in_flight) {
        return Err(TransferError::ComponentIsBeingOperatedOn { component });
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn device(raw: u64) -> DeviceId {
        DeviceId::new(raw)
    }

    fn component(raw: u64) -> ComponentId {
        ComponentId::new(raw)
    }

    /// Two devices, `c1` on `d1`, `c2` on `d2`.
    fn registry() -> Registry {
        Registry::new(
            HashMap::from([(device(1), 2), (device(2), 1)]),
            HashMap::from([(component(1), device(1)), (component(2), device(2))]),
        )
        .unwrap()
    }

    #[test]
    fn classifies_the_three_shapes() {
        let registry = registry();
        assert_eq!(
            classify(&registry, component(3), None, Some(device(1))),
            Ok(TransferKind::Add)
        );
        assert_eq!(
            classify(&registry, component(1), Some(device(1)), Some(device(2))),
            Ok(TransferKind::Move)
        );
        assert_eq!(
            classify(&registry, component(1), Some(device(1)), None),
            Ok(TransferKind::Remove)
        );
    }

    #[test]
    fn rejects_transfer_without_any_device() {
        let registry = registry();
        assert_eq!(
            classify(&registry, component(1), None, None),
            Err(TransferError::IllegalTransferType {
                component: component(1)
            })
        );
    }

    #[test]
    fn rejects_unknown_devices() {
        let registry = registry();
        assert_eq!(
            classify(&registry, component(1), Some(device(9)), Some(device(2))),
            Err(TransferError::DeviceDoesNotExist { device: device(9) })
        );
        assert_eq!(
            classify(&registry, component(1), Some(device(1)), Some(device(9))),
            Err(TransferError::DeviceDoesNotExist { device: device(9) })
        );
    }

    #[test]
    fn rejects_adding_an_existing_component() {
        let registry = registry();
        assert_eq!(
            classify(&registry, component(1), None, Some(device(2))),
            Err(TransferError::ComponentAlreadyExists {
                component: component(1),
                device: Some(device(1)),
            })
        );
    }

    #[test]
    fn rejects_absent_or_misplaced_component() {
        let registry = registry();
        assert_eq!(
            classify(&registry, component(9), Some(device(1)), None),
            Err(TransferError::ComponentDoesNotExist {
                component: component(9),
                device: device(1),
            })
        );
        // Registered, but not where the transfer claims it is.
        assert_eq!(
            classify(&registry, component(2), Some(device(1)), None),
            Err(TransferError::ComponentDoesNotExist {
                component: component(2),
                device: device(1),
            })
        );
    }

    #[test]
    fn rejects_move_to_current_residence() {
        let registry = registry();
        assert_eq!(
            classify(&registry, component(1), Some(device(1)), Some(device(1))),
            Err(TransferError::ComponentDoesNotNeedTransfer {
                component: component(1),
                device: device(1),
            })
        );
    }

    #[test]
    fn rejects_component_with_transfer_in_flight() {
        let mut registry = registry();
        registry.component_mut(component(1)).in_flight = true;
        assert_eq!(
            classify(&registry, component(1), Some(device(1)), Some(device(2))),
            Err(TransferError::ComponentIsBeingOperatedOn {
                component: component(1)
            })
        );
    }
}
