//! Resource allocation - Instance ids and port pairs derived from the registry

use std::collections::HashSet;

use super::error::InstanceError;
use super::instance::{InstanceId, InstanceRecord, PortFamily};

/// Distance between consecutive candidate ports
pub const PORT_STEP: u16 = 10;

/// Upper bound on probes per family before giving up
pub const MAX_PORT_PROBES: usize = 1000;

/// Next id: one past the highest id ever kept in the registry
pub fn next_id(existing: &[InstanceRecord]) -> Result<InstanceId, InstanceError> {
    match existing.iter().map(|r| r.id).max() {
        None => Ok(InstanceId(1)),
        Some(max) => max
            .0
            .checked_add(1)
            .map(InstanceId)
            .ok_or(InstanceError::IdSpaceExhausted(max)),
    }
}

/// Find the first free `(primary, secondary)` pair probing upward from the bases.
///
/// Each family is only checked against its own family, so a primary port may
/// equal another instance's secondary port.
pub fn allocate_ports(
    existing: &[InstanceRecord],
    base_primary: u16,
    base_secondary: u16,
) -> Result<(u16, u16), InstanceError> {
    let used_primary: HashSet<u16> = existing.iter().map(|r| r.primary_port).collect();
    let used_secondary: HashSet<u16> = existing.iter().map(|r| r.secondary_port).collect();

    let primary = probe(&used_primary, base_primary, PortFamily::Primary)?;
    let secondary = probe(&used_secondary, base_secondary, PortFamily::Secondary)?;
    Ok((primary, secondary))
}

fn probe(used: &HashSet<u16>, base: u16, family: PortFamily) -> Result<u16, InstanceError> {
    let mut candidate = Some(base);
    for _ in 0..MAX_PORT_PROBES {
        match candidate {
            Some(port) if !used.contains(&port) => return Ok(port),
            Some(port) => candidate = port.checked_add(PORT_STEP),
            None => break,
        }
    }
    Err(InstanceError::PortSpaceExhausted { family, base })
}
