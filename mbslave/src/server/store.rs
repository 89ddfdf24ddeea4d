use std::collections::BTreeMap;

use crate::constants::limits::TABLE_SIZE;
use crate::types::UnitId;

/// The four tables of a single device
///
/// Every table holds [`TABLE_SIZE`] values so any 16-bit address is valid.
/// Tables are allocated once and never resized.
pub struct DeviceMemory {
    discrete_inputs: Box<[bool]>,
    coils: Box<[bool]>,
    holding_registers: Box<[u16]>,
    input_registers: Box<[u16]>,
}

impl DeviceMemory {
    fn new() -> Self {
        Self {
            discrete_inputs: vec![false; TABLE_SIZE].into_boxed_slice(),
            coils: vec![false; TABLE_SIZE].into_boxed_slice(),
            holding_registers: vec![0; TABLE_SIZE].into_boxed_slice(),
            input_registers: vec![0; TABLE_SIZE].into_boxed_slice(),
        }
    }

    /// Discrete inputs, read-only from the protocol's perspective
    pub fn discrete_inputs(&self) -> &[bool] {
        &self.discrete_inputs
    }

    /// Mutable access to the discrete inputs
    pub fn discrete_inputs_mut(&mut self) -> &mut [bool] {
        &mut self.discrete_inputs
    }

    /// Coils
    pub fn coils(&self) -> &[bool] {
        &self.coils
    }

    /// Mutable access to the coils
    pub fn coils_mut(&mut self) -> &mut [bool] {
        &mut self.coils
    }

    /// Holding registers
    pub fn holding_registers(&self) -> &[u16] {
        &self.holding_registers
    }

    /// Mutable access to the holding registers
    pub fn holding_registers_mut(&mut self) -> &mut [u16] {
        &mut self.holding_registers
    }

    /// Input registers, read-only from the protocol's perspective
    pub fn input_registers(&self) -> &[u16] {
        &self.input_registers
    }

    /// Mutable access to the input registers
    pub fn input_registers_mut(&mut self) -> &mut [u16] {
        &mut self.input_registers
    }
}

impl std::fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // tables are too large to print
        f.debug_struct("DeviceMemory").finish_non_exhaustive()
    }
}

/// Per-device storage for every configured unit id
///
/// Only handlers and store transactions running on the dispatch task ever see
/// a `&mut RegisterStore`, so there is at most one writer at any time.
#[derive(Debug)]
pub struct RegisterStore {
    devices: BTreeMap<UnitId, DeviceMemory>,
}

impl RegisterStore {
    /// Allocate full tables for each unit id, duplicates are ignored
    pub fn new(unit_ids: &[UnitId]) -> Self {
        let mut devices = BTreeMap::new();
        for id in unit_ids {
            devices.entry(*id).or_insert_with(DeviceMemory::new);
        }
        Self { devices }
    }

    /// Memory of a device, `None` if the unit id was never configured
    pub fn get(&self, unit_id: UnitId) -> Option<&DeviceMemory> {
        self.devices.get(&unit_id)
    }

    /// Mutable memory of a device, `None` if the unit id was never configured
    pub fn get_mut(&mut self, unit_id: UnitId) -> Option<&mut DeviceMemory> {
        self.devices.get_mut(&unit_id)
    }

    /// Returns true if the unit id was configured
    pub fn contains(&self, unit_id: UnitId) -> bool {
        self.devices.contains_key(&unit_id)
    }

    /// Configured unit ids in ascending order
    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.devices.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_full_tables_for_each_unit() {
        let store = RegisterStore::new(&[UnitId::new(1), UnitId::new(7)]);
        let device = store.get(UnitId::new(7)).unwrap();
        assert_eq!(device.coils().len(), TABLE_SIZE);
        assert_eq!(device.discrete_inputs().len(), TABLE_SIZE);
        assert_eq!(device.holding_registers().len(), TABLE_SIZE);
        assert_eq!(device.input_registers().len(), TABLE_SIZE);
        assert!(store.get(UnitId::new(2)).is_none());
    }

    #[test]
    fn duplicate_unit_ids_share_one_device() {
        let store = RegisterStore::new(&[UnitId::new(3), UnitId::new(3)]);
        assert_eq!(store.unit_ids().collect::<Vec<_>>(), vec![UnitId::new(3)]);
    }

    #[test]
    fn devices_are_independent() {
        let mut store = RegisterStore::new(&[UnitId::new(1), UnitId::new(2)]);
        store.get_mut(UnitId::new(1)).unwrap().holding_registers_mut()[0xFFFF] = 0xCAFE;
        assert_eq!(store.get(UnitId::new(1)).unwrap().holding_registers()[0xFFFF], 0xCAFE);
        assert_eq!(store.get(UnitId::new(2)).unwrap().holding_registers()[0xFFFF], 0);
    }
}
