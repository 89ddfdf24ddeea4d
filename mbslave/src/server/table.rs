use std::collections::BTreeMap;

use crate::common::function::FunctionCode;
use crate::error::ConfigError;
use crate::server::handler::FunctionHandler;
use crate::server::handlers;
use crate::types::UnitId;

pub(crate) type BoxedHandler = Box<dyn FunctionHandler>;

/// function code -> handler for a single device
#[derive(Default)]
pub(crate) struct FunctionMap {
    handlers: BTreeMap<u8, BoxedHandler>,
}

impl FunctionMap {
    fn with_defaults() -> Self {
        let mut map = Self::default();
        for code in FunctionCode::ALL {
            map.insert(code.get_value(), handlers::standard(code));
        }
        map
    }

    fn insert(&mut self, function: u8, handler: BoxedHandler) {
        self.handlers.insert(function, handler);
    }

    pub(crate) fn get_mut(&mut self, function: u8) -> Option<&mut BoxedHandler> {
        self.handlers.get_mut(&function)
    }
}

/// (unit id, function code) -> handler
pub(crate) struct DispatchTable {
    units: BTreeMap<UnitId, FunctionMap>,
}

impl DispatchTable {
    /// one function map per unit id, each with the standard handlers installed
    pub(crate) fn new(unit_ids: &[UnitId]) -> Self {
        let mut units = BTreeMap::new();
        for id in unit_ids {
            units.entry(*id).or_insert_with(FunctionMap::with_defaults);
        }
        Self { units }
    }

    pub(crate) fn get_mut(&mut self, unit_id: UnitId) -> Option<&mut FunctionMap> {
        self.units.get_mut(&unit_id)
    }

    /// install or replace a binding, the last registration wins
    pub(crate) fn register(
        &mut self,
        unit_id: UnitId,
        function: u8,
        handler: BoxedHandler,
    ) -> Result<(), ConfigError> {
        match self.units.get_mut(&unit_id) {
            None => Err(ConfigError::UnknownUnitId(unit_id)),
            Some(map) => {
                map.insert(function, handler);
                Ok(())
            }
        }
    }

    pub(crate) fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ExceptionCode;
    use crate::frame::Frame;
    use crate::server::store::RegisterStore;

    fn nop(_: &mut RegisterStore, _: &dyn Frame) -> Result<Vec<u8>, ExceptionCode> {
        Ok(Vec::new())
    }

    fn is_bound(table: &mut DispatchTable, unit_id: u8, function: u8) -> bool {
        table
            .get_mut(UnitId::new(unit_id))
            .is_some_and(|map| map.get_mut(function).is_some())
    }

    #[test]
    fn installs_standard_functions_for_each_unit() {
        let mut table = DispatchTable::new(&[UnitId::new(1), UnitId::new(2)]);
        for id in [1, 2] {
            for code in [1, 2, 3, 4, 5, 6, 15, 16] {
                assert!(is_bound(&mut table, id, code));
            }
            assert!(!is_bound(&mut table, id, 0x07));
            assert!(!is_bound(&mut table, id, 0x2B));
        }
    }

    #[test]
    fn registration_for_unknown_unit_leaves_table_unchanged() {
        let mut table = DispatchTable::new(&[UnitId::new(1)]);
        assert_eq!(
            table.register(UnitId::new(2), 99, Box::new(nop)),
            Err(ConfigError::UnknownUnitId(UnitId::new(2)))
        );
        assert!(table.get_mut(UnitId::new(2)).is_none());
        assert!(!is_bound(&mut table, 1, 99));
        assert_eq!(table.unit_ids().collect::<Vec<_>>(), vec![UnitId::new(1)]);
    }

    #[test]
    fn registration_is_per_unit() {
        let mut table = DispatchTable::new(&[UnitId::new(1), UnitId::new(2)]);
        table.register(UnitId::new(1), 99, Box::new(nop)).unwrap();
        assert!(is_bound(&mut table, 1, 99));
        assert!(!is_bound(&mut table, 2, 99));
    }
}
