use crate::constants::limits::TABLE_SIZE;

/// Modbus unit identifier, just a type-safe wrapper around `u8`
///
/// On a Modbus slave every configured unit id is a logical device with its own
/// four tables and its own dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

impl UnitId {
    /// Create a new unit id
    pub const fn new(value: u8) -> Self {
        Self { value }
    }

    /// Broadcast address, only meaningful on serial lines
    pub const fn broadcast() -> Self {
        Self { value: 0x00 }
    }

    /// Returns true if the address is reserved in RTU mode
    ///
    /// Users should *not* use reserved addresses in RTU mode.
    pub fn is_rtu_reserved(&self) -> bool {
        self.value >= 248
    }
}

impl From<u8> for UnitId {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

/// Start and count tuple used when addressing a block of values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    /// Starting address of the range
    pub start: u16,
    /// Count of elements in the range
    pub count: u16,
}

impl AddressRange {
    /// Create a range without validation
    pub const fn new(start: u16, count: u16) -> Self {
        Self { start, count }
    }

    /// Returns true if the range fits inside a table of `TABLE_SIZE` values
    pub fn fits_table(&self) -> bool {
        self.start as usize + self.count as usize <= TABLE_SIZE
    }

    /// Converts to a std range suitable for slicing a table
    pub fn to_std_range(self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        start..start + self.count as usize
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "start: {:#06X} qty: {}", self.start, self.count)
    }
}

/// Value and its address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Indexed<T> {
    /// Address of the value
    pub index: u16,
    /// Associated value
    pub value: T,
}

impl<T> Indexed<T> {
    /// Create a new indexed value
    pub fn new(index: u16, value: T) -> Self {
        Indexed { index, value }
    }
}

impl std::fmt::Display for Indexed<bool> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "idx: {:#06X} value: {}", self.index, self.value as i32)
    }
}

impl std::fmt::Display for Indexed<u16> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "idx: {:#06X} value: {:#06X}", self.index, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_at_end_of_table_fits() {
        assert!(AddressRange::new(0xFFFF, 1).fits_table());
        assert!(AddressRange::new(0, 0xFFFF).fits_table());
        assert!(!AddressRange::new(0xFFFF, 2).fits_table());
    }

    #[test]
    fn converts_to_std_range_without_overflow() {
        assert_eq!(AddressRange::new(0xFFFF, 1).to_std_range(), 65535..65536);
    }

    #[test]
    fn reserved_rtu_addresses() {
        assert!(!UnitId::new(247).is_rtu_reserved());
        assert!(UnitId::new(248).is_rtu_reserved());
    }
}
