pub(crate) fn num_bytes_for_bits(count: u16) -> usize {
    (count as usize + 7) / 8
}

/// pack bits LSB first, the first value lands in bit 0 of the first byte
pub(crate) fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; (values.len() + 7) / 8];
    for (i, value) in values.iter().enumerate() {
        if *value {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// unpack `count` bits from packed bytes, returns None if there are not enough bytes
pub(crate) fn unpack_bits(bytes: &[u8], count: u16) -> Option<Vec<bool>> {
    if bytes.len() < num_bytes_for_bits(count) {
        return None;
    }
    Some(
        (0..count as usize)
            .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
            .collect(),
    )
}
