use alloy_primitives::{keccak256, B256};

/// One step of an inbox hash chain: commits `data` on top of `prev`.
/// Equal accumulators at an index prove equal stream prefixes.
pub fn extend(prev: B256, data: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(32 + data.len());
    buf.extend_from_slice(prev.as_slice());
    buf.extend_from_slice(data);
    keccak256(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_depends_on_prev_and_data() {
        let a = extend(B256::ZERO, b"one");
        let b = extend(B256::ZERO, b"two");
        let c = extend(a, b"two");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(extend(a, b"two"), c);
    }
}
