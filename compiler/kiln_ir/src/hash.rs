//! Hash functions whose results must agree between emitted code and the
//! runtime's native implementations.

/// Polynomial string hash over UTF-16 code units (`h = 31 * h + unit`).
///
/// Emitters bucket string switch keys with this function; the runtime's
/// `core/String.hashCode` computes the same value, so the emitted key table
/// matches what generated code sees at run time.
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

#[cfg(test)]
mod tests {
    use super::string_hash;

    #[test]
    fn known_values() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
        // Colliding pair used by the string switch tests.
        assert_eq!(string_hash("Aa"), string_hash("BB"));
    }
}
