//! Generates business-level reference numbers for ledger records.

use uuid::Uuid;

/// Generate a globally unique transaction reference: a dashless UUIDv4,
/// 32 hex characters.
pub fn new_reference_number() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::new_reference_number;

    #[test]
    fn references_are_32_hex_characters() {
        let reference = new_reference_number();

        assert_eq!(reference.len(), 32);
        assert!(reference.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn references_are_unique() {
        assert_ne!(new_reference_number(), new_reference_number());
    }
}
