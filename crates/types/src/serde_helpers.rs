//! Serde helpers for JSON-RPC quantities.
//!
//! Execution nodes encode integers as `0x`-prefixed hex strings without
//! leading zeros. These helpers map them onto plain `u64` fields.

/// Hex-encoded `u64` quantities.
///
/// Use with `#[serde(with = "beacon_types::serde_helpers::quantity")]`.
pub mod quantity {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a `u64` as a `0x`-prefixed hex quantity.
    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    /// Deserialize a `0x`-prefixed hex quantity into a `u64`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    /// Parse a hex quantity, tolerating a missing `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty or not valid hex.
    pub fn parse(s: &str) -> Result<u64, String> {
        let digits = s.trim_start_matches("0x");
        if digits.is_empty() {
            return Err(format!("empty quantity: {s:?}"));
        }
        u64::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity {s:?}: {e}"))
    }
}
