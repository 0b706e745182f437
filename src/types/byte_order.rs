use serde::{Deserialize, Serialize};

#[cfg(target_endian = "big")]
pub const NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Big;

#[cfg(target_endian = "little")]
pub const NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Little;

#[cfg(target_endian = "big")]
pub const NON_NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Little;

#[cfg(target_endian = "little")]
pub const NON_NATIVE_BYTE_ORDER: ByteOrder = ByteOrder::Big;

/// Byte order / endianness of dataset bytes at rest.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Big Endian
    Big,
    /// Little Endian
    #[default]
    Little,
}

impl ByteOrder {
    /// Whether this byte order matches the host's.
    pub fn is_native(self) -> bool {
        self == NATIVE_BYTE_ORDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json;

    #[test]
    fn test_native_byte_order() {
        assert_ne!(NATIVE_BYTE_ORDER, NON_NATIVE_BYTE_ORDER);
        assert!(NATIVE_BYTE_ORDER.is_native());
        assert!(!NON_NATIVE_BYTE_ORDER.is_native());
    }

    #[test]
    fn test_deserialise() {
        let little: ByteOrder = serde_json::from_str(r#""little""#).unwrap();
        assert_eq!(ByteOrder::Little, little);
        let big: ByteOrder = serde_json::from_str(r#""big""#).unwrap();
        assert_eq!(ByteOrder::Big, big);
    }

    #[test]
    fn test_serialise() {
        assert_eq!(r#""big""#, serde_json::to_string(&ByteOrder::Big).unwrap());
        assert_eq!(ByteOrder::Little, ByteOrder::default());
    }
}
