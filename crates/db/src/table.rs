//! Typed table definitions over raw byte storage.

use crate::DatabaseError;

/// Byte encoding for keys. The encoding must preserve the key ordering,
/// since cursor scans operate on the encoded form.
pub trait Encode {
    /// Encoded representation.
    type Encoded: AsRef<[u8]>;

    /// Encodes the key.
    fn encode(self) -> Self::Encoded;
}

/// Inverse of [`Encode`].
pub trait Decode: Sized {
    /// Decodes a key from its stored bytes.
    fn decode(bytes: &[u8]) -> Result<Self, DatabaseError>;
}

/// Byte representation for values.
pub trait Compress {
    /// Compressed representation.
    type Compressed: AsRef<[u8]>;

    /// Compresses the value.
    fn compress(self) -> Self::Compressed;
}

/// Inverse of [`Compress`].
pub trait Decompress: Sized {
    /// Decompresses a value from its stored bytes.
    fn decompress(bytes: &[u8]) -> Result<Self, DatabaseError>;
}

/// Marker for types usable as table keys.
pub trait Key: Encode + Decode + Ord + Clone + std::fmt::Debug + 'static {}

impl<T> Key for T where T: Encode + Decode + Ord + Clone + std::fmt::Debug + 'static {}

/// Marker for types usable as table values.
pub trait Value: Compress + Decompress + std::fmt::Debug + 'static {}

impl<T> Value for T where T: Compress + Decompress + std::fmt::Debug + 'static {}

/// A named table in the store.
pub trait Table: 'static {
    /// Table name, also the on-disk identifier.
    const NAME: &'static str;

    /// Key type.
    type Key: Key;

    /// Value type.
    type Value: Value;
}

/// A key-value row of table `T`.
pub type TableRow<T> = (<T as Table>::Key, <T as Table>::Value);

impl Encode for Vec<u8> {
    type Encoded = Vec<u8>;

    fn encode(self) -> Self::Encoded {
        self
    }
}

impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> Result<Self, DatabaseError> {
        Ok(bytes.to_vec())
    }
}

impl Encode for String {
    type Encoded = Vec<u8>;

    fn encode(self) -> Self::Encoded {
        self.into_bytes()
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> Result<Self, DatabaseError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| DatabaseError::Decode("invalid utf8 key"))
    }
}

impl Encode for u64 {
    type Encoded = [u8; 8];

    fn encode(self) -> Self::Encoded {
        self.to_be_bytes()
    }
}

impl Decode for u64 {
    fn decode(bytes: &[u8]) -> Result<Self, DatabaseError> {
        let bytes: [u8; 8] =
            bytes.try_into().map_err(|_| DatabaseError::Decode("expected 8 byte big-endian"))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl Compress for Vec<u8> {
    type Compressed = Vec<u8>;

    fn compress(self) -> Self::Compressed {
        self
    }
}

impl Decompress for Vec<u8> {
    fn decompress(bytes: &[u8]) -> Result<Self, DatabaseError> {
        Ok(bytes.to_vec())
    }
}

impl Compress for u64 {
    type Compressed = [u8; 8];

    fn compress(self) -> Self::Compressed {
        self.to_be_bytes()
    }
}

impl Decompress for u64 {
    fn decompress(bytes: &[u8]) -> Result<Self, DatabaseError> {
        <u64 as Decode>::decode(bytes)
    }
}
