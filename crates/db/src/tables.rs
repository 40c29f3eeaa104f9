//! Tables used by the staged-sync core.

/// Declares unit structs implementing [`Table`](crate::table::Table) and the
/// [`TABLES`] listing used to pre-create them when the environment opens.
macro_rules! tables {
    ($($(#[$docs:meta])* table $name:ident<Key = $key:ty, Value = $value:ty>;)*) => {
        $(
            $(#[$docs])*
            #[derive(Debug, Clone, Copy, Default)]
            pub struct $name;

            impl $crate::table::Table for $name {
                const NAME: &'static str = stringify!($name);
                type Key = $key;
                type Value = $value;
            }
        )*

        /// Names of every table, in declaration order.
        pub const TABLES: &[&str] = &[$(stringify!($name),)*];
    };
}

tables! {
    /// Completed data migrations, keyed by migration name.
    table Migrations<Key = String, Value = Vec<u8>>;

    /// Store-wide metadata: storage-mode flags such as `smReceipts` and the
    /// per-stage progress cursors (8-byte big-endian block numbers keyed by
    /// stage name).
    table DatabaseInfo<Key = String, Value = Vec<u8>>;

    /// Account changesets: `be_u64(block) ‖ address` → previous account
    /// value. The block-number prefix keeps the table in block order.
    table PlainAccountChangeSet<Key = Vec<u8>, Value = Vec<u8>>;

    /// Storage changesets:
    /// `be_u64(block) ‖ address ‖ incarnation ‖ location` → previous value.
    table PlainStorageChangeSet<Key = Vec<u8>, Value = Vec<u8>>;

    /// Account history chunks: `history_key ‖ be_u64(suffix)` → serialized
    /// Roaring64 bitmap, where `suffix` is the highest block in the chunk or
    /// `u64::MAX` for the open-ended tail chunk.
    table AccountHistory<Key = Vec<u8>, Value = Vec<u8>>;

    /// Storage history chunks, keyed like [`AccountHistory`].
    table StorageHistory<Key = Vec<u8>, Value = Vec<u8>>;
}
