//! Storage contract consumed by the network layer

/// Key-value storage with boolean outcomes
///
/// Implementors never panic for expected conditions: a rejected write, a
/// missing key or an existing key are all reported through the return value
/// and leave the store untouched.
pub trait Storage {
    /// Insert or replace `key`
    ///
    /// Behaves as [`put_if_absent`](Storage::put_if_absent) when the key is
    /// missing and as [`set`](Storage::set) when it is present.
    fn put(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Insert `key` only if it is not present yet
    fn put_if_absent(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Replace the value of an existing `key`
    fn set(&mut self, key: &[u8], value: &[u8]) -> bool;

    /// Remove `key`, returning whether it was present
    fn delete(&mut self, key: &[u8]) -> bool;

    /// Look up `key`, returning a copy of its value
    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>>;
}

/// The same contract as [`Storage`], callable from many threads at once
///
/// This is what connection handlers hold, typically as
/// `Arc<dyn SharedStorage>`.
pub trait SharedStorage: Send + Sync {
    /// See [`Storage::put`]
    fn put(&self, key: &[u8], value: &[u8]) -> bool;

    /// See [`Storage::put_if_absent`]
    fn put_if_absent(&self, key: &[u8], value: &[u8]) -> bool;

    /// See [`Storage::set`]
    fn set(&self, key: &[u8], value: &[u8]) -> bool;

    /// See [`Storage::delete`]
    fn delete(&self, key: &[u8]) -> bool;

    /// See [`Storage::get`]
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}
