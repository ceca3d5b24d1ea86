/// Callback invoked for every committed change to a key.
///
/// Called while the leaf holding `key` is still locked, so notifications for
/// one key arrive in the order the changes took effect. `old` is `None` for
/// an insert and `new` is `None` for a removal. Implementations must not call
/// back into the tree's mutating operations.
pub trait ModificationListener<K, V>: Send + Sync {
    /// Reports one change to `key`.
    fn on_modification(&self, key: &K, old: Option<&V>, new: Option<&V>);
}

impl<K, V, F> ModificationListener<K, V> for F
where
    F: Fn(&K, Option<&V>, Option<&V>) + Send + Sync,
{
    fn on_modification(&self, key: &K, old: Option<&V>, new: Option<&V>) {
        self(key, old, new)
    }
}
