/// Marker for snapshot keys that must be delivered to every processor
/// instance at restore time.
///
/// External partitions do not align with engine partitions, so a restored
/// instance cannot rely on owning the engine partition its keys were saved
/// under. Wrapping a key broadcasts it: every instance sees every entry and
/// keeps only the partitions it now owns.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Eq, PartialEq, Hash)]
pub struct BroadcastKey<K> {
    key: K,
}

pub fn broadcast_key<K>(key: K) -> BroadcastKey<K> {
    BroadcastKey { key }
}

impl<K> BroadcastKey<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_key(self) -> K {
        self.key
    }
}
