//! # Identity Registry
//!
//! Maps per-device user identities onto virtual world identities.
//!
//! Every device numbers its tracked people locally, so the same local ID can
//! appear on several devices at once. The registry keys on the
//! `(device user id, client id)` pair and hands out virtual IDs from a
//! counter that only ever moves forward. A late "lost user" for a released
//! ID can therefore never remove a newer user.

use std::collections::HashMap;
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::world::VirtualUserId;

/// A tracked person as seen by one device.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceUserKey {
    /// User ID local to the reporting sensor.
    pub device_user_id: i32,
    /// The reporting device.
    pub client_id: String,
}

impl DeviceUserKey {
    /// Creates a key.
    pub fn new(device_user_id: i32, client_id: impl Into<String>) -> Self {
        Self {
            device_user_id,
            client_id: client_id.into(),
        }
    }
}

impl fmt::Display for DeviceUserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.device_user_id, self.client_id)
    }
}

/// Bidirectional device-user ↔ virtual-user mapping.
#[derive(Clone, Debug, Default)]
pub struct IdentityRegistry {
    by_key: HashMap<DeviceUserKey, VirtualUserId>,
    by_id: HashMap<VirtualUserId, DeviceUserKey>,
    next_id: u32,
}

impl IdentityRegistry {
    /// Creates an empty registry. The first assigned ID is 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next virtual ID to `key`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DuplicateUser`] if `key` is already assigned.
    /// - [`CoreError::IdentitiesExhausted`] once IDs no longer fit the wire.
    pub fn assign(&mut self, key: DeviceUserKey) -> CoreResult<VirtualUserId> {
        if self.by_key.contains_key(&key) {
            return Err(CoreError::DuplicateUser(key));
        }

        let id = VirtualUserId(self.next_id);
        if id > VirtualUserId::MAX {
            return Err(CoreError::IdentitiesExhausted);
        }
        self.next_id += 1;

        self.by_id.insert(id, key.clone());
        self.by_key.insert(key, id);
        Ok(id)
    }

    /// Returns the virtual ID assigned to `key`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownUser`] if `key` is not assigned.
    pub fn lookup(&self, key: &DeviceUserKey) -> CoreResult<VirtualUserId> {
        self.by_key
            .get(key)
            .copied()
            .ok_or_else(|| CoreError::UnknownUser(key.clone()))
    }

    /// Removes `key` and returns the ID it held. The ID is never handed out again.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownUser`] if `key` is not assigned.
    pub fn release(&mut self, key: &DeviceUserKey) -> CoreResult<VirtualUserId> {
        let id = self
            .by_key
            .remove(key)
            .ok_or_else(|| CoreError::UnknownUser(key.clone()))?;
        self.by_id.remove(&id);
        Ok(id)
    }

    /// Reverse lookup: which device user holds `id`.
    #[must_use]
    pub fn key_of(&self, id: VirtualUserId) -> Option<&DeviceUserKey> {
        self.by_id.get(&id)
    }

    /// Returns true if `key` is assigned.
    #[must_use]
    pub fn contains(&self, key: &DeviceUserKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Keys owned by `client_id`, in ascending virtual ID order.
    #[must_use]
    pub fn keys_for_client(&self, client_id: &str) -> Vec<DeviceUserKey> {
        let mut owned: Vec<(VirtualUserId, &DeviceUserKey)> = self
            .by_id
            .iter()
            .filter(|(_, key)| key.client_id == client_id)
            .map(|(id, key)| (*id, key))
            .collect();
        owned.sort_unstable_by_key(|(id, _)| *id);
        owned.into_iter().map(|(_, key)| key.clone()).collect()
    }

    /// Number of live assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns true if nobody is assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// The ID the next successful `assign` will return.
    #[must_use]
    pub const fn next_id(&self) -> VirtualUserId {
        VirtualUserId(self.next_id)
    }

    /// Iterates over live assignments in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceUserKey, VirtualUserId)> {
        self.by_key.iter().map(|(key, id)| (key, *id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_is_monotonic() {
        let mut registry = IdentityRegistry::new();

        let a = registry.assign(DeviceUserKey::new(1, "left")).unwrap();
        let b = registry.assign(DeviceUserKey::new(1, "right")).unwrap();
        let c = registry.assign(DeviceUserKey::new(2, "left")).unwrap();

        assert_eq!(a, VirtualUserId(0));
        assert_eq!(b, VirtualUserId(1));
        assert_eq!(c, VirtualUserId(2));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_assign_is_rejected() {
        let mut registry = IdentityRegistry::new();
        let key = DeviceUserKey::new(7, "kinect");

        registry.assign(key.clone()).unwrap();
        let err = registry.assign(key.clone()).unwrap_err();

        assert_eq!(err, CoreError::DuplicateUser(key));
        assert_eq!(registry.next_id(), VirtualUserId(1));
    }

    #[test]
    fn test_released_ids_are_not_reused() {
        let mut registry = IdentityRegistry::new();
        let key = DeviceUserKey::new(3, "kinect");

        let first = registry.assign(key.clone()).unwrap();
        assert_eq!(registry.release(&key).unwrap(), first);
        let second = registry.assign(key.clone()).unwrap();

        assert!(second > first);
        assert!(registry.key_of(first).is_none());
        assert_eq!(registry.key_of(second), Some(&key));
    }

    #[test]
    fn test_lookup_and_release_unknown() {
        let mut registry = IdentityRegistry::new();
        let key = DeviceUserKey::new(1, "nobody");

        assert_eq!(registry.lookup(&key), Err(CoreError::UnknownUser(key.clone())));
        assert_eq!(registry.release(&key), Err(CoreError::UnknownUser(key)));
    }

    #[test]
    fn test_keys_for_client_sorted_by_virtual_id() {
        let mut registry = IdentityRegistry::new();
        registry.assign(DeviceUserKey::new(9, "a")).unwrap();
        registry.assign(DeviceUserKey::new(4, "b")).unwrap();
        registry.assign(DeviceUserKey::new(2, "a")).unwrap();

        let owned = registry.keys_for_client("a");
        assert_eq!(owned, vec![DeviceUserKey::new(9, "a"), DeviceUserKey::new(2, "a")]);
        assert!(registry.keys_for_client("c").is_empty());
    }

    #[test]
    fn test_id_space_exhaustion() {
        let mut registry = IdentityRegistry {
            next_id: VirtualUserId::MAX.0,
            ..IdentityRegistry::default()
        };

        assert_eq!(
            registry.assign(DeviceUserKey::new(1, "x")).unwrap(),
            VirtualUserId::MAX
        );
        assert_eq!(
            registry.assign(DeviceUserKey::new(2, "x")),
            Err(CoreError::IdentitiesExhausted)
        );
    }
}
