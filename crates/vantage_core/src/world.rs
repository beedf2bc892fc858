//! # Virtual World State
//!
//! The single source of truth for who is where.

use std::collections::HashMap;
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Hub-assigned identity of a tracked person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualUserId(pub u32);

impl VirtualUserId {
    /// Largest ID that still fits a signed 32-bit wire integer.
    pub const MAX: Self = Self(i32::MAX as u32);

    /// The ID as sent on the wire.
    #[inline]
    #[must_use]
    pub const fn as_wire(self) -> i32 {
        // Never exceeds MAX, so the cast is lossless.
        self.0 as i32
    }
}

impl fmt::Display for VirtualUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized position in the virtual world.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VirtualPosition {
    /// World X, in `[floor, max_x]`.
    pub x: f32,
    /// World Y, in `[floor, max_y]`.
    pub y: f32,
    /// Reserved. Always 0 while the world is 2-D.
    pub z: f32,
}

impl VirtualPosition {
    /// Creates a position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Current position of every live virtual user.
#[derive(Clone, Debug, Default)]
pub struct VirtualWorldState {
    users: HashMap<VirtualUserId, VirtualPosition>,
}

impl VirtualWorldState {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or moves a user.
    pub fn set(&mut self, id: VirtualUserId, position: VirtualPosition) {
        self.users.insert(id, position);
    }

    /// Returns a user's position.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownVirtualUser`] if `id` is not in the world.
    pub fn get(&self, id: VirtualUserId) -> CoreResult<VirtualPosition> {
        self.users
            .get(&id)
            .copied()
            .ok_or(CoreError::UnknownVirtualUser(id))
    }

    /// Removes a user and returns its last position.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownVirtualUser`] if `id` is not in the world.
    pub fn remove(&mut self, id: VirtualUserId) -> CoreResult<VirtualPosition> {
        self.users
            .remove(&id)
            .ok_or(CoreError::UnknownVirtualUser(id))
    }

    /// Returns true if `id` is in the world.
    #[must_use]
    pub fn contains(&self, id: VirtualUserId) -> bool {
        self.users.contains_key(&id)
    }

    /// Number of users in the world.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns true if the world is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Iterates over users in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (VirtualUserId, VirtualPosition)> + '_ {
        self.users.iter().map(|(id, pos)| (*id, *pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let mut world = VirtualWorldState::new();
        let id = VirtualUserId(4);

        world.set(id, VirtualPosition::new(1.0, 2.0, 0.0));
        world.set(id, VirtualPosition::new(3.0, 4.0, 0.0));

        assert_eq!(world.len(), 1);
        assert_eq!(world.get(id).unwrap(), VirtualPosition::new(3.0, 4.0, 0.0));
        assert_eq!(world.remove(id).unwrap().x, 3.0);
        assert!(world.is_empty());
    }

    #[test]
    fn test_unknown_user() {
        let mut world = VirtualWorldState::new();
        let id = VirtualUserId(99);

        assert_eq!(world.get(id), Err(CoreError::UnknownVirtualUser(id)));
        assert_eq!(world.remove(id), Err(CoreError::UnknownVirtualUser(id)));
    }

    #[test]
    fn test_wire_id() {
        assert_eq!(VirtualUserId(12).as_wire(), 12);
        assert_eq!(VirtualUserId::MAX.as_wire(), i32::MAX);
    }
}
