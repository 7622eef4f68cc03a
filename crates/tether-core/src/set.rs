//! Permission sets and relationships.
//!
//! A [`PermissionSet`] is an ordered mapping of name to value scoped to one
//! [`SetKind`]. A [`Relationship`] is one direction of a pairing: the
//! grants an owner extends to a pair, plus the edit-access flags that let
//! the pair flip those grants itself.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::permission::{PermissionDomain, PermissionName, PermissionValue, PermissionValueType};

/// The scope a permission set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetKind {
    Global,
    UniquePairPerm,
    EditAccess,
}

impl SetKind {
    /// Whether `name` may appear in a set of this kind.
    pub fn admits(self, name: PermissionName) -> bool {
        match self {
            SetKind::Global => name.domain() == PermissionDomain::Global,
            SetKind::UniquePairPerm => name.domain() == PermissionDomain::Pair,
            SetKind::EditAccess => name.has_edit_access(),
        }
    }

    /// The value type `name` must hold in a set of this kind.
    pub fn value_type_of(self, name: PermissionName) -> PermissionValueType {
        match self {
            SetKind::EditAccess => PermissionValueType::Bool,
            _ => name.value_type(),
        }
    }
}

/// An ordered mapping of permission name to typed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    kind: SetKind,
    entries: BTreeMap<PermissionName, PermissionValue>,
}

impl PermissionSet {
    /// Create an empty set.
    pub fn new(kind: SetKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// Create a set holding the default value of every admissible name.
    pub fn with_defaults(kind: SetKind) -> Self {
        let entries = PermissionName::ALL
            .iter()
            .copied()
            .filter(|n| kind.admits(*n))
            .map(|n| {
                let value = match kind {
                    SetKind::EditAccess => PermissionValue::Bool(false),
                    _ => n.default_value(),
                };
                (n, value)
            })
            .collect();
        Self { kind, entries }
    }

    pub fn kind(&self) -> SetKind {
        self.kind
    }

    pub fn get(&self, name: PermissionName) -> Option<&PermissionValue> {
        self.entries.get(&name)
    }

    /// Boolean value of `name`; absent or non-boolean reads as `false`.
    pub fn get_bool(&self, name: PermissionName) -> bool {
        self.get(name).and_then(PermissionValue::as_bool).unwrap_or(false)
    }

    /// Duration value of `name`; absent reads as zero.
    pub fn get_duration(&self, name: PermissionName) -> Duration {
        self.get(name)
            .and_then(PermissionValue::as_duration)
            .unwrap_or(Duration::ZERO)
    }

    /// Text value of `name`; absent reads as empty.
    pub fn get_text(&self, name: PermissionName) -> &str {
        self.get(name).and_then(PermissionValue::as_text).unwrap_or("")
    }

    /// Check that `value` may be stored under `name` in this set.
    pub fn validate(&self, name: PermissionName, value: &PermissionValue) -> Result<()> {
        if !self.kind.admits(name) {
            return Err(CoreError::WrongDomain {
                name,
                kind: self.kind,
            });
        }
        let expected = self.kind.value_type_of(name);
        if value.value_type() != expected {
            return Err(CoreError::TypeMismatch {
                name,
                expected,
                got: value.value_type(),
            });
        }
        Ok(())
    }

    /// Store `value` under `name`, returning the previous value.
    pub fn set(&mut self, name: PermissionName, value: PermissionValue) -> Result<Option<PermissionValue>> {
        self.validate(name, &value)?;
        Ok(self.entries.insert(name, value))
    }

    /// Reset `name` to its default, returning the previous value.
    pub fn reset(&mut self, name: PermissionName) -> Option<PermissionValue> {
        if !self.kind.admits(name) {
            return None;
        }
        let value = match self.kind {
            SetKind::EditAccess => PermissionValue::Bool(false),
            _ => name.default_value(),
        };
        self.entries.insert(name, value)
    }

    pub fn contains(&self, name: PermissionName) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PermissionName, &PermissionValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One direction of a pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// What the owner allows the pair to do.
    pub perms: PermissionSet,
    /// Which of those grants the pair may flip itself.
    pub access: PermissionSet,
}

impl Relationship {
    /// A freshly established pairing: everything at its default.
    pub fn with_defaults() -> Self {
        Self {
            perms: PermissionSet::with_defaults(SetKind::UniquePairPerm),
            access: PermissionSet::with_defaults(SetKind::EditAccess),
        }
    }

    pub fn in_hardcore(&self) -> bool {
        self.perms.get_bool(PermissionName::InHardcore)
    }

    /// Whether the pair may flip `name` without the owner.
    pub fn has_edit_access(&self, name: PermissionName) -> bool {
        name.has_edit_access() && self.access.get_bool(name)
    }

    /// Check the 1:1 pairing between grants and edit-access flags.
    pub fn check_mirror(&self) -> Result<()> {
        for (name, _) in self.perms.iter() {
            if name.has_edit_access() && !self.access.contains(name) {
                return Err(CoreError::MirrorBroken(name));
            }
        }
        for (name, _) in self.access.iter() {
            if !self.perms.contains(name) {
                return Err(CoreError::MirrorBroken(name));
            }
        }
        Ok(())
    }
}

impl Default for Relationship {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_domain() {
        let global = PermissionSet::with_defaults(SetKind::Global);
        assert!(global.contains(PermissionName::ChatGarblerActive));
        assert!(!global.contains(PermissionName::LockGags));

        let pair = PermissionSet::with_defaults(SetKind::UniquePairPerm);
        assert!(pair.contains(PermissionName::InHardcore));
        assert!(!pair.contains(PermissionName::ForcedStay));
    }

    #[test]
    fn test_set_rejects_wrong_domain() {
        let mut global = PermissionSet::with_defaults(SetKind::Global);
        let err = global.set(PermissionName::LockGags, true.into()).unwrap_err();
        assert!(matches!(err, CoreError::WrongDomain { .. }));
    }

    #[test]
    fn test_set_rejects_wrong_variant() {
        let mut pair = PermissionSet::with_defaults(SetKind::UniquePairPerm);
        let err = pair.set(PermissionName::MaxGagTime, true.into()).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));

        let prev = pair
            .set(PermissionName::MaxGagTime, Duration::from_secs(60).into())
            .unwrap();
        assert_eq!(prev, Some(PermissionValue::Duration(Duration::ZERO)));
    }

    #[test]
    fn test_edit_access_is_bool_only() {
        let mut access = PermissionSet::with_defaults(SetKind::EditAccess);
        assert!(access.set(PermissionName::MaxGagTime, true.into()).is_ok());
        assert!(access
            .set(PermissionName::MaxGagTime, Duration::from_secs(1).into())
            .is_err());
        assert!(access.set(PermissionName::InHardcore, true.into()).is_err());
    }

    #[test]
    fn test_relationship_mirror() {
        let rel = Relationship::with_defaults();
        rel.check_mirror().unwrap();

        for name in PermissionName::ALL {
            if name.is_hardcore_only() {
                assert!(!rel.access.contains(*name));
            }
        }
    }

    #[test]
    fn test_reset_restores_default() {
        let mut pair = PermissionSet::with_defaults(SetKind::UniquePairPerm);
        pair.set(PermissionName::AllowForcedStay, true.into()).unwrap();
        pair.reset(PermissionName::AllowForcedStay);
        assert!(!pair.get_bool(PermissionName::AllowForcedStay));
    }
}
