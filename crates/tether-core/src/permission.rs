//! The closed permission catalogue.
//!
//! Every permission a user can declare or grant is a variant of
//! [`PermissionName`]. Each name statically knows which set it lives in,
//! which channel may write it, and the variant of [`PermissionValue`] it
//! holds, so lookups are exhaustive matches instead of string comparisons.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;
use crate::lockable::Category;

/// A typed permission value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionValue {
    Bool(bool),
    Duration(Duration),
    Text(String),
}

impl PermissionValue {
    pub fn value_type(&self) -> PermissionValueType {
        match self {
            PermissionValue::Bool(_) => PermissionValueType::Bool,
            PermissionValue::Duration(_) => PermissionValueType::Duration,
            PermissionValue::Text(_) => PermissionValueType::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PermissionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            PermissionValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PermissionValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PermissionValue {
    fn from(b: bool) -> Self {
        PermissionValue::Bool(b)
    }
}

impl From<Duration> for PermissionValue {
    fn from(d: Duration) -> Self {
        PermissionValue::Duration(d)
    }
}

impl From<&str> for PermissionValue {
    fn from(s: &str) -> Self {
        PermissionValue::Text(s.to_string())
    }
}

impl From<String> for PermissionValue {
    fn from(s: String) -> Self {
        PermissionValue::Text(s)
    }
}

/// Discriminant of [`PermissionValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionValueType {
    Bool,
    Duration,
    Text,
}

/// Which kind of set a permission lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionDomain {
    /// The user's own general settings.
    Global,
    /// What an item owner allows one specific pair to do.
    Pair,
}

/// Which channel may write a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionChannel {
    /// Ordinary negotiation. Pair names on this channel have an
    /// edit-access mirror.
    Standard,
    /// Only writable through the hardcore channel; never delegable.
    Hardcore,
}

macro_rules! permission_catalogue {
    (
        $(
            $name:ident => $domain:ident, $channel:ident, $default:expr;
        )+
    ) => {
        /// Every permission known to the system.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum PermissionName {
            $($name,)+
        }

        impl PermissionName {
            /// All names, in declaration order.
            pub const ALL: &'static [PermissionName] = &[$(PermissionName::$name,)+];

            /// Canonical string form, as used on the wire by older clients.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(PermissionName::$name => stringify!($name),)+
                }
            }

            pub const fn domain(self) -> PermissionDomain {
                match self {
                    $(PermissionName::$name => PermissionDomain::$domain,)+
                }
            }

            pub const fn channel(self) -> PermissionChannel {
                match self {
                    $(PermissionName::$name => PermissionChannel::$channel,)+
                }
            }

            /// The value a freshly created set holds for this name.
            pub fn default_value(self) -> PermissionValue {
                match self {
                    $(PermissionName::$name => PermissionValue::from($default),)+
                }
            }
        }

        impl FromStr for PermissionName {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($name) => Ok(PermissionName::$name),)+
                    other => Err(CoreError::UnknownPermission(other.to_string())),
                }
            }
        }
    };
}

const NO_TIME: Duration = Duration::ZERO;

permission_catalogue! {
    // Global, standard
    ChatGarblerActive => Global, Standard, false;
    WardrobeEnabled => Global, Standard, true;
    ItemAutoEquip => Global, Standard, false;
    RestraintSetAutoEquip => Global, Standard, false;
    GlobalTriggerPhrase => Global, Standard, "";

    // Global, hardcore state. Text values hold the enabler's UID.
    ChatGarblerLocked => Global, Hardcore, false;
    ForcedFollow => Global, Hardcore, "";
    ForcedEmoteState => Global, Hardcore, "";
    ForcedStay => Global, Hardcore, "";
    ForcedBlindfold => Global, Hardcore, "";
    ChatBoxesHidden => Global, Hardcore, "";
    ChatInputHidden => Global, Hardcore, "";
    ChatInputBlocked => Global, Hardcore, "";

    // Pair, standard (mirrored by edit access)
    ApplyGags => Pair, Standard, false;
    LockGags => Pair, Standard, false;
    MaxGagTime => Pair, Standard, NO_TIME;
    UnlockGags => Pair, Standard, false;
    RemoveGags => Pair, Standard, false;
    ApplyRestraintSets => Pair, Standard, false;
    LockRestraintSets => Pair, Standard, false;
    MaxRestraintTime => Pair, Standard, NO_TIME;
    UnlockRestraintSets => Pair, Standard, false;
    RemoveRestraintSets => Pair, Standard, false;
    PermanentLocks => Pair, Standard, false;
    OwnerLocks => Pair, Standard, false;
    DevotionalLocks => Pair, Standard, false;
    TriggerPhrase => Pair, Standard, "";

    // Pair, hardcore-only
    InHardcore => Pair, Hardcore, false;
    AllowForcedFollow => Pair, Hardcore, false;
    AllowForcedEmote => Pair, Hardcore, false;
    AllowForcedStay => Pair, Hardcore, false;
    AllowBlindfold => Pair, Hardcore, false;
    AllowHidingChatBoxes => Pair, Hardcore, false;
    AllowHidingChatInput => Pair, Hardcore, false;
    AllowChatInputBlocking => Pair, Hardcore, false;
    AllowGarblerLocking => Pair, Hardcore, false;
}

impl PermissionName {
    pub fn value_type(self) -> PermissionValueType {
        self.default_value().value_type()
    }

    /// Pair names with no edit-access mirror.
    pub fn is_hardcore_only(self) -> bool {
        self.domain() == PermissionDomain::Pair && self.channel() == PermissionChannel::Hardcore
    }

    /// Pair names that carry an edit-access mirror.
    pub fn has_edit_access(self) -> bool {
        self.domain() == PermissionDomain::Pair && self.channel() == PermissionChannel::Standard
    }

    /// Names of the given domain.
    pub fn in_domain(domain: PermissionDomain) -> impl Iterator<Item = PermissionName> {
        Self::ALL.iter().copied().filter(move |n| n.domain() == domain)
    }

    /// Permission required to apply content of `category`.
    pub const fn apply(category: Category) -> Self {
        match category {
            Category::Gag => PermissionName::ApplyGags,
            Category::RestraintSet => PermissionName::ApplyRestraintSets,
        }
    }

    /// Permission required to padlock content of `category`.
    pub const fn lock(category: Category) -> Self {
        match category {
            Category::Gag => PermissionName::LockGags,
            Category::RestraintSet => PermissionName::LockRestraintSets,
        }
    }

    /// Permission required to unlock content of `category`.
    pub const fn unlock(category: Category) -> Self {
        match category {
            Category::Gag => PermissionName::UnlockGags,
            Category::RestraintSet => PermissionName::UnlockRestraintSets,
        }
    }

    /// Permission required to remove content of `category`.
    pub const fn remove(category: Category) -> Self {
        match category {
            Category::Gag => PermissionName::RemoveGags,
            Category::RestraintSet => PermissionName::RemoveRestraintSets,
        }
    }

    /// Longest lock a pair may place on content of `category`.
    pub const fn max_time(category: Category) -> Self {
        match category {
            Category::Gag => PermissionName::MaxGagTime,
            Category::RestraintSet => PermissionName::MaxRestraintTime,
        }
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_string_roundtrip() {
        for name in PermissionName::ALL {
            let parsed: PermissionName = name.as_str().parse().unwrap();
            assert_eq!(*name, parsed);
        }
        assert!("NotAPermission".parse::<PermissionName>().is_err());
    }

    #[test]
    fn test_hardcore_only_names_have_no_mirror() {
        for name in PermissionName::ALL {
            if name.is_hardcore_only() {
                assert!(!name.has_edit_access(), "{name} must not be mirrored");
            }
        }
        assert!(PermissionName::InHardcore.is_hardcore_only());
        assert!(PermissionName::AllowForcedStay.is_hardcore_only());
        assert!(PermissionName::LockGags.has_edit_access());
        assert!(!PermissionName::ChatGarblerActive.has_edit_access());
    }

    #[test]
    fn test_value_types() {
        assert_eq!(PermissionName::MaxGagTime.value_type(), PermissionValueType::Duration);
        assert_eq!(PermissionName::ForcedStay.value_type(), PermissionValueType::Text);
        assert_eq!(PermissionName::ChatGarblerLocked.value_type(), PermissionValueType::Bool);
    }

    #[test]
    fn test_category_lookups() {
        assert_eq!(PermissionName::lock(Category::Gag), PermissionName::LockGags);
        assert_eq!(
            PermissionName::max_time(Category::RestraintSet),
            PermissionName::MaxRestraintTime
        );
    }

    #[test]
    fn test_value_serde_json() {
        let v = PermissionValue::Duration(Duration::from_secs(7200));
        let json = serde_json::to_string(&v).unwrap();
        let back: PermissionValue = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
