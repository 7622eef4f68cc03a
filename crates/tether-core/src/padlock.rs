//! Padlocks: the lock record attached to a lockable.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use subtle::ConstantTimeEq;

use crate::error::CoreError;
use crate::types::{Timestamp, UserId};

/// Longest accepted padlock password.
pub const MAX_PASSWORD_LEN: usize = 20;

/// The kind of padlock on an item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadlockKind {
    #[default]
    None,
    Basic,
    Password,
    Timer,
    TimerPassword,
    Owner,
    Devotional,
    OwnerTimer,
    DevotionalTimer,
    /// Self-inflicted, timer-only, released only by expiry.
    Mimic,
}

impl PadlockKind {
    pub const ALL: &'static [PadlockKind] = &[
        PadlockKind::None,
        PadlockKind::Basic,
        PadlockKind::Password,
        PadlockKind::Timer,
        PadlockKind::TimerPassword,
        PadlockKind::Owner,
        PadlockKind::Devotional,
        PadlockKind::OwnerTimer,
        PadlockKind::DevotionalTimer,
        PadlockKind::Mimic,
    ];

    pub fn is_none(self) -> bool {
        self == PadlockKind::None
    }

    /// Kinds that carry an expiry.
    pub fn is_timer(self) -> bool {
        matches!(
            self,
            PadlockKind::Timer
                | PadlockKind::TimerPassword
                | PadlockKind::OwnerTimer
                | PadlockKind::DevotionalTimer
                | PadlockKind::Mimic
        )
    }

    /// Locked kinds with no expiry.
    pub fn is_permanent(self) -> bool {
        !self.is_none() && !self.is_timer()
    }

    pub fn takes_password(self) -> bool {
        matches!(self, PadlockKind::Password | PadlockKind::TimerPassword)
    }

    pub fn is_owner_class(self) -> bool {
        matches!(self, PadlockKind::Owner | PadlockKind::OwnerTimer)
    }

    pub fn is_devotional_class(self) -> bool {
        matches!(self, PadlockKind::Devotional | PadlockKind::DevotionalTimer)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PadlockKind::None => "None",
            PadlockKind::Basic => "Basic",
            PadlockKind::Password => "Password",
            PadlockKind::Timer => "Timer",
            PadlockKind::TimerPassword => "TimerPassword",
            PadlockKind::Owner => "Owner",
            PadlockKind::Devotional => "Devotional",
            PadlockKind::OwnerTimer => "OwnerTimer",
            PadlockKind::DevotionalTimer => "DevotionalTimer",
            PadlockKind::Mimic => "Mimic",
        }
    }
}

impl fmt::Display for PadlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PadlockKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PadlockKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::UnknownPadlock(s.to_string()))
    }
}

/// The lock record attached to a lockable.
///
/// `kind == None` exactly when there is no password, expiry or assigner.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Padlock {
    pub kind: PadlockKind,
    pub password: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub assigner: Option<UserId>,
}

impl Padlock {
    /// The unlocked state.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        !self.kind.is_none()
    }

    /// True once a timer-bearing padlock has reached its expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.kind.is_timer() && self.expires_at.is_some_and(|at| now >= at)
    }

    /// Milliseconds left before expiry, if this padlock has one.
    pub fn remaining_ms(&self, now: Timestamp) -> Option<i64> {
        self.expires_at.map(|at| at.saturating_sub(now).max(0))
    }

    /// Compare a password attempt against this padlock.
    pub fn password_matches(&self, attempt: &str) -> bool {
        match &self.password {
            Some(stored) => bool::from(stored.as_bytes().ct_eq(attempt.as_bytes())),
            None => false,
        }
    }

    /// Check the structural invariants of the record.
    pub fn check_invariant(&self) -> Result<(), CoreError> {
        let empty = self.password.is_none() && self.expires_at.is_none() && self.assigner.is_none();
        if self.kind.is_none() != empty {
            return Err(CoreError::MalformedPadlock(
                "kind None must coincide with no password, expiry or assigner",
            ));
        }
        if self.kind.is_timer() != self.expires_at.is_some() {
            return Err(CoreError::MalformedPadlock("expiry present iff kind is a timer"));
        }
        if self.kind.takes_password() != self.password.is_some() {
            return Err(CoreError::MalformedPadlock("password present iff kind takes one"));
        }
        Ok(())
    }
}

impl fmt::Debug for Padlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Padlock")
            .field("kind", &self.kind)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("assigner", &self.assigner)
            .finish()
    }
}

/// Check that a password is acceptable for a password-bearing padlock.
pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.is_empty() {
        return Err("password must not be empty");
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err("password longer than 20 characters");
    }
    if !password.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("password must be ASCII alphanumeric");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classes() {
        assert!(PadlockKind::Mimic.is_timer());
        assert!(PadlockKind::Basic.is_permanent());
        assert!(PadlockKind::Owner.is_permanent());
        assert!(!PadlockKind::OwnerTimer.is_permanent());
        assert!(PadlockKind::TimerPassword.takes_password());
        assert!(PadlockKind::DevotionalTimer.is_devotional_class());
        assert!(!PadlockKind::None.is_permanent());
    }

    #[test]
    fn test_kind_string_roundtrip() {
        for kind in PadlockKind::ALL {
            assert_eq!(kind.as_str().parse::<PadlockKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_none_invariant() {
        Padlock::none().check_invariant().unwrap();

        let broken = Padlock {
            kind: PadlockKind::None,
            password: Some("x".into()),
            ..Padlock::default()
        };
        assert!(broken.check_invariant().is_err());
    }

    #[test]
    fn test_expiry_boundary() {
        let lock = Padlock {
            kind: PadlockKind::Timer,
            password: None,
            expires_at: Some(1000),
            assigner: Some(UserId::new("a")),
        };
        assert!(!lock.is_expired(999));
        assert!(lock.is_expired(1000));
        assert_eq!(lock.remaining_ms(400), Some(600));
        assert_eq!(lock.remaining_ms(4000), Some(0));
    }

    #[test]
    fn test_remaining_saturates_for_unbounded_timers() {
        let lock = Padlock {
            kind: PadlockKind::OwnerTimer,
            password: None,
            expires_at: Some(Timestamp::MAX),
            assigner: Some(UserId::new("a")),
        };
        assert_eq!(lock.remaining_ms(-1), Some(Timestamp::MAX));
        assert_eq!(lock.remaining_ms(Timestamp::MIN), Some(Timestamp::MAX));
    }

    #[test]
    fn test_password_matching() {
        let lock = Padlock {
            kind: PadlockKind::Password,
            password: Some("hunter2".into()),
            expires_at: None,
            assigner: Some(UserId::new("a")),
        };
        assert!(lock.password_matches("hunter2"));
        assert!(!lock.password_matches("hunter3"));
        assert!(!lock.password_matches("hunter"));
        assert!(!lock.password_matches("hunter22"));
        assert!(!Padlock::none().password_matches(""));
    }

    #[test]
    fn test_debug_redacts_password() {
        let lock = Padlock {
            kind: PadlockKind::Password,
            password: Some("secret1".into()),
            expires_at: None,
            assigner: Some(UserId::new("a")),
        };
        let debug = format!("{:?}", lock);
        assert!(!debug.contains("secret1"));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("abc123").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password("has space").is_err());
        assert!(validate_password(&"a".repeat(21)).is_err());
    }
}
