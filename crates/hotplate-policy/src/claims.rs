use hotplate_core::Uid;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PolicyError, PolicyResult};

// ---------------------------------------------------------------------------
// ActorContext: raw identity assertion from the identity provider
// ---------------------------------------------------------------------------

/// Identity assertion supplied per request by the identity provider.
///
/// Never persisted. Nothing outside this module reads the raw claims;
/// downstream policy only sees the derived `AuthLevel` and the uid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActorContext {
    pub uid: Option<String>,
    pub admin: bool,
    pub webmaster: bool,
    pub authorized: bool,
    #[serde(alias = "email_verified")]
    pub email_verified: bool,
}

impl ActorContext {
    /// A signed-in identity with no claims set.
    pub fn signed_in(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
            ..Self::default()
        }
    }

    /// A verified, authorized identity with the given privilege claims.
    pub fn verified(uid: impl Into<String>, webmaster: bool, admin: bool) -> Self {
        Self {
            uid: Some(uid.into()),
            admin,
            webmaster,
            authorized: true,
            email_verified: true,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthLevel: four-level privilege rank
// ---------------------------------------------------------------------------

/// Derived privilege rank. Declaration order gives the total order
/// None < User < Webmaster < Admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuthLevel {
    None,
    User,
    Webmaster,
    Admin,
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthLevel::None => write!(f, "None"),
            AuthLevel::User => write!(f, "User"),
            AuthLevel::Webmaster => write!(f, "Webmaster"),
            AuthLevel::Admin => write!(f, "Admin"),
        }
    }
}

/// Collapse raw claims into an `AuthLevel`.
///
/// Every level requires `authorized && email_verified`; an absent context
/// is anonymous and resolves to `None`.
pub fn resolve_auth_level(context: Option<&ActorContext>) -> AuthLevel {
    let Some(ctx) = context else {
        return AuthLevel::None;
    };
    if !(ctx.authorized && ctx.email_verified) {
        return AuthLevel::None;
    }
    match (ctx.webmaster, ctx.admin) {
        (true, true) => AuthLevel::Admin,
        (true, false) => AuthLevel::Webmaster,
        // admin without webmaster grants nothing beyond a user
        (false, _) => AuthLevel::User,
    }
}

// ---------------------------------------------------------------------------
// Actor: what the engine sees: level + uid
// ---------------------------------------------------------------------------

/// A resolved requester. Built fresh for each request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub uid: Option<Uid>,
    pub level: AuthLevel,
}

impl Actor {
    pub fn new(uid: impl Into<Uid>, level: AuthLevel) -> Self {
        Self {
            uid: Some(uid.into()),
            level,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            uid: None,
            level: AuthLevel::None,
        }
    }

    /// Resolve an actor from an optional identity assertion.
    ///
    /// Claims without a uid, or an empty uid, cannot come from a real
    /// identity provider and are rejected as malformed.
    pub fn from_context(context: Option<&ActorContext>) -> PolicyResult<Self> {
        let Some(ctx) = context else {
            return Ok(Self::anonymous());
        };
        let uid = match ctx.uid.as_deref() {
            Some(raw) if raw.trim().is_empty() => {
                return Err(PolicyError::MalformedActor("uid is empty".to_string()));
            }
            Some(raw) => Some(Uid::new(raw)),
            None if ctx.admin || ctx.webmaster || ctx.authorized || ctx.email_verified => {
                return Err(PolicyError::MalformedActor(
                    "claims present without a uid".to_string(),
                ));
            }
            None => None,
        };
        Ok(Self {
            uid,
            level: resolve_auth_level(Some(ctx)),
        })
    }

    pub fn at_least(&self, level: AuthLevel) -> bool {
        self.level >= level
    }

    /// Whether this actor's uid equals `uid`. Anonymous actors own nothing.
    pub fn is(&self, uid: &str) -> bool {
        self.uid.as_ref().is_some_and(|own| own.as_str() == uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(admin: bool, webmaster: bool, authorized: bool, verified: bool) -> ActorContext {
        ActorContext {
            uid: Some("u".into()),
            admin,
            webmaster,
            authorized,
            email_verified: verified,
        }
    }

    #[test]
    fn test_auth_level_ordering() {
        assert!(AuthLevel::Admin > AuthLevel::Webmaster);
        assert!(AuthLevel::Webmaster > AuthLevel::User);
        assert!(AuthLevel::User > AuthLevel::None);
    }

    #[test]
    fn test_resolve_all_claim_combinations() {
        for bits in 0u8..16 {
            let (admin, webmaster, authorized, verified) =
                (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0);
            let level = resolve_auth_level(Some(&ctx(admin, webmaster, authorized, verified)));
            let expected = if !(authorized && verified) {
                AuthLevel::None
            } else if admin && webmaster {
                AuthLevel::Admin
            } else if webmaster {
                AuthLevel::Webmaster
            } else {
                AuthLevel::User
            };
            assert_eq!(level, expected, "claims bits {bits:04b}");
        }
    }

    #[test]
    fn test_dropping_admin_keeps_webmaster() {
        let admin = ctx(true, true, true, true);
        let mut demoted = admin.clone();
        demoted.admin = false;
        assert_eq!(resolve_auth_level(Some(&admin)), AuthLevel::Admin);
        assert_eq!(resolve_auth_level(Some(&demoted)), AuthLevel::Webmaster);
    }

    #[test]
    fn test_unverified_email_is_none() {
        assert_eq!(
            resolve_auth_level(Some(&ctx(true, true, true, false))),
            AuthLevel::None
        );
    }

    #[test]
    fn test_absent_context_is_none() {
        assert_eq!(resolve_auth_level(None), AuthLevel::None);
        assert_eq!(Actor::from_context(None).unwrap(), Actor::anonymous());
    }

    #[test]
    fn test_from_context_keeps_uid_for_unprivileged_sign_in() {
        let actor = Actor::from_context(Some(&ActorContext::signed_in("person"))).unwrap();
        assert_eq!(actor.level, AuthLevel::None);
        assert!(actor.is("person"));
    }

    #[test]
    fn test_from_context_rejects_malformed() {
        let empty_uid = ActorContext {
            uid: Some("  ".into()),
            ..ActorContext::default()
        };
        assert!(matches!(
            Actor::from_context(Some(&empty_uid)),
            Err(PolicyError::MalformedActor(_))
        ));

        let claims_without_uid = ActorContext {
            uid: None,
            authorized: true,
            ..ActorContext::default()
        };
        assert!(Actor::from_context(Some(&claims_without_uid)).is_err());
    }

    #[test]
    fn test_context_deserializes_both_spellings() {
        let camel: ActorContext =
            serde_json::from_str(r#"{"uid":"a","authorized":true,"emailVerified":true}"#).unwrap();
        let snake: ActorContext =
            serde_json::from_str(r#"{"uid":"a","authorized":true,"email_verified":true}"#).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(resolve_auth_level(Some(&camel)), AuthLevel::User);
    }

    #[test]
    fn test_anonymous_owns_nothing() {
        assert!(!Actor::anonymous().is(""));
    }
}
