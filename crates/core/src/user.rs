//! Polymorphic user identity (SPEC §3, §9 "Polymorphic user variants").
//!
//! Three account kinds share one core record and resolve to the same
//! [`LoginContext`] for anything downstream of authentication. Concrete
//! credential verification for each variant is out of scope; [`AuthProvider`]
//! is the seam a real implementation would sit behind.

use crate::ids::UserId;
use serde::{Deserialize, Serialize};

/// Fields every account kind carries regardless of how it authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub id: UserId,
    pub email: String,
    pub is_admin: bool,
    /// Terms-of-service version the user last accepted, if any.
    pub accepted_terms_version: Option<String>,
    /// A provisioned user's existence and credentials come from
    /// configuration rather than self-signup; cleanup exempts them.
    pub provisioned: bool,
}

/// A local account: password-based, with an email-verification flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub password_hash: String,
    pub email_verified: bool,
}

/// An account federated through an OIDC identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcAccount {
    pub issuer: String,
    pub subject: String,
}

/// An account backed by a directory service (LDAP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapAccount {
    pub directory_name: String,
    pub unique_id: String,
}

/// The tagged sum over the three account kinds (SPEC §3 "User").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserIdentity {
    Local { core: UserCore, account: LocalAccount },
    Oidc { core: UserCore, account: OidcAccount },
    Ldap { core: UserCore, account: LdapAccount },
}

impl UserIdentity {
    pub fn core(&self) -> &UserCore {
        match self {
            UserIdentity::Local { core, .. }
            | UserIdentity::Oidc { core, .. }
            | UserIdentity::Ldap { core, .. } => core,
        }
    }

    /// Resolves any account variant to the shared context downstream
    /// authorisation code depends on (SPEC §9).
    pub fn login_context(&self) -> LoginContext {
        let core = self.core();
        LoginContext {
            id: core.id,
            email: core.email.clone(),
            is_admin: core.is_admin,
        }
    }
}

/// What's left of a [`UserIdentity`] once authentication has happened: the
/// only shape downstream authorisation code should need to look at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoginContext {
    pub id: UserId,
    pub email: String,
    pub is_admin: bool,
}

/// Seam for verifying a caller's credential and producing a [`LoginContext`].
/// Concrete local/OIDC/LDAP verification is out of scope; this boundary and
/// [`InMemoryAuthProvider`] are all that's implemented here.
pub trait AuthProvider: Send + Sync {
    /// Opaque credential in, login context out. `None` means "not recognised".
    fn authenticate(&self, credential: &str) -> Option<LoginContext>;
}

/// Test double mapping literal credential strings to login contexts.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthProvider {
    users: std::collections::HashMap<String, LoginContext>,
}

impl InMemoryAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, credential: impl Into<String>, ctx: LoginContext) -> Self {
        self.users.insert(credential.into(), ctx);
        self
    }
}

impl AuthProvider for InMemoryAuthProvider {
    fn authenticate(&self, credential: &str) -> Option<LoginContext> {
        self.users.get(credential).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(id: i64, admin: bool) -> UserCore {
        UserCore {
            id: UserId::new(id),
            email: format!("user{id}@example.invalid"),
            is_admin: admin,
            accepted_terms_version: None,
            provisioned: false,
        }
    }

    #[test]
    fn every_variant_resolves_to_a_login_context() {
        let local = UserIdentity::Local {
            core: core(1, false),
            account: LocalAccount {
                password_hash: "hash".into(),
                email_verified: true,
            },
        };
        let oidc = UserIdentity::Oidc {
            core: core(2, true),
            account: OidcAccount {
                issuer: "https://idp.example.invalid".into(),
                subject: "sub-123".into(),
            },
        };
        let ldap = UserIdentity::Ldap {
            core: core(3, false),
            account: LdapAccount {
                directory_name: "cn=user3".into(),
                unique_id: "uid-3".into(),
            },
        };

        assert_eq!(local.login_context().id, UserId::new(1));
        assert!(!local.login_context().is_admin);
        assert!(oidc.login_context().is_admin);
        assert_eq!(ldap.login_context().email, "user3@example.invalid");
    }

    #[test]
    fn in_memory_auth_provider_looks_up_by_credential() {
        let ctx = LoginContext {
            id: UserId::new(7),
            email: "u7@example.invalid".into(),
            is_admin: false,
        };
        let provider = InMemoryAuthProvider::new().with_user("token-abc", ctx.clone());
        assert_eq!(provider.authenticate("token-abc"), Some(ctx));
        assert_eq!(provider.authenticate("unknown"), None);
    }
}
