use crate::types::Uid;

/// Who is making a store request, as derived by the store itself.
///
/// A `Caller` can only be built from a verified identity and a role the
/// store looked up on its own. Nothing from a request payload feeds into
/// it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    uid: Option<Uid>,
    is_admin: bool,
}

impl Caller {
    /// A request that carried no (valid) identity token.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            uid: None,
            is_admin: false,
        }
    }

    /// A verified identity and its store-derived admin flag.
    #[must_use]
    pub const fn authenticated(uid: Uid, is_admin: bool) -> Self {
        Self {
            uid: Some(uid),
            is_admin,
        }
    }

    #[must_use]
    pub const fn uid(&self) -> Option<&Uid> {
        self.uid.as_ref()
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.uid.is_some()
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Whether the caller is the identity `uid`.
    #[must_use]
    pub fn is(&self, uid: &str) -> bool {
        self.uid.as_ref().is_some_and(|own| own.as_str() == uid)
    }
}
