//! Identifier normalization.
//!
//! Operators write bare logins, alias localparts and group localparts in
//! manifests; everything the engine and the wire client see is fully
//! qualified. Normalization is total and pure: already-qualified input
//! passes through untouched.

/// Qualifies human-entered names against a homeserver domain.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    domain: String,
}

impl IdentityResolver {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
        }
    }

    /// The domain identifiers are qualified against.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// `login` → `@login:domain`, unless already of the `@x:y` form.
    pub fn user_id(&self, login: &str) -> String {
        if login.starts_with('@') && login.contains(':') {
            return login.to_string();
        }
        format!("@{}:{}", login, self.domain)
    }

    /// `name` → `#name:domain`, unless already a qualified alias (`#x:y`)
    /// or a room id (`!x:y`).
    pub fn room_alias(&self, name: &str) -> String {
        if (name.starts_with('#') || name.starts_with('!')) && name.contains(':') {
            return name.to_string();
        }
        format!("#{}:{}", name, self.domain)
    }

    /// `localpart` → `+localpart:domain`, unless already qualified.
    pub fn group_id(&self, localpart: &str) -> String {
        if localpart.starts_with('+') && localpart.contains(':') {
            return localpart.to_string();
        }
        format!("+{}:{}", localpart, self.domain)
    }

    /// `localpart` → `!localpart:domain`, unless already qualified.
    pub fn space_id(&self, localpart: &str) -> String {
        if localpart.starts_with('!') && localpart.contains(':') {
            return localpart.to_string();
        }
        format!("!{}:{}", localpart, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new("example.com")
    }

    #[test]
    fn qualifies_bare_login() {
        assert_eq!(resolver().user_id("alice"), "@alice:example.com");
    }

    #[test]
    fn qualified_login_passes_through() {
        assert_eq!(
            resolver().user_id("@alice:other.net"),
            "@alice:other.net"
        );
    }

    #[test]
    fn login_with_colon_but_no_sigil_is_qualified() {
        // "a:b" is not a user id; it still gets the local domain.
        assert_eq!(resolver().user_id("a:b"), "@a:b:example.com");
    }

    #[test]
    fn room_alias_forms() {
        let r = resolver();
        assert_eq!(r.room_alias("ops"), "#ops:example.com");
        assert_eq!(r.room_alias("#ops:example.com"), "#ops:example.com");
        assert_eq!(r.room_alias("!abc:example.com"), "!abc:example.com");
    }

    #[test]
    fn group_and_space_forms() {
        let r = resolver();
        assert_eq!(r.group_id("team"), "+team:example.com");
        assert_eq!(r.group_id("+team:other.net"), "+team:other.net");
        assert_eq!(r.space_id("hq"), "!hq:example.com");
        assert_eq!(r.space_id("!hq:other.net"), "!hq:other.net");
    }
}
