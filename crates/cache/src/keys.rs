use std::fmt;

use common::UserId;

/// Per-user cache keys. Each variant renders into its own namespace so a
/// cart view can never collide with a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Materialized cart view.
    CartView(UserId),
    /// Session token.
    Token(UserId),
}

impl CacheKey {
    pub fn namespace(&self) -> &'static str {
        match self {
            CacheKey::CartView(_) => "cart",
            CacheKey::Token(_) => "token",
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            CacheKey::CartView(user_id) | CacheKey::Token(user_id) => *user_id,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace(), self.user_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_user() {
        let user = UserId::new();
        assert_eq!(CacheKey::CartView(user).to_string(), format!("cart:{user}"));
        assert_eq!(CacheKey::Token(user).to_string(), format!("token:{user}"));
        assert_ne!(
            CacheKey::CartView(user).to_string(),
            CacheKey::CartView(UserId::new()).to_string()
        );
    }
}
