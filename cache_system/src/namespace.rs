//! Key prefixes isolating adapters that share one physical backend

use std::fmt;
use uuid::Uuid;

/// Prefix concatenated with every key before it reaches the backend.
/// Fixed for the lifetime of the adapter holding it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Use the given prefix verbatim
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    /// Derive a stable prefix from a seed. The same seed yields the same
    /// prefix in every process, so independent deployments can share entries.
    pub fn from_seed(seed: &str) -> Self {
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        Self(format!("{}:", id.simple()))
    }

    /// Random prefix, private to this adapter instance
    pub fn generate() -> Self {
        Self(format!("{}:", Uuid::new_v4().simple()))
    }

    /// Pick the prefix the way configuration asks for it:
    /// explicit prefix, then seed, then a generated one.
    pub fn resolve(explicit: Option<&str>, seed: Option<&str>) -> Self {
        match (explicit, seed) {
            (Some(prefix), _) => Self::new(prefix),
            (None, Some(seed)) => Self::from_seed(seed),
            (None, None) => {
                let generated = Self::generate();
                tracing::warn!(
                    namespace = %generated,
                    "no namespace configured, generated one is not shared across processes"
                );
                generated
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn apply(&self, key: &str) -> String {
        let mut prefixed = String::with_capacity(self.0.len() + key.len());
        prefixed.push_str(&self.0);
        prefixed.push_str(key);
        prefixed
    }

    pub fn strip<'a>(&self, prefixed: &'a str) -> Option<&'a str> {
        prefixed.strip_prefix(self.0.as_str())
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_strip() {
        let ns = Namespace::new("app:");
        assert_eq!(ns.apply("user:1"), "app:user:1");
        assert_eq!(ns.strip("app:user:1"), Some("user:1"));
        assert_eq!(ns.strip("other:user:1"), None);
    }

    #[test]
    fn test_seed_is_deterministic() {
        assert_eq!(Namespace::from_seed("pages"), Namespace::from_seed("pages"));
        assert_ne!(Namespace::from_seed("pages"), Namespace::from_seed("sessions"));
    }

    #[test]
    fn test_generated_are_distinct() {
        assert_ne!(Namespace::generate(), Namespace::generate());
    }

    #[test]
    fn test_resolve_precedence() {
        assert_eq!(Namespace::resolve(Some("x:"), Some("seed")).as_str(), "x:");
        assert_eq!(Namespace::resolve(None, Some("seed")), Namespace::from_seed("seed"));
        assert!(Namespace::resolve(None, None).as_str().ends_with(':'));
    }
}
