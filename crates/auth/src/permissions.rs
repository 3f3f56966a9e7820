use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier, `module.action` (e.g. "pos.checkout", "ledger.post").
///
/// `"*"` grants everything; `"pos.*"` grants every permission under `pos.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies a requirement for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(prefix) => required
                .as_str()
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_wildcard_covers_only_its_module() {
        let pos = Permission::new("pos.*");
        assert!(pos.grants(&Permission::new("pos.checkout")));
        assert!(pos.grants(&Permission::new("pos.shift.close")));
        assert!(!pos.grants(&Permission::new("posting.run")));
        assert!(!pos.grants(&Permission::new("ledger.post")));
    }

    #[test]
    fn star_grants_everything() {
        assert!(Permission::new("*").grants(&Permission::new("ledger.backfill")));
    }
}
