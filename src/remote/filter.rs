//! Tool-name admission filtering for federated servers.
//!
//! Each upstream carries four lists: exact allow, exact deny, glob
//! allow, glob deny. When any allow list is non-empty the tool must
//! match at least one allow entry; otherwise it must not match any deny
//! entry.
//!
//! # Pattern Syntax
//!
//! Globs use the same wildcards as the rest of the project:
//!
//! - `*` matches any sequence of characters
//! - `?` matches any single character
//! - `[abc]` matches any character in the set
//!
//! Invalid patterns are skipped (never match).

use glob::Pattern;
use tracing::warn;

use crate::remote::config::ServerConfig;

/// Compiled admission filter for one upstream server.
#[derive(Debug, Default)]
pub struct ToolFilter {
    allow: Vec<String>,
    deny: Vec<String>,
    allow_glob: Vec<Pattern>,
    deny_glob: Vec<Pattern>,
}

impl ToolFilter {
    /// Compiles the filter lists of a server configuration.
    ///
    /// Invalid glob patterns are dropped with a warning rather than
    /// failing the whole server.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            allow: config.tool_allow.clone(),
            deny: config.tool_deny.clone(),
            allow_glob: compile(&config.tool_allow_glob, &config.name),
            deny_glob: compile(&config.tool_deny_glob, &config.name),
        }
    }

    /// Whether a tool name is admitted.
    #[must_use]
    pub fn allowed(&self, name: &str) -> bool {
        let has_allow = !self.allow.is_empty() || !self.allow_glob.is_empty();
        if has_allow {
            return self.matches_allow(name);
        }
        !self.matches_deny(name)
    }

    fn matches_allow(&self, name: &str) -> bool {
        self.allow.iter().any(|entry| entry == name)
            || self.allow_glob.iter().any(|pattern| pattern.matches(name))
    }

    fn matches_deny(&self, name: &str) -> bool {
        self.deny.iter().any(|entry| entry == name)
            || self.deny_glob.iter().any(|pattern| pattern.matches(name))
    }
}

fn compile(patterns: &[String], server: &str) -> Vec<Pattern> {
    patterns
        .iter()
        .filter(|raw| !raw.is_empty())
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!(server = %server, pattern = %raw, error = %err.msg, "skipping invalid glob");
                None
            }
        })
        .collect()
}
