//! Topic names, subscription patterns, and wildcard matching.
//!
//! Topics are dot-separated strings like `products.item.save`. Patterns are
//! topics that may additionally contain `*` (exactly one segment) or a
//! trailing `**` (zero or more segments). Only subscriptions use patterns;
//! publish topics must be fully literal.

use std::sync::{Arc, RwLock};

/// Single-level wildcard segment.
pub const WILDCARD: &str = "*";

/// Multi-level wildcard segment, only valid as the final pattern segment.
pub const WILDCARD_DEEP: &str = "**";

/// Maximum topic name length.
pub const MAX_TOPIC_LENGTH: usize = 256;

fn check_segments(name: &str, allow_wildcards: bool) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("topic cannot be empty");
    }
    if name.len() > MAX_TOPIC_LENGTH {
        return Err("topic too long");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("topic contains invalid characters");
    }

    let segments: Vec<&str> = name.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err("topic contains an empty segment");
        }
        match *segment {
            WILDCARD if allow_wildcards => {}
            WILDCARD_DEEP if allow_wildcards => {
                if i != segments.len() - 1 {
                    return Err("'**' is only allowed as the final segment");
                }
            }
            s if s.contains('*') => {
                return Err(if allow_wildcards {
                    "wildcard must be a whole segment"
                } else {
                    "publish topics cannot contain wildcards"
                });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Validate a publish topic. Wildcard tokens are rejected.
///
/// # Errors
///
/// Returns an error message if the topic is malformed.
pub fn validate_topic(topic: &str) -> Result<(), &'static str> {
    check_segments(topic, false)
}

/// Validate a subscription pattern. `*` may appear as any whole segment and
/// `**` only as the final segment.
///
/// # Errors
///
/// Returns an error message if the pattern is malformed.
pub fn validate_pattern(pattern: &str) -> Result<(), &'static str> {
    check_segments(pattern, true)
}

/// Check whether a subscription pattern matches a published topic.
///
/// Pure and deterministic: literal segments compare exactly (case-sensitive),
/// `*` consumes exactly one segment, a trailing `**` consumes all remaining
/// segments including zero. An empty pattern matches only an empty topic.
#[must_use]
pub fn matches(pattern: &str, topic: &str) -> bool {
    if pattern.is_empty() || topic.is_empty() {
        return pattern.is_empty() && topic.is_empty();
    }

    let pattern_segments: Vec<&str> = pattern.split('.').collect();
    let topic_segments: Vec<&str> = topic.split('.').collect();

    for (i, p) in pattern_segments.iter().enumerate() {
        if *p == WILDCARD_DEEP && i == pattern_segments.len() - 1 {
            // Everything up to here matched; `**` swallows the rest.
            return i <= topic_segments.len();
        }
        match topic_segments.get(i) {
            Some(t) if *p == WILDCARD || p == t => {}
            _ => return false,
        }
    }

    pattern_segments.len() == topic_segments.len()
}

/// How specific a pattern is, used for deterministic delivery precedence.
///
/// Literal-only patterns are delivered before single-wildcard patterns,
/// which are delivered before multi-wildcard patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Specificity {
    /// No wildcard segments.
    Literal,
    /// Contains `*` but no `**`.
    SingleWildcard,
    /// Ends with `**`.
    MultiWildcard,
}

impl Specificity {
    /// Rank a pattern.
    #[must_use]
    pub fn of(pattern: &str) -> Self {
        let mut rank = Specificity::Literal;
        for segment in pattern.split('.') {
            match segment {
                WILDCARD_DEEP => return Specificity::MultiWildcard,
                WILDCARD => rank = Specificity::SingleWildcard,
                _ => {}
            }
        }
        rank
    }
}

type FilterFn = dyn Fn(&str) -> bool + Send + Sync;

/// A shared, swappable topic predicate.
///
/// Used as the mirror privacy filter: the bridge consults it on both send and
/// receive, and `Bus::set_mirror_filter` swaps the predicate at runtime.
/// The default filter allows every topic.
#[derive(Clone)]
pub struct TopicFilter {
    allow: Arc<RwLock<Arc<FilterFn>>>,
}

impl TopicFilter {
    /// Create a filter that allows every topic.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::new(|_| true)
    }

    /// Create a filter from a predicate.
    #[must_use]
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            allow: Arc::new(RwLock::new(Arc::new(predicate))),
        }
    }

    /// Create a filter that allows topics matching any of the given patterns.
    #[must_use]
    pub fn patterns(patterns: Vec<String>) -> Self {
        Self::new(move |topic| patterns.iter().any(|p| matches(p, topic)))
    }

    /// Replace the predicate.
    pub fn set(&self, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) {
        *self.allow.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(predicate);
    }

    /// Check whether a topic passes the filter.
    #[must_use]
    pub fn allows(&self, topic: &str) -> bool {
        let predicate = self
            .allow
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        predicate(topic)
    }
}

impl Default for TopicFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl std::fmt::Debug for TopicFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicFilter").finish_non_exhaustive()
    }
}
