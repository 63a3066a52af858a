//! Event-type filters.
//!
//! A [`Filter`] is a list of [`Matcher`]s combined with OR. The empty filter
//! accepts every event type in the namespace.

use regex::Regex;
use serde_json::Value;

use crate::errors::EventsError;

/// A single event-type predicate.
#[derive(Clone, Debug)]
pub enum Matcher {
    /// Accepts exactly this event type.
    Exact(String),
    /// Accepts event types the pattern finds a match in (unanchored).
    Pattern(Regex),
}

impl Matcher {
    /// Compile a pattern matcher.
    pub fn pattern(pattern: &str) -> Result<Self, EventsError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|e| EventsError::invalid_argument(format!("invalid pattern '{pattern}': {e}")))
    }

    /// Whether this matcher accepts `event_type`.
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == event_type,
            Self::Pattern(re) => re.is_match(event_type),
        }
    }
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

impl From<Regex> for Matcher {
    fn from(value: Regex) -> Self {
        Self::Pattern(value)
    }
}

/// The matchers a registration applies to incoming event types.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    matchers: Vec<Matcher>,
}

impl Filter {
    /// The filter that accepts everything.
    pub fn any() -> Self {
        Self::default()
    }

    /// A filter accepting one exact event type.
    pub fn exact(event_type: impl Into<String>) -> Self {
        Self {
            matchers: vec![Matcher::Exact(event_type.into())],
        }
    }

    /// Build a filter from loosely typed input.
    ///
    /// Accepts a string (exact), an object `{"pattern": "..."}`, or an array
    /// of those. Array entries that are neither, and patterns that fail to
    /// compile, are dropped. Any other top-level value yields the empty filter.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => items.iter().filter_map(matcher_from_value).collect(),
            other => matcher_from_value(other).into_iter().collect(),
        }
    }

    /// Add a matcher.
    #[must_use]
    pub fn with(mut self, matcher: impl Into<Matcher>) -> Self {
        self.matchers.push(matcher.into());
        self
    }

    /// Whether this filter has no matchers (accepts everything).
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// The matchers, in the order they were added.
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Whether `event_type` passes this filter.
    pub fn matches(&self, event_type: &str) -> bool {
        self.matchers.is_empty() || self.matchers.iter().any(|m| m.matches(event_type))
    }
}

fn matcher_from_value(value: &Value) -> Option<Matcher> {
    match value {
        Value::String(s) => Some(Matcher::Exact(s.clone())),
        Value::Object(obj) => obj
            .get("pattern")
            .and_then(Value::as_str)
            .and_then(|p| Matcher::pattern(p).ok()),
        _ => None,
    }
}

impl From<Matcher> for Filter {
    fn from(value: Matcher) -> Self {
        Self {
            matchers: vec![value],
        }
    }
}

impl From<&str> for Filter {
    fn from(value: &str) -> Self {
        Self::exact(value)
    }
}

impl From<String> for Filter {
    fn from(value: String) -> Self {
        Self::exact(value)
    }
}

impl From<Regex> for Filter {
    fn from(value: Regex) -> Self {
        Matcher::Pattern(value).into()
    }
}

impl From<Vec<Matcher>> for Filter {
    fn from(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }
}

impl FromIterator<Matcher> for Filter {
    fn from_iter<I: IntoIterator<Item = Matcher>>(iter: I) -> Self {
        Self {
            matchers: iter.into_iter().collect(),
        }
    }
}
