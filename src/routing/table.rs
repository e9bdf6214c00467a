//! Route table
//!
//! Ordered `(pattern, spec)` entries. Resolution picks the earliest entry
//! whose pattern matches the path and whose spec implements the method;
//! an entry lacking the method never shadows a later one.

use std::rc::Rc;

use regex::Regex;

use crate::error::RouteError;
use crate::handler::{HandlerMethod, HandlerSpec};

struct RouteEntry {
    pattern: Regex,
    spec: Rc<HandlerSpec>,
}

/// Result of a successful resolution
pub struct RouteMatch<'a> {
    pub spec: &'a Rc<HandlerSpec>,
    pub method: HandlerMethod,
    /// Capture groups, index 0 is the whole match; unmatched groups are empty
    pub args: Vec<String>,
}

#[derive(Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the spec's route and append it
    ///
    /// Duplicate routes are accepted; the later one is simply unreachable.
    pub fn register(&mut self, spec: HandlerSpec) -> Result<(), RouteError> {
        let pattern = Regex::new(spec.route()).map_err(|source| RouteError::InvalidPattern {
            route: spec.route().to_string(),
            source,
        })?;
        tracing::debug!(route = spec.route(), "route registered");
        self.entries.push(RouteEntry {
            pattern,
            spec: Rc::new(spec),
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the handler spec for `path` (query excluded) and `method`
    pub fn resolve(&self, path: &str, method: &str) -> Option<RouteMatch<'_>> {
        let method = HandlerMethod::from_name(method)?;

        self.entries.iter().find_map(|entry| {
            if !entry.spec.handles(method) {
                return None;
            }
            let captures = entry.pattern.captures(path)?;
            Some(RouteMatch {
                spec: &entry.spec,
                method,
                args: captures
                    .iter()
                    .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                    .collect(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(specs: Vec<HandlerSpec>) -> RouteTable {
        let mut table = RouteTable::new();
        for spec in specs {
            table.register(spec).unwrap();
        }
        table
    }

    #[test]
    fn test_capture_groups() {
        let routes = table(vec![HandlerSpec::new(r"^/page/(.+?)/(\d+)").get(|_| Ok(()))]);
        let matched = routes.resolve("/page/hello/42", "GET").unwrap();
        assert_eq!(matched.args, vec!["/page/hello/42", "hello", "42"]);
        assert_eq!(matched.method, HandlerMethod::Get);
    }

    #[test]
    fn test_first_registered_wins() {
        let routes = table(vec![
            HandlerSpec::new("^/a").get(|_| Ok(())).use_sessions(true),
            HandlerSpec::new("^/a").get(|_| Ok(())),
        ]);
        let matched = routes.resolve("/a/b", "get").unwrap();
        assert!(matched.spec.uses_sessions());
    }

    #[test]
    fn test_missing_method_does_not_shadow() {
        let routes = table(vec![
            HandlerSpec::new("^/item").post(|_| Ok(())),
            HandlerSpec::new(r"^/item/(\d+)").get(|_| Ok(())),
        ]);
        let matched = routes.resolve("/item/7", "GET").unwrap();
        assert_eq!(matched.spec.route(), r"^/item/(\d+)");
        assert_eq!(matched.args[1], "7");

        let matched = routes.resolve("/item/7", "POST").unwrap();
        assert_eq!(matched.spec.route(), "^/item");
    }

    #[test]
    fn test_not_found() {
        let routes = table(vec![HandlerSpec::new("^/only").get(|_| Ok(()))]);
        assert!(routes.resolve("/other", "GET").is_none());
        assert!(routes.resolve("/only", "PUT").is_none());
        assert!(routes.resolve("/only", "OPTIONS").is_none());
    }

    #[test]
    fn test_unanchored_pattern_matches_anywhere() {
        let routes = table(vec![HandlerSpec::new("styles/(.*)").get(|_| Ok(()))]);
        let matched = routes.resolve("/static/styles/site.css", "GET").unwrap();
        assert_eq!(matched.args, vec!["styles/site.css", "site.css"]);
    }

    #[test]
    fn test_unmatched_optional_group_is_empty() {
        let routes = table(vec![HandlerSpec::new(r"^/opt(/(\d+))?$").get(|_| Ok(()))]);
        let matched = routes.resolve("/opt", "GET").unwrap();
        assert_eq!(matched.args, vec!["/opt", "", ""]);
    }

    #[test]
    fn test_invalid_pattern() {
        let mut routes = RouteTable::new();
        let err = routes.register(HandlerSpec::new("^/(unclosed")).unwrap_err();
        assert!(err.to_string().contains("^/(unclosed"));
        assert!(routes.is_empty());
    }
}
