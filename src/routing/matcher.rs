//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile `/users/:id` style patterns into segment lists
//! - Match request paths segment by segment
//! - Extract named parameters in declaration order
//!
//! # Design Decisions
//! - Literal segments compare ASCII case-insensitively
//! - A single trailing slash on the request path is ignored
//! - Parameter values are returned as-is (no percent-decoding)
//! - No regex: matching is a single pass over the segments

/// One or more path patterns registered together.
///
/// A set of patterns is matched with OR semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec(Vec<String>);

impl PathSpec {
    pub fn patterns(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for PathSpec {
    fn from(path: &str) -> Self {
        Self(vec![path.to_string()])
    }
}

impl From<String> for PathSpec {
    fn from(path: String) -> Self {
        Self(vec![path])
    }
}

impl From<&String> for PathSpec {
    fn from(path: &String) -> Self {
        Self(vec![path.clone()])
    }
}

impl From<Vec<String>> for PathSpec {
    fn from(paths: Vec<String>) -> Self {
        Self(paths)
    }
}

impl From<Vec<&str>> for PathSpec {
    fn from(paths: Vec<&str>) -> Self {
        Self(paths.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for PathSpec {
    fn from(paths: &[&str]) -> Self {
        Self(paths.iter().map(|p| p.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for PathSpec {
    fn from(paths: [&str; N]) -> Self {
        Self(paths.iter().map(|p| p.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param { name: String, optional: bool },
    Wildcard { name: String },
}

/// A single compiled pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
    keys: Vec<String>,
}

impl PathPattern {
    /// Compile a pattern such as `/users/:id`, `/files/*` or `/posts/:slug?`.
    pub fn compile(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut keys = Vec::new();
        let mut wildcards = 0usize;

        for raw in split_path(source) {
            if raw == "*" {
                let name = wildcards.to_string();
                wildcards += 1;
                keys.push(name.clone());
                segments.push(Segment::Wildcard { name });
            } else if let Some(param) = raw.strip_prefix(':') {
                let (name, optional) = match param.strip_suffix('?') {
                    Some(name) => (name, true),
                    None => (param, false),
                };
                keys.push(name.to_string());
                segments.push(Segment::Param {
                    name: name.to_string(),
                    optional,
                });
            } else {
                segments.push(Segment::Literal(raw.to_string()));
            }
        }

        Self {
            source: source.to_string(),
            segments,
            keys,
        }
    }

    /// The pattern as it was written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names in positional order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Match `path` and return the captured `(name, value)` pairs, ordered
    /// as [`keys`](Self::keys).
    ///
    /// Absent optional parameters are not reported.
    pub fn captures(&self, path: &str) -> Option<Vec<(String, String)>> {
        let walk = Walk {
            segments: &self.segments,
            parts: split_path(path),
            trailing_slash: path.ends_with('/'),
        };
        let mut values = Vec::with_capacity(self.keys.len());
        walk.step(0, 0, &mut values).then_some(values)
    }
}

/// Backtracking match of compiled segments against request path parts.
struct Walk<'a> {
    segments: &'a [Segment],
    parts: Vec<&'a str>,
    trailing_slash: bool,
}

impl Walk<'_> {
    fn step(&self, idx: usize, cursor: usize, values: &mut Vec<(String, String)>) -> bool {
        let Some(segment) = self.segments.get(idx) else {
            return cursor == self.parts.len();
        };
        let part = self.parts.get(cursor).copied();

        match segment {
            Segment::Literal(literal) => {
                part.is_some_and(|part| part.eq_ignore_ascii_case(literal))
                    && self.step(idx + 1, cursor + 1, values)
            }
            Segment::Param { name, optional } => {
                if let Some(part) = part.filter(|part| !part.is_empty()) {
                    values.push((name.clone(), part.to_string()));
                    if self.step(idx + 1, cursor + 1, values) {
                        return true;
                    }
                    values.pop();
                }
                *optional && self.step(idx + 1, cursor, values)
            }
            Segment::Wildcard { name } => {
                // The slash before `*` is mandatory: an empty capture needs
                // `/prefix/` with nothing after it.
                let last = idx + 1 == self.segments.len();
                let min = if last && self.trailing_slash { 0 } else { 1 };
                let available = self.parts.len().saturating_sub(cursor);
                for take in (min..=available).rev() {
                    let end = cursor + take;
                    values.push((name.clone(), self.parts[cursor..end].join("/")));
                    if self.step(idx + 1, end, values) {
                        return true;
                    }
                    values.pop();
                }
                false
            }
        }
    }
}

/// Compiled form of a [`PathSpec`].
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<PathPattern>,
}

impl PathMatcher {
    pub fn new(spec: &PathSpec) -> Self {
        Self {
            patterns: spec.patterns().iter().map(|p| PathPattern::compile(p)).collect(),
        }
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    /// Returns the parameters of the first pattern matching `path`.
    pub fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        self.patterns.iter().find_map(|pattern| pattern.captures(path))
    }

    pub fn matches(&self, path: &str) -> bool {
        self.match_path(path).is_some()
    }
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = PathPattern::compile("/health");
        assert_eq!(pattern.captures("/health"), Some(vec![]));
        assert_eq!(pattern.captures("/health/"), Some(vec![]));
        assert_eq!(pattern.captures("/HEALTH"), Some(vec![]));
        assert!(pattern.captures("/health/deep").is_none());
        assert!(pattern.captures("/").is_none());
    }

    #[test]
    fn test_root_pattern() {
        let pattern = PathPattern::compile("/");
        assert!(pattern.captures("/").is_some());
        assert!(pattern.captures("/x").is_none());
    }

    #[test]
    fn test_param_extraction() {
        let pattern = PathPattern::compile("/users/:id");
        assert_eq!(pattern.keys(), &["id".to_string()]);
        assert_eq!(pattern.captures("/users/42"), Some(params(&[("id", "42")])));
        assert!(pattern.captures("/users").is_none());
        assert!(pattern.captures("/users/42/posts").is_none());
    }

    #[test]
    fn test_params_keep_declaration_order() {
        let pattern = PathPattern::compile("/orgs/:org/repos/:repo");
        assert_eq!(
            pattern.captures("/orgs/acme/repos/api"),
            Some(params(&[("org", "acme"), ("repo", "api")]))
        );
    }

    #[test]
    fn test_param_values_are_opaque() {
        let pattern = PathPattern::compile("/files/:name");
        assert_eq!(
            pattern.captures("/files/a%20b.txt"),
            Some(params(&[("name", "a%20b.txt")]))
        );
    }

    #[test]
    fn test_optional_param() {
        let pattern = PathPattern::compile("/posts/:slug?");
        assert_eq!(pattern.captures("/posts"), Some(vec![]));
        assert_eq!(pattern.captures("/posts/hello"), Some(params(&[("slug", "hello")])));
    }

    #[test]
    fn test_wildcard() {
        let pattern = PathPattern::compile("/static/*");
        assert_eq!(pattern.keys(), &["0".to_string()]);
        assert_eq!(
            pattern.captures("/static/css/site.css"),
            Some(params(&[("0", "css/site.css")]))
        );

        let anchored = PathPattern::compile("/a/*/edit");
        assert_eq!(anchored.captures("/a/x/y/edit"), Some(params(&[("0", "x/y")])));
        assert!(anchored.captures("/a/x/y").is_none());
        assert!(anchored.captures("/a/edit").is_none());
    }

    #[test]
    fn test_wildcard_needs_its_slash() {
        let pattern = PathPattern::compile("/static/*");
        assert!(pattern.captures("/static").is_none());
        assert_eq!(pattern.captures("/static/"), Some(params(&[("0", "")])));

        let root = PathPattern::compile("/*");
        assert_eq!(root.captures("/"), Some(params(&[("0", "")])));
        assert_eq!(root.captures("/a/b"), Some(params(&[("0", "a/b")])));
    }

    #[test]
    fn test_optional_param_before_literal() {
        let pattern = PathPattern::compile("/users/:id?/edit");
        assert_eq!(pattern.captures("/users/edit"), Some(vec![]));
        assert_eq!(pattern.captures("/users/7/edit"), Some(params(&[("id", "7")])));
        assert!(pattern.captures("/users/7").is_none());
    }

    #[test]
    fn test_or_of_patterns() {
        let matcher = PathMatcher::new(&PathSpec::from(["/a", "/b"]));
        assert!(matcher.matches("/a"));
        assert!(matcher.matches("/b"));
        assert!(!matcher.matches("/c"));
        assert!(!matcher.matches("/a/b"));
    }

    #[test]
    fn test_first_matching_pattern_drives_extraction() {
        let spec = PathSpec::from(vec!["/items/:first", "/items/:second"]);
        let matcher = PathMatcher::new(&spec);
        assert_eq!(matcher.match_path("/items/7"), Some(params(&[("first", "7")])));
    }
}
