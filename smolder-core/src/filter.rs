//! Glob-based route selection.
//!
//! `*` matches within one path segment, `**` matches zero or more whole
//! segments. A route is selected iff (the include list is empty OR at least
//! one include matches) AND no exclude matches. Method selection is an
//! independent set. Matching is pure and total.

use std::collections::BTreeSet;

use http::Method;

use crate::route::RouteSpec;

/// A parsed path glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    raw: String,
    segments: Vec<String>,
}

impl Glob {
    /// Parse a glob pattern. Leading `/` is stripped so `/users/**` and
    /// `users/**` agree.
    pub fn new(pattern: &str) -> Self {
        let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
        Self {
            raw: pattern.to_string(),
            segments: trimmed.split('/').map(str::to_string).collect(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match against a path (leading `/` stripped before comparison).
    pub fn matches(&self, path: &str) -> bool {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let segs: Vec<&str> = trimmed.split('/').collect();
        match_segments(&self.segments, &segs)
    }

    /// Count of literal (non-wildcard) characters, used for longest-match
    /// override resolution.
    pub fn literal_len(&self) -> usize {
        self.segments
            .iter()
            .map(|s| s.chars().filter(|c| *c != '*').count())
            .sum()
    }
}

fn match_segments(pattern: &[String], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(p) if p == "**" => {
            // `**` absorbs zero or more whole segments.
            if match_segments(&pattern[1..], path) {
                return true;
            }
            !path.is_empty() && match_segments(pattern, &path[1..])
        }
        Some(p) => match path.first() {
            Some(seg) => match_one(p, seg) && match_segments(&pattern[1..], &path[1..]),
            None => false,
        },
    }
}

/// Wildcard match within a single segment: `*` matches any run of characters
/// (never `/`, segments are pre-split).
fn match_one(pattern: &str, segment: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = segment.chars().collect();
    let (mut pi, mut si) = (0usize, 0usize);
    let (mut star, mut mark) = (None::<usize>, 0usize);
    while si < s.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = si;
            pi += 1;
        } else if pi < p.len() && p[pi] == s[si] {
            pi += 1;
            si += 1;
        } else if let Some(sp) = star {
            pi = sp + 1;
            mark += 1;
            si = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Include/exclude filter over a route set.
#[derive(Debug, Clone, Default)]
pub struct RouteFilter {
    include: Vec<Glob>,
    exclude: Vec<Glob>,
    methods: Option<BTreeSet<Method>>,
}

impl RouteFilter {
    /// A filter that selects everything.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(include: &[&str], exclude: &[&str]) -> Self {
        Self {
            include: include.iter().map(|p| Glob::new(p)).collect(),
            exclude: exclude.iter().map(|p| Glob::new(p)).collect(),
            methods: None,
        }
    }

    pub fn include(mut self, pattern: &str) -> Self {
        self.include.push(Glob::new(pattern));
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.exclude.push(Glob::new(pattern));
        self
    }

    /// Restrict to the given methods; absent means all methods.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    /// Whether a route's path is selected, ignoring methods.
    pub fn selects_path(&self, path: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|g| g.matches(path));
        included && !self.exclude.iter().any(|g| g.matches(path))
    }

    /// The subset of a route's methods that pass the method filter.
    pub fn selected_methods(&self, route: &RouteSpec) -> Vec<Method> {
        route
            .methods()
            .iter()
            .filter(|m| self.methods.as_ref().is_none_or(|set| set.contains(*m)))
            .cloned()
            .collect()
    }

    /// Apply the filter to a route set, preserving order.
    pub fn apply<'a>(&self, routes: &'a [RouteSpec]) -> Vec<&'a RouteSpec> {
        routes
            .iter()
            .filter(|r| self.selects_path(r.path()) && !self.selected_methods(r).is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typeref::TypeRef;

    #[test]
    fn star_stays_within_a_segment() {
        let g = Glob::new("/users/*");
        assert!(g.matches("/users/42"));
        assert!(!g.matches("/users/42/posts"));
        assert!(!g.matches("/users"));
    }

    #[test]
    fn double_star_spans_segments() {
        let g = Glob::new("/users/**");
        assert!(g.matches("/users"));
        assert!(g.matches("/users/42"));
        assert!(g.matches("/users/42/posts/7"));
        assert!(!g.matches("/accounts/42"));
    }

    #[test]
    fn embedded_star_matches_partial_segment() {
        let g = Glob::new("/api/v*/users");
        assert!(g.matches("/api/v1/users"));
        assert!(g.matches("/api/v22/users"));
        assert!(!g.matches("/api/x1/users"));
    }

    #[test]
    fn leading_slash_is_insignificant() {
        assert!(Glob::new("users/**").matches("/users/1"));
        assert!(Glob::new("/users/**").matches("users/1"));
    }

    fn routes() -> Vec<RouteSpec> {
        vec![
            RouteSpec::builder("/health").method(Method::GET).build().unwrap(),
            RouteSpec::builder("/users/{id:int}").method(Method::GET).build().unwrap(),
            RouteSpec::builder("/users")
                .method(Method::POST)
                .body(TypeRef::record(vec![]))
                .build()
                .unwrap(),
        ]
    }

    #[test]
    fn include_exclude_selection() {
        let routes = routes();
        let filter = RouteFilter::new(&["/users/**"], &[]);
        let selected = filter.apply(&routes);
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|r| r.path().starts_with("/users")));

        let filter = RouteFilter::new(&[], &["/health"]);
        assert_eq!(filter.apply(&routes).len(), 2);

        let filter = RouteFilter::all();
        assert_eq!(filter.apply(&routes).len(), 3);
    }

    #[test]
    fn exclude_wins_over_include() {
        let routes = routes();
        let filter = RouteFilter::new(&["/users/**"], &["/users/{id:int}"]);
        // The exclude glob is matched literally against the pattern string,
        // which contains `{id:int}` - so it only drops an exact match.
        assert_eq!(filter.apply(&routes).len(), 1);
    }

    #[test]
    fn method_filter_is_independent() {
        let routes = routes();
        let filter = RouteFilter::all().methods([Method::POST]);
        let selected = filter.apply(&routes);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].path(), "/users");
    }
}
