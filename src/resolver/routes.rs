//! Route table lookup
//!
//! Maps a URL path to the controller and action that serve it. Routes come
//! from configuration, with resource-style conventions as a fallback.

use crate::config::ConfigError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Controller and action serving a route
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteTarget {
    /// Controller path, e.g. `users` or `admin/users`
    pub controller: String,
    pub action: String,
}

impl RouteTarget {
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.controller, self.action)
    }
}

impl FromStr for RouteTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('#') {
            Some((controller, action)) if !controller.is_empty() && !action.is_empty() => {
                Ok(RouteTarget::new(controller, action))
            }
            _ => Err(format!("expected controller#action, got '{}'", s)),
        }
    }
}

/// Read-only router lookup
pub trait RouteTable: Send + Sync {
    fn lookup(&self, path: &str) -> Option<RouteTarget>;
}

fn segments(path: &str) -> Vec<&str> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Numeric ids, `:param` placeholders and UUIDs
fn is_id_segment(segment: &str) -> bool {
    if segment.starts_with(':') {
        return true;
    }
    if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    segment.len() == 36
        && segment.chars().filter(|&c| c == '-').count() == 4
        && segment.chars().all(|c| c == '-' || c.is_ascii_hexdigit())
}

/// Resource-style routing conventions
///
/// `/users` -> `users#index`, `/users/new` -> `users#new`,
/// `/users/1` -> `users#show`, `/users/1/edit` -> `users#edit`.
/// A segment followed by an id is a parent resource and is dropped
/// (`/users/1/posts` -> `posts#index`); other segments are namespaces
/// (`/admin/users` -> `admin/users#index`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionalRoutes;

impl RouteTable for ConventionalRoutes {
    fn lookup(&self, path: &str) -> Option<RouteTarget> {
        let segs = segments(path);
        let n = segs.len();
        if n == 0 {
            return None;
        }

        let (resource, action) = if segs[n - 1] == "new" && n >= 2 {
            (&segs[..n - 1], "new")
        } else if segs[n - 1] == "edit" && n >= 3 && is_id_segment(segs[n - 2]) {
            (&segs[..n - 2], "edit")
        } else if is_id_segment(segs[n - 1]) && n >= 2 {
            (&segs[..n - 1], "show")
        } else {
            (&segs[..], "index")
        };

        let controller: Vec<&str> = resource
            .iter()
            .enumerate()
            .filter(|(i, seg)| {
                !is_id_segment(seg)
                    && !resource.get(i + 1).map(|s| is_id_segment(s)).unwrap_or(false)
            })
            .map(|(_, seg)| *seg)
            .collect();

        if controller.is_empty() {
            return None;
        }
        Some(RouteTarget::new(controller.join("/"), action))
    }
}

#[derive(Debug, Clone)]
enum PatternSegment {
    Literal(String),
    Param,
    Glob,
}

#[derive(Debug, Clone)]
struct RoutePattern {
    source: String,
    segments: Vec<PatternSegment>,
}

impl RoutePattern {
    fn parse(pattern: &str) -> Self {
        let segments = segments(pattern)
            .into_iter()
            .map(|seg| {
                if seg.starts_with(':') {
                    PatternSegment::Param
                } else if seg.starts_with('*') {
                    PatternSegment::Glob
                } else {
                    PatternSegment::Literal(seg.to_string())
                }
            })
            .collect();
        Self {
            source: pattern.to_string(),
            segments,
        }
    }

    fn matches(&self, path: &[&str]) -> bool {
        let mut i = 0;
        for segment in &self.segments {
            match segment {
                PatternSegment::Glob => return true,
                PatternSegment::Param => {
                    if i >= path.len() {
                        return false;
                    }
                }
                PatternSegment::Literal(lit) => {
                    if path.get(i) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
            i += 1;
        }
        i == path.len()
    }

    /// Literal segments count more than parameters
    fn specificity(&self) -> (usize, usize) {
        let literals = self
            .segments
            .iter()
            .filter(|s| matches!(s, PatternSegment::Literal(_)))
            .count();
        let glob = self
            .segments
            .iter()
            .any(|s| matches!(s, PatternSegment::Glob));
        (usize::from(!glob), literals)
    }
}

/// Routes declared in configuration
#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    routes: Vec<(RoutePattern, RouteTarget)>,
    fallback: Option<ConventionalRoutes>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes from a `pattern -> controller#action` map, with conventional fallback
    pub fn from_config(routes: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut table = Self::new().with_fallback();
        for (pattern, target) in routes {
            let target = target.parse::<RouteTarget>().map_err(ConfigError::Invalid)?;
            table.add(pattern, target);
        }
        Ok(table)
    }

    pub fn add(&mut self, pattern: &str, target: RouteTarget) {
        self.routes.push((RoutePattern::parse(pattern), target));
        // Most specific first; stable for equal specificity
        self.routes
            .sort_by(|a, b| b.0.specificity().cmp(&a.0.specificity()));
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback = Some(ConventionalRoutes);
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteTable for StaticRoutes {
    fn lookup(&self, path: &str) -> Option<RouteTarget> {
        let segs = segments(path);
        if let Some((pattern, target)) = self.routes.iter().find(|(p, _)| p.matches(&segs)) {
            log::debug!("Route {} matched {} -> {}", path, pattern.source, target);
            return Some(target.clone());
        }
        self.fallback.as_ref().and_then(|f| f.lookup(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conventional(path: &str) -> Option<String> {
        ConventionalRoutes.lookup(path).map(|t| t.to_string())
    }

    #[test]
    fn test_conventional_resources() {
        assert_eq!(conventional("/users").as_deref(), Some("users#index"));
        assert_eq!(conventional("/users/new").as_deref(), Some("users#new"));
        assert_eq!(conventional("/users/42").as_deref(), Some("users#show"));
        assert_eq!(conventional("/users/:id").as_deref(), Some("users#show"));
        assert_eq!(conventional("/users/42/edit").as_deref(), Some("users#edit"));
        assert_eq!(conventional("/users/?page=2").as_deref(), Some("users#index"));
    }

    #[test]
    fn test_conventional_namespaces_and_nesting() {
        assert_eq!(conventional("/admin/users").as_deref(), Some("admin/users#index"));
        assert_eq!(conventional("/admin/users/7").as_deref(), Some("admin/users#show"));
        assert_eq!(conventional("/users/1/posts").as_deref(), Some("posts#index"));
        assert_eq!(conventional("/users/1/posts/2/edit").as_deref(), Some("posts#edit"));
        assert_eq!(
            conventional("/orders/3f2b6c1e-8a4d-4b7e-9c2a-1d5e6f7a8b9c").as_deref(),
            Some("orders#show")
        );
    }

    #[test]
    fn test_conventional_root_has_no_target() {
        assert_eq!(conventional("/"), None);
        assert_eq!(conventional("/42"), None);
    }

    #[test]
    fn test_static_routes_win_over_convention() {
        let mut routes = BTreeMap::new();
        routes.insert("/".to_string(), "pages#home".to_string());
        routes.insert("/login".to_string(), "sessions#new".to_string());
        routes.insert("/u/:name".to_string(), "profiles#show".to_string());
        let table = StaticRoutes::from_config(&routes).unwrap();

        assert_eq!(table.lookup("/").unwrap().to_string(), "pages#home");
        assert_eq!(table.lookup("/login").unwrap().to_string(), "sessions#new");
        assert_eq!(table.lookup("/u/ada").unwrap().to_string(), "profiles#show");
        assert_eq!(table.lookup("/posts/1").unwrap().to_string(), "posts#show");
    }

    #[test]
    fn test_literal_beats_param() {
        let mut table = StaticRoutes::new();
        table.add("/users/:id", RouteTarget::new("users", "show"));
        table.add("/users/me", RouteTarget::new("accounts", "show"));
        assert_eq!(table.lookup("/users/me").unwrap().controller, "accounts");
        assert_eq!(table.lookup("/users/5").unwrap().controller, "users");
        assert!(table.lookup("/other").is_none());
    }

    #[test]
    fn test_glob_route() {
        let mut table = StaticRoutes::new();
        table.add("/docs/*path", RouteTarget::new("docs", "show"));
        assert_eq!(table.lookup("/docs/a/b/c").unwrap().action, "show");
    }

    #[test]
    fn test_bad_target_is_config_error() {
        let mut routes = BTreeMap::new();
        routes.insert("/x".to_string(), "nope".to_string());
        assert!(StaticRoutes::from_config(&routes).is_err());
    }
}
