//! Site (tenant) prefixes and the URL path resolver.
//!
//! A site prefix is one of:
//!
//! - empty: the default site
//! - `@name`: a named user site
//! - a domain-like string containing a dot: a custom-domain site
//!
//! [`is_site_prefix`] is the single classification rule. Every handler that
//! needs to pull a tenant out of a URL goes through [`resolve`] or
//! [`resolve_url_path`] instead of re-deriving it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Returns true if a URL segment names a site: it starts with `@` or contains `.`.
pub fn is_site_prefix(segment: &str) -> bool {
    segment.starts_with('@') || segment.contains('.')
}

/// A validated site prefix. The empty prefix is the default site.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SitePrefix(String);

impl SitePrefix {
    /// The default (admin) site.
    pub fn default_site() -> Self {
        Self(String::new())
    }

    /// Parse a URL segment. Returns `None` unless the segment is empty or
    /// satisfies [`is_site_prefix`]. A bare `@`, dot-only segments (`.`,
    /// `..`) and anything that is not a single path segment are rejected.
    pub fn parse(segment: &str) -> Option<Self> {
        if segment.is_empty() {
            return Some(Self::default_site());
        }
        if segment == "@"
            || segment.chars().all(|c| c == '.')
            || segment.contains(['/', '\\', '\0'])
            || !is_site_prefix(segment)
        {
            return None;
        }
        Some(Self(segment.to_string()))
    }

    /// Build the prefix for a site name as stored in the `site` table.
    ///
    /// `""` maps to the default site, names containing a dot stay as-is
    /// (custom domains), anything else gets an `@`.
    pub fn from_site_name(name: &str) -> Self {
        if name.is_empty() || name.contains('.') {
            Self(name.to_string())
        } else {
            Self(format!("@{name}"))
        }
    }

    /// The site name as stored in the `site` table.
    pub fn site_name(&self) -> &str {
        self.0.strip_prefix('@').unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// True for custom-domain sites (`example.com`).
    pub fn is_custom_domain(&self) -> bool {
        self.0.contains('.')
    }

    /// Join a content-relative path onto this site's root.
    pub fn join(&self, path: &str) -> String {
        match (self.0.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => self.0.clone(),
            (false, false) => format!("{}/{}", self.0, path),
        }
    }
}

impl fmt::Display for SitePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SitePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("SitePrefix(<default>)")
        } else {
            write!(f, "SitePrefix({})", self.0)
        }
    }
}

/// Split URL segments into `(site, remainder)`.
///
/// If the first segment is a site prefix it is consumed as the tenant;
/// otherwise the tenant is the default site and nothing is consumed.
pub fn resolve<S: AsRef<str>>(segments: &[S]) -> (SitePrefix, &[S]) {
    if let Some(first) = segments.first()
        && let Some(site) = SitePrefix::parse(first.as_ref())
        && !site.is_default()
    {
        return (site, &segments[1..]);
    }
    (SitePrefix::default_site(), segments)
}

/// A request path resolved against a fixed routing prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub site: SitePrefix,
    /// Remaining segments joined with `/`, empty segments dropped.
    pub path: String,
}

/// Resolve a URL path such as `/admin/@alice/posts/hello.md` under the
/// routing prefix `admin`.
///
/// Returns `None` if the path does not start with the routing prefix or
/// contains a `.` or `..` segment.
pub fn resolve_url_path(url_path: &str, routing_prefix: &str) -> Option<Route> {
    let segments: Vec<&str> = url_path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.iter().any(|s| matches!(*s, "." | "..")) {
        return None;
    }
    let (head, rest) = segments.split_first()?;
    if *head != routing_prefix {
        return None;
    }
    let (site, remainder) = resolve(rest);
    Some(Route {
        site,
        path: remainder.join("/"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_site_prefix("@alice"));
        assert!(is_site_prefix("example.com"));
        assert!(!is_site_prefix("posts"));
        assert!(!is_site_prefix(""));
    }

    #[test]
    fn test_parse() {
        assert_eq!(SitePrefix::parse("").unwrap(), SitePrefix::default_site());
        assert_eq!(SitePrefix::parse("@bob").unwrap().as_str(), "@bob");
        assert!(SitePrefix::parse("@").is_none());
        assert!(SitePrefix::parse("notes").is_none());
        for bad in [".", "..", "...", "a/b.com", "x.com\0"] {
            assert!(SitePrefix::parse(bad).is_none(), "{bad:?}");
        }
        assert_eq!(SitePrefix::parse("example.com").unwrap().as_str(), "example.com");
    }

    #[test]
    fn test_site_name_mapping() {
        assert_eq!(SitePrefix::from_site_name("alice").as_str(), "@alice");
        assert_eq!(SitePrefix::from_site_name("example.com").as_str(), "example.com");
        assert!(SitePrefix::from_site_name("").is_default());
        assert_eq!(SitePrefix::from_site_name("alice").site_name(), "alice");
        assert_eq!(SitePrefix::from_site_name("example.com").site_name(), "example.com");
    }

    #[test]
    fn test_resolve_consumes_tenant() {
        let segments = ["@alice", "posts", "hello.md"];
        let (site, rest) = resolve(&segments);
        assert_eq!(site.as_str(), "@alice");
        assert_eq!(rest, &["posts", "hello.md"]);
    }

    #[test]
    fn test_resolve_default_tenant() {
        let segments = ["posts", "hello.md"];
        let (site, rest) = resolve(&segments);
        assert!(site.is_default());
        assert_eq!(rest, &segments);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for input in [
            vec!["@a", "notes"],
            vec!["example.com"],
            vec!["pages", "index.html"],
            vec![],
        ] {
            let first = resolve(&input);
            let second = resolve(&input);
            assert_eq!(first.0, second.0);
            assert_eq!(first.1, second.1);
        }
    }

    #[test]
    fn test_resolve_url_path() {
        let route = resolve_url_path("/admin/@alice/posts/", "admin").unwrap();
        assert_eq!(route.site.as_str(), "@alice");
        assert_eq!(route.path, "posts");

        let route = resolve_url_path("/admin//pages//index.html", "admin").unwrap();
        assert!(route.site.is_default());
        assert_eq!(route.path, "pages/index.html");

        assert!(resolve_url_path("/public/posts", "admin").is_none());
        assert!(resolve_url_path("/admin/../posts/", "admin").is_none());
        assert!(resolve_url_path("/admin/./posts/", "admin").is_none());
        assert!(resolve_url_path("/admin/@alice/../@bob/posts", "admin").is_none());
    }

    #[test]
    fn test_resolve_skips_dot_segments() {
        let (site, rest) = resolve(&["..", "posts"]);
        assert!(site.is_default());
        assert_eq!(rest, ["..", "posts"]);
    }

    #[test]
    fn test_join() {
        let site = SitePrefix::parse("@alice").unwrap();
        assert_eq!(site.join("posts"), "@alice/posts");
        assert_eq!(site.join(""), "@alice");
        assert_eq!(SitePrefix::default_site().join("posts"), "posts");
    }
}
