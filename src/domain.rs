//! Domain name normalization and suffix matching.
//!
//! The same rule drives blocking and whitelist routing: a pattern covers
//! itself and every subdomain of itself, never its parents.

/// Normalize a domain: trim whitespace, lowercase, drop one trailing dot.
pub fn normalize(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_lowercase()
}

/// Returns true if `name` equals `pattern` or is a subdomain of it.
///
/// Both sides are expected to be normalized already.
pub fn covers(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    match name.strip_suffix(pattern) {
        Some("") => true,
        Some(prefix) => prefix.ends_with('.'),
        None => false,
    }
}

/// Returns true if `name` is covered by any of `patterns`.
pub fn matches<S: AsRef<str>>(name: &str, patterns: &[S]) -> bool {
    let name = normalize(name);
    if name.is_empty() {
        return false;
    }
    patterns
        .iter()
        .any(|pattern| covers(&normalize(pattern.as_ref()), &name))
}

/// Iterate a normalized name and each of its right-aligned label suffixes.
///
/// `a.b.example.com` yields `a.b.example.com`, `b.example.com`,
/// `example.com`, `com`.
pub fn ancestors(name: &str) -> Ancestors<'_> {
    Ancestors {
        current: (!name.is_empty()).then_some(name),
    }
}

pub struct Ancestors<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let current = self.current?;
        self.current = current
            .find('.')
            .map(|pos| &current[pos + 1..])
            .filter(|rest| !rest.is_empty());
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_lowercases_and_strips_one_dot() {
        assert_eq!(normalize("  Example.COM. "), "example.com");
        assert_eq!(normalize("example.com.."), "example.com.");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn matches_exact_and_subdomains() {
        let patterns = ["example.com"];

        assert!(matches("example.com", &patterns));
        assert!(matches("api.example.com", &patterns));
        assert!(matches("a.b.example.com.", &patterns));
        assert!(matches("API.Example.Com", &patterns));
    }

    #[test]
    fn matches_is_direction_sensitive() {
        assert!(!matches("example.com", &["api.example.com"]));
        assert!(!matches("badexample.com", &["example.com"]));
        assert!(!matches("example.com.evil", &["example.com"]));
    }

    #[test]
    fn matches_normalizes_patterns() {
        assert!(matches("www.corp.local", &[" Corp.Local. "]));
        assert!(!matches("corp.local", &[""]));
        assert!(!matches("", &["corp.local"]));
    }

    #[test]
    fn ancestors_walks_to_tld() {
        let all: Vec<_> = ancestors("a.b.example.com").collect();

        assert_eq!(all, ["a.b.example.com", "b.example.com", "example.com", "com"]);
        assert_eq!(ancestors("").count(), 0);
        assert_eq!(ancestors("localhost").collect::<Vec<_>>(), ["localhost"]);
    }

    #[test]
    fn ancestors_agree_with_matches() {
        let patterns = ["example.com", "ads.tracker.net"];
        let names = ["x.example.com", "tracker.net", "ads.tracker.net", "a.ads.tracker.net", "com"];
        for name in names {
            let by_walk = ancestors(name).any(|a| patterns.contains(&a));
            assert_eq!(by_walk, matches(name, &patterns), "{name}");
        }
    }
}
