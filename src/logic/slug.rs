use std::collections::HashSet;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const FALLBACK_SLUG: &str = "item";

/// Transliterate a label into a URL slug: diacritics stripped, lower-cased,
/// every run of other characters collapsed into a single hyphen.
pub fn slugify(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_dash = false;

    for ch in label.nfd().filter(|c| !is_combining_mark(*c)) {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if out.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        out
    }
}

/// Slug for `label` that does not collide with `taken`: `label`, `label-2`, `label-3`, ...
/// The lowest free suffix wins, so the result only depends on the sibling set.
pub fn unique_slug<'a>(label: &str, taken: impl IntoIterator<Item = &'a str>) -> String {
    let taken: HashSet<&str> = taken.into_iter().collect();
    let base = slugify(label);
    if !taken.contains(base.as_str()) {
        return base;
    }

    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or(base)
}

/// Lower-case ASCII alphanumerics separated by single hyphens
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Plumbing"), "plumbing");
        assert_eq!(slugify("  Électricité & Éclairage "), "electricite-eclairage");
        assert_eq!(slugify("Garden / Landscaping"), "garden-landscaping");
        assert_eq!(slugify("Café Crème 2.0"), "cafe-creme-2-0");
        assert_eq!(slugify("!!!"), "item");
    }

    #[test]
    fn test_unique_slug_appends_lowest_free_suffix() {
        assert_eq!(unique_slug("Plumbing", ["electric"]), "plumbing");
        assert_eq!(unique_slug("Plumbing", ["plumbing"]), "plumbing-2");
        assert_eq!(
            unique_slug("Plumbing", ["plumbing", "plumbing-2", "plumbing-4"]),
            "plumbing-3"
        );
    }

    #[test]
    fn test_unique_slug_is_stable() {
        let siblings = vec!["tiling", "tiling-2"];
        let first = unique_slug("Tiling", siblings.iter().copied());
        let second = unique_slug("Tiling", siblings.iter().copied());
        assert_eq!(first, second);
        assert_eq!(first, "tiling-3");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("leak-repair-2"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Leak"));
        assert!(!is_valid_slug("leak--repair"));
        assert!(!is_valid_slug("-leak"));
    }
}
