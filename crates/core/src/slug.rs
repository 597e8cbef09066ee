//! URL slugs derived from product titles.

/// Slug used when a title contains nothing slug-worthy.
const FALLBACK_SLUG: &str = "product";

/// Turn a title into a URL slug.
///
/// Lowercases, drops everything except ASCII letters, digits, underscores,
/// hyphens and whitespace, then collapses each run of whitespace, underscores
/// and hyphens into a single hyphen. Leading and trailing hyphens are removed.
///
/// ```
/// use mypeteats_core::slug::slugify;
///
/// assert_eq!(slugify("  Chicken & Rice -- Adult Dog Food! "), "chicken-rice-adult-dog-food");
/// assert_eq!(slugify("snake_case_title"), "snake-case-title");
/// ```
#[must_use]
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_separator = false;

    for c in lowered.chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            pending_separator = true;
        } else if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        }
    }

    slug
}

/// Slug for a title, never empty.
#[must_use]
pub fn slug_for_title(title: &str) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        FALLBACK_SLUG.to_owned()
    } else {
        slug
    }
}

/// Candidates to try, in order, when `base` may already be taken:
/// `base`, `base-2`, `base-3`, ...
pub fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_owned()).chain((2_u32..).map(move |n| format!("{base}-{n}")))
}
