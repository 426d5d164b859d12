//! Derivation of URL-safe graph identifiers from display names.

const FALLBACK_ID: &str = "unnamed_graph";

/// Turn a display name into a URL-safe slug.
///
/// Lowercases ASCII, maps every character outside `[a-z0-9_-]` to `_`,
/// collapses runs of `_` and trims them from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let mapped = if c.is_ascii_alphanumeric() || c == '-' {
            c
        } else {
            '_'
        };
        if mapped == '_' && slug.ends_with('_') {
            continue;
        }
        slug.push(mapped);
    }

    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Allocate an id for `name` that `is_taken` rejects for none of the candidates.
///
/// Collisions get `_1`, `_2`, ... appended to the slug.
pub fn allocate(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let base = slugify(name);
    if !is_taken(&base) {
        return base;
    }

    let mut counter: u64 = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if !is_taken(&candidate) {
            return candidate;
        }
        counter = counter.saturating_add(1);
    }
}

/// Whether `graph_id` is safe to use as a single path component.
pub fn is_valid(graph_id: &str) -> bool {
    !graph_id.is_empty()
        && graph_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}
