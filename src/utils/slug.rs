/// Lowercases, keeps ASCII alphanumerics, collapses everything else into single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '\'' {
            // apostrophes are dropped without splitting words
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// `base`, `base-1`, `base-2`, ... for the n-th collision.
pub fn with_suffix(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base}-{attempt}")
    }
}
