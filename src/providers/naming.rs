//! Unique name generation for duplicate transfers and trash moves

/// Split a title into stem and extension (with dot). Dotfiles keep their name
/// as the stem.
pub fn split_title(title: &str) -> (&str, &str) {
    match title.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < title.len() => (&title[..idx], &title[idx..]),
        _ => (title, ""),
    }
}

/// Candidate names after `title` itself: "name 1.ext", "name 2.ext", ...
pub fn candidate_names(title: &str) -> impl Iterator<Item = String> + '_ {
    let (stem, ext) = split_title(title);
    (1u32..).map(move |n| format!("{} {}{}", stem, n, ext))
}

/// First name not taken according to `exists`, starting with `title`
pub fn unique_name<F>(title: &str, mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !exists(title) {
        return title.to_string();
    }
    candidate_names(title)
        .find(|name| !exists(name))
        .unwrap_or_else(|| title.to_string())
}

/// Apply a rename while keeping the original extension: "a.xlsx" renamed to
/// "b" becomes "b.xlsx". Folders are renamed verbatim.
pub fn renamed_title(current: &str, requested: &str, is_folder: bool) -> String {
    let requested = requested.trim();
    if is_folder {
        return requested.to_string();
    }
    let (_, ext) = split_title(current);
    if ext.is_empty() || requested.to_lowercase().ends_with(&ext.to_lowercase()) {
        requested.to_string()
    } else {
        format!("{}{}", requested, ext)
    }
}
