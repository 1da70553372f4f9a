pub(crate) fn normalize_header(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches([':', '?']).to_ascii_lowercase()
}

/// Form usernames arrive as "@Name", "name " or "NAME"; all resolve to the same key.
pub(crate) fn normalize_username(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned.trim().trim_start_matches('@').to_lowercase()
}
