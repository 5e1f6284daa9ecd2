//! Naming helpers: route plurals and `before<Action>` / `after<Action>` hook names.

/// Default route segment for a model name: "post" -> "posts", "category" -> "categories",
/// "status" -> "statuses".
pub fn default_plural(name: &str) -> String {
    let lower = name.to_lowercase();
    if let Some(stem) = lower.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) && !stem.is_empty() {
            return format!("{}ies", stem);
        }
    }
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        return format!("{}es", lower);
    }
    format!("{}s", lower)
}

/// "CreateOne" -> "createOne"
pub fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// "createOne" -> "CreateOne"
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluralizes_common_endings() {
        assert_eq!(default_plural("post"), "posts");
        assert_eq!(default_plural("category"), "categories");
        assert_eq!(default_plural("key"), "keys");
        assert_eq!(default_plural("status"), "statuses");
        assert_eq!(default_plural("Box"), "boxes");
    }

    #[test]
    fn flips_first_letter() {
        assert_eq!(lower_first("FindMany"), "findMany");
        assert_eq!(upper_first("findMany"), "FindMany");
        assert_eq!(lower_first(""), "");
    }
}
