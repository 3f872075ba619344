/// Maximum number of suggestions returned.
pub const SUGGESTION_LIMIT: usize = 10;

/// Case-insensitive subsequence filter: an item matches when every character
/// of `query` appears in it in the same order. Source order is kept and the
/// result is capped at [`SUGGESTION_LIMIT`]. An empty query returns the first
/// items unfiltered.
pub fn fuzzy_search<'a>(query: &str, items: &'a [String]) -> Vec<&'a str> {
    if query.is_empty() {
        return items
            .iter()
            .take(SUGGESTION_LIMIT)
            .map(String::as_str)
            .collect();
    }

    let needle: Vec<char> = query.chars().flat_map(char::to_lowercase).collect();
    items
        .iter()
        .filter(|item| is_subsequence(&needle, item))
        .take(SUGGESTION_LIMIT)
        .map(String::as_str)
        .collect()
}

fn is_subsequence(needle: &[char], haystack: &str) -> bool {
    let mut pending = needle.iter().peekable();
    for c in haystack.chars().flat_map(char::to_lowercase) {
        match pending.peek() {
            Some(&&want) if want == c => {
                pending.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    pending.peek().is_none()
}
