/// Returns true if the keyword appears anywhere in the text, including
/// inside larger words.
pub fn matches_partially(text: &str, keyword: &str) -> bool {
    text.contains(keyword)
}

/// Returns true if the keyword appears as a complete word in the text.
/// Word boundaries are non-word characters or start/end of string; word
/// characters are Unicode letters, digits, and underscore.
pub fn matches_whole_word(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }

    for (pos, _) in text.match_indices(keyword) {
        let left_ok = text[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !is_word_char(c));
        let right_ok = text[pos + keyword.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));

        if left_ok && right_ok {
            return true;
        }
    }

    false
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
