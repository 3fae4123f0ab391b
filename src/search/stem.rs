//! Lightweight suffix stemmer.

/// Strips common English suffixes from a word.
///
/// Rules are tried in order: `ied`→`y`, `ies`→`y`, strip `ing`, strip `ed`,
/// strip `es`, strip trailing `s`. The first rule whose result is at least
/// three characters wins; words of three characters or fewer are returned
/// unchanged. This is deliberately cruder than a dictionary stemmer: it only
/// has to bring inflected forms close enough for substring matching.
///
/// # Examples
///
/// ```
/// use memorygraph::search::simple_stem;
///
/// assert_eq!(simple_stem("retried"), "retry");
/// assert_eq!(simple_stem("retries"), "retry");
/// assert_eq!(simple_stem("retrying"), "retry");
/// assert_eq!(simple_stem("errors"), "error");
/// assert_eq!(simple_stem("cat"), "cat");
/// ```
#[must_use]
pub fn simple_stem(word: &str) -> String {
    if word.len() <= 3 {
        return word.to_string();
    }

    if let Some(base) = word.strip_suffix("ied")
        && base.len() + 1 >= 3
    {
        return format!("{base}y");
    }
    if let Some(base) = word.strip_suffix("ies")
        && base.len() + 1 >= 3
    {
        return format!("{base}y");
    }
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(base) = word.strip_suffix(suffix)
            && base.len() >= 3
        {
            return base.to_string();
        }
    }

    word.to_string()
}
