use chrono::SecondsFormat;

/// Collapses every run of whitespace (NBSP included) into a single space.
pub fn norm_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps only the digits of `s` and parses them; `None` when there is no digit.
pub fn parse_count(s: &str) -> Option<u64> {
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Empty or blank strings become `None`.
pub fn non_empty<S: AsRef<str>>(s: S) -> Option<String> {
    let s = s.as_ref().trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

pub(crate) fn get_now() -> String {
    chrono::offset::Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
