/// Removes every run of four or more consecutive ASCII digits (card numbers,
/// store ids, reference codes). Shorter runs such as "24/7" survive.
pub fn strip_long_digit_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut run = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            run.push(c);
            continue;
        }
        if run.len() < 4 {
            out.push_str(&run);
        }
        run.clear();
        out.push(c);
    }
    if run.len() < 4 {
        out.push_str(&run);
    }
    out
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rule-pattern candidate used by the recommender.
pub fn candidate_pattern(text: &str) -> String {
    let stripped: String = strip_long_digit_runs(text)
        .chars()
        .filter(|c| *c != '*' && *c != '#')
        .collect();
    let collapsed = collapse_whitespace(&stripped);
    let head = collapsed
        .split(['-', '/'])
        .next()
        .unwrap_or_default();
    head.trim().to_string()
}

/// Grouping key for recurring-charge detection: lowercase alphanumeric words
/// with all digits removed, so "NETFLIX.COM 0424" and "Netflix.com 0524" agree.
pub fn merchant_key(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphabetic() { c } else { ' ' })
        .collect();
    collapse_whitespace(&cleaned)
}
