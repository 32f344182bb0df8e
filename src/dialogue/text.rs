//! Small text utilities shared by the classifier, resolver and matcher.

use std::ops::Range;

/// Lowercase, trim, and fold curly apostrophes so phrase lists can be ASCII.
pub fn normalize(text: &str) -> String {
    text.trim().replace(['\u{2019}', '\u{2018}'], "'").to_lowercase()
}

/// Lowercase and drop everything except ASCII letters, digits and spaces.
pub fn normalize_title(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == ' ' {
                ch
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&kept)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `true` when `word` occurs in `haystack` bounded by non-alphanumerics.
pub fn contains_word(haystack: &str, word: &str) -> bool {
    for (index, _) in haystack.match_indices(word) {
        let before_ok = index == 0 || !haystack.as_bytes()[index - 1].is_ascii_alphanumeric();
        let after = index + word.len();
        let after_ok =
            after >= haystack.len() || !haystack.as_bytes()[after].is_ascii_alphanumeric();
        if before_ok && after_ok {
            return true;
        }
    }
    false
}

pub fn contains_any_word(haystack: &str, words: &[&str]) -> bool {
    words.iter().any(|word| contains_word(haystack, word))
}

/// `true` when `haystack` begins with `phrase` followed by a word boundary.
pub fn starts_with_word(haystack: &str, phrase: &str) -> bool {
    haystack.starts_with(phrase)
        && haystack[phrase.len()..]
            .chars()
            .next()
            .is_none_or(|ch| !ch.is_ascii_alphanumeric())
}

pub fn starts_with_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| starts_with_word(haystack, phrase))
}

/// Remove byte ranges from `text` and collapse the leftover whitespace.
pub fn remove_spans(text: &str, spans: &[Range<usize>]) -> String {
    let mut sorted: Vec<Range<usize>> = spans
        .iter()
        .filter(|span| span.start < span.end && span.end <= text.len())
        .cloned()
        .collect();
    sorted.sort_by_key(|span| span.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in sorted {
        if span.start > cursor {
            out.push_str(&text[cursor..span.start]);
        }
        out.push(' ');
        cursor = cursor.max(span.end);
    }
    if cursor < text.len() {
        out.push_str(&text[cursor..]);
    }
    collapse_whitespace(&out)
}

/// Edit distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0_usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Similarity in `[0, 1]` derived from edit distance over normalized titles.
#[allow(clippy::cast_precision_loss)]
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_title(a);
    let b = normalize_title(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let distance = levenshtein(&a, &b) as f64;
    let longest = a.chars().count().max(b.chars().count()) as f64;
    (1.0 - distance / longest).max(0.0)
}

/// Parse a small English number word ("five", "twenty five", "an").
pub fn word_number(text: &str) -> Option<u32> {
    const UNITS: &[(&str, u32)] = &[
        ("a", 1),
        ("an", 1),
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
        ("eleven", 11),
        ("twelve", 12),
        ("fifteen", 15),
        ("twenty", 20),
        ("thirty", 30),
        ("forty", 40),
        ("fourty", 40),
        ("fifty", 50),
        ("sixty", 60),
        ("ninety", 90),
    ];
    let mut total = 0;
    let mut seen = false;
    for token in text.split(|ch: char| ch.is_whitespace() || ch == '-') {
        if token.is_empty() {
            continue;
        }
        let (_, value) = UNITS.iter().find(|(word, _)| *word == token)?;
        total += value;
        seen = true;
    }
    seen.then_some(total)
}

/// All standalone unsigned integers in `text`, in order.
pub fn integers(text: &str) -> Vec<usize> {
    text.split(|ch: char| !ch.is_ascii_digit())
        .filter(|token| !token.is_empty() && token.len() <= 4)
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// A reply made only of 1-based positions ("2", "1 and 3", "task #4").
/// Returns `None` if any other word appears.
pub fn index_list(text: &str) -> Option<Vec<usize>> {
    const FILLER: &[&str] = &[
        "and", "&", "task", "tasks", "number", "numbers", "no", "item", "items", "option",
        "options",
    ];
    let mut out: Vec<usize> = Vec::new();
    for token in text.split(|ch: char| ch.is_whitespace() || ch == ',' || ch == '#') {
        let token = token.trim_matches(|ch: char| matches!(ch, '.' | '!' | '?' | '(' | ')'));
        if token.is_empty() {
            continue;
        }
        let lowered = token.to_ascii_lowercase();
        if let Ok(index) = lowered.parse::<usize>() {
            if index == 0 {
                return None;
            }
            if !out.contains(&index) {
                out.push(index);
            }
        } else if !FILLER.contains(&lowered.as_str()) {
            return None;
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Question detection: trailing `?` or a leading interrogative/auxiliary.
pub fn is_question_like(text: &str) -> bool {
    const OPENERS: &[&str] = &[
        "what", "what's", "whats", "when", "where", "which", "who", "whom", "why", "how",
        "do", "does", "did", "is", "are", "am", "can", "could", "will", "would", "should",
        "have", "has", "any",
    ];
    let normalized = normalize(text);
    normalized.ends_with('?') || starts_with_any(&normalized, OPENERS)
}
