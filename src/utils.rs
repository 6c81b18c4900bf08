use std::borrow::Cow;

use url::Url;

/// Helpers for truncating text.
pub trait Truncatable {
    /// Truncates to `len` characters, appending `suffix` if anything was cut.
    fn truncate_with_suffix(&self, len: usize, suffix: &str) -> Cow<'_, str>;
}

impl Truncatable for String {
    fn truncate_with_suffix(&self, len: usize, suffix: &str) -> Cow<'_, str> {
        self.as_str().truncate_with_suffix(len, suffix)
    }
}

impl Truncatable for str {
    fn truncate_with_suffix(&self, len: usize, suffix: &str) -> Cow<'_, str> {
        match self.char_indices().nth(len) {
            Some((byte_idx, _)) => {
                let mut truncated = String::with_capacity(byte_idx + suffix.len());
                truncated.push_str(&self[..byte_idx]);
                truncated.push_str(suffix);
                Cow::Owned(truncated)
            }
            None => Cow::Borrowed(self),
        }
    }
}

/// Extracts HTTP(s) URLs from a string.
#[must_use]
pub fn extract_urls(s: &str) -> Option<Vec<Url>> {
    let urls: Vec<Url> = s
        .split_whitespace()
        .filter(|word| word.to_ascii_lowercase().starts_with("http"))
        .filter_map(|word| Url::parse(word).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .collect();

    (!urls.is_empty()).then_some(urls)
}

/// Returns the longest prefix of `s` that is at most `max_bytes` long and ends on a char
/// boundary.
fn floor_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut end = max_bytes;

    while !s.is_char_boundary(end) {
        end -= 1;
    }

    &s[..end]
}

/// Splits `word` into pieces of at most `max_chars` characters.
fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();

    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Splits `message` into lines of at most `max_chars` characters, breaking on spaces.
///
/// Words longer than the limit are split mid-word.
#[must_use]
pub fn split_message_intelligently(message: &str, max_chars: usize) -> Vec<String> {
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    let mut parts = vec![];
    let mut current = String::new();
    let mut current_len = 0;

    for word in message.split(' ').filter(|word| !word.is_empty()) {
        let word_len = word.chars().count();
        let separator = usize::from(current_len > 0);

        if current_len + separator + word_len <= max_chars {
            if separator == 1 {
                current.push(' ');
            }

            current.push_str(word);
            current_len += separator + word_len;

            continue;
        }

        if current_len > 0 {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len > max_chars {
            let mut pieces = hard_split(word, max_chars);

            // The last piece may still be joined by following words.
            if let Some(last) = pieces.pop() {
                parts.extend(pieces);
                current_len = last.chars().count();
                current = last;
            }
        } else {
            current.push_str(word);
            current_len = word_len;
        }
    }

    if current_len > 0 {
        parts.push(current);
    }

    parts
}

/// Wraps `message` into lines of at most `max_bytes` UTF-8 bytes.
///
/// Existing newlines are kept and each paragraph is wrapped on spaces, falling back to
/// splitting inside a word when it alone exceeds the limit. At most `max_lines` lines are
/// returned; if text was dropped, `placeholder` is appended to the last line while staying
/// within `max_bytes`.
#[must_use]
pub fn wrap_utf8_bytes(
    message: &str,
    max_bytes: usize,
    max_lines: usize,
    placeholder: &str,
) -> Vec<String> {
    let mut lines = vec![];

    for paragraph in message.split('\n').map(|p| p.trim_end_matches('\r')) {
        let mut current = String::new();

        for word in paragraph.split(' ').filter(|word| !word.is_empty()) {
            let separator = usize::from(!current.is_empty());

            if current.len() + separator + word.len() <= max_bytes {
                if separator == 1 {
                    current.push(' ');
                }

                current.push_str(word);
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }

            let mut rest = word;

            while rest.len() > max_bytes {
                let head = floor_char_boundary(rest, max_bytes);

                if head.is_empty() {
                    break;
                }

                lines.push(head.to_string());
                rest = &rest[head.len()..];
            }

            current.push_str(rest);
        }

        if !current.is_empty() {
            lines.push(current);
        }
    }

    if lines.len() > max_lines {
        lines.truncate(max_lines);

        if let Some(last) = lines.last_mut() {
            let keep = floor_char_boundary(last, max_bytes.saturating_sub(placeholder.len()));
            *last = format!("{keep}{placeholder}");
        }
    }

    lines
}
