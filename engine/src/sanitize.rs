//! Free-text sanitization for untrusted payloads.
//!
//! Player names and identifiers arriving through share links are attacker
//! controlled. Sanitization strips markup, script-like protocol schemes and
//! inline event handlers, and truncates to a bounded length. HTML entities
//! are decoded before each stripping pass and the result is re-checked, since
//! encoded payloads can smuggle markup through entity encoding
//! (`&lt;script&gt;` decodes to `<script>`).

/// Passes applied until the text stops changing. Bounded so a pathological
/// input cannot loop forever.
const MAX_PASSES: usize = 5;

/// Protocol schemes stripped from free text.
const BLOCKED_SCHEMES: [&str; 3] = ["javascript:", "data:", "vbscript:"];

/// Sanitize one free-text field.
///
/// Returns the cleaned text truncated to `max_len` characters. May be empty
/// if the input was entirely markup.
pub fn sanitize_text(input: &str, max_len: usize) -> String {
    let mut text = input.to_string();
    for _ in 0..MAX_PASSES {
        let pass = strip_event_handlers(&strip_schemes(&strip_tags(&decode_entities(&text))));
        if pass == text {
            break;
        }
        text = pass;
    }
    // Collapse whitespace runs left behind by stripped fragments.
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_len).collect()
}

/// Decode the common HTML entities plus numeric character references.
/// Unrecognized sequences are kept literally.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '&' {
            out.push(c);
            continue;
        }
        // Entity candidate: up to ';' within a short window.
        let rest = &input[start + 1..];
        let semi = rest
            .char_indices()
            .take(12)
            .find(|(_, c)| *c == ';')
            .map(|(i, _)| i);
        let Some(semi) = semi else {
            out.push(c);
            continue;
        };
        let body = &rest[..semi];
        let decoded = match body {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => decode_numeric_entity(body),
        };
        match decoded {
            Some(d) => {
                out.push(d);
                // Consume the entity body and the ';'.
                for _ in 0..body.chars().count() + 1 {
                    chars.next();
                }
            }
            None => out.push(c),
        }
    }
    out
}

fn decode_numeric_entity(body: &str) -> Option<char> {
    let digits = body.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

/// Remove `<...>` spans. An unterminated `<` drops the remainder of the
/// string rather than letting a half-open tag through.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Remove script-like protocol schemes, case-insensitively.
fn strip_schemes(input: &str) -> String {
    let mut text = input.to_string();
    for scheme in BLOCKED_SCHEMES {
        while let Some(pos) = find_ascii_ci(&text, scheme) {
            // Schemes start and end with ASCII bytes, so both offsets sit on
            // char boundaries.
            text.replace_range(pos..pos + scheme.len(), "");
        }
    }
    text
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Remove `onxxx=` inline event handler attributes.
fn strip_event_handlers(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        if is_handler_start(bytes, i) {
            if let Some(end) = handler_end(bytes, i) {
                i = end;
                continue;
            }
        }
        // Advance one char, not one byte.
        let c = input[i..].chars().next().unwrap_or('\u{fffd}');
        out.push(c);
        i += c.len_utf8();
    }
    out
}

fn is_handler_start(bytes: &[u8], i: usize) -> bool {
    if i > 0 && bytes[i - 1].is_ascii_alphanumeric() {
        return false;
    }
    bytes.len() >= i + 2 && bytes[i].eq_ignore_ascii_case(&b'o') && bytes[i + 1].eq_ignore_ascii_case(&b'n')
}

/// End offset of an `on<letters> \s* =` sequence starting at `i`, if present.
fn handler_end(bytes: &[u8], i: usize) -> Option<usize> {
    let mut j = i + 2;
    let name_start = j;
    while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
        j += 1;
    }
    if j == name_start {
        return None;
    }
    while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
        j += 1;
    }
    if j < bytes.len() && bytes[j] == b'=' {
        Some(j + 1)
    } else {
        None
    }
}
