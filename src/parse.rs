//! Cell text to integer conversion.
//!
//! Leaderboard cells carry thousands separators, stray whitespace and, once
//! annotated, rendered deltas such as `[+3]`. Parsing is total: anything that
//! does not yield a number becomes 0.

/// Parse the integer value of a cell's text.
///
/// Bracketed substrings are dropped first so a previously rendered `[+5]` is
/// never folded into the value, then everything except digits and `-` is
/// removed. Unterminated brackets are kept as ordinary text.
pub fn parse_integer(text: &str) -> i64 {
    let stripped = strip_bracketed(text);
    let clean: String = stripped
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-')
        .collect();

    leading_integer(&clean).unwrap_or(0)
}

/// Render a delta as `+N`, `0` or `-N`.
pub fn format_signed(n: i64) -> String {
    if n > 0 {
        format!("+{n}")
    } else {
        n.to_string()
    }
}

fn strip_bracketed(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        match rest[open..].find(']') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

// optional sign followed by digits; trailing junk such as a second '-' is ignored
fn leading_integer(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());

    let digits = &digits[..end];
    if digits.is_empty() {
        return None;
    }

    let value = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -value } else { value })
}
