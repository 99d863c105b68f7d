//! Expression parsing and the depth-aware splitting the statement matchers
//! share.

use winnow::ascii::{digit1, space0};
use winnow::combinator::opt;
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{one_of, rest, take_while};

use crate::ast::{DurationValue, Expression, KeyframeSeparator, Property};

type Lexed<O> = Result<O, ErrMode<ContextError>>;

fn decimal<'s>(input: &mut &'s str) -> Lexed<&'s str> {
    (digit1, opt(('.', digit1))).take().parse_next(input)
}

fn beat_fraction<'s>(input: &mut &'s str) -> Lexed<&'s str> {
    (digit1, '/', digit1).take().parse_next(input)
}

fn name<'s>(input: &mut &'s str) -> Lexed<&'s str> {
    take_while(1.., is_name_char).parse_next(input)
}

fn keyframe<'s>(input: &mut &'s str) -> Lexed<(&'s str, char, &'s str)> {
    let (position, _, _, separator, _, value) =
        (decimal, '%', space0, one_of(['=', ':']), space0, rest).parse_next(input)?;
    Ok((position, separator, value))
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '$')
}

/// `42`, `0.5`. No sign, no exponent.
pub fn parse_number(text: &str) -> Option<f64> {
    let digits = decimal.parse(text).ok()?;
    str::parse::<f64>(digits).ok()
}

/// True for a non-empty run of identifier characters (letters, digits, `_`, `.`, `$`).
pub fn is_name(text: &str) -> bool {
    name.parse(text).is_ok()
}

/// Splits `50% = 0.8` / `50%: 0.8` into position, separator and value text.
pub fn split_keyframe(text: &str) -> Option<(&str, KeyframeSeparator, &str)> {
    let (position, separator, value) = keyframe.parse(text).ok()?;
    let separator = match separator {
        ':' => KeyframeSeparator::Colon,
        _ => KeyframeSeparator::Equals,
    };
    Some((position, separator, value))
}

/// `1/4` is a beat fraction, `auto` is auto, a bare number is milliseconds.
pub fn classify_duration(token: &str) -> Option<DurationValue> {
    if beat_fraction.parse(token).is_ok() {
        return Some(DurationValue::beat(token));
    }
    if let Some(value) = parse_number(token) {
        return Some(DurationValue::Milliseconds {
            value,
            raw: token.to_string(),
        });
    }
    if token == "auto" {
        return Some(DurationValue::AutoDuration);
    }
    None
}

pub fn parse_value(raw: &str) -> Expression {
    let value = raw.trim();

    if value.is_empty() {
        return Expression::ObjectLiteral { properties: vec![] };
    }
    match value {
        "true" => return Expression::BooleanLiteral { value: true },
        "false" => return Expression::BooleanLiteral { value: false },
        "auto" => return Expression::identifier("auto"),
        _ => {}
    }
    if let Some(n) = parse_number(value) {
        return Expression::NumberLiteral {
            value: n,
            raw: value.to_string(),
        };
    }
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return Expression::string(&value[1..value.len() - 1]);
    }
    if let Some(synth) = value.strip_prefix("synth ") {
        let synth = synth.trim();
        if !synth.is_empty() {
            return Expression::SynthReference {
                name: synth.to_string(),
            };
        }
    }
    if value.starts_with('{') && value.ends_with('}') {
        if let Some(properties) = parse_object_body(&value[1..value.len() - 1]) {
            return Expression::ObjectLiteral { properties };
        }
    }

    Expression::identifier(value)
}

/// `None` when any pair lacks a key or a value.
fn parse_object_body(body: &str) -> Option<Vec<Property>> {
    split_top_level(body, |c| c == ',')
        .into_iter()
        .map(|pair| {
            let colon = find_top_level(pair, ':')?;
            let key = pair[..colon].trim();
            let value = pair[colon + 1..].trim();
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some(Property {
                key: key.to_string(),
                value: parse_value(value),
            })
        })
        .collect()
}

/// Trigger arguments: separated by whitespace or commas.
pub fn split_arguments(text: &str) -> Vec<&str> {
    split_top_level(text, |c| c.is_whitespace() || c == ',')
}

/// Call arguments inside `(...)`: separated by commas only.
pub fn split_call_arguments(text: &str) -> Vec<&str> {
    split_top_level(text, |c| c == ',')
}

/// Splits an arrow expression on every `->` outside strings and brackets.
pub fn split_arrows(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut scan = Scan::default();
    let mut start = 0;
    let mut skip_next = false;

    for (idx, ch) in text.char_indices() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if scan.step(ch) && ch == '-' && text[idx + 1..].starts_with('>') {
            parts.push(text[start..idx].trim());
            start = idx + 2;
            skip_next = true;
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Net nesting of `open`/`close` outside string literals. Positive means the
/// text leaves that many brackets open.
pub fn open_depth(text: &str, open: char, close: char) -> i32 {
    let mut depth = 0;
    let mut strings = StringState::default();
    for ch in text.chars() {
        if strings.consume(ch) {
            continue;
        }
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
        }
    }
    depth
}

/// Byte offset of the first `target` at depth zero outside strings.
pub fn find_top_level(text: &str, target: char) -> Option<usize> {
    let mut scan = Scan::default();
    text.char_indices()
        .find(|&(_, ch)| scan.step(ch) && ch == target)
        .map(|(idx, _)| idx)
}

/// Splits on separator characters found at depth zero outside strings.
/// Pieces are trimmed and empty pieces dropped.
pub fn split_top_level(text: &str, is_sep: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut scan = Scan::default();
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        if scan.step(ch) && is_sep(ch) {
            push_piece(&mut parts, &text[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    push_piece(&mut parts, &text[start..]);
    parts
}

fn push_piece<'a>(parts: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        parts.push(piece);
    }
}

#[derive(Default)]
struct StringState {
    inside: bool,
    escaped: bool,
}

impl StringState {
    /// Returns true while `ch` belongs to a string literal, quotes included.
    fn consume(&mut self, ch: char) -> bool {
        if self.inside {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.inside = false;
            }
            return true;
        }
        if ch == '"' {
            self.inside = true;
            return true;
        }
        false
    }
}

#[derive(Default)]
struct Scan {
    strings: StringState,
    depth: usize,
}

impl Scan {
    /// Feeds one character; true when it sits at depth zero outside strings.
    fn step(&mut self, ch: char) -> bool {
        if self.strings.consume(ch) {
            return false;
        }
        match ch {
            '{' | '(' | '[' => {
                self.depth += 1;
                false
            }
            '}' | ')' | ']' => {
                self.depth = self.depth.saturating_sub(1);
                false
            }
            _ => self.depth == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_literals() {
        assert_eq!(
            parse_value("true"),
            Expression::BooleanLiteral { value: true }
        );
        assert_eq!(
            parse_value(" false "),
            Expression::BooleanLiteral { value: false }
        );
        assert_eq!(parse_value("auto"), Expression::identifier("auto"));
        assert_eq!(parse_value("120"), Expression::number(120.0));
        assert_eq!(parse_value("0.25"), Expression::number(0.25));
        assert_eq!(parse_value("\"kick.wav\""), Expression::string("kick.wav"));
        assert_eq!(
            parse_value("synth sine"),
            Expression::SynthReference {
                name: "sine".into()
            }
        );
        assert_eq!(parse_value("tempo"), Expression::identifier("tempo"));
    }

    #[test]
    fn numbers_keep_their_written_digits() {
        let Expression::NumberLiteral { raw, .. } = parse_value("12345678901234567891") else {
            panic!("expected number");
        };
        assert_eq!(raw, "12345678901234567891");
        assert!(matches!(
            classify_duration("007"),
            Some(DurationValue::Milliseconds { value, raw }) if value == 7.0 && raw == "007"
        ));
    }

    #[test]
    fn parse_value_empty_is_empty_object() {
        assert_eq!(
            parse_value("   "),
            Expression::ObjectLiteral { properties: vec![] }
        );
    }

    #[test]
    fn parse_value_rejects_signed_and_exponent_numbers() {
        assert_eq!(parse_value("-1"), Expression::identifier("-1"));
        assert_eq!(parse_value("1e3"), Expression::identifier("1e3"));
        assert_eq!(parse_value("1."), Expression::identifier("1."));
    }

    #[test]
    fn parse_value_nested_objects() {
        let value = parse_value(r#"{a: 1, b: {c: "x, y"}, d: [1, 2]}"#);
        let Expression::ObjectLiteral { properties } = value else {
            panic!("expected object, got {value:?}");
        };
        assert_eq!(properties.len(), 3);
        assert_eq!(properties[0].key, "a");
        assert_eq!(properties[0].value, Expression::number(1.0));
        assert_eq!(
            properties[1].value,
            Expression::ObjectLiteral {
                properties: vec![Property {
                    key: "c".into(),
                    value: Expression::string("x, y"),
                }]
            }
        );
        assert_eq!(properties[2].value, Expression::identifier("[1, 2]"));
    }

    #[test]
    fn malformed_object_falls_back_to_identifier() {
        assert_eq!(
            parse_value("{a: 1, b}"),
            Expression::identifier("{a: 1, b}")
        );
        assert_eq!(parse_value("{a: }"), Expression::identifier("{a: }"));
    }

    #[test]
    fn split_arguments_respects_strings_and_braces() {
        assert_eq!(
            split_arguments(r#"1/4 "a b", {x: 1, y: 2}  tail"#),
            vec!["1/4", "\"a b\"", "{x: 1, y: 2}", "tail"]
        );
    }

    #[test]
    fn split_call_arguments_keeps_spaces() {
        assert_eq!(
            split_call_arguments(r#"10, "a, b", f(1, 2)"#),
            vec!["10", "\"a, b\"", "f(1, 2)"]
        );
        assert!(split_call_arguments("  ").is_empty());
    }

    #[test]
    fn escaped_backslash_closes_string() {
        // "a\\" ends the literal, so the comma after it separates.
        assert_eq!(
            split_call_arguments(r#""a\\", b"#),
            vec![r#""a\\""#, "b"]
        );
        // "a\", b" stays one literal.
        assert_eq!(split_call_arguments(r#""a\", b""#), vec![r#""a\", b""#]);
    }

    #[test]
    fn split_arrows_ignores_nested_arrows() {
        assert_eq!(
            split_arrows(r#"synth -> attack(10) -> note("a->b")"#),
            vec!["synth", "attack(10)", "note(\"a->b\")"]
        );
        assert_eq!(split_arrows("plain"), vec!["plain"]);
    }

    #[test]
    fn open_depth_counts_outside_strings() {
        assert_eq!(open_depth("let x = {", '{', '}'), 1);
        assert_eq!(open_depth("{a: \"{\"}", '{', '}'), 0);
        assert_eq!(open_depth("}", '{', '}'), -1);
        assert_eq!(open_depth("f(1, (2", '(', ')'), 2);
    }

    #[test]
    fn durations_classify_in_order() {
        assert_eq!(classify_duration("1/4"), Some(DurationValue::beat("1/4")));
        assert_eq!(
            classify_duration("250"),
            Some(DurationValue::milliseconds(250.0))
        );
        assert_eq!(classify_duration("auto"), Some(DurationValue::AutoDuration));
        assert_eq!(classify_duration("1/x"), None);
        assert_eq!(classify_duration("fast"), None);
    }

    #[test]
    fn keyframes_split_on_either_separator() {
        assert_eq!(
            split_keyframe("50% = 0.8"),
            Some(("50", KeyframeSeparator::Equals, "0.8"))
        );
        assert_eq!(
            split_keyframe("12.5%: {a: 1}"),
            Some(("12.5", KeyframeSeparator::Colon, "{a: 1}"))
        );
        assert_eq!(split_keyframe("50 = 0.8"), None);
    }

    #[test]
    fn names() {
        assert!(is_name("drums_1"));
        assert!(is_name("$env.bpm"));
        assert!(!is_name(""));
        assert!(!is_name("two words"));
    }
}
