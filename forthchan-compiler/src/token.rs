//! Classifies a single whitespace/quote-delimited chunk into a [`TokenKind`] (§6.2).
//!
//! Ported from the reference translator's `is_*` predicate family, but each predicate returns the
//! data it discovered (the sign, the comparator, the variable name) instead of a bare bool, so
//! `lower` never has to re-parse a token's text.

use forthchan::isa::Term;

/// The largest magnitude a `number` literal may carry (§4.5: "at least 56-bit signed values").
pub const LITERAL_LIMIT: i64 = 1 << 56;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sign {
    Plus,
    Minus,
    Star,
    Slash,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Comparator {
    Eq,
    Neq,
    Less,
    Gr,
    Le,
    Ge,
}

/// A variable use, already split into its shape (§4.5 "variable operations").
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum VariableOp {
    Read(String),
    Write(String),
    Address(String),
    /// `name-K`: declares `name` as (at least) a `K`-cell array; emits no instruction of its own,
    /// it only contributes to the variable's allocated size.
    ArraySlot { name: String, size: u32 },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Number(i64),
    Sign(Sign),
    Comparator(Comparator),
    /// `:name`
    WordDefStart(String),
    /// `;`
    WordDefEnd,
    /// A `"..."` literal, with the surrounding quotes stripped.
    StringImm(String),
    VariableOp(VariableOp),
    /// Every other bare word: built-in vocabulary, control keywords (`if`, `do`, `loop`, ...),
    /// port words, and user word names. `lower` dispatches on the string itself, same as the
    /// keyword re-checks the reference translator does after its own `is_user_word` pass.
    Identifier(String),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub term: Term,
}

/// Classifies one already-split chunk of source text. Returns `None` for text that matches none
/// of the recognized token shapes, which the caller turns into a fatal lexical error — unlike the
/// reference translator, which silently dropped such tokens.
pub fn classify(text: &str) -> Option<TokenKind> {
    if let Some(n) = parse_number(text) {
        return Some(TokenKind::Number(n));
    }
    if let Some(sign) = parse_sign(text) {
        return Some(TokenKind::Sign(sign));
    }
    if let Some(cmp) = parse_comparator(text) {
        return Some(TokenKind::Comparator(cmp));
    }
    if is_user_word(text) {
        return Some(TokenKind::Identifier(text.to_string()));
    }
    if let Some(op) = parse_variable_op(text) {
        return Some(TokenKind::VariableOp(op));
    }
    if let Some(kind) = parse_word_def(text) {
        return Some(kind);
    }
    if is_string_imm(text) {
        return Some(TokenKind::StringImm(text[1..text.len() - 1].to_string()));
    }
    None
}

fn parse_number(s: &str) -> Option<i64> {
    let v: i64 = s.parse().ok()?;
    let within_limit = if v < 0 {
        -v < LITERAL_LIMIT
    } else {
        v < LITERAL_LIMIT - 1
    };
    if within_limit {
        Some(v)
    } else {
        None
    }
}

fn parse_sign(s: &str) -> Option<Sign> {
    match s {
        "+" => Some(Sign::Plus),
        "-" => Some(Sign::Minus),
        "*" => Some(Sign::Star),
        "/" => Some(Sign::Slash),
        _ => None,
    }
}

fn parse_comparator(s: &str) -> Option<Comparator> {
    match s {
        "=" => Some(Comparator::Eq),
        "<>" => Some(Comparator::Neq),
        "<" => Some(Comparator::Less),
        ">" => Some(Comparator::Gr),
        "<=" => Some(Comparator::Le),
        ">=" => Some(Comparator::Ge),
        _ => None,
    }
}

fn parse_word_def(s: &str) -> Option<TokenKind> {
    if s == ";" {
        return Some(TokenKind::WordDefEnd);
    }
    let rest = s.strip_prefix(':')?;
    if is_user_word(rest) {
        Some(TokenKind::WordDefStart(rest.to_string()))
    } else {
        None
    }
}

fn is_string_imm(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('"') && s.ends_with('"')
}

/// `^[A-Za-z][A-Za-z\-\\_]*$`
pub fn is_user_word(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphabetic() || matches!(c, '-' | '\\' | '_'))
}

/// A user word prefixed with `_`: the namespace the compiler reserves for its own synthetic
/// variables (string-literal desugaring).
pub fn is_compiler_word(s: &str) -> bool {
    s.len() > 1 && s.starts_with('_') && is_user_word(&s[1..])
}

fn parse_variable_op(s: &str) -> Option<VariableOp> {
    let parts: Vec<&str> = s.split('-').collect();
    match parts.as_slice() {
        [_] => {
            if s.is_empty() {
                return None;
            }
            let (name, suffix) = s.split_at(s.len() - 1);
            if !(is_compiler_word(name) || is_user_word(name)) {
                return None;
            }
            match suffix {
                "!" => Some(VariableOp::Write(name.to_string())),
                "?" => Some(VariableOp::Read(name.to_string())),
                "&" => Some(VariableOp::Address(name.to_string())),
                _ => None,
            }
        }
        [name, size_str] => {
            if (is_user_word(name) || is_compiler_word(name)) && parse_number(size_str).is_some() {
                let size: u32 = size_str.parse().ok()?;
                Some(VariableOp::ArraySlot {
                    name: name.to_string(),
                    size,
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_numbers_within_and_beyond_the_limit() {
        assert_eq!(classify("42"), Some(TokenKind::Number(42)));
        assert_eq!(classify("-7"), Some(TokenKind::Number(-7)));
        assert_eq!(classify(&LITERAL_LIMIT.to_string()), None);
    }

    #[test]
    fn classifies_signs_and_comparators() {
        assert_eq!(classify("+"), Some(TokenKind::Sign(Sign::Plus)));
        assert_eq!(classify("<="), Some(TokenKind::Comparator(Comparator::Le)));
    }

    #[test]
    fn classifies_word_def_boundaries() {
        assert_eq!(
            classify(":square"),
            Some(TokenKind::WordDefStart("square".to_string()))
        );
        assert_eq!(classify(";"), Some(TokenKind::WordDefEnd));
    }

    #[test]
    fn classifies_variable_ops() {
        assert_eq!(
            classify("counter!"),
            Some(TokenKind::VariableOp(VariableOp::Write("counter".to_string())))
        );
        assert_eq!(
            classify("counter?"),
            Some(TokenKind::VariableOp(VariableOp::Read("counter".to_string())))
        );
        assert_eq!(
            classify("buf&"),
            Some(TokenKind::VariableOp(VariableOp::Address("buf".to_string())))
        );
        assert_eq!(
            classify("buf-10"),
            Some(TokenKind::VariableOp(VariableOp::ArraySlot {
                name: "buf".to_string(),
                size: 10
            }))
        );
        assert_eq!(
            classify("_string_pointer!"),
            Some(TokenKind::VariableOp(VariableOp::Write(
                "_string_pointer".to_string()
            )))
        );
    }

    #[test]
    fn classifies_identifiers_and_rejects_garbage() {
        assert_eq!(classify("do"), Some(TokenKind::Identifier("do".to_string())));
        assert_eq!(classify("swap"), Some(TokenKind::Identifier("swap".to_string())));
        assert_eq!(classify("foo-bar"), Some(TokenKind::Identifier("foo-bar".to_string())));
        assert_eq!(classify("3abc"), None);
        assert_eq!(classify("!!!"), None);
    }

    #[test]
    fn classifies_string_immediates() {
        assert_eq!(
            classify("\"hi\""),
            Some(TokenKind::StringImm("hi".to_string()))
        );
    }
}
