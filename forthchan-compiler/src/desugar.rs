//! Expands `"..."` string literals (and the bare `print_string` word) into the token sequence
//! that actually prints them (§4.5), the same way the reference translator's
//! `print_string_code_terms`/`replace_complex_terms` pair does: declare a scratch array big
//! enough for the text plus a NUL terminator, store each character, then busy-loop over the main
//! port until every byte (up to the terminator) has been emitted.
//!
//! Synthetic tokens reuse the ordinary [`classify`] path — they are built from the exact same
//! vocabulary a user could type by hand, just generated rather than parsed.

use forthchan::isa::Term;

use crate::token::{classify, Token, TokenKind};

fn expand_words(term: &Term, template: &str) -> Vec<Token> {
    template
        .split_whitespace()
        .map(|word| {
            let kind = classify(word)
                .unwrap_or_else(|| panic!("internal desugaring template word {:?} does not classify", word));
            Token {
                kind,
                term: term.clone(),
            }
        })
        .collect()
}

/// The print loop alone, shared by both string literals and a standalone `print_string` word.
fn print_string_tokens(term: &Term) -> Vec<Token> {
    expand_words(
        term,
        "_string_pointer! \
         begin \
             _string_pointer? pick_absolute \
             dup \
             if drop leave then \
             begin cant_emit 0 = until \
             emit \
             _string_pointer? 1 + _string_pointer! \
         0 until",
    )
}

fn string_literal_tokens(term: &Term, content: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let array_size = content.chars().count() + 1;
    tokens.extend(expand_words(
        term,
        &format!("_string-{} _string& _string_pointer!", array_size),
    ));
    for ch in content.chars() {
        tokens.extend(expand_words(
            term,
            &format!(
                "{code} _string_pointer? put_absolute _string_pointer? 1 + _string_pointer!",
                code = ch as u32
            ),
        ));
    }
    tokens.extend(expand_words(term, "0 _string_pointer? put_absolute _string&"));
    tokens.extend(print_string_tokens(term));
    tokens
}

pub fn desugar(tokens: Vec<Token>) -> Vec<Token> {
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        match &token.kind {
            TokenKind::Identifier(name) if name == "print_string" => {
                expanded.extend(print_string_tokens(&token.term));
            }
            TokenKind::StringImm(content) => {
                expanded.extend(string_literal_tokens(&token.term, content));
            }
            _ => expanded.push(token),
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    #[test]
    fn string_literal_expands_to_no_string_imm_tokens() {
        let tokens = tokenize("\"hi\" halt").unwrap();
        let expanded = desugar(tokens);
        assert!(!expanded
            .iter()
            .any(|t| matches!(t.kind, TokenKind::StringImm(_))));
        assert!(matches!(
            expanded.last().unwrap().kind,
            TokenKind::Identifier(ref name) if name == "halt"
        ));
    }

    #[test]
    fn empty_string_literal_still_reserves_a_terminator_slot() {
        let tokens = tokenize("\"\"").unwrap();
        let expanded = desugar(tokens);
        assert!(expanded
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::VariableOp(crate::token::VariableOp::ArraySlot { size: 1, .. }))));
    }

    #[test]
    fn print_string_word_expands_without_a_literal() {
        let tokens = tokenize("print_string").unwrap();
        let expanded = desugar(tokens);
        assert!(expanded.len() > 1);
    }

    #[test]
    fn non_string_tokens_pass_through_unchanged() {
        let tokens = tokenize("1 2 +").unwrap();
        let expanded = desugar(tokens.clone());
        assert_eq!(tokens, expanded);
    }
}
