//! Splits source text into lines, lines into chunks (pest), and chunks into classified
//! [`Token`]s (§6.2). A bare `\` chunk starts a line comment: the rest of the line is dropped.

use pest::Parser;
use pest_derive::Parser;

use forthchan::isa::Term;

use crate::error::LexError;
use crate::token::{classify, Token};

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct LineGrammar;

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    for (line_idx, line) in source.lines().enumerate() {
        let line_number = (line_idx + 1) as u32;
        let mut pairs = LineGrammar::parse(Rule::line, line).map_err(|err| LexError::Grammar {
            line: line_number,
            message: err.to_string(),
        })?;
        let line_pair = pairs.next().expect("`line` rule always produces exactly one pair");

        let mut pos = 0u32;
        for chunk in line_pair.into_inner() {
            if chunk.as_rule() == Rule::EOI {
                continue;
            }
            pos += 1;
            let text = chunk.as_str();
            if text == "\\" {
                break;
            }
            let term = Term::new(line_number, pos, text);
            let kind = classify(text).ok_or_else(|| LexError::UnknownToken { term: term.clone() })?;
            tokens.push(Token { kind, term });
        }
    }
    Ok(tokens)
}
