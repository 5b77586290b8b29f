//! Structural nesting check (§4.5, the reference translator's `code_correctness_check`): every
//! `if` finds a `then`, every `do`/`doi` and `begin` finds a `loop`/`mloop`/`until`, `else`
//! appears at most once per `if`, `leave` appears inside a loop, and word definitions never
//! nest or straddle an open block.
//!
//! Runs before desugaring so error positions point at the user's own source, not synthesized
//! string-literal tokens.

use crate::error::ValidationError;
use crate::token::{Token, TokenKind};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Block {
    Loop,
    While,
    If { has_else: bool },
}

pub fn validate(tokens: &[Token]) -> Result<(), ValidationError> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut in_word_def = false;

    for token in tokens {
        match &token.kind {
            TokenKind::WordDefStart(_) => {
                if in_word_def || !blocks.is_empty() {
                    return Err(ValidationError::MisplacedWordDef {
                        term: token.term.clone(),
                    });
                }
                in_word_def = true;
            }
            TokenKind::WordDefEnd => {
                if !in_word_def || !blocks.is_empty() {
                    return Err(ValidationError::MisplacedWordDef {
                        term: token.term.clone(),
                    });
                }
                in_word_def = false;
            }
            TokenKind::Identifier(name) => match name.as_str() {
                "do" | "doi" => blocks.push(Block::Loop),
                "begin" => blocks.push(Block::While),
                "if" => blocks.push(Block::If { has_else: false }),
                "else" => match blocks.last_mut() {
                    Some(Block::If { has_else }) if !*has_else => *has_else = true,
                    _ => {
                        return Err(ValidationError::DoubleElse {
                            term: token.term.clone(),
                        })
                    }
                },
                "then" => match blocks.pop() {
                    Some(Block::If { .. }) => {}
                    _ => {
                        return Err(ValidationError::UnmatchedClose {
                            term: token.term.clone(),
                        })
                    }
                },
                "loop" | "mloop" => match blocks.pop() {
                    Some(Block::Loop) => {}
                    _ => {
                        return Err(ValidationError::UnmatchedClose {
                            term: token.term.clone(),
                        })
                    }
                },
                "until" => match blocks.pop() {
                    Some(Block::While) => {}
                    _ => {
                        return Err(ValidationError::UnmatchedClose {
                            term: token.term.clone(),
                        })
                    }
                },
                "leave" => {
                    let inside_loop = blocks
                        .iter()
                        .any(|b| matches!(b, Block::Loop | Block::While));
                    if !inside_loop {
                        return Err(ValidationError::LeaveOutsideLoop {
                            term: token.term.clone(),
                        });
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }

    if in_word_def || !blocks.is_empty() {
        return Err(ValidationError::UnclosedBlocks);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn check(src: &str) -> Result<(), ValidationError> {
        validate(&tokenize(src).unwrap())
    }

    #[test]
    fn accepts_balanced_if_then() {
        assert!(check("1 if 2 then").is_ok());
    }

    #[test]
    fn accepts_if_else_then() {
        assert!(check("1 if 2 else 3 then").is_ok());
    }

    #[test]
    fn rejects_double_else() {
        assert!(matches!(
            check("1 if 2 else 3 else 4 then"),
            Err(ValidationError::DoubleElse { .. })
        ));
    }

    #[test]
    fn rejects_unmatched_then() {
        assert!(matches!(
            check("1 then"),
            Err(ValidationError::UnmatchedClose { .. })
        ));
    }

    #[test]
    fn accepts_do_loop_with_leave() {
        assert!(check("5 0 do 1 leave loop").is_ok());
    }

    #[test]
    fn accepts_leave_inside_begin_until() {
        assert!(check("begin 1 leave 0 until").is_ok());
    }

    #[test]
    fn rejects_leave_outside_any_loop() {
        assert!(matches!(
            check("leave"),
            Err(ValidationError::LeaveOutsideLoop { .. })
        ));
    }

    #[test]
    fn rejects_nested_word_definitions() {
        assert!(matches!(
            check(":outer :inner ; ;"),
            Err(ValidationError::MisplacedWordDef { .. })
        ));
    }

    #[test]
    fn rejects_unclosed_block_at_end_of_source() {
        assert!(matches!(
            check("1 if 2"),
            Err(ValidationError::UnclosedBlocks)
        ));
    }
}
