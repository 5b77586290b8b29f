//! Lexes, validates, desugars, and lowers `.forthchan` source text into a flat `Instruction`
//! stream (§4.5) ready to hand to `progimage::write` or boot straight into a `forthchan::DataPath`.

mod desugar;
mod error;
mod lexer;
mod lower;
mod token;
mod validate;

pub use error::{Error, LexError, LowerError, ValidationError};
pub use token::{Comparator, Sign, Token, TokenKind, VariableOp};

use forthchan::isa::Instruction;

/// Compiles one source file in a single pass (§4.5): tokenize, check block/word-definition
/// nesting, expand string literals, then emit instructions.
pub fn compile(source: &str) -> Result<Vec<Instruction>, Error> {
    let tokens = lexer::tokenize(source)?;
    validate::validate(&tokens)?;
    let tokens = desugar::desugar(tokens);
    let code = lower::lower(tokens)?;
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forthchan::isa::Opcode;

    #[test]
    fn compiles_a_small_program_end_to_end() {
        let code = compile("1 2 + cr").unwrap();
        assert_eq!(code.last().unwrap().opcode, Opcode::Halt);
    }

    #[test]
    fn reports_a_lex_error_for_garbage_tokens() {
        assert!(matches!(compile("1 !!! 2"), Err(Error::Lex(_))));
    }

    #[test]
    fn reports_a_validation_error_for_unbalanced_blocks() {
        assert!(matches!(compile("1 if 2"), Err(Error::Validation(_))));
    }

    #[test]
    fn reports_a_lower_error_for_undefined_words() {
        assert!(matches!(compile("not_a_real_word"), Err(Error::Lower(_))));
    }
}
