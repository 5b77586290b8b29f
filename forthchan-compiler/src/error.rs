//! Error types, split by compiler stage the same way the donor `vasm` crate splits `ParseError`
//! from `AssembleError`: a fatal shape problem at the character level (`LexError`), a fatal
//! nesting problem at the block level (`ValidationError`), and a fatal reference problem at the
//! whole-program level (`LowerError`), all folded into one top-level [`Error`].

use std::fmt;

use forthchan::isa::Term;

#[derive(Clone, Debug, PartialEq)]
pub enum LexError {
    /// The line doesn't even parse as whitespace/quote-delimited chunks (an unterminated `"`).
    Grammar { line: u32, message: String },
    /// A chunk that doesn't match any recognized token shape (§6.2).
    UnknownToken { term: Term },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexError::Grammar { line, message } => write!(f, "line {}: {}", line, message),
            LexError::UnknownToken { term } => write!(
                f,
                "{}:{}: unrecognized token {:?}",
                term.line_number, term.line_position, term.name
            ),
        }
    }
}

impl std::error::Error for LexError {}

#[derive(Clone, Debug, PartialEq)]
pub enum ValidationError {
    /// `then`/`loop`/`mloop`/`until` with nothing open to close.
    UnmatchedClose { term: Term },
    /// A second `else` inside the same `if ... then`.
    DoubleElse { term: Term },
    /// `leave` outside any `do`/`doi ... loop`/`mloop` or `begin ... until` block.
    LeaveOutsideLoop { term: Term },
    /// A word definition opened while another is already open, or a control block left open
    /// across a word definition's boundary.
    MisplacedWordDef { term: Term },
    /// End of source reached with blocks or a word definition still open.
    UnclosedBlocks,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationError::UnmatchedClose { term } => write!(
                f,
                "{}:{}: {:?} has nothing to close",
                term.line_number, term.line_position, term.name
            ),
            ValidationError::DoubleElse { term } => write!(
                f,
                "{}:{}: `if` already has an `else`",
                term.line_number, term.line_position
            ),
            ValidationError::LeaveOutsideLoop { term } => write!(
                f,
                "{}:{}: `leave` outside of a loop",
                term.line_number, term.line_position
            ),
            ValidationError::MisplacedWordDef { term } => write!(
                f,
                "{}:{}: word definitions cannot nest or cross open control blocks",
                term.line_number, term.line_position
            ),
            ValidationError::UnclosedBlocks => {
                write!(f, "unexpected end of source: a block or word definition was never closed")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Clone, Debug, PartialEq)]
pub enum LowerError {
    /// A word call with no matching `:name ... ;` definition anywhere in the source.
    UndefinedWord { name: String, term: Term },
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LowerError::UndefinedWord { name, term } => write!(
                f,
                "{}:{}: call to undefined word {:?}",
                term.line_number, term.line_position, name
            ),
        }
    }
}

impl std::error::Error for LowerError {}

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    Lex(LexError),
    Validation(ValidationError),
    Lower(LowerError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Lex(e) => write!(f, "{}", e),
            Error::Validation(e) => write!(f, "{}", e),
            Error::Lower(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<LexError> for Error {
    fn from(err: LexError) -> Error {
        Error::Lex(err)
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Error {
        Error::Validation(err)
    }
}

impl From<LowerError> for Error {
    fn from(err: LowerError) -> Error {
        Error::Lower(err)
    }
}
