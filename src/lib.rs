// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use std::fmt::{Display, Formatter};

mod macros;
pub mod log;
pub mod build;
pub mod segments;
pub mod token_set;
pub mod lexer;
pub mod nfa;
pub mod grammar;
pub mod sanity;

// Analysis pipeline:
// - the front end fills a `Grammar` with token productions (regex trees) and BNF productions (expansion arena)
// - `SanityChecker` validates the grammar and registers the token ordinals
// - `LexerData::build_data` builds one NFA per lexical state, closes it and indexes the states
// - the code generator queries the expansion algebra (FIRST/FINAL/FOLLOW, sizes, lookahead requirements)

// ---------------------------------------------------------------------------------------------
// Shared types

/// Token ordinal (0 is the end-of-input pseudo-token)
pub type TokenId = u32;
/// Index of a regular expression in the grammar-wide regex arena (not an ordinal)
pub type RegexId = usize;
/// Index of a token production
pub type TpId = usize;
/// Index of an expansion node in the grammar-wide expansion arena
pub type ExpId = usize;
/// Index of a BNF production
pub type ProdId = usize;
/// Index of a lexical state
pub type LexStateId = usize;
/// Index of an NFA state in the state arena of its lexical state
pub type StateId = usize;

/// Size of an expansion that has no upper bound.
pub const UNBOUNDED: u32 = u32::MAX;

pub const DEFAULT_LEXICAL_STATE: &str = "DEFAULT";

/// Position of a construct in the grammar source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SrcLoc {
    pub line: u32,
    pub column: u32,
}

impl SrcLoc {
    pub fn new(line: u32, column: u32) -> Self {
        SrcLoc { line, column }
    }
}

impl Display for SrcLoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Grammar node a diagnostic is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Grammar,
    Production(ProdId),
    Expansion(ExpId),
    Regex(RegexId),
    /// regex specification `index` of token production `tp`
    RegexSpec(TpId, usize),
    LexicalState(LexStateId),
}

// ---------------------------------------------------------------------------------------------
// General helper functions

pub(crate) fn escape_char(c: char) -> String {
    match c {
        '\u{0}' => "MIN".to_string(),
        '\u{10ffff}' => "MAX".to_string(),
        _ => c.escape_debug().to_string(),
    }
}

/// Displays a codepoint, even if it's not a valid `char` (surrogates).
pub(crate) fn escape_codepoint(c: u32) -> String {
    match char::from_u32(c) {
        Some(c) => escape_char(c),
        None => format!("\\u{{{c:x}}}"),
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$'),
        _ => false,
    }
}

// ---------------------------------------------------------------------------------------------
// General helper traits

pub trait CollectJoin {
    fn join(&mut self, separator: &str) -> String
        where Self: Iterator,
              <Self as Iterator>::Item: ToString
    {
        self.map(|x| x.to_string()).collect::<Vec<_>>().join(separator)
    }

    fn to_vec(self) -> Vec<<Self as Iterator>::Item>
        where Self: Iterator + Sized
    {
        self.collect::<Vec<_>>()
    }
}

impl<I: Iterator> CollectJoin for I {}
