// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use std::fmt::{Display, Formatter};
use crate::lexer::LexerData;
use crate::{CollectJoin, TokenId};

type BitBlock = u64;

const BLOCK_NBITS: usize = BitBlock::BITS as usize;

/// Set of token ordinals.
///
/// The universe is the current token count of the grammar (registered regular expressions
/// followed by the extra tokens); it's only needed by [not](TokenSet::not), so the other
/// operations work whatever the number of tokens registered so far.
///
/// The `incomplete` flag marks a FOLLOW set that couldn't be determined locally: it must be
/// taken as unknown, not as empty.
#[derive(Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct TokenSet {
    blocks: Vec<BitBlock>,
    incomplete: bool,
}

impl TokenSet {
    pub fn new() -> Self {
        TokenSet { blocks: Vec::new(), incomplete: false }
    }

    pub fn from_token(ordinal: TokenId) -> Self {
        let mut s = Self::new();
        s.set(ordinal);
        s
    }

    pub fn set(&mut self, ordinal: TokenId) {
        let (block, bit) = Self::position(ordinal);
        if block >= self.blocks.len() {
            self.blocks.resize(block + 1, 0);
        }
        self.blocks[block] |= 1 << bit;
    }

    pub fn clear(&mut self, ordinal: TokenId) {
        let (block, bit) = Self::position(ordinal);
        if let Some(b) = self.blocks.get_mut(block) {
            *b &= !(1 << bit);
            self.trim();
        }
    }

    pub fn get(&self, ordinal: TokenId) -> bool {
        let (block, bit) = Self::position(ordinal);
        self.blocks.get(block).map(|b| b & (1 << bit) != 0).unwrap_or(false)
    }

    /// Union with `other`. The `incomplete` flag of `self` is not modified.
    pub fn or(&mut self, other: &TokenSet) {
        if other.blocks.len() > self.blocks.len() {
            self.blocks.resize(other.blocks.len(), 0);
        }
        for (b, o) in self.blocks.iter_mut().zip(&other.blocks) {
            *b |= *o;
        }
    }

    /// Complement in the universe `[0, token_count)`; the bits beyond aren't modified.
    pub fn not(&mut self, token_count: usize) {
        let nblocks = (token_count + BLOCK_NBITS - 1) / BLOCK_NBITS;
        if nblocks > self.blocks.len() {
            self.blocks.resize(nblocks, 0);
        }
        for (i, b) in self.blocks.iter_mut().enumerate().take(nblocks) {
            let first = i * BLOCK_NBITS;
            let n = (token_count - first).min(BLOCK_NBITS);
            let mask = if n == BLOCK_NBITS { BitBlock::MAX } else { (1 << n) - 1 };
            *b ^= mask;
        }
        self.trim();
    }

    pub fn cardinality(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == 0)
    }

    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    pub fn set_incomplete(&mut self, incomplete: bool) {
        self.incomplete = incomplete;
    }

    /// Iterates over the ordinals in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.blocks.iter().enumerate().flat_map(|(i, &b)| {
            (0..BLOCK_NBITS)
                .filter(move |bit| b & (1 << bit) != 0)
                .map(move |bit| (i * BLOCK_NBITS + bit) as TokenId)
        })
    }

    /// Raw words of the set, padded to `1 + token_count / 64` words as the generated tables expect.
    pub fn to_words(&self, token_count: usize) -> Vec<BitBlock> {
        let mut words = self.blocks.clone();
        let len = 1 + token_count / BLOCK_NBITS;
        if words.len() < len {
            words.resize(len, 0);
        }
        words
    }

    /// Names of the tokens in the set, limited to the current token count of `lexer_data`.
    pub fn token_names(&self, lexer_data: &LexerData) -> Vec<String> {
        self.tokens_within(lexer_data).map(|ordinal| lexer_data.token_name(ordinal)).collect()
    }

    pub fn first_token_name(&self, lexer_data: &LexerData) -> Option<String> {
        self.tokens_within(lexer_data).next().map(|ordinal| lexer_data.token_name(ordinal))
    }

    pub fn comma_delimited_tokens(&self, lexer_data: &LexerData) -> String {
        if self.cardinality() <= 1 {
            self.first_token_name(lexer_data).unwrap_or_default()
        } else {
            self.token_names(lexer_data).join(", ")
        }
    }

    fn tokens_within<'a>(&'a self, lexer_data: &LexerData) -> impl Iterator<Item = TokenId> + 'a {
        let token_count = lexer_data.token_count();
        self.iter().take_while(move |&ordinal| (ordinal as usize) < token_count)
    }

    #[inline]
    fn position(ordinal: TokenId) -> (usize, usize) {
        let ordinal = ordinal as usize;
        (ordinal / BLOCK_NBITS, ordinal % BLOCK_NBITS)
    }

    fn trim(&mut self) {
        while self.blocks.last() == Some(&0) {
            self.blocks.pop();
        }
    }
}

impl FromIterator<TokenId> for TokenSet {
    fn from_iter<T: IntoIterator<Item = TokenId>>(iter: T) -> Self {
        let mut s = TokenSet::new();
        for ordinal in iter {
            s.set(ordinal);
        }
        s
    }
}

impl Display for TokenSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.iter().join(", "), if self.incomplete { "+?" } else { "" })
    }
}

// ---------------------------------------------------------------------------------------------
