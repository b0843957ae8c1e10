// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.


use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use vectree::VecTree;
use iter_index::IndexerIterator;
use crate::log::{BufLog, Logger};
use crate::nfa::LexicalStateData;
use crate::segments::Segments;
use crate::token_set::TokenSet;
use crate::{is_identifier, CollectJoin, LexStateId, NodeRef, RegexId, SrcLoc, TokenId, TpId, UNBOUNDED};

// ---------------------------------------------------------------------------------------------
// Regular expressions

/// Regular expression operator, stored in a [ReTree].
///
/// * `CharList(segments, negated)`: character class
/// * `String(image)`: string literal
/// * `Concat`, `Or`: sequence and choice of the children
/// * `Star`, `Plus`, `Maybe`: `(child)*`, `(child)+`, `(child)?`
/// * `Repeat(min, max)`: `(child){min,max}`, with `max = None` for `{min,}`
/// * `Ref(name)`: reference to a named regular expression
/// * `Eof`: end of input
#[derive(Clone, Debug, PartialEq)]
pub enum ReType {
    CharList(Box<Segments>, bool),
    String(Box<String>),
    Concat,
    Or,
    Star,
    Plus,
    Maybe,
    Repeat(u32, Option<u32>),
    Ref(Box<String>),
    Eof,
}

impl Display for ReType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReType::CharList(segs, negated) => write!(f, "{}{segs}", if *negated { "~" } else { "" }),
            ReType::String(s) => write!(f, "{s:?}"),
            ReType::Concat => write!(f, "&"),
            ReType::Or => write!(f, "|"),
            ReType::Star => write!(f, "*"),
            ReType::Plus => write!(f, "+"),
            ReType::Maybe => write!(f, "?"),
            ReType::Repeat(min, Some(max)) => write!(f, "{{{min},{max}}}"),
            ReType::Repeat(min, None) => write!(f, "{{{min},}}"),
            ReType::Ref(name) => write!(f, "<{name}>"),
            ReType::Eof => write!(f, "<EOF>"),
        }
    }
}

pub type ReTree = VecTree<ReType>;

/// Single-node tree of a string literal.
pub fn re_string(image: &str) -> ReTree {
    let mut tree = ReTree::new();
    tree.add_root(ReType::String(Box::new(image.to_string())));
    tree
}

/// Single-node tree of a character class.
pub fn re_chars(segments: Segments, negated: bool) -> ReTree {
    let mut tree = ReTree::new();
    tree.add_root(ReType::CharList(Box::new(segments), negated));
    tree
}

/// Single-node tree of a reference to a named regular expression.
pub fn re_ref(name: &str) -> ReTree {
    let mut tree = ReTree::new();
    tree.add_root(ReType::Ref(Box::new(name.to_string())));
    tree
}

/// Kind of a token production.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind { Token, Skip, More, Unparsed }

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", match self {
            TokenKind::Token => "TOKEN",
            TokenKind::Skip => "SKIP",
            TokenKind::More => "MORE",
            TokenKind::Unparsed => "UNPARSED",
        })
    }
}

/// Regular expression of a token definition, or a terminal of a BNF production.
#[derive(Clone, Debug)]
pub struct RegularExpression {
    pub(crate) label: String,
    pub(crate) ordinal: Option<TokenId>,
    pub(crate) private: bool,
    pub(crate) tree: ReTree,
    pub(crate) token_production: Option<TpId>,
    pub(crate) new_lexical_state: Option<LexStateId>,
    pub(crate) action: Option<String>,
    pub(crate) loc: SrcLoc,
}

impl RegularExpression {
    pub fn new(label: &str, private: bool, tree: ReTree, token_production: Option<TpId>) -> Self {
        RegularExpression {
            label: label.to_string(),
            ordinal: None,
            private,
            tree,
            token_production,
            new_lexical_state: None,
            action: None,
            loc: SrcLoc::default(),
        }
    }

    /// The user label, or a synthesized one: `EOF` for ordinal 0, the ordinal otherwise.
    pub fn label(&self) -> String {
        if !self.label.is_empty() {
            self.label.clone()
        } else {
            match self.ordinal {
                Some(0) | None => "EOF".to_string(),
                Some(ordinal) => ordinal.to_string(),
            }
        }
    }

    pub fn has_label(&self) -> bool {
        !self.label.is_empty()
    }

    pub fn ordinal(&self) -> Option<TokenId> {
        self.ordinal
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn tree(&self) -> &ReTree {
        &self.tree
    }

    pub fn token_production(&self) -> Option<TpId> {
        self.token_production
    }

    pub fn new_lexical_state(&self) -> Option<LexStateId> {
        self.new_lexical_state
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn loc(&self) -> SrcLoc {
        self.loc
    }

    pub fn root_op(&self) -> Option<&ReType> {
        self.tree.get_root().map(|root| self.tree.get(root))
    }

    /// Image of a string literal.
    pub fn image(&self) -> Option<&str> {
        match self.root_op() {
            Some(ReType::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Referenced name if the expression is a plain reference `<NAME>`.
    pub fn reference(&self) -> Option<&str> {
        match self.root_op() {
            Some(ReType::Ref(name)) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.root_op(), Some(ReType::Or))
    }

    /// Names referenced anywhere in the tree, in depth-first order.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        if let Some(root) = self.tree.get_root() {
            let mut stack = vec![root];
            while let Some(node) = stack.pop() {
                if let ReType::Ref(name) = self.tree.get(node) {
                    refs.push(name.as_str());
                }
                stack.extend(self.tree.children(node).iter().rev());
            }
        }
        refs
    }
}

// ---------------------------------------------------------------------------------------------
// Token productions

#[derive(Clone, Debug)]
pub struct RegexSpec {
    pub(crate) regex: RegexId,
    pub(crate) next_state: Option<String>,
    pub(crate) action: Option<String>,
    pub(crate) loc: SrcLoc,
}

impl RegexSpec {
    pub fn regex(&self) -> RegexId {
        self.regex
    }

    pub fn next_state(&self) -> Option<&str> {
        self.next_state.as_deref()
    }
}

/// Group of regular expressions declared with the same kind, in the same lexical states.
///
/// A non-explicit token production is created for the string literals used directly in
/// the BNF productions.
#[derive(Clone, Debug)]
pub struct TokenProduction {
    pub(crate) kind: TokenKind,
    pub(crate) lexical_states: Vec<String>,
    pub(crate) ignore_case: bool,
    pub(crate) explicit: bool,
    pub(crate) specs: Vec<RegexSpec>,
    pub(crate) loc: SrcLoc,
}

impl TokenProduction {
    pub fn new(kind: TokenKind, lexical_states: Vec<String>, ignore_case: bool, explicit: bool) -> Self {
        TokenProduction { kind, lexical_states, ignore_case, explicit, specs: Vec::new(), loc: SrcLoc::default() }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn lexical_states(&self) -> &[String] {
        &self.lexical_states
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn specs(&self) -> &[RegexSpec] {
        &self.specs
    }
}

// ---------------------------------------------------------------------------------------------
// Lexer data

/// Grammar-wide registry of the lexical part: regular expressions, ordinals and lexical states.
#[derive(Clone, Debug)]
pub struct LexerData {
    /// all the regular expressions, registered or not
    pub(crate) regexes: Vec<RegularExpression>,
    /// registered regular expressions, indexed by ordinal
    pub(crate) ordinals: Vec<RegexId>,
    pub(crate) token_productions: Vec<TokenProduction>,
    pub(crate) lexical_states: Vec<LexicalStateData>,
    pub(crate) named_tokens: HashMap<String, RegexId>,
    pub(crate) extra_tokens: Vec<String>,
    pub(crate) ignore_case: bool,
}

impl LexerData {
    pub const EOF: RegexId = 0;

    pub fn new(ignore_case: bool) -> Self {
        let mut eof_tree = ReTree::new();
        eof_tree.add_root(ReType::Eof);
        let mut eof = RegularExpression::new("EOF", false, eof_tree, None);
        eof.ordinal = Some(0);
        LexerData {
            regexes: vec![eof],
            ordinals: vec![Self::EOF],
            token_productions: Vec::new(),
            lexical_states: Vec::new(),
            named_tokens: HashMap::new(),
            extra_tokens: Vec::new(),
            ignore_case,
        }
    }

    // -----------------------------------------------------------------------------------------
    // regular expressions

    pub(crate) fn add_regex(&mut self, regex: RegularExpression) -> RegexId {
        let id = self.regexes.len();
        self.regexes.push(regex);
        id
    }

    pub fn add_token_production(&mut self, tp: TokenProduction) -> TpId {
        self.token_productions.push(tp);
        self.token_productions.len() - 1
    }

    /// Adds a regular expression to a token production.
    pub fn add_regex_spec(&mut self, tp: TpId, label: &str, private: bool, tree: ReTree) -> RegexId {
        let id = self.add_regex(RegularExpression::new(label, private, tree, Some(tp)));
        self.token_productions[tp].specs.push(RegexSpec { regex: id, next_state: None, action: None, loc: SrcLoc::default() });
        id
    }

    /// Sets the lexical state the lexer switches to after matching the last regular expression
    /// added to `tp`, and the action it executes.
    pub fn set_spec_transition(&mut self, tp: TpId, next_state: Option<&str>, action: Option<&str>) {
        if let Some(spec) = self.token_productions[tp].specs.last_mut() {
            spec.next_state = next_state.map(|s| s.to_string());
            spec.action = action.map(|s| s.to_string());
        }
    }

    pub fn regex(&self, id: RegexId) -> &RegularExpression {
        &self.regexes[id]
    }

    pub fn num_regexes(&self) -> usize {
        self.regexes.len()
    }

    /// Registers the regular expression as a token type and gives it the next ordinal.
    pub fn add_regular_expression(&mut self, id: RegexId) -> TokenId {
        let ordinal = self.ordinals.len() as TokenId;
        self.regexes[id].ordinal = Some(ordinal);
        self.ordinals.push(id);
        ordinal
    }

    /// Registered regular expression of ordinal `ordinal`; `None` for extra tokens and [UNBOUNDED].
    pub fn regular_expression(&self, ordinal: TokenId) -> Option<&RegularExpression> {
        if ordinal == UNBOUNDED {
            return None;
        }
        self.ordinals.get(ordinal as usize).map(|&id| &self.regexes[id])
    }

    /// Registered regular expressions, by increasing ordinal.
    pub fn regular_expressions(&self) -> impl Iterator<Item = (TokenId, &RegularExpression)> {
        self.ordinals.iter().index::<TokenId>().map(|(ordinal, &id)| (ordinal, &self.regexes[id]))
    }

    pub fn num_regular_expressions(&self) -> usize {
        self.ordinals.len()
    }

    pub fn named_token(&self, name: &str) -> Option<RegexId> {
        self.named_tokens.get(name).copied()
    }

    /// Adds a named token and returns the regular expression previously defined with that name, if any.
    pub(crate) fn add_named_token(&mut self, name: &str, id: RegexId) -> Option<RegexId> {
        match self.named_tokens.get(name) {
            Some(&previous) => Some(previous),
            None => {
                self.named_tokens.insert(name.to_string(), id);
                None
            }
        }
    }

    pub fn add_extra_token(&mut self, name: &str) {
        if !self.extra_tokens.iter().any(|t| t == name) {
            self.extra_tokens.push(name.to_string());
        }
    }

    pub fn extra_tokens(&self) -> &[String] {
        &self.extra_tokens
    }

    /// Ordinal of an extra token; extra tokens come after all the registered regular expressions.
    pub fn extra_token_ordinal(&self, name: &str) -> Option<TokenId> {
        self.extra_tokens.iter().position(|t| t == name).map(|i| (self.ordinals.len() + i) as TokenId)
    }

    pub fn token_count(&self) -> usize {
        self.ordinals.len() + self.extra_tokens.len()
    }

    pub fn token_name(&self, ordinal: TokenId) -> String {
        let ordinal = ordinal as usize;
        if ordinal < self.ordinals.len() {
            self.regexes[self.ordinals[ordinal]].label()
        } else {
            self.extra_tokens.get(ordinal - self.ordinals.len()).cloned().unwrap_or_else(|| ordinal.to_string())
        }
    }

    pub fn token_productions(&self) -> &[TokenProduction] {
        &self.token_productions
    }

    pub fn token_production(&self, id: TpId) -> &TokenProduction {
        &self.token_productions[id]
    }

    /// Ignore-case flag of the regular expression: the flag of its token production, or the grammar's.
    pub fn ignore_case_of(&self, id: RegexId) -> bool {
        match self.regexes[id].token_production {
            Some(tp) => self.token_productions[tp].ignore_case,
            None => self.ignore_case,
        }
    }

    /// Kind of the token production the regular expression was declared in, if any.
    pub fn kind_of(&self, id: RegexId) -> Option<TokenKind> {
        self.regexes[id].token_production.map(|tp| self.token_productions[tp].kind)
    }

    /// Checks if the content of the regular expression can match an empty string. Unresolved
    /// and cyclic references are considered as not matching.
    pub fn matches_empty_string(&self, id: RegexId) -> bool {
        let mut visiting = vec![id];
        self.regexes[id].tree.get_root()
            .map(|root| self.node_matches_empty(id, root, &mut visiting))
            .unwrap_or(false)
    }

    fn node_matches_empty(&self, id: RegexId, node: usize, visiting: &mut Vec<RegexId>) -> bool {
        let tree = &self.regexes[id].tree;
        let mut children = tree.children(node).iter();
        match tree.get(node) {
            ReType::CharList(..) | ReType::Eof => false,
            ReType::String(s) => s.is_empty(),
            ReType::Concat => children.all(|&c| self.node_matches_empty(id, c, visiting)),
            ReType::Or => children.any(|&c| self.node_matches_empty(id, c, visiting)),
            ReType::Star | ReType::Maybe => true,
            ReType::Plus => children.all(|&c| self.node_matches_empty(id, c, visiting)),
            ReType::Repeat(min, _) => *min == 0 || children.all(|&c| self.node_matches_empty(id, c, visiting)),
            ReType::Ref(name) => {
                match self.named_tokens.get(name.as_str()) {
                    Some(&target) if !visiting.contains(&target) => {
                        visiting.push(target);
                        let result = self.regexes[target].tree.get_root()
                            .map(|root| self.node_matches_empty(target, root, visiting))
                            .unwrap_or(false);
                        visiting.pop();
                        result
                    }
                    _ => false,
                }
            }
        }
    }

    // -----------------------------------------------------------------------------------------
    // lexical states

    /// Adds a lexical state, or returns the index of the existing state with that name.
    pub fn add_lexical_state(&mut self, name: &str) -> LexStateId {
        match self.lexical_state_index(name) {
            Some(index) => index,
            None => {
                self.lexical_states.push(LexicalStateData::new(name));
                self.lexical_states.len() - 1
            }
        }
    }

    pub fn lexical_state(&self, name: &str) -> Option<&LexicalStateData> {
        self.lexical_states.iter().find(|lsd| lsd.name() == name)
    }

    pub fn lexical_state_index(&self, name: &str) -> Option<LexStateId> {
        self.lexical_states.iter().position(|lsd| lsd.name() == name)
    }

    pub fn lexical_state_name(&self, index: LexStateId) -> &str {
        self.lexical_states[index].name()
    }

    pub fn lexical_states(&self) -> &[LexicalStateData] {
        &self.lexical_states
    }

    pub fn num_lexical_states(&self) -> usize {
        self.lexical_states.len()
    }

    /// Lexical state of a regular expression: the last state that contains it, or the first state.
    pub fn regex_lexical_state(&self, id: RegexId) -> LexStateId {
        self.lexical_states.iter().enumerate()
            .filter(|(_, lsd)| lsd.contains_regular_expression(id))
            .map(|(index, _)| index)
            .last()
            .unwrap_or(0)
    }

    pub fn max_nfa_states(&self) -> usize {
        self.lexical_states.iter().map(|lsd| lsd.num_states()).max().unwrap_or(0)
    }

    pub fn has_lexical_state_transitions(&self) -> bool {
        self.lexical_states.len() > 1 && self.regular_expressions().any(|(_, re)| re.new_lexical_state.is_some())
    }

    pub fn has_token_actions(&self) -> bool {
        self.regular_expressions().any(|(_, re)| re.action.is_some())
    }

    // -----------------------------------------------------------------------------------------
    // labels and token classification

    /// Replaces the labels that are not identifiers by `_TOKEN_<ordinal>`, or by the upper-case
    /// image of a string literal if it's an identifier that isn't used yet.
    pub fn ensure_string_labels(&mut self) {
        for ordinal in 0..self.ordinals.len() {
            let id = self.ordinals[ordinal];
            if !is_identifier(&self.regexes[id].label()) {
                let mut label = format!("_TOKEN_{ordinal}");
                if let Some(image) = self.regexes[id].image() {
                    let upper = image.to_uppercase();
                    if is_identifier(&upper) && !self.regular_expressions().any(|(_, re)| re.label() == upper) {
                        label = upper;
                    }
                }
                self.regexes[id].label = label;
            }
        }
    }

    pub fn string_literal_label(&self, image: &str) -> Option<String> {
        self.regular_expressions()
            .find(|(_, re)| re.image() == Some(image))
            .map(|(_, re)| re.label())
    }

    fn tokens_of_kind(&self, kind: TokenKind) -> TokenSet {
        self.regular_expressions()
            .filter(|(_, re)| re.token_production.map(|tp| self.token_productions[tp].kind) == Some(kind))
            .map(|(ordinal, _)| ordinal)
            .collect()
    }

    pub fn more_tokens(&self) -> TokenSet {
        self.tokens_of_kind(TokenKind::More)
    }

    pub fn skipped_tokens(&self) -> TokenSet {
        self.tokens_of_kind(TokenKind::Skip)
    }

    pub fn unparsed_tokens(&self) -> TokenSet {
        self.tokens_of_kind(TokenKind::Unparsed)
    }

    /// Tokens of kind TOKEN, and the tokens defined outside any token production (like EOF).
    pub fn regular_tokens(&self) -> TokenSet {
        let mut result = self.tokens_of_kind(TokenKind::Token);
        for (ordinal, re) in self.regular_expressions() {
            if re.token_production.is_none() {
                result.set(ordinal);
            }
        }
        result
    }

    // -----------------------------------------------------------------------------------------
    // NFA generation

    /// Builds the NFA of each lexical state, then checks the choices that can't be matched
    /// and the lexical states without any token.
    ///
    /// The ordinals must have been assigned beforehand (see [SanityChecker](crate::sanity::SanityChecker)).
    pub fn build_data(&mut self, log: &mut BufLog) {
        const VERBOSE: bool = false;
        for tp_id in 0..self.token_productions.len() {
            for name in self.token_productions[tp_id].lexical_states.clone() {
                match self.lexical_state_index(&name) {
                    Some(index) => self.lexical_states[index].add_token_production(tp_id),
                    None => log.add_error_at(NodeRef::Grammar, format!("Lexical state \"{name}\" has not been defined.")),
                }
            }
        }
        let mut choices = Vec::<RegexId>::new();
        let mut lexical_states = std::mem::take(&mut self.lexical_states);
        for lsd in lexical_states.iter_mut() {
            choices.extend(lsd.process(self));
            if VERBOSE { println!("lexical state {}: {} states", lsd.name(), lsd.num_states()); }
        }
        self.lexical_states = lexical_states;
        self.set_transitions_and_actions();
        for choice in choices {
            self.check_unmatchability(choice, log);
        }
        for (index, lsd) in self.lexical_states.iter().enumerate() {
            if lsd.is_empty() {
                log.add_error_at(NodeRef::LexicalState(index), format!("Lexical State {} does not contain any token types!", lsd.name()));
            }
        }
    }

    fn set_transitions_and_actions(&mut self) {
        let mut updates = Vec::<(RegexId, Option<LexStateId>, Option<String>)>::new();
        for lsd in &self.lexical_states {
            for &tp_id in lsd.token_productions() {
                for spec in &self.token_productions[tp_id].specs {
                    if self.regexes[spec.regex].private {
                        continue;
                    }
                    let new_state = spec.next_state.as_ref()
                        .filter(|next| next.as_str() != lsd.name())
                        .and_then(|next| self.lexical_state_index(next));
                    let action = spec.action.clone().filter(|a| !a.is_empty());
                    updates.push((spec.regex, new_state, action));
                }
            }
        }
        for (id, new_state, action) in updates {
            if new_state.is_some() {
                self.regexes[id].new_lexical_state = new_state;
            }
            if action.is_some() {
                self.regexes[id].action = action;
            }
        }
    }

    /// Warns about the alternatives of a choice that are references to tokens with a smaller
    /// ordinal in the same lexical state: those tokens always win, so the choice never matches them.
    fn check_unmatchability(&self, choice: RegexId, log: &mut BufLog) {
        let re = &self.regexes[choice];
        let (Some(root), Some(choice_ordinal)) = (re.tree.get_root(), re.ordinal) else { return };
        let choice_state = self.regex_lexical_state(choice);
        for &alt in re.tree.children(root) {
            let target = match re.tree.get(alt) {
                ReType::Ref(name) => self.named_token(name),
                _ => None,
            };
            if let Some(target) = target {
                let cur = &self.regexes[target];
                if !cur.private && cur.ordinal.is_some_and(|o| o > 0 && o < choice_ordinal)
                    && self.regex_lexical_state(target) == choice_state
                {
                    log.add_warning_at(NodeRef::Regex(choice),
                        format!("Regular Expression choice : {} can never be matched as : {}", cur.label(), re.label()));
                }
            }
        }
    }

    /// Lists the registered tokens, for debugging purposes.
    pub fn tokens_to_str(&self) -> String {
        self.regular_expressions()
            .map(|(ordinal, re)| format!("{ordinal}: {}", re.label()))
            .join(", ")
    }
}
