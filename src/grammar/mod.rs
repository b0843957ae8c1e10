// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

mod expansion;
mod tests;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use crate::build::{BuildError, BuildErrorSource, HasBuildErrorSource};
use crate::lexer::{LexerData, RegularExpression, ReTree, TokenKind, TokenProduction, re_ref, re_string};
use crate::log::{BufLog, LogReader, LogStatus, LogWriter};
use crate::sanity::SanityChecker;
use crate::token_set::TokenSet;
use crate::{ExpId, LexStateId, NodeRef, ProdId, RegexId, SrcLoc, TokenId, TpId, DEFAULT_LEXICAL_STATE};

// ---------------------------------------------------------------------------------------------

/// Grammar-wide options set by the front end.
#[derive(Clone, Debug, PartialEq)]
pub struct GrammarOptions {
    /// default ignore-case flag of the token productions and BNF string literals
    pub ignore_case: bool,
    /// prefix of all the generated identifiers (set variables, scan routines, ...)
    pub identifier_prefix: String,
    /// legacy lookahead semantics: a semantic-only lookahead has an amount of 0
    pub legacy_lookahead: bool,
}

impl Default for GrammarOptions {
    fn default() -> Self {
        GrammarOptions { ignore_case: false, identifier_prefix: String::new(), legacy_lookahead: false }
    }
}

// ---------------------------------------------------------------------------------------------

/// Empty expansions: they never consume any token.
#[derive(Clone, Debug, PartialEq)]
pub enum EmptyKind {
    /// `{}`
    Plain,
    /// semantic action; `applies_in_lookahead` is set for the `#{...}#` actions that are also executed while scanning ahead
    CodeBlock { applies_in_lookahead: bool },
    /// `FAIL`
    Failure,
    /// `ACTIVATE_TOKENS` / `DEACTIVATE_TOKENS`
    TokenActivation(Vec<String>),
    /// `LEXICAL_STATE NAME` switch
    LexicalStateSwitch(String),
}

/// Kind of an expansion node. The children are kept in [ExpNode], in this order:
/// - `Sequence`: the units
/// - `Choice`: the alternatives
/// - `ZeroOrMore`, `OneOrMore`, `ZeroOrOne`, `Parentheses`: the nested expansion
#[derive(Clone, Debug, PartialEq)]
pub enum ExpKind {
    Sequence,
    Choice,
    ZeroOrMore,
    OneOrMore,
    ZeroOrOne,
    Parentheses,
    NonTerminal(String),
    Terminal(RegexId),
    Empty(EmptyKind),
}

impl ExpKind {
    pub fn is_loop(&self) -> bool {
        matches!(self, ExpKind::ZeroOrMore | ExpKind::OneOrMore)
    }
}

impl Display for ExpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpKind::Sequence => write!(f, "sequence"),
            ExpKind::Choice => write!(f, "choice"),
            ExpKind::ZeroOrMore => write!(f, "(...)*"),
            ExpKind::OneOrMore => write!(f, "(...)+"),
            ExpKind::ZeroOrOne => write!(f, "(...)?"),
            ExpKind::Parentheses => write!(f, "(...)"),
            ExpKind::NonTerminal(name) => write!(f, "non-terminal {name}"),
            ExpKind::Terminal(re) => write!(f, "terminal #{re}"),
            ExpKind::Empty(EmptyKind::Plain) => write!(f, "{{}}"),
            ExpKind::Empty(EmptyKind::CodeBlock { .. }) => write!(f, "code block"),
            ExpKind::Empty(EmptyKind::Failure) => write!(f, "FAIL"),
            ExpKind::Empty(EmptyKind::TokenActivation(tokens)) => write!(f, "token activation [{}]", tokens.join(", ")),
            ExpKind::Empty(EmptyKind::LexicalStateSwitch(state)) => write!(f, "LEXICAL_STATE {state}"),
        }
    }
}

/// Structural parent of an expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Parent {
    None,
    /// root expansion of a production
    Production(ProdId),
    Expansion(ExpId),
    /// nested or up-to expansion of the lookahead carried by the sequence
    Lookahead(ExpId),
}

/// Lookbehind predicate: a path of production names, `.` and `...` wildcards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LookBehind {
    pub path: Vec<String>,
    pub negated: bool,
}

/// Explicit lookahead carried by a sequence.
///
/// Without nested expansion, the lookahead expansion is the sequence itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lookahead {
    /// explicit amount of tokens
    pub amount: Option<u32>,
    /// separate syntactic lookahead
    pub nested: Option<ExpId>,
    /// semantic predicate
    pub semantic: Option<String>,
    /// the semantic predicate is also evaluated in nested lookaheads
    pub semantic_nested: bool,
    pub negated: bool,
    pub look_behind: Option<LookBehind>,
    /// "match up to" boundary, which must be a single token
    pub up_to: Option<ExpId>,
    pub legacy: bool,
}

impl Lookahead {
    pub fn with_amount(amount: u32) -> Self {
        Lookahead { amount: Some(amount), ..Default::default() }
    }

    pub fn syntactic(nested: ExpId) -> Self {
        Lookahead { nested: Some(nested), ..Default::default() }
    }

    pub fn semantic(predicate: &str) -> Self {
        Lookahead { semantic: Some(predicate.to_string()), ..Default::default() }
    }

    pub fn has_explicit_numerical_amount(&self) -> bool {
        self.amount.is_some()
    }
}

/// Node of the expansion arena.
#[derive(Clone, Debug)]
pub struct ExpNode {
    pub(crate) kind: ExpKind,
    pub(crate) parent: Parent,
    pub(crate) children: Vec<ExpId>,
    pub(crate) lookahead: Option<Lookahead>,
    /// `=>||` marker after this unit
    pub(crate) scan_limit: bool,
    /// `=>|+n`
    pub(crate) scan_limit_plus: u32,
    pub(crate) tolerant: bool,
    pub(crate) loc: SrcLoc,
    pub(crate) first_set: RefCell<Option<TokenSet>>,
    pub(crate) first_set_var_name: RefCell<Option<String>>,
    pub(crate) scan_routine_name: RefCell<Option<String>>,
    pub(crate) needs_left_recursion_check: Cell<bool>,
}

impl ExpNode {
    fn new(kind: ExpKind, children: Vec<ExpId>) -> Self {
        ExpNode {
            kind,
            parent: Parent::None,
            children,
            lookahead: None,
            scan_limit: false,
            scan_limit_plus: 0,
            tolerant: false,
            loc: SrcLoc::default(),
            first_set: RefCell::new(None),
            first_set_var_name: RefCell::new(None),
            scan_routine_name: RefCell::new(None),
            needs_left_recursion_check: Cell::new(false),
        }
    }

    pub fn kind(&self) -> &ExpKind {
        &self.kind
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    pub fn children(&self) -> &[ExpId] {
        &self.children
    }

    pub fn lookahead(&self) -> Option<&Lookahead> {
        self.lookahead.as_ref()
    }

    pub fn is_scan_limit(&self) -> bool {
        self.scan_limit
    }

    pub fn scan_limit_plus(&self) -> u32 {
        self.scan_limit_plus
    }

    pub fn is_tolerant(&self) -> bool {
        self.tolerant
    }

    pub fn loc(&self) -> SrcLoc {
        self.loc
    }
}

// ---------------------------------------------------------------------------------------------

/// BNF production `NAME : root ;`
#[derive(Clone, Debug)]
pub struct BnfProduction {
    pub(crate) name: String,
    pub(crate) root: ExpId,
    pub(crate) lexical_state: Option<String>,
    pub(crate) node_name: Option<String>,
    pub(crate) loc: SrcLoc,
    pub(crate) first_set: RefCell<Option<TokenSet>>,
    pub(crate) final_set: RefCell<Option<TokenSet>>,
}

impl BnfProduction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> ExpId {
        self.root
    }

    pub fn lexical_state(&self) -> Option<&str> {
        self.lexical_state.as_deref()
    }

    pub fn loc(&self) -> SrcLoc {
        self.loc
    }

    /// Name of the generated tree node: the production name, unless another name was given.
    /// The special names `abstract`, `interface`, `void` and `scan` don't count.
    pub fn node_name(&self) -> &str {
        match self.node_name.as_deref() {
            Some(name) if !matches!(name, "abstract" | "interface" | "void" | "scan") => name,
            _ => &self.name,
        }
    }

    /// The production is only used in lookaheads (`#scan`), so it never builds a tree node.
    pub fn only_for_lookahead(&self) -> bool {
        self.node_name.as_deref() == Some("scan")
    }

    pub fn first_set_var_name(&self) -> String {
        format!("{}_FIRST_SET", self.name)
    }
}

// ---------------------------------------------------------------------------------------------

/// Property computed recursively through non-terminals, for the re-entrancy guards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Query {
    PossiblyEmpty,
    MinimumSize,
    MaximumSize,
    FirstSet,
    FinalSet,
    AlwaysSuccessful,
    Lookahead,
    ScanLimit,
    TokenActivation,
    LexicalStateSwitch,
    SingleToken,
}

/// Compilation context of a grammar: options, lexer data, expansion arena, productions and log.
///
/// The front end fills it with the builder methods, then calls [Grammar::analyze] or
/// [Grammar::try_analyze]. The code generator queries the expansion algebra afterward.
#[derive(Debug)]
pub struct Grammar {
    pub(crate) options: GrammarOptions,
    pub(crate) lexer_data: LexerData,
    pub(crate) nodes: Vec<ExpNode>,
    pub(crate) productions: Vec<BnfProduction>,
    pub(crate) production_map: HashMap<String, ProdId>,
    /// token names declared in the token productions, by ordinal
    pub(crate) token_names: BTreeMap<TokenId, String>,
    pub(crate) log: BufLog,
    /// queries in progress, per non-terminal node
    pub(crate) in_progress: RefCell<HashSet<(Query, ExpId)>>,
    /// number of times a guard has returned its fallback value
    pub(crate) guard_hits: Cell<u32>,
    pub(crate) identifiers: RefCell<HashSet<String>>,
}

impl Grammar {
    pub fn new(options: GrammarOptions) -> Self {
        let mut lexer_data = LexerData::new(options.ignore_case);
        lexer_data.add_lexical_state(DEFAULT_LEXICAL_STATE);
        Grammar {
            options,
            lexer_data,
            nodes: Vec::new(),
            productions: Vec::new(),
            production_map: HashMap::new(),
            token_names: BTreeMap::new(),
            log: BufLog::new(),
            in_progress: RefCell::new(HashSet::new()),
            guard_hits: Cell::new(0),
            identifiers: RefCell::new(HashSet::new()),
        }
    }

    pub fn options(&self) -> &GrammarOptions {
        &self.options
    }

    pub fn lexer_data(&self) -> &LexerData {
        &self.lexer_data
    }

    pub fn node(&self, id: ExpId) -> &ExpNode {
        &self.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn production(&self, id: ProdId) -> &BnfProduction {
        &self.productions[id]
    }

    pub fn productions(&self) -> &[BnfProduction] {
        &self.productions
    }

    pub fn production_id(&self, name: &str) -> Option<ProdId> {
        self.production_map.get(name).copied()
    }

    pub fn token_names(&self) -> &BTreeMap<TokenId, String> {
        &self.token_names
    }

    pub(crate) fn add_token_name(&mut self, ordinal: TokenId, name: &str) {
        self.token_names.insert(ordinal, name.to_string());
    }

    // -----------------------------------------------------------------------------------------
    // lexical part

    /// Declares a lexical state. `DEFAULT` is always declared.
    pub fn add_lexical_state(&mut self, name: &str) -> LexStateId {
        self.lexer_data.add_lexical_state(name)
    }

    /// Adds a token production. Without any lexical state, it belongs to `DEFAULT`.
    pub fn add_token_production(&mut self, kind: TokenKind, lexical_states: &[&str], ignore_case: bool, explicit: bool) -> TpId {
        let states = if lexical_states.is_empty() {
            vec![DEFAULT_LEXICAL_STATE.to_string()]
        } else {
            lexical_states.iter().map(|s| s.to_string()).collect()
        };
        self.lexer_data.add_token_production(TokenProduction::new(kind, states, ignore_case || self.options.ignore_case, explicit))
    }

    /// Adds a regular expression to the token production `tp`. The label is empty for an
    /// anonymous regular expression.
    pub fn add_regex_spec(&mut self, tp: TpId, label: &str, private: bool, tree: ReTree) -> RegexId {
        self.lexer_data.add_regex_spec(tp, label, private, tree)
    }

    fn spec_mut(&mut self, re: RegexId) -> Option<&mut crate::lexer::RegexSpec> {
        let tp = self.lexer_data.regexes[re].token_production?;
        self.lexer_data.token_productions[tp].specs.iter_mut().find(|spec| spec.regex == re)
    }

    /// Sets the lexical state the lexer switches to after matching `re`.
    pub fn set_next_state(&mut self, re: RegexId, state: &str) {
        if let Some(spec) = self.spec_mut(re) {
            spec.next_state = Some(state.to_string());
        }
    }

    /// Sets the code executed after matching `re`.
    pub fn set_action(&mut self, re: RegexId, action: &str) {
        if let Some(spec) = self.spec_mut(re) {
            spec.action = Some(action.to_string());
        }
    }

    pub fn add_extra_token(&mut self, name: &str) {
        self.lexer_data.add_extra_token(name);
    }

    // -----------------------------------------------------------------------------------------
    // expansions

    fn add_node(&mut self, kind: ExpKind, children: Vec<ExpId>) -> ExpId {
        let id = self.nodes.len();
        for &child in &children {
            self.nodes[child].parent = Parent::Expansion(id);
        }
        self.nodes.push(ExpNode::new(kind, children));
        id
    }

    pub fn sequence(&mut self, units: Vec<ExpId>) -> ExpId {
        self.add_node(ExpKind::Sequence, units)
    }

    pub fn choice(&mut self, alternatives: Vec<ExpId>) -> ExpId {
        self.add_node(ExpKind::Choice, alternatives)
    }

    pub fn zero_or_more(&mut self, nested: ExpId) -> ExpId {
        self.add_node(ExpKind::ZeroOrMore, vec![nested])
    }

    pub fn one_or_more(&mut self, nested: ExpId) -> ExpId {
        self.add_node(ExpKind::OneOrMore, vec![nested])
    }

    pub fn zero_or_one(&mut self, nested: ExpId) -> ExpId {
        self.add_node(ExpKind::ZeroOrOne, vec![nested])
    }

    pub fn parentheses(&mut self, nested: ExpId) -> ExpId {
        self.add_node(ExpKind::Parentheses, vec![nested])
    }

    pub fn non_terminal(&mut self, name: &str) -> ExpId {
        self.add_node(ExpKind::NonTerminal(name.to_string()), vec![])
    }

    /// Terminal referring to the regular expression `re`.
    pub fn terminal(&mut self, re: RegexId) -> ExpId {
        self.add_node(ExpKind::Terminal(re), vec![])
    }

    /// String literal used in a BNF production. It's declared in an implicit token production
    /// of the `DEFAULT` lexical state, and merged later with any identical explicit literal.
    pub fn literal(&mut self, image: &str) -> ExpId {
        let tp = self.add_token_production(TokenKind::Token, &[], false, false);
        let re = self.lexer_data.add_regex_spec(tp, "", false, re_string(image));
        self.terminal(re)
    }

    /// `<NAME>` reference to a named token used in a BNF production.
    pub fn token_ref(&mut self, name: &str) -> ExpId {
        let re = self.lexer_data.add_regex(RegularExpression::new("", false, re_ref(name), None));
        self.terminal(re)
    }

    pub fn empty(&mut self) -> ExpId {
        self.add_node(ExpKind::Empty(EmptyKind::Plain), vec![])
    }

    pub fn code_block(&mut self, applies_in_lookahead: bool) -> ExpId {
        self.add_node(ExpKind::Empty(EmptyKind::CodeBlock { applies_in_lookahead }), vec![])
    }

    pub fn failure(&mut self) -> ExpId {
        self.add_node(ExpKind::Empty(EmptyKind::Failure), vec![])
    }

    pub fn token_activation(&mut self, tokens: &[&str]) -> ExpId {
        let tokens = tokens.iter().map(|t| t.to_string()).collect();
        self.add_node(ExpKind::Empty(EmptyKind::TokenActivation(tokens)), vec![])
    }

    pub fn lexical_state_switch(&mut self, state: &str) -> ExpId {
        self.add_node(ExpKind::Empty(EmptyKind::LexicalStateSwitch(state.to_string())), vec![])
    }

    /// Attaches an explicit lookahead to a sequence.
    pub fn set_lookahead(&mut self, seq: ExpId, lookahead: Lookahead) {
        assert_eq!(self.nodes[seq].kind, ExpKind::Sequence, "a lookahead can only be attached to a sequence");
        for exp in [lookahead.nested, lookahead.up_to].into_iter().flatten() {
            self.nodes[exp].parent = Parent::Lookahead(seq);
        }
        self.nodes[seq].lookahead = Some(lookahead);
    }

    /// Marks the scan limit (`=>||`, or `=>|+n` when `plus > 0`) after the unit `exp`.
    pub fn set_scan_limit(&mut self, exp: ExpId, plus: u32) {
        self.nodes[exp].scan_limit = true;
        self.nodes[exp].scan_limit_plus = plus;
    }

    pub fn set_tolerant(&mut self, exp: ExpId, tolerant: bool) {
        self.nodes[exp].tolerant = tolerant;
    }

    // -----------------------------------------------------------------------------------------
    // productions

    /// Adds the production `name : root ;`. A later definition with the same name replaces
    /// the earlier one in the name lookups.
    pub fn add_production(&mut self, name: &str, root: ExpId) -> ProdId {
        let id = self.productions.len();
        self.nodes[root].parent = Parent::Production(id);
        self.productions.push(BnfProduction {
            name: name.to_string(),
            root,
            lexical_state: None,
            node_name: None,
            loc: SrcLoc::default(),
            first_set: RefCell::new(None),
            final_set: RefCell::new(None),
        });
        self.production_map.insert(name.to_string(), id);
        id
    }

    pub fn set_production_lexical_state(&mut self, prod: ProdId, state: &str) {
        self.productions[prod].lexical_state = Some(state.to_string());
    }

    pub fn set_production_node_name(&mut self, prod: ProdId, node_name: &str) {
        self.productions[prod].node_name = Some(node_name.to_string());
    }

    pub fn set_location(&mut self, node: NodeRef, loc: SrcLoc) {
        match node {
            NodeRef::Grammar | NodeRef::LexicalState(_) => {}
            NodeRef::Production(id) => self.productions[id].loc = loc,
            NodeRef::Expansion(id) => self.nodes[id].loc = loc,
            NodeRef::Regex(id) => self.lexer_data.regexes[id].loc = loc,
            NodeRef::RegexSpec(tp, index) => {
                if let Some(spec) = self.lexer_data.token_productions[tp].specs.get_mut(index) {
                    spec.loc = loc;
                }
            }
        }
    }

    /// Location of a node in the grammar source, for the diagnostics.
    pub fn describe(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Grammar => "grammar".to_string(),
            NodeRef::Production(id) => {
                let prod = &self.productions[id];
                format!("production {} on {}", prod.name, prod.loc)
            }
            NodeRef::Expansion(id) => format!("{} on {}", self.nodes[id].kind, self.nodes[id].loc),
            NodeRef::Regex(id) => {
                let re = &self.lexer_data.regexes[id];
                format!("regular expression {} on {}", re.label(), re.loc)
            }
            NodeRef::RegexSpec(tp, index) => {
                match self.lexer_data.token_productions[tp].specs.get(index) {
                    Some(spec) => format!("regular expression {} on {}", self.lexer_data.regexes[spec.regex].label(), spec.loc),
                    None => format!("token production #{tp}"),
                }
            }
            NodeRef::LexicalState(id) => format!("lexical state {}", self.lexer_data.lexical_state_name(id)),
        }
    }

    // -----------------------------------------------------------------------------------------
    // analysis

    /// Checks the grammar, registers the tokens, then builds the NFA of each lexical state
    /// if no error was found. Returns the stage that logged the errors, if any.
    pub fn analyze(&mut self) -> Option<BuildErrorSource> {
        SanityChecker::new(self).do_checks();
        if !self.log.has_no_errors() {
            return Some(SanityChecker::SOURCE);
        }
        self.lexer_data.build_data(&mut self.log);
        if !self.log.has_no_errors() {
            return Some(LexerData::SOURCE);
        }
        self.lexer_data.ensure_string_labels();
        None
    }

    /// Analyzes the grammar and converts any error into a [BuildError] holding the log.
    pub fn try_analyze(mut self) -> Result<Grammar, BuildError> {
        match self.analyze() {
            None => Ok(self),
            Some(source) => Err(BuildError::new(self.log, source)),
        }
    }

    // -----------------------------------------------------------------------------------------
    // generated identifiers

    /// Prefix of a family of generated identifiers.
    pub fn identifier_prefix(&self, base: &str) -> String {
        format!("{}{base}_", self.options.identifier_prefix)
    }

    /// Generates an identifier unique in the grammar, from a prefix and the location of the expansion.
    pub(crate) fn unique_identifier(&self, prefix: &str, exp: ExpId) -> String {
        let loc = self.nodes[exp].loc;
        let production = self.containing_production(exp).map(|p| format!("{}_", self.productions[p].name)).unwrap_or_default();
        let base = format!("{prefix}{production}{}_{}", loc.line, loc.column);
        let mut identifiers = self.identifiers.borrow_mut();
        let mut name = base.clone();
        let mut counter = 1;
        while identifiers.contains(&name) {
            name = format!("{base}_{counter}");
            counter += 1;
        }
        identifiers.insert(name.clone());
        name
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::new(GrammarOptions::default())
    }
}

impl LogReader for Grammar {
    type Item = BufLog;

    fn get_log(&self) -> &Self::Item {
        &self.log
    }

    fn give_log(self) -> Self::Item {
        self.log
    }
}

impl LogWriter for Grammar {
    fn get_mut_log(&mut self) -> &mut impl crate::log::Logger {
        &mut self.log
    }
}

impl HasBuildErrorSource for Grammar {
    const SOURCE: BuildErrorSource = BuildErrorSource::Grammar;
}

impl HasBuildErrorSource for SanityChecker<'_> {
    const SOURCE: BuildErrorSource = BuildErrorSource::SanityChecker;
}

impl HasBuildErrorSource for LexerData {
    const SOURCE: BuildErrorSource = BuildErrorSource::LexerData;
}
