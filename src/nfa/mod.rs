// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

pub(crate) mod builder;
mod tests;

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Display, Formatter};
use crate::lexer::LexerData;
use crate::segments::Seg;
use crate::{CollectJoin, RegexId, StateId, TokenId, TpId, DEFAULT_LEXICAL_STATE};
use builder::NfaBuilder;

// ---------------------------------------------------------------------------------------------
// NFA state

/// State of the NFA of a lexical state.
///
/// A state consumes one character of its `moves` to go to `next`, or goes to any state
/// of `epsilon` without consuming anything. After the epsilon closure, `epsilon` contains
/// the states reachable that have moves (including the state itself when it has moves).
///
/// A composite state stands for the set of states in `members`; composites are shared
/// by all the states that have the same closure.
#[derive(Clone, Debug, Default)]
pub struct NfaState {
    pub(crate) moves: Vec<Seg>,
    pub(crate) next: Option<StateId>,
    pub(crate) epsilon: BTreeSet<StateId>,
    pub(crate) ty: Option<RegexId>,
    pub(crate) index: Option<usize>,
    closure_done: bool,
    pub(crate) members: Option<BTreeSet<StateId>>,
}

impl NfaState {
    pub fn moves(&self) -> &[Seg] {
        &self.moves
    }

    pub fn next(&self) -> Option<StateId> {
        self.next
    }

    pub fn epsilon(&self) -> &BTreeSet<StateId> {
        &self.epsilon
    }

    /// Regular expression accepted if the matching stops in this state.
    pub fn ty(&self) -> Option<RegexId> {
        self.ty
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_composite(&self) -> bool {
        self.members.is_some()
    }

    pub fn members(&self) -> Option<&BTreeSet<StateId>> {
        self.members.as_ref()
    }

    /// Ordinal of the accepted token, `u32::MAX` if the state doesn't accept anything.
    pub fn ordinal(&self, lexer_data: &LexerData) -> TokenId {
        assert!(!self.is_composite(), "a composite state has no ordinal");
        self.ty.and_then(|re| lexer_data.regex(re).ordinal()).unwrap_or(TokenId::MAX)
    }

    /// Leading moves below 128. The last one may cross the ASCII boundary.
    pub fn ascii_moves(&self) -> &[Seg] {
        let mut n = 0;
        for seg in &self.moves {
            if seg.0 >= 128 {
                break;
            }
            n += 1;
            if seg.1 >= 128 {
                break;
            }
        }
        &self.moves[..n]
    }

    pub fn non_ascii_moves(&self) -> &[Seg] {
        &self.moves[self.ascii_moves().len()..]
    }

    pub fn has_ascii_moves(&self) -> bool {
        self.moves.first().is_some_and(|seg| seg.0 < 128)
    }

    pub fn has_non_ascii_moves(&self) -> bool {
        self.moves.last().is_some_and(|seg| seg.1 >= 128)
    }

    pub(crate) fn add_range(&mut self, left: u32, right: u32) {
        self.moves.push(Seg(left, right));
    }

    /// Sets a single-character move; when `ignore_case` is set, the upper and lower variants
    /// are added too.
    pub(crate) fn set_char_move(&mut self, c: u32, ignore_case: bool) {
        self.moves.clear();
        if !ignore_case {
            self.add_range(c, c);
        } else {
            let upper = crate::segments::simple_upper(c).unwrap_or(c);
            let lower = crate::segments::simple_lower(c).unwrap_or(c);
            self.add_range(upper, upper);
            if upper != lower {
                self.add_range(lower, lower);
            }
            if c != upper && c != lower {
                self.add_range(c, c);
            }
            if self.moves.len() > 1 {
                self.moves.sort();
            }
        }
    }

    fn intersects(&self, other: &NfaState) -> bool {
        self.moves.iter().any(|a| other.moves.iter().any(|b| a.0 <= b.1 && b.0 <= a.1))
    }
}

impl Display for NfaState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.members {
            Some(members) => write!(f, "composite {{{}}}", members.iter().join(", "))?,
            None => {
                write!(f, "{}", self.moves.iter().join(", "))?;
                if let Some(next) = self.next {
                    write!(f, " -> {next}")?;
                }
                if !self.epsilon.is_empty() {
                    write!(f, ", eps {{{}}}", self.epsilon.iter().join(", "))?;
                }
            }
        }
        if let Some(ty) = self.ty {
            write!(f, " <regex {ty}>")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------------------------
// Lexical state

/// NFA and string literal tables of a lexical state.
///
/// All the token rules of the state share one NFA: the initial state has an epsilon move
/// to the start of each rule, and the final state of each rule is typed with its regular
/// expression.
#[derive(Clone, Debug)]
pub struct LexicalStateData {
    name: String,
    pub(crate) initial: StateId,
    pub(crate) states: Vec<NfaState>,
    /// live states
    pub(crate) all_states: BTreeSet<StateId>,
    canonical_sets: HashMap<BTreeSet<StateId>, StateId>,
    case_sensitive: HashMap<String, RegexId>,
    case_insensitive: HashMap<String, RegexId>,
    regexes: HashSet<RegexId>,
    token_productions: Vec<TpId>,
}

impl LexicalStateData {
    pub fn new(name: &str) -> Self {
        let mut lsd = LexicalStateData {
            name: name.to_string(),
            initial: 0,
            states: Vec::new(),
            all_states: BTreeSet::new(),
            canonical_sets: HashMap::new(),
            case_sensitive: HashMap::new(),
            case_insensitive: HashMap::new(),
            regexes: HashSet::new(),
            token_productions: Vec::new(),
        };
        lsd.initial = lsd.new_state();
        lsd
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Initial state; after indexing, it's the canonical form of the initial state, with index 0.
    pub fn initial_state(&self) -> StateId {
        self.initial
    }

    pub fn state(&self, id: StateId) -> &NfaState {
        &self.states[id]
    }

    /// Number of live states.
    pub fn num_states(&self) -> usize {
        self.all_states.len()
    }

    /// Live states, sorted by index.
    pub fn all_nfa_states(&self) -> Vec<StateId> {
        let mut result = self.all_states.iter().copied().collect::<Vec<_>>();
        result.sort_by_key(|&s| self.states[s].index);
        result
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }

    pub fn contains_regular_expression(&self, re: RegexId) -> bool {
        self.regexes.contains(&re)
    }

    pub fn token_productions(&self) -> &[TpId] {
        &self.token_productions
    }

    pub(crate) fn add_token_production(&mut self, tp: TpId) {
        self.token_productions.push(tp);
    }

    // -----------------------------------------------------------------------------------------
    // string literal tables

    pub(crate) fn add_string_literal(&mut self, image: &str, re: RegexId, ignore_case: bool) {
        if ignore_case {
            self.case_insensitive.insert(image.to_uppercase(), re);
        } else {
            self.case_sensitive.insert(image.to_string(), re);
        }
    }

    /// Looks for a string literal, first with an exact match, then in the case-insensitive table.
    pub fn string_literal(&self, image: &str) -> Option<RegexId> {
        self.case_sensitive.get(image)
            .or_else(|| self.case_insensitive.get(&image.to_uppercase()))
            .copied()
    }

    // -----------------------------------------------------------------------------------------
    // state arena

    pub(crate) fn new_state(&mut self) -> StateId {
        let id = self.states.len();
        self.states.push(NfaState::default());
        self.all_states.insert(id);
        id
    }

    pub(crate) fn add_epsilon_move(&mut self, from: StateId, to: StateId) {
        self.states[from].epsilon.insert(to);
    }

    /// State that stands for `id` once the closure is done: the state itself, its only
    /// closure member, or the composite of its closure members.
    pub fn canonical_state(&self, id: StateId) -> StateId {
        let state = &self.states[id];
        if state.is_composite() || state.epsilon.is_empty() {
            id
        } else if state.epsilon.len() == 1 {
            state.epsilon.first().copied().unwrap_or(id)
        } else {
            self.canonical_sets.get(&state.epsilon).copied().unwrap_or(id)
        }
    }

    /// Like [canonical_state](Self::canonical_state), but creates the composite if necessary.
    fn make_canonical(&mut self, id: StateId) -> StateId {
        let state = &self.states[id];
        if state.is_composite() || state.epsilon.len() <= 1 {
            self.canonical_state(id)
        } else {
            let set = state.epsilon.clone();
            self.canonical_composite(set)
        }
    }

    /// Returns the unique composite of `set`.
    pub(crate) fn canonical_composite(&mut self, set: BTreeSet<StateId>) -> StateId {
        assert!(set.len() > 1, "composite state requested for {} state(s)", set.len());
        if let Some(&composite) = self.canonical_sets.get(&set) {
            return composite;
        }
        let composite = self.new_state();
        self.states[composite].members = Some(set.clone());
        self.canonical_sets.insert(set, composite);
        composite
    }

    // -----------------------------------------------------------------------------------------
    // generation

    /// Builds the NFA of the token productions, then computes the closures and the indices.
    /// Returns the choice expressions, whose alternatives must be checked for unmatchability.
    pub(crate) fn process(&mut self, lexer_data: &LexerData) -> Vec<RegexId> {
        let mut choices = Vec::new();
        for tp_id in self.token_productions.clone() {
            let tp = lexer_data.token_production(tp_id);
            let ignore_case = tp.ignore_case || lexer_data.ignore_case;
            for spec in tp.specs() {
                let re = spec.regex();
                if lexer_data.regex(re).is_private() {
                    continue;
                }
                self.regexes.insert(re);
                if lexer_data.regex(re).is_choice() {
                    choices.push(re);
                }
                NfaBuilder::new(self, lexer_data, ignore_case).build_states(re);
            }
        }
        self.generate_data();
        choices
    }

    pub(crate) fn generate_data(&mut self) {
        for id in self.all_states.iter().copied().collect::<Vec<_>>() {
            self.epsilon_closure(id);
        }
        self.add_composite_states();
        self.index_states();
    }

    /// Computes the epsilon closure of `id`. The state inherits the type of the states
    /// it reaches when it has none; only the closure members that have moves are kept.
    pub(crate) fn epsilon_closure(&mut self, id: StateId) {
        if self.states[id].closure_done {
            return;
        }
        self.states[id].closure_done = true;
        for st in self.states[id].epsilon.iter().copied().collect::<Vec<_>>() {
            self.epsilon_closure(st);
            let ty = self.states[id].ty;
            let st_ty = self.states[st].ty;
            assert!(ty.is_none() || st_ty.is_none() || ty == st_ty,
                    "epsilon closure of state {id} merges two accepting types: {ty:?} and {st_ty:?}");
            if ty.is_none() {
                self.states[id].ty = st_ty;
            }
            for other in self.states[st].epsilon.iter().copied().collect::<Vec<_>>() {
                self.states[id].epsilon.insert(other);
                self.epsilon_closure(other);
            }
        }
        self.states[id].epsilon.insert(id);
        let mut epsilon = std::mem::take(&mut self.states[id].epsilon);
        epsilon.retain(|&s| !self.states[s].moves.is_empty());
        self.states[id].epsilon = epsilon;
    }

    fn add_composite_states(&mut self) {
        for id in self.all_states.iter().copied().collect::<Vec<_>>() {
            let canonical = self.make_canonical(id);
            if canonical != id {
                self.all_states.insert(canonical);
                self.all_states.remove(&id);
            }
        }
    }

    /// Gives index 0 to the initial state, then indexes the composites, the states that need
    /// move code, and finally the composite members. The states without index are dropped.
    fn index_states(&mut self) {
        self.initial = self.make_canonical(self.initial);
        self.states[self.initial].index = Some(0);
        let mut index = 1;
        let live = self.all_states.iter().copied().collect::<Vec<_>>();
        let mut in_composite = BTreeSet::<StateId>::new();
        for &id in &live {
            if self.states[id].index != Some(0) {
                if let Some(members) = &self.states[id].members {
                    in_composite.extend(members.iter().copied());
                    self.states[id].index = Some(index);
                    index += 1;
                }
            }
        }
        for &id in &live {
            let state = &self.states[id];
            if state.index != Some(0) && !state.is_composite() && self.is_move_code_needed(id) && !in_composite.contains(&id) {
                self.states[id].index = Some(index);
                index += 1;
            }
        }
        for id in in_composite {
            if self.states[id].index != Some(0) {
                self.states[id].index = Some(index);
                index += 1;
            }
        }
        let states = &self.states;
        self.all_states.retain(|&id| states[id].index.is_some());
    }

    // -----------------------------------------------------------------------------------------
    // code generation queries

    pub fn is_move_code_needed(&self, id: StateId) -> bool {
        let state = &self.states[id];
        if state.is_composite() {
            return true;
        }
        if self.states[self.canonical_state(id)].is_composite() {
            return false;
        }
        match state.next {
            None => false,
            Some(next) => self.states[next].ty.is_some() || !self.states[next].epsilon.is_empty(),
        }
    }

    /// Index of the canonical form of the next state.
    pub fn next_state_index(&self, id: StateId) -> Option<usize> {
        self.states[id].next.and_then(|next| self.states[self.canonical_state(next)].index)
    }

    /// Name of the generated method: `NFA_<index>` in the default state, `NFA_<state>_<index>`
    /// otherwise, and `NFA_COMPOSITE_...` for composite states.
    pub fn method_name(&self, id: StateId) -> Option<String> {
        let index = self.states[id].index?;
        let name = if self.name == DEFAULT_LEXICAL_STATE {
            format!("NFA_{index}")
        } else {
            format!("NFA_{}_{index}", self.name)
        };
        Some(if self.states[id].is_composite() { name.replacen("NFA_", "NFA_COMPOSITE_", 1) } else { name })
    }

    pub fn moves_array_name(&self, id: StateId) -> Option<String> {
        self.method_name(id).map(|name| name.replacen("NFA_", "NFA_MOVES_", 1))
    }

    /// Members of a composite state, sorted by decreasing ordinal of their next state, then
    /// by their first move range, then by decreasing number of move ranges.
    pub fn ordered_states(&self, composite: StateId, lexer_data: &LexerData) -> Vec<StateId> {
        let mut result = self.states[composite].members.iter().flatten().copied().collect::<Vec<_>>();
        result.sort_by_key(|&id| {
            let state = &self.states[id];
            let next_ordinal = state.next.map(|n| self.states[n].ordinal(lexer_data)).unwrap_or(TokenId::MAX);
            let first = state.moves.first().copied();
            (Reverse(next_ordinal), first.map(|s| s.0), first.map(|s| s.1), Reverse(state.moves.len()))
        });
        result
    }

    /// Checks if the moves of `id` intersect the moves of any state in `others`.
    pub fn overlaps(&self, id: StateId, others: &[StateId]) -> bool {
        others.iter().any(|&other| other == id || self.states[id].intersects(&self.states[other]))
    }
}
