// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

//! Expansion algebra: derived properties of the expansion nodes, computed on demand from the
//! arena. The recursive queries through non-terminals are protected by re-entrancy guards that
//! return a conservative value.

use std::collections::HashSet;
use crate::grammar::{EmptyKind, ExpKind, Grammar, Lookahead, Parent, Query};
use crate::token_set::TokenSet;
use crate::{ExpId, ProdId, UNBOUNDED};

impl Grammar {
    /// Evaluates `f` unless the same query is already in progress on `exp`, in which case
    /// `fallback` is returned.
    fn guarded<T>(&self, query: Query, exp: ExpId, fallback: T, f: impl FnOnce() -> T) -> T {
        if !self.in_progress.borrow_mut().insert((query, exp)) {
            self.guard_hits.set(self.guard_hits.get() + 1);
            return fallback;
        }
        let result = f();
        self.in_progress.borrow_mut().remove(&(query, exp));
        result
    }

    // -----------------------------------------------------------------------------------------
    // structure

    pub fn kind(&self, exp: ExpId) -> &ExpKind {
        &self.nodes[exp].kind
    }

    pub fn parent(&self, exp: ExpId) -> Parent {
        self.nodes[exp].parent
    }

    /// Units of a sequence, alternatives of a choice, or nested expansion of the other constructs.
    pub fn units(&self, exp: ExpId) -> &[ExpId] {
        &self.nodes[exp].children
    }

    fn parent_expansion(&self, exp: ExpId) -> Option<ExpId> {
        match self.nodes[exp].parent {
            Parent::Expansion(p) => Some(p),
            _ => None,
        }
    }

    fn is_sequence(&self, exp: ExpId) -> bool {
        self.nodes[exp].kind == ExpKind::Sequence
    }

    /// Production referred to by a non-terminal, if it's defined.
    pub fn referred_production(&self, exp: ExpId) -> Option<ProdId> {
        match &self.nodes[exp].kind {
            ExpKind::NonTerminal(name) => self.production_id(name),
            _ => None,
        }
    }

    /// Nested expansion: the only child of a repetition or parentheses, or the root of the
    /// production referred to by a non-terminal.
    pub fn nested_expansion(&self, exp: ExpId) -> Option<ExpId> {
        match &self.nodes[exp].kind {
            ExpKind::ZeroOrMore | ExpKind::OneOrMore | ExpKind::ZeroOrOne | ExpKind::Parentheses => {
                self.nodes[exp].children.first().copied()
            }
            ExpKind::NonTerminal(_) => self.referred_production(exp).map(|p| self.productions[p].root),
            _ => None,
        }
    }

    /// Production containing the expansion, including the expansions of its lookaheads.
    pub fn containing_production(&self, exp: ExpId) -> Option<ProdId> {
        let mut current = exp;
        loop {
            match self.nodes[current].parent {
                Parent::Production(p) => return Some(p),
                Parent::Expansion(p) | Parent::Lookahead(p) => current = p,
                Parent::None => return None,
            }
        }
    }

    /// Parentheses that only wrap a sequence.
    pub fn is_superfluous_parentheses(&self, exp: ExpId) -> bool {
        self.nodes[exp].kind == ExpKind::Parentheses
            && self.nodes[exp].children.first().is_some_and(|&c| self.is_sequence(c))
    }

    /// Units of a sequence, each followed by the units of the sequence it wraps if it's
    /// superfluous parentheses.
    pub fn all_units(&self, seq: ExpId) -> Vec<ExpId> {
        let mut result = Vec::new();
        for &unit in &self.nodes[seq].children {
            result.push(unit);
            if self.is_superfluous_parentheses(unit) {
                result.extend(self.all_units(self.nodes[unit].children[0]));
            }
        }
        result
    }

    /// First unit of the sequence that can't be empty, looking inside superfluous parentheses.
    pub fn first_non_empty(&self, seq: ExpId) -> Option<ExpId> {
        for &unit in &self.nodes[seq].children {
            if self.is_superfluous_parentheses(unit) {
                if let Some(inner) = self.first_non_empty(self.nodes[unit].children[0]) {
                    return Some(inner);
                }
            } else if !self.is_possibly_empty(unit) {
                return Some(unit);
            }
        }
        None
    }

    /// All the expansions below `exp`, including the expansions of the lookaheads, in depth-first order.
    pub fn descendants(&self, exp: ExpId) -> Vec<ExpId> {
        let mut result = Vec::new();
        let mut stack = self.attached(exp);
        stack.reverse();
        while let Some(e) = stack.pop() {
            result.push(e);
            stack.extend(self.attached(e).into_iter().rev());
        }
        result
    }

    fn attached(&self, exp: ExpId) -> Vec<ExpId> {
        let node = &self.nodes[exp];
        let mut result = Vec::new();
        if let Some(la) = &node.lookahead {
            result.extend(la.nested);
            result.extend(la.up_to);
        }
        result.extend(node.children.iter().copied());
        result
    }

    /// Checks if the expansion is where the parser chooses among alternatives. Superfluous
    /// parentheses at the start of a sequence at a choice point are also at that choice point.
    pub fn is_at_choice_point(&self, exp: ExpId) -> bool {
        let parent = match self.nodes[exp].parent {
            Parent::Production(_) => return true,
            Parent::Expansion(p) => p,
            Parent::Lookahead(_) | Parent::None => return false,
        };
        match self.nodes[parent].kind {
            ExpKind::Choice | ExpKind::ZeroOrMore | ExpKind::OneOrMore | ExpKind::ZeroOrOne => true,
            ExpKind::Parentheses => {
                match self.parent_expansion(parent) {
                    Some(grandparent) if self.is_sequence(grandparent) => {
                        if !self.is_at_choice_point(grandparent) {
                            return false;
                        }
                        for &unit in &self.nodes[grandparent].children {
                            if unit == parent {
                                return true;
                            }
                            if self.maximum_size(unit) > 0 {
                                break;
                            }
                        }
                        false
                    }
                    _ => self.is_at_choice_point(parent),
                }
            }
            _ => false,
        }
    }

    /// First ancestor that is not directly inside superfluous parentheses.
    pub fn non_superfluous_parent(&self, exp: ExpId) -> Parent {
        let parent = self.nodes[exp].parent;
        match parent {
            Parent::Expansion(p) if self.is_superfluous_parentheses(p) => {
                match self.parent_expansion(p) {
                    Some(grandparent) => self.non_superfluous_parent(grandparent),
                    None => self.nodes[p].parent,
                }
            }
            _ => parent,
        }
    }

    /// Lexical state to switch into to parse the expansion (root of a production with a lexical state).
    pub fn specified_lexical_state(&self, exp: ExpId) -> Option<&str> {
        match self.nodes[exp].parent {
            Parent::Production(p) => self.productions[p].lexical_state(),
            _ => None,
        }
    }

    /// Checks if only possibly-empty units precede the expansion in its sequence.
    pub fn begins_sequence(&self, exp: ExpId) -> bool {
        if let Some(parent) = self.parent_expansion(exp) {
            if self.is_sequence(parent) {
                for &unit in &self.nodes[parent].children {
                    if unit == exp {
                        return true;
                    }
                    if !self.is_possibly_empty(unit) {
                        return false;
                    }
                }
            }
        }
        false
    }

    pub fn is_inside_lookahead(&self, exp: ExpId) -> bool {
        let mut current = exp;
        loop {
            match self.nodes[current].parent {
                Parent::Lookahead(_) => return true,
                Parent::Expansion(p) => current = p,
                Parent::Production(_) | Parent::None => return false,
            }
        }
    }

    // -----------------------------------------------------------------------------------------
    // sizes

    pub fn is_possibly_empty(&self, exp: ExpId) -> bool {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => children.iter().all(|&u| self.is_possibly_empty(u)),
            ExpKind::Choice => children.iter().any(|&c| self.is_possibly_empty(c)),
            ExpKind::ZeroOrMore | ExpKind::ZeroOrOne | ExpKind::Empty(_) => true,
            ExpKind::OneOrMore | ExpKind::Parentheses => self.is_possibly_empty(children[0]),
            ExpKind::NonTerminal(_) => match self.nested_expansion(exp) {
                Some(root) => self.guarded(Query::PossiblyEmpty, exp, false, || self.is_possibly_empty(root)),
                None => false,
            },
            ExpKind::Terminal(_) => false,
        }
    }

    /// Minimum number of tokens consumed by the expansion.
    pub fn minimum_size(&self, exp: ExpId) -> u32 {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                let mut result = 0_u32;
                for &unit in children {
                    let size = self.minimum_size(unit);
                    if size == UNBOUNDED {
                        return UNBOUNDED;
                    }
                    result = result.saturating_add(size);
                }
                result
            }
            ExpKind::Choice => {
                let mut result = UNBOUNDED;
                for &choice in children {
                    let size = self.minimum_size(choice);
                    if size == 0 {
                        return 0;
                    }
                    result = result.min(size);
                }
                result
            }
            ExpKind::ZeroOrMore | ExpKind::ZeroOrOne | ExpKind::Empty(_) => 0,
            ExpKind::OneOrMore | ExpKind::Parentheses => self.minimum_size(children[0]),
            ExpKind::NonTerminal(_) => match self.nested_expansion(exp) {
                Some(root) => self.guarded(Query::MinimumSize, exp, UNBOUNDED, || self.minimum_size(root)),
                None => UNBOUNDED,
            },
            ExpKind::Terminal(_) => 1,
        }
    }

    /// Maximum number of tokens consumed by the expansion, or [UNBOUNDED].
    pub fn maximum_size(&self, exp: ExpId) -> u32 {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                let mut result = 0_u32;
                for &unit in children {
                    let size = self.maximum_size(unit);
                    if size == UNBOUNDED {
                        return UNBOUNDED;
                    }
                    result = result.saturating_add(size);
                }
                result
            }
            ExpKind::Choice => {
                let mut result = 0;
                for &choice in children {
                    result = result.max(self.maximum_size(choice));
                    if result == UNBOUNDED {
                        break;
                    }
                }
                result
            }
            ExpKind::ZeroOrMore => UNBOUNDED,
            ExpKind::OneOrMore => if self.maximum_size(children[0]) == 0 { 0 } else { UNBOUNDED },
            ExpKind::ZeroOrOne | ExpKind::Parentheses => self.maximum_size(children[0]),
            ExpKind::NonTerminal(_) => match self.nested_expansion(exp) {
                Some(root) => self.guarded(Query::MaximumSize, exp, UNBOUNDED, || self.maximum_size(root)),
                None => UNBOUNDED,
            },
            ExpKind::Terminal(_) => 1,
            ExpKind::Empty(_) => 0,
        }
    }

    // -----------------------------------------------------------------------------------------
    // token sets

    /// Tokens that can begin the expansion. The result is memoized when it doesn't depend on
    /// a re-entrancy guard.
    pub fn first_set(&self, exp: ExpId) -> TokenSet {
        if let Some(set) = self.nodes[exp].first_set.borrow().as_ref() {
            return set.clone();
        }
        let hits = self.guard_hits.get();
        let set = self.calc_first_set(exp);
        if self.guard_hits.get() == hits {
            *self.nodes[exp].first_set.borrow_mut() = Some(set.clone());
        }
        set
    }

    fn calc_first_set(&self, exp: ExpId) -> TokenSet {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                let mut result = TokenSet::new();
                for &unit in children {
                    result.or(&self.first_set(unit));
                    if !self.is_possibly_empty(unit) {
                        break;
                    }
                }
                result
            }
            ExpKind::Choice => {
                let mut result = TokenSet::new();
                for &choice in children {
                    result.or(&self.first_set(self.lookahead_expansion(choice)));
                }
                result
            }
            ExpKind::ZeroOrMore | ExpKind::OneOrMore | ExpKind::ZeroOrOne | ExpKind::Parentheses => {
                self.first_set(children[0])
            }
            ExpKind::NonTerminal(_) => match self.referred_production(exp) {
                Some(prod) => self.guarded(Query::FirstSet, exp, TokenSet::new(), || self.production_first_set(prod)),
                None => TokenSet::new(),
            },
            ExpKind::Terminal(re) => self.terminal_set(*re),
            ExpKind::Empty(_) => TokenSet::new(),
        }
    }

    fn terminal_set(&self, re: crate::RegexId) -> TokenSet {
        match self.lexer_data.regex(re).ordinal() {
            Some(ordinal) => TokenSet::from_token(ordinal),
            None => TokenSet::new(),
        }
    }

    /// Tokens that can end the expansion.
    pub fn final_set(&self, exp: ExpId) -> TokenSet {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                let mut result = TokenSet::new();
                for &unit in children.iter().rev() {
                    result.or(&self.final_set(unit));
                    if !self.is_possibly_empty(unit) {
                        break;
                    }
                }
                result
            }
            ExpKind::Choice => {
                let mut result = TokenSet::new();
                for &choice in children {
                    result.or(&self.final_set(choice));
                }
                result
            }
            ExpKind::ZeroOrMore | ExpKind::OneOrMore | ExpKind::ZeroOrOne | ExpKind::Parentheses => {
                self.final_set(children[0])
            }
            ExpKind::NonTerminal(_) => match self.referred_production(exp) {
                Some(prod) => self.guarded(Query::FinalSet, exp, TokenSet::new(), || self.production_final_set(prod)),
                None => TokenSet::new(),
            },
            ExpKind::Terminal(re) => self.terminal_set(*re),
            ExpKind::Empty(_) => TokenSet::new(),
        }
    }

    /// Tokens that can follow the expansion in its production. The set is marked incomplete
    /// when the end of the production can be reached, since what follows is then unknown.
    pub fn follow_set(&self, exp: ExpId) -> TokenSet {
        let mut result = TokenSet::new();
        if self.is_at_end_of_loop(exp) {
            if let Some(ancestor) = self.first_loop_ancestor(exp) {
                result.or(&self.first_set(ancestor));
            }
        }
        let mut following = exp;
        loop {
            match self.following_expansion(following) {
                None => {
                    result.set_incomplete(true);
                    break;
                }
                Some(next) => {
                    result.or(&self.first_set(next));
                    following = next;
                    if !self.is_possibly_empty(next) {
                        break;
                    }
                }
            }
        }
        result
    }

    /// Next sibling in the parent sequence, or the expansion following the parent.
    pub fn following_expansion(&self, exp: ExpId) -> Option<ExpId> {
        let parent = self.parent_expansion(exp)?;
        if self.is_sequence(parent) {
            let siblings = &self.nodes[parent].children;
            if let Some(index) = siblings.iter().position(|&s| s == exp) {
                if index + 1 < siblings.len() {
                    return Some(siblings[index + 1]);
                }
            }
        }
        self.following_expansion(parent)
    }

    /// Closest preceding sibling in the parent sequence that can consume a token.
    pub fn preceding(&self, exp: ExpId) -> Option<ExpId> {
        let parent = self.parent_expansion(exp)?;
        if !self.is_sequence(parent) {
            return None;
        }
        let siblings = &self.nodes[parent].children;
        let index = siblings.iter().position(|&s| s == exp)?;
        siblings[..index].iter().rev().copied().find(|&s| self.maximum_size(s) > 0)
    }

    pub fn is_at_end_of_loop(&self, exp: ExpId) -> bool {
        if self.nodes[exp].kind.is_loop() {
            return true;
        }
        let Some(parent) = self.parent_expansion(exp) else { return false };
        if self.is_sequence(parent) {
            let siblings = &self.nodes[parent].children;
            if let Some(index) = siblings.iter().position(|&s| s == exp) {
                if siblings[index + 1..].iter().any(|&s| !self.is_possibly_empty(s)) {
                    return false;
                }
            }
        }
        self.is_at_end_of_loop(parent)
    }

    pub fn first_loop_ancestor(&self, exp: ExpId) -> Option<ExpId> {
        let mut current = exp;
        while !self.nodes[current].kind.is_loop() {
            current = self.parent_expansion(current)?;
        }
        Some(current)
    }

    /// Checks if a lexical state switch follows the expansion, skipping the possibly-empty
    /// expansions. Returns `None` when the end of the production is reached first.
    pub fn is_before_lexical_state_switch(&self, exp: ExpId) -> Option<bool> {
        let mut following = exp;
        loop {
            following = self.following_expansion(following)?;
            if self.specifies_lexical_state_switch(following) {
                return Some(true);
            }
            if !self.is_possibly_empty(following) {
                return Some(false);
            }
        }
    }

    // -----------------------------------------------------------------------------------------
    // lookahead

    /// Sequence owning the lookahead that applies to the expansion: its own, or the one
    /// inherited from a leading non-terminal or superfluous parentheses.
    pub fn lookahead_owner(&self, exp: ExpId) -> Option<ExpId> {
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                if self.nodes[exp].lookahead.is_some() {
                    return Some(exp);
                }
                for unit in self.all_units(exp) {
                    if let ExpKind::NonTerminal(_) = self.nodes[unit].kind {
                        return self.lookahead_owner(unit);
                    }
                    if self.is_superfluous_parentheses(unit) {
                        return self.lookahead_owner(self.nodes[unit].children[0]);
                    }
                    if self.maximum_size(unit) > 0 {
                        break;
                    }
                }
                None
            }
            ExpKind::NonTerminal(_) => {
                let root = self.nested_expansion(exp)?;
                self.guarded(Query::Lookahead, exp, None, || self.lookahead_owner(root))
            }
            _ => None,
        }
    }

    pub fn lookahead(&self, exp: ExpId) -> Option<&Lookahead> {
        self.lookahead_owner(exp).and_then(|owner| self.nodes[owner].lookahead.as_ref())
    }

    /// Checks if a lookahead was written on the expansion. Only a sequence carries its own
    /// lookahead; the other expansions report the lookahead that applies to them.
    pub fn has_explicit_lookahead(&self, exp: ExpId) -> bool {
        if self.is_sequence(exp) {
            self.nodes[exp].lookahead.is_some()
        } else {
            self.lookahead(exp).is_some()
        }
    }

    pub fn has_explicit_numerical_lookahead(&self, exp: ExpId) -> bool {
        self.lookahead(exp).is_some_and(|la| la.has_explicit_numerical_amount())
    }

    pub fn has_separate_syntactic_lookahead(&self, exp: ExpId) -> bool {
        self.lookahead(exp).is_some_and(|la| la.nested.is_some())
    }

    pub fn has_semantic_lookahead(&self, exp: ExpId) -> bool {
        self.lookahead(exp).is_some_and(|la| la.semantic.is_some())
    }

    pub fn has_look_behind(&self, exp: ExpId) -> bool {
        self.lookahead(exp).is_some_and(|la| la.look_behind.is_some())
    }

    pub fn is_negated(&self, exp: ExpId) -> bool {
        self.lookahead(exp).is_some_and(|la| la.negated)
    }

    pub fn up_to_expansion(&self, exp: ExpId) -> Option<ExpId> {
        self.lookahead(exp).and_then(|la| la.up_to)
    }

    /// Expansion scanned to decide whether to enter `exp`: the nested expansion of its
    /// lookahead, or `exp` itself.
    pub fn lookahead_expansion(&self, exp: ExpId) -> ExpId {
        self.lookahead(exp).and_then(|la| la.nested).unwrap_or(exp)
    }

    /// Number of tokens to scan ahead.
    pub fn lookahead_amount(&self, exp: ExpId) -> u32 {
        match self.lookahead_owner(exp) {
            Some(owner) => self.la_amount(owner),
            None if self.requires_scan_ahead(exp) => UNBOUNDED,
            None => 1,
        }
    }

    /// Amount of the lookahead carried by `owner`: the explicit amount, 0 for a semantic-only
    /// lookahead in legacy mode, otherwise unbounded.
    pub fn la_amount(&self, owner: ExpId) -> u32 {
        match &self.nodes[owner].lookahead {
            Some(la) => match la.amount {
                Some(amount) => amount,
                None if la.legacy && la.nested.is_none() && la.semantic.is_some() => 0,
                None => UNBOUNDED,
            },
            None => UNBOUNDED,
        }
    }

    fn la_expansion(&self, owner: ExpId) -> ExpId {
        self.nodes[owner].lookahead.as_ref().and_then(|la| la.nested).unwrap_or(owner)
    }

    /// Checks if the lookahead carried by `owner` always succeeds.
    pub fn la_is_always_successful(&self, owner: ExpId) -> bool {
        match &self.nodes[owner].lookahead {
            Some(la) => la.semantic.is_none() && (self.la_amount(owner) == 0 || self.is_possibly_empty(self.la_expansion(owner))),
            None => true,
        }
    }

    pub fn la_requires_scan_ahead(&self, owner: ExpId) -> bool {
        match &self.nodes[owner].lookahead {
            Some(la) => !self.is_possibly_empty(self.la_expansion(owner)) || la.semantic_nested,
            None => false,
        }
    }

    pub fn requires_scan_ahead(&self, exp: ExpId) -> bool {
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                let units = &self.nodes[exp].children;
                if units.iter().any(|&u| self.nodes[u].scan_limit) {
                    return true;
                }
                for &unit in units {
                    if let Some(prod) = self.referred_production(unit) {
                        if self.production_has_scan_limit(prod) || self.production_has_explicit_lookahead(prod) {
                            return true;
                        }
                    }
                    if !self.is_possibly_empty(unit) {
                        break;
                    }
                }
                self.lookahead_owner(exp).is_some_and(|owner| self.la_requires_scan_ahead(owner))
            }
            ExpKind::Empty(_) => false,
            _ => {
                self.lookahead_owner(exp).is_some_and(|owner| self.la_requires_scan_ahead(owner))
                    || self.has_global_semantic_actions(exp)
            }
        }
    }

    /// Checks if the expansion needs more than one token of lookahead at its choice point,
    /// without any explicit lookahead saying so.
    pub fn has_implicit_syntactic_lookahead(&self, exp: ExpId) -> bool {
        if !self.is_at_choice_point(exp) {
            return false;
        }
        if self.has_separate_syntactic_lookahead(exp) {
            return false;
        }
        if self.is_always_successful(exp) {
            return false;
        }
        if self.has_scan_limit(exp) {
            return true;
        }
        if self.has_explicit_numerical_lookahead(exp) && self.lookahead_amount(exp) <= 1 {
            return false;
        }
        if self.maximum_size(exp) <= 1 {
            return false;
        }
        self.lookahead_owner(exp).is_some_and(|owner| self.la_amount(owner) > 1)
    }

    /// Checks if the code generator must emit a predicate method to decide whether to enter
    /// the expansion.
    pub fn requires_predicate_method(&self, exp: ExpId) -> bool {
        if self.is_inside_lookahead(exp) || !self.is_at_choice_point(exp) {
            return false;
        }
        if self.lookahead(exp).is_some() {
            return true;
        }
        if self.is_possibly_empty(exp) {
            return false;
        }
        if self.has_implicit_syntactic_lookahead(exp) {
            return true;
        }
        if self.has_token_activation(exp) || self.specified_lexical_state(exp).is_some() {
            return true;
        }
        if self.specifies_lexical_state_switch(exp) {
            return true;
        }
        self.has_global_semantic_actions(exp)
    }

    pub fn has_nested_semantic_lookahead(&self, exp: ExpId) -> bool {
        self.descendants(exp).into_iter()
            .any(|d| self.lookahead(d).is_some_and(|la| la.semantic.is_some() && la.semantic_nested))
    }

    /// Checks if the expansion contains a code block that is also executed while scanning ahead.
    pub fn has_global_semantic_actions(&self, exp: ExpId) -> bool {
        self.descendants(exp).into_iter()
            .any(|d| matches!(self.nodes[d].kind, ExpKind::Empty(EmptyKind::CodeBlock { applies_in_lookahead: true })))
    }

    // -----------------------------------------------------------------------------------------
    // scan limits

    pub fn is_scan_limit(&self, exp: ExpId) -> bool {
        self.nodes[exp].scan_limit
    }

    /// Checks if the sequence, or a non-terminal at its start, has a scan limit.
    pub fn has_scan_limit(&self, exp: ExpId) -> bool {
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                let mut at_start = true;
                for unit in self.all_units(exp) {
                    if self.nodes[unit].scan_limit {
                        return true;
                    }
                    if at_start && matches!(self.nodes[unit].kind, ExpKind::NonTerminal(_)) && self.has_scan_limit(unit) {
                        return true;
                    }
                    if !self.is_possibly_empty(unit) {
                        at_start = false;
                    }
                }
                false
            }
            ExpKind::NonTerminal(_) => match self.referred_production(exp) {
                Some(prod) => self.guarded(Query::ScanLimit, exp, false, || self.production_has_scan_limit(prod)),
                None => false,
            },
            _ => false,
        }
    }

    pub fn has_explicit_scan_limit(&self, exp: ExpId) -> bool {
        self.is_sequence(exp) && self.nodes[exp].children.iter().any(|&u| self.nodes[u].scan_limit)
    }

    // -----------------------------------------------------------------------------------------
    // other properties

    pub(crate) fn has_failure_child(&self, exp: ExpId) -> bool {
        self.nodes[exp].children.iter().any(|&c| self.nodes[c].kind == ExpKind::Empty(EmptyKind::Failure))
    }

    fn base_always_successful(&self, exp: ExpId) -> bool {
        if self.has_semantic_lookahead(exp) || self.has_look_behind(exp) || !self.is_possibly_empty(exp) {
            return false;
        }
        if self.has_failure_child(exp) {
            return false;
        }
        match self.lookahead(exp) {
            None => true,
            Some(la) => la.nested.map_or(true, |nested| self.is_possibly_empty(nested)),
        }
    }

    /// Checks if the expansion matches whatever the input.
    pub fn is_always_successful(&self, exp: ExpId) -> bool {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => self.base_always_successful(exp) && children.iter().all(|&u| self.is_always_successful(u)),
            ExpKind::Choice => self.base_always_successful(exp) && children.iter().any(|&c| self.is_always_successful(c)),
            ExpKind::Parentheses => self.base_always_successful(exp) && self.is_always_successful(children[0]),
            ExpKind::NonTerminal(_) => match self.nested_expansion(exp) {
                Some(root) => self.guarded(Query::AlwaysSuccessful, exp, false, || self.is_always_successful(root)),
                None => false,
            },
            ExpKind::Empty(EmptyKind::Failure) => false,
            _ => self.base_always_successful(exp),
        }
    }

    pub fn has_token_activation(&self, exp: ExpId) -> bool {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                for &unit in children {
                    if self.has_token_activation(unit) {
                        return true;
                    }
                    if !self.is_possibly_empty(unit) {
                        break;
                    }
                }
                false
            }
            ExpKind::NonTerminal(_) => match self.nested_expansion(exp) {
                Some(root) => self.guarded(Query::TokenActivation, exp, false, || self.has_token_activation(root)),
                None => false,
            },
            ExpKind::Empty(EmptyKind::TokenActivation(_)) => true,
            _ => children.iter().any(|&c| matches!(self.nodes[c].kind, ExpKind::Empty(EmptyKind::TokenActivation(_)))),
        }
    }

    pub fn specifies_lexical_state_switch(&self, exp: ExpId) -> bool {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                for &unit in children {
                    if self.specifies_lexical_state_switch(unit) {
                        return true;
                    }
                    if !self.is_possibly_empty(unit) {
                        break;
                    }
                }
                false
            }
            ExpKind::Choice => children.iter().any(|&c| self.specifies_lexical_state_switch(c)),
            ExpKind::ZeroOrMore | ExpKind::OneOrMore | ExpKind::ZeroOrOne | ExpKind::Parentheses => {
                self.specifies_lexical_state_switch(children[0])
            }
            ExpKind::NonTerminal(_) => match self.referred_production(exp) {
                Some(prod) => {
                    let root = self.productions[prod].root;
                    self.productions[prod].lexical_state.is_some()
                        || self.guarded(Query::LexicalStateSwitch, exp, false, || self.specifies_lexical_state_switch(root))
                }
                None => false,
            },
            ExpKind::Empty(EmptyKind::LexicalStateSwitch(_)) => true,
            ExpKind::Terminal(_) | ExpKind::Empty(_) => false,
        }
    }

    /// Checks if the expansion is always matched by exactly one token, without lookahead,
    /// failure, lexical state switch or semantic action in the lookahead.
    pub fn is_single_token(&self, exp: ExpId) -> bool {
        if self.is_possibly_empty(exp) || self.maximum_size(exp) > 1 || self.has_scan_limit(exp)
            || self.specifies_lexical_state_switch(exp)
        {
            return false;
        }
        if self.lookahead(exp).is_some() {
            return false;
        }
        let descendants = self.descendants(exp);
        if descendants.iter().any(|&d| matches!(self.nodes[d].kind, ExpKind::Empty(EmptyKind::Failure | EmptyKind::TokenActivation(_)))) {
            return false;
        }
        if descendants.iter().any(|&d| self.specifies_lexical_state_switch(d) || self.has_look_behind(d)) {
            return false;
        }
        if self.has_nested_semantic_lookahead(exp) || self.has_global_semantic_actions(exp) {
            return false;
        }
        match self.nested_expansion(exp) {
            Some(root) if matches!(self.nodes[exp].kind, ExpKind::NonTerminal(_)) => {
                self.guarded(Query::SingleToken, exp, false, || self.is_single_token(root))
            }
            _ => true,
        }
    }

    /// Checks if the expansion can start with the production `name`, following the leading
    /// non-terminals. A non-terminal that refers to `name` is marked for a left-recursion check.
    pub fn potentially_starts_with(&self, exp: ExpId, name: &str, visited: &mut HashSet<String>) -> bool {
        let children = &self.nodes[exp].children;
        match &self.nodes[exp].kind {
            ExpKind::Sequence => {
                let mut result = false;
                for &unit in children {
                    if self.potentially_starts_with(unit, name, visited) {
                        result = true;
                    }
                    if !self.is_possibly_empty(unit) {
                        break;
                    }
                }
                result
            }
            ExpKind::Choice => children.iter().any(|&c| self.potentially_starts_with(c, name, visited)),
            ExpKind::ZeroOrMore | ExpKind::OneOrMore | ExpKind::ZeroOrOne | ExpKind::Parentheses => {
                self.potentially_starts_with(children[0], name, visited)
            }
            ExpKind::NonTerminal(nt_name) => {
                if nt_name == name {
                    self.nodes[exp].needs_left_recursion_check.set(true);
                    return true;
                }
                if !visited.insert(nt_name.clone()) {
                    return false;
                }
                match self.nested_expansion(exp) {
                    Some(root) => self.potentially_starts_with(root, name, visited),
                    None => false,
                }
            }
            ExpKind::Terminal(_) | ExpKind::Empty(_) => false,
        }
    }

    pub fn needs_left_recursion_check(&self, exp: ExpId) -> bool {
        self.nodes[exp].needs_left_recursion_check.get()
    }

    /// Checks if a scan-ahead must go through the whole non-terminal instead of stopping at
    /// its lookahead.
    pub fn scan_to_end(&self, exp: ExpId) -> bool {
        if self.is_inside_lookahead(exp) {
            return true;
        }
        match self.non_superfluous_parent(exp) {
            Parent::Expansion(parent) if self.is_sequence(parent) => {
                if !self.is_at_choice_point(parent) {
                    return true;
                }
                if self.has_explicit_numerical_lookahead(parent) || self.has_explicit_scan_limit(parent) {
                    return true;
                }
                self.first_non_empty(parent) != Some(exp)
            }
            _ => !self.is_at_choice_point(exp),
        }
    }

    /// Checks if a recovery method must be generated for the expansion (fault-tolerant parsing).
    pub fn requires_recover_method(&self, exp: ExpId) -> bool {
        if self.is_inside_lookahead(exp) {
            return false;
        }
        if self.containing_production(exp).is_some_and(|p| self.productions[p].only_for_lookahead()) {
            return false;
        }
        if self.nodes[exp].tolerant || matches!(self.nodes[exp].parent, Parent::Production(_)) {
            return true;
        }
        self.preceding(exp)
            .is_some_and(|p| self.nodes[p].tolerant && !matches!(self.nodes[p].kind, ExpKind::Terminal(_)))
    }

    // -----------------------------------------------------------------------------------------
    // generated names

    pub fn first_set_var_name(&self, exp: ExpId) -> String {
        if let Some(name) = self.nodes[exp].first_set_var_name.borrow().as_ref() {
            return name.clone();
        }
        let name = match self.nodes[exp].parent {
            Parent::Production(p) => self.productions[p].first_set_var_name(),
            _ => self.unique_identifier(&self.identifier_prefix("first_set"), exp),
        };
        *self.nodes[exp].first_set_var_name.borrow_mut() = Some(name.clone());
        name
    }

    fn derived_set_var_name(&self, exp: ExpId, kind: &str) -> String {
        let first = self.first_set_var_name(exp);
        if first.starts_with(&self.identifier_prefix("first_set")) {
            first.replacen("first", kind, 1)
        } else {
            first.replace("_FIRST_SET", &format!("_{}_SET", kind.to_uppercase()))
        }
    }

    pub fn final_set_var_name(&self, exp: ExpId) -> String {
        self.derived_set_var_name(exp, "final")
    }

    pub fn follow_set_var_name(&self, exp: ExpId) -> String {
        self.derived_set_var_name(exp, "follow")
    }

    /// Name of the routine that scans the expansion ahead.
    pub fn scan_routine_name(&self, exp: ExpId) -> String {
        if let Some(name) = self.nodes[exp].scan_routine_name.borrow().as_ref() {
            return name.clone();
        }
        let name = match self.nodes[exp].parent {
            Parent::Production(p) => self.production_lookahead_method_name(p),
            _ => self.unique_identifier(&self.identifier_prefix("check"), exp),
        };
        *self.nodes[exp].scan_routine_name.borrow_mut() = Some(name.clone());
        name
    }

    fn derived_method_name(&self, exp: ExpId, base: &str) -> String {
        self.scan_routine_name(exp).replace(&self.identifier_prefix("check"), &self.identifier_prefix(base))
    }

    pub fn predicate_method_name(&self, exp: ExpId) -> String {
        self.derived_method_name(exp, "scan")
    }

    pub fn recover_method_name(&self, exp: ExpId) -> String {
        self.derived_method_name(exp, "recover")
    }

    pub fn recover_to_method_name(&self, exp: ExpId) -> String {
        self.derived_method_name(exp, "recover_to")
    }

    // -----------------------------------------------------------------------------------------
    // productions

    pub fn production_first_set(&self, prod: ProdId) -> TokenSet {
        if let Some(set) = self.productions[prod].first_set.borrow().as_ref() {
            return set.clone();
        }
        let hits = self.guard_hits.get();
        let set = self.first_set(self.productions[prod].root);
        if self.guard_hits.get() == hits {
            *self.productions[prod].first_set.borrow_mut() = Some(set.clone());
        }
        set
    }

    pub fn production_final_set(&self, prod: ProdId) -> TokenSet {
        if let Some(set) = self.productions[prod].final_set.borrow().as_ref() {
            return set.clone();
        }
        let hits = self.guard_hits.get();
        let set = self.final_set(self.productions[prod].root);
        if self.guard_hits.get() == hits {
            *self.productions[prod].final_set.borrow_mut() = Some(set.clone());
        }
        set
    }

    pub fn production_is_possibly_empty(&self, prod: ProdId) -> bool {
        self.is_possibly_empty(self.productions[prod].root)
    }

    pub fn production_is_always_successful(&self, prod: ProdId) -> bool {
        self.is_always_successful(self.productions[prod].root)
    }

    pub fn production_has_scan_limit(&self, prod: ProdId) -> bool {
        let root = self.productions[prod].root;
        self.is_sequence(root) && self.has_scan_limit(root)
    }

    pub fn production_has_explicit_lookahead(&self, prod: ProdId) -> bool {
        self.has_explicit_lookahead(self.productions[prod].root)
    }

    pub fn production_lookahead(&self, prod: ProdId) -> Option<&Lookahead> {
        self.lookahead(self.productions[prod].root)
    }

    pub fn production_lookahead_method_name(&self, prod: ProdId) -> String {
        format!("{}{}", self.identifier_prefix("check"), self.productions[prod].name)
    }

    /// Checks if the production can start with itself.
    pub fn is_left_recursive(&self, prod: ProdId) -> bool {
        let production = &self.productions[prod];
        self.potentially_starts_with(production.root, &production.name, &mut HashSet::new())
    }

    /// Non-terminals referring to the production.
    pub fn referring_non_terminals(&self, prod: ProdId) -> Vec<ExpId> {
        let name = &self.productions[prod].name;
        (0..self.nodes.len())
            .filter(|&id| matches!(&self.nodes[id].kind, ExpKind::NonTerminal(n) if n == name))
            .collect()
    }
}
