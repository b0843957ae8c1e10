// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

use crate::lexer::{LexerData, ReType};
use crate::nfa::LexicalStateData;
use crate::{RegexId, StateId};

/// Thompson construction of the NFA of a regular expression in a lexical state.
///
/// Each construct gives a `(start, end)` pair of states. The references to named regular
/// expressions are expanded again at each use, so they don't share any state.
pub(crate) struct NfaBuilder<'a> {
    lsd: &'a mut LexicalStateData,
    lexer_data: &'a LexerData,
    ignore_case: bool,
    /// regular expressions being expanded
    stack: Vec<RegexId>,
}

/// Repetition of a sub-expression, used to unfold `{min,max}`.
#[derive(Clone, Copy)]
enum Unit {
    Once,
    Star,
    Maybe,
}

impl<'a> NfaBuilder<'a> {
    pub fn new(lsd: &'a mut LexicalStateData, lexer_data: &'a LexerData, ignore_case: bool) -> Self {
        NfaBuilder { lsd, lexer_data, ignore_case, stack: Vec::new() }
    }

    /// Builds the states of `re`, types its final state and links it to the initial state.
    pub fn build_states(&mut self, re: RegexId) {
        let (start, end) = self.visit_regex(re);
        self.lsd.states[end].ty = Some(re);
        let initial = self.lsd.initial;
        self.lsd.add_epsilon_move(initial, start);
    }

    fn visit_regex(&mut self, re: RegexId) -> (StateId, StateId) {
        let root = self.lexer_data.regex(re).tree().get_root();
        match root {
            Some(root) if !self.stack.contains(&re) => {
                self.stack.push(re);
                let result = self.visit(re, root);
                self.stack.pop();
                result
            }
            _ => {
                let state = self.lsd.new_state();
                (state, state)
            }
        }
    }

    fn visit(&mut self, re: RegexId, node: usize) -> (StateId, StateId) {
        let lexer_data = self.lexer_data;
        let tree = lexer_data.regex(re).tree();
        let children = tree.children(node);
        match tree.get(node) {
            ReType::CharList(segments, negated) => {
                let start = self.lsd.new_state();
                let end = self.lsd.new_state();
                for seg in segments.ordered_ranges(self.ignore_case, *negated) {
                    self.lsd.states[start].add_range(seg.0, seg.1);
                }
                self.lsd.states[start].next = Some(end);
                (start, end)
            }
            ReType::String(image) => {
                let ignore_case = lexer_data.ignore_case || self.ignore_case;
                let start = self.lsd.new_state();
                let mut state = start;
                for c in image.chars() {
                    self.lsd.states[state].set_char_move(c as u32, ignore_case);
                    let end = self.lsd.new_state();
                    self.lsd.states[state].next = Some(end);
                    state = end;
                }
                (start, state)
            }
            ReType::Concat => {
                let parts = children.iter().map(|&c| self.visit(re, c)).collect::<Vec<_>>();
                self.sequence(parts)
            }
            ReType::Or => {
                if children.len() == 1 {
                    return self.visit(re, children[0]);
                }
                let start = self.lsd.new_state();
                let end = self.lsd.new_state();
                for &child in children {
                    let (s, e) = self.visit(re, child);
                    self.lsd.add_epsilon_move(start, s);
                    self.lsd.add_epsilon_move(e, end);
                }
                (start, end)
            }
            ReType::Star => self.repeat_unit(re, children[0], Unit::Star),
            ReType::Maybe => self.repeat_unit(re, children[0], Unit::Maybe),
            ReType::Plus => {
                let start = self.lsd.new_state();
                let end = self.lsd.new_state();
                let (s, e) = self.visit(re, children[0]);
                self.lsd.add_epsilon_move(start, s);
                self.lsd.add_epsilon_move(e, s);
                self.lsd.add_epsilon_move(e, end);
                (start, end)
            }
            ReType::Repeat(min, max) => {
                let mut units = vec![Unit::Once; *min as usize];
                match max {
                    None => units.push(Unit::Star),
                    Some(max) => units.extend((*min..*max).map(|_| Unit::Maybe)),
                }
                let parts = units.into_iter().map(|u| self.repeat_unit(re, children[0], u)).collect::<Vec<_>>();
                self.sequence(parts)
            }
            ReType::Ref(name) => {
                match lexer_data.named_token(name) {
                    Some(target) => self.visit_regex(target),
                    None => {
                        let state = self.lsd.new_state();
                        (state, state)
                    }
                }
            }
            ReType::Eof => {
                let state = self.lsd.new_state();
                (state, state)
            }
        }
    }

    fn repeat_unit(&mut self, re: RegexId, node: usize, unit: Unit) -> (StateId, StateId) {
        match unit {
            Unit::Once => self.visit(re, node),
            Unit::Star => {
                let start = self.lsd.new_state();
                let end = self.lsd.new_state();
                let (s, e) = self.visit(re, node);
                self.lsd.add_epsilon_move(start, s);
                self.lsd.add_epsilon_move(start, end);
                self.lsd.add_epsilon_move(e, end);
                self.lsd.add_epsilon_move(e, s);
                (start, end)
            }
            Unit::Maybe => {
                let start = self.lsd.new_state();
                let end = self.lsd.new_state();
                let (s, e) = self.visit(re, node);
                self.lsd.add_epsilon_move(start, s);
                self.lsd.add_epsilon_move(start, end);
                self.lsd.add_epsilon_move(e, end);
                (start, end)
            }
        }
    }

    /// Links the parts in series. A single part is returned as it is.
    fn sequence(&mut self, parts: Vec<(StateId, StateId)>) -> (StateId, StateId) {
        if parts.len() == 1 {
            return parts[0];
        }
        let start = self.lsd.new_state();
        let end = self.lsd.new_state();
        let mut prev_end = start;
        for (s, e) in parts {
            self.lsd.add_epsilon_move(prev_end, s);
            prev_end = e;
        }
        self.lsd.add_epsilon_move(prev_end, end);
        (start, end)
    }
}
