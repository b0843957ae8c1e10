// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.


use std::collections::HashSet;
use crate::grammar::{EmptyKind, ExpKind, Grammar};
use crate::lexer::{LexerData, ReType, TokenKind};
use crate::log::{LogStatus, Logger};
use crate::{ExpId, NodeRef, RegexId};

/// Checks of a grammar before any generation, and registration of the token ordinals.
///
/// The checks are made in a fixed order. An undefined non-terminal stops them immediately,
/// and any error found before the resolution of the token references stops them there.
pub struct SanityChecker<'a> {
    grammar: &'a mut Grammar,
}

impl<'a> SanityChecker<'a> {
    pub fn new(grammar: &'a mut Grammar) -> Self {
        SanityChecker { grammar }
    }

    pub fn do_checks(&mut self) {
        const VERBOSE: bool = false;
        if !self.check_non_terminals() {
            return;
        }
        self.check_lookahead_locations();
        self.check_lexical_state_names();
        self.check_choices();
        self.check_loops();
        self.check_look_behinds();
        self.check_regex_specs();
        self.register_named_tokens();
        self.register_string_literals();
        if VERBOSE { println!("tokens: {}", self.grammar.lexer_data.tokens_to_str()); }
        if self.grammar.num_errors() > 0 {
            return;
        }
        self.check_token_references();
        self.resolve_token_references();
        self.check_regex_loops();
    }

    fn expansions(&self) -> std::ops::Range<ExpId> {
        0..self.grammar.num_nodes()
    }

    /// Reports the non-terminals referring to undefined productions. Returns `false` if there is any.
    fn check_non_terminals(&mut self) -> bool {
        let mut ok = true;
        for exp in self.expansions() {
            if let ExpKind::NonTerminal(name) = self.grammar.kind(exp) {
                if self.grammar.production_id(name).is_none() {
                    let msg = format!("Non-terminal {name} has not been defined.");
                    self.grammar.add_error_at(NodeRef::Expansion(exp), msg);
                    ok = false;
                }
            }
        }
        ok
    }

    fn check_lookahead_locations(&mut self) {
        for exp in self.expansions() {
            let g = &*self.grammar;
            if g.kind(exp) == &ExpKind::Sequence && g.has_explicit_lookahead(exp) && !g.is_at_choice_point(exp) {
                self.grammar.add_error_at(NodeRef::Expansion(exp), "Encountered scanahead at a non-choice location.");
            }
        }
        for exp in self.expansions() {
            let g = &*self.grammar;
            if g.is_scan_limit(exp) {
                if let crate::grammar::Parent::Expansion(parent) = g.parent(exp) {
                    if !g.is_at_choice_point(parent) {
                        self.grammar.add_error_at(NodeRef::Expansion(exp), "The up-to-here delimiter can only be at a choice point.");
                    }
                }
            }
        }
    }

    fn undefined_state_msg(name: &str) -> String {
        format!("Lexical state \"{name}\" has not been defined.")
    }

    fn check_lexical_state_names(&mut self) {
        for prod in 0..self.grammar.productions().len() {
            let g = &*self.grammar;
            let production = g.production(prod);
            let undefined = production.lexical_state()
                .filter(|name| g.lexer_data().lexical_state_index(name).is_none())
                .map(Self::undefined_state_msg);
            let left_recursive = g.is_left_recursive(prod);
            let name = production.name().to_string();
            if let Some(msg) = undefined {
                self.grammar.add_error_at(NodeRef::Production(prod), msg);
            }
            if left_recursive {
                self.grammar.add_warning_at(NodeRef::Production(prod), format!("Production {name} is left recursive."));
            }
        }
        for exp in self.expansions() {
            let g = &*self.grammar;
            let undefined = g.specified_lexical_state(exp)
                .filter(|name| g.lexer_data().lexical_state_index(name).is_none())
                .map(Self::undefined_state_msg);
            if let Some(msg) = undefined {
                self.grammar.add_error_at(NodeRef::Expansion(exp), msg);
            }
        }
    }

    /// Reports the alternatives that can never be reached because a previous alternative
    /// always succeeds.
    fn check_choices(&mut self) {
        for exp in self.expansions() {
            if self.grammar.kind(exp) != &ExpKind::Choice {
                continue;
            }
            let choices = self.grammar.units(exp).to_vec();
            for (i, &unit) in choices.iter().enumerate().take(choices.len().saturating_sub(1)) {
                if self.grammar.is_always_successful(unit) {
                    let num_following = choices.len() - i - 1;
                    let msg = if num_following == 1 {
                        " The expansion that follows ".to_string()
                    } else {
                        format!(" The following {num_following} expansions ")
                    };
                    self.grammar.add_error_at(NodeRef::Expansion(unit), format!("This expansion can match the empty string.{msg}can never be matched."));
                }
            }
        }
    }

    /// Checks if the expansion inside a repetition fails without consuming anything.
    fn always_fails(&self, nested: ExpId) -> bool {
        let g = &*self.grammar;
        (g.kind(nested) == &ExpKind::Empty(EmptyKind::Failure) || g.has_failure_child(nested)) && g.is_possibly_empty(nested)
    }

    fn check_loops(&mut self) {
        for exp in self.expansions() {
            let star_or_plus = match self.grammar.kind(exp) {
                ExpKind::ZeroOrMore => "(...)*",
                ExpKind::OneOrMore => "(...)+",
                _ => continue,
            };
            let nested = self.grammar.units(exp)[0];
            if self.always_fails(nested) {
                self.grammar.add_error_at(NodeRef::Expansion(exp), format!("Expansion inside {star_or_plus} always fails! This cannot be right!"));
            } else if self.grammar.is_always_successful(nested) {
                self.grammar.add_error_at(NodeRef::Expansion(exp),
                    format!("Expansion inside {star_or_plus} can be matched by the empty string, so it would produce an infinite loop!"));
            }
        }
        for exp in self.expansions() {
            if self.grammar.kind(exp) != &ExpKind::ZeroOrOne {
                continue;
            }
            let nested = self.grammar.units(exp)[0];
            if self.always_fails(nested) {
                self.grammar.add_warning_at(NodeRef::Expansion(exp), "The FAIL inside this construct is always triggered. This may not be your intention.");
            } else if self.grammar.is_always_successful(nested) {
                self.grammar.add_warning_at(NodeRef::Expansion(exp),
                    "The expansion inside this (...)? construct can be matched by the empty string so it is always matched. This may not be your intention.");
            }
        }
    }

    /// Checks the production names in the lookbehind paths and the "match up to" expansions.
    fn check_look_behinds(&mut self) {
        for exp in self.expansions() {
            let g = &*self.grammar;
            let Some(la) = g.node(exp).lookahead() else { continue };
            let undefined = la.look_behind.iter()
                .flat_map(|lb| lb.path.iter())
                .filter(|name| name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$'))
                .filter(|name| g.production_id(name).is_none())
                .cloned()
                .collect::<Vec<_>>();
            for name in undefined {
                self.grammar.add_error_at(NodeRef::Expansion(exp), format!("Predicate refers to undefined Non-terminal: {name}"));
            }
        }
        for exp in self.expansions() {
            let g = &*self.grammar;
            let up_to = g.node(exp).lookahead().and_then(|la| la.up_to);
            if let Some(up_to) = up_to {
                if !g.is_single_token(up_to) {
                    self.grammar.add_error_at(NodeRef::Expansion(up_to), "The expansion after UPTO here must be matched by exactly one token.");
                }
            }
        }
    }

    fn check_regex_specs(&mut self) {
        let mut errors = Vec::<(NodeRef, String)>::new();
        let lexer_data = &self.grammar.lexer_data;
        for (tp_id, tp) in lexer_data.token_productions().iter().enumerate() {
            for (index, spec) in tp.specs().iter().enumerate() {
                if let Some(next) = spec.next_state() {
                    if lexer_data.lexical_state_index(next).is_none() {
                        errors.push((NodeRef::RegexSpec(tp_id, index), Self::undefined_state_msg(next)));
                    }
                }
            }
        }
        for (tp_id, tp) in lexer_data.token_productions().iter().enumerate() {
            for (index, spec) in tp.specs().iter().enumerate() {
                if lexer_data.matches_empty_string(spec.regex()) {
                    errors.push((NodeRef::RegexSpec(tp_id, index), "Regular Expression can match empty string. This is not allowed here.".to_string()));
                }
            }
        }
        for (node, msg) in errors {
            self.grammar.add_error_at(node, msg);
        }
    }

    fn spec_regexes(&self, tp: usize) -> Vec<RegexId> {
        self.grammar.lexer_data.token_productions[tp].specs.iter().map(|spec| spec.regex).collect()
    }

    fn register_named_tokens(&mut self) {
        for tp in 0..self.grammar.lexer_data.token_productions.len() {
            for re in self.spec_regexes(tp) {
                let regex = self.grammar.lexer_data.regex(re);
                if regex.reference().is_some() || !regex.has_label() {
                    continue;
                }
                let label = regex.label.clone();
                if self.grammar.lexer_data.add_named_token(&label, re).is_some() {
                    self.grammar.add_error_at(NodeRef::Regex(re), format!("Multiply defined lexical token name \"{label}\"."));
                }
            }
        }
    }

    /// Registers the token ordinals. A string literal already defined in a lexical state takes
    /// the ordinal of the first definition when it's in an implicit token production.
    fn register_string_literals(&mut self) {
        for tp in 0..self.grammar.lexer_data.token_productions.len() {
            let mut private = HashSet::<RegexId>::new();
            let mut removed = Vec::<RegexId>::new();
            let states = self.grammar.lexer_data.token_productions[tp].lexical_states.clone();
            let explicit = self.grammar.lexer_data.token_productions[tp].explicit;
            for re in self.spec_regexes(tp) {
                let lexer_data = &mut self.grammar.lexer_data;
                let regex = lexer_data.regex(re);
                if regex.reference().is_some() {
                    continue;
                }
                if regex.is_private() {
                    private.insert(re);
                    continue;
                }
                match regex.image().map(|s| s.to_string()) {
                    None => {
                        lexer_data.add_regular_expression(re);
                    }
                    Some(image) => {
                        for name in &states {
                            let Some(index) = self.grammar.lexer_data.lexical_state_index(name) else { continue };
                            let lexer_data = &mut self.grammar.lexer_data;
                            match lexer_data.lexical_states[index].string_literal(&image) {
                                None => {
                                    if lexer_data.regex(re).ordinal().is_none() {
                                        lexer_data.add_regular_expression(re);
                                    }
                                    let ignore_case = lexer_data.ignore_case_of(re);
                                    lexer_data.lexical_states[index].add_string_literal(&image, re, ignore_case);
                                }
                                Some(present) if !explicit => {
                                    match lexer_data.kind_of(present) {
                                        Some(kind) if kind != TokenKind::Token => {
                                            self.grammar.add_error_at(NodeRef::Regex(re),
                                                format!("String token \"{image}\" has been defined as a \"{kind}\" token."));
                                        }
                                        _ if private.contains(&present) => {
                                            self.grammar.add_error_at(NodeRef::Regex(re),
                                                format!("String token \"{image}\" has been defined as a private regular expression."));
                                        }
                                        _ => {
                                            lexer_data.regexes[re].ordinal = lexer_data.regex(present).ordinal();
                                            removed.push(re);
                                        }
                                    }
                                }
                                Some(_) => {}
                            }
                        }
                    }
                }
                let regex = self.grammar.lexer_data.regex(re);
                if let (true, Some(ordinal)) = (regex.has_label(), regex.ordinal()) {
                    let label = regex.label.clone();
                    self.grammar.add_token_name(ordinal, &label);
                }
            }
            self.grammar.lexer_data.token_productions[tp].specs.retain(|spec| !removed.contains(&spec.regex));
        }
    }

    /// Checks the references to named tokens, in the regular expressions and in the BNF productions.
    fn check_token_references(&mut self) {
        let mut errors = Vec::<(RegexId, String)>::new();
        let lexer_data = &self.grammar.lexer_data;
        for (re, regex) in lexer_data.regexes.iter().enumerate() {
            let explicit = regex.token_production().is_some_and(|tp| lexer_data.token_production(tp).is_explicit());
            for label in regex.references() {
                if lexer_data.extra_tokens().iter().any(|t| t == label) {
                    continue;
                }
                match lexer_data.named_token(label) {
                    None => errors.push((re, format!("Undefined lexical token name \"{label}\"."))),
                    Some(_) if explicit => {}
                    Some(referenced) => {
                        if lexer_data.regex(referenced).is_private() {
                            errors.push((re, format!("Token name \"{label}\" refers to a private (with a #) regular expression.")));
                        } else if lexer_data.kind_of(referenced).is_some_and(|kind| kind != TokenKind::Token) {
                            errors.push((re, format!("Token name \"{label}\" refers to a non-token (SKIP, MORE, UNPARSED) regular expression.")));
                        }
                    }
                }
            }
        }
        for (re, msg) in errors {
            self.grammar.add_error_at(NodeRef::Regex(re), msg);
        }
    }

    /// Gives the references their target's ordinal, then removes the references from the
    /// token productions since they don't define any new token.
    fn resolve_token_references(&mut self) {
        let lexer_data = &mut self.grammar.lexer_data;
        for re in 0..lexer_data.regexes.len() {
            let ordinal = match lexer_data.regexes[re].reference() {
                Some(label) => match lexer_data.named_token(label) {
                    Some(target) => lexer_data.regexes[target].ordinal,
                    None => lexer_data.extra_token_ordinal(label),
                },
                None => continue,
            };
            lexer_data.regexes[re].ordinal = ordinal;
        }
        let LexerData { regexes, token_productions, .. } = lexer_data;
        for tp in token_productions.iter_mut() {
            tp.specs.retain(|spec| regexes[spec.regex].reference().is_none());
        }
    }

    /// Reports the named regular expressions that refer to themselves, directly or not.
    fn check_regex_loops(&mut self) {
        let lexer_data = &self.grammar.lexer_data;
        let mut visitor = RegexLoopVisitor { lexer_data, visiting: HashSet::new(), visited: HashSet::new(), loops: Vec::new() };
        for tp in lexer_data.token_productions() {
            for spec in tp.specs() {
                visitor.visit(spec.regex());
            }
        }
        let loops = visitor.loops;
        for re in loops {
            self.grammar.add_error_at(NodeRef::Regex(re), "Self-referential loop detected");
        }
    }
}

struct RegexLoopVisitor<'a> {
    lexer_data: &'a LexerData,
    visiting: HashSet<RegexId>,
    visited: HashSet<RegexId>,
    /// regular expressions containing a reference that closes a loop
    loops: Vec<RegexId>,
}

impl RegexLoopVisitor<'_> {
    fn visit(&mut self, re: RegexId) {
        let lexer_data = self.lexer_data;
        let tree = lexer_data.regex(re).tree();
        let Some(root) = tree.get_root() else { return };
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if let ReType::Ref(label) = tree.get(node) {
                if let Some(target) = lexer_data.named_token(label) {
                    if !self.visited.contains(&target) {
                        if self.visiting.insert(target) {
                            self.visit(target);
                            self.visiting.remove(&target);
                        } else {
                            self.visited.insert(target);
                            self.loops.push(re);
                        }
                    }
                }
            }
            stack.extend(tree.children(node).iter().rev());
        }
    }
}
