// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

#![cfg(test)]

use super::*;
use crate::lexer::{re_chars, re_string, ReTree, ReType, TokenKind, TokenProduction};
use crate::log::{BufLog, LogStatus};
use crate::{btreeset, seg, segments};

/// Lexer data with one TOKEN production in DEFAULT, containing the given `(label, tree)` pairs,
/// registered in that order.
fn build_lexer(ignore_case: bool, tokens: Vec<(&str, ReTree)>) -> (LexerData, Vec<RegexId>) {
    let mut lexer_data = LexerData::new(false);
    lexer_data.add_lexical_state("DEFAULT");
    let tp = lexer_data.add_token_production(TokenProduction::new(TokenKind::Token, vec!["DEFAULT".to_string()], ignore_case, true));
    let mut ids = Vec::new();
    for (label, tree) in tokens {
        let id = lexer_data.add_regex_spec(tp, label, false, tree);
        lexer_data.add_named_token(label, id);
        lexer_data.add_regular_expression(id);
        ids.push(id);
    }
    let mut log = BufLog::new();
    lexer_data.build_data(&mut log);
    assert!(log.has_no_errors(), "{log}");
    (lexer_data, ids)
}

fn consuming_states(lsd: &LexicalStateData) -> usize {
    lsd.states.iter().filter(|s| !s.moves.is_empty()).count()
}

#[test]
fn string_literal_chain() {
    let (lexer_data, ids) = build_lexer(false, vec![("AB", re_string("ab"))]);
    let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
    let s0 = lsd.initial_state();
    assert_eq!(lsd.state(s0).index(), Some(0));
    assert_eq!(lsd.state(s0).moves(), &[seg!('a')]);
    let s1 = lsd.state(s0).next().unwrap();
    assert_eq!(lsd.state(s1).moves(), &[seg!('b')]);
    assert_eq!(lsd.state(s1).index(), Some(1));
    let end = lsd.state(s1).next().unwrap();
    assert!(lsd.state(end).moves().is_empty());
    assert_eq!(lsd.state(end).ty(), Some(ids[0]));
    assert_eq!(lsd.num_states(), 2);
    assert_eq!(lsd.all_nfa_states(), vec![s0, s1]);
    assert_eq!(consuming_states(lsd), 2);
    assert!(lsd.is_move_code_needed(s1));
    assert_eq!(lsd.next_state_index(s0), Some(1));
    assert_eq!(lsd.method_name(s1), Some("NFA_1".to_string()));
    assert_eq!(lsd.moves_array_name(s1), Some("NFA_MOVES_1".to_string()));
}

#[test]
fn ignore_case_moves() {
    let (lexer_data, _) = build_lexer(true, vec![("A", re_string("A"))]);
    let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
    assert_eq!(lsd.state(lsd.initial_state()).moves(), &[seg!('A'), seg!('a')]);

    let (lexer_data, _) = build_lexer(true, vec![("B", re_chars(segments!['b'], false))]);
    let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
    assert_eq!(lsd.state(lsd.initial_state()).moves(), &[seg!('B'), seg!('b')]);

    let mut state = NfaState::default();
    state.set_char_move('x' as u32, false);
    assert_eq!(state.moves(), &[seg!('x')]);
    state.set_char_move('7' as u32, true);
    assert_eq!(state.moves(), &[seg!('7')]);
}

#[test]
fn negated_class() {
    let (lexer_data, _) = build_lexer(false, vec![("NOT_A", re_chars(segments!['a'], true))]);
    let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
    let initial = lsd.state(lsd.initial_state());
    assert_eq!(initial.moves(), &[Seg(0, 'a' as u32 - 1), Seg('b' as u32, 0x10ffff)]);
    assert_eq!(initial.ascii_moves(), &[Seg(0, 'a' as u32 - 1), Seg('b' as u32, 0x10ffff)]);
    assert!(initial.non_ascii_moves().is_empty());
    assert!(initial.has_ascii_moves() && initial.has_non_ascii_moves());
}

#[test]
fn ascii_split() {
    let mut state = NfaState::default();
    state.moves = vec![seg!('0' - '9'), Seg(100, 200), Seg(300, 400)];
    assert_eq!(state.ascii_moves(), &[seg!('0' - '9'), Seg(100, 200)]);
    assert_eq!(state.non_ascii_moves(), &[Seg(300, 400)]);
    state.moves = vec![Seg(200, 300)];
    assert!(state.ascii_moves().is_empty());
    assert!(!state.has_ascii_moves() && state.has_non_ascii_moves());
    assert!(!NfaState::default().has_ascii_moves());
}

#[test]
fn composite_is_canonical() {
    let mut lsd = LexicalStateData::new("DEFAULT");
    let a = lsd.new_state();
    let b = lsd.new_state();
    lsd.states[a].add_range('a' as u32, 'a' as u32);
    lsd.states[b].add_range('b' as u32, 'b' as u32);
    let p = lsd.new_state();
    let q = lsd.new_state();
    for st in [p, q] {
        lsd.add_epsilon_move(st, a);
        lsd.add_epsilon_move(st, b);
    }
    lsd.generate_data();
    let cp = lsd.canonical_state(p);
    let cq = lsd.canonical_state(q);
    assert_eq!(cp, cq);
    assert!(lsd.state(cp).is_composite());
    assert_eq!(lsd.state(cp).members(), Some(&btreeset![a, b]));
    assert_eq!(lsd.state(cp).index(), Some(1));
    assert_eq!(lsd.canonical_composite(btreeset![a, b]), cp);
    assert_ne!(lsd.canonical_composite(btreeset![a, p]), cp);
    // p and q are replaced by the composite, the members are indexed last
    assert!(!lsd.all_states.contains(&p) && !lsd.all_states.contains(&q));
    assert_eq!(lsd.state(a).index(), Some(2));
    assert_eq!(lsd.state(b).index(), Some(3));
    assert_eq!(lsd.state(lsd.initial_state()).index(), Some(0));
}

#[test]
fn initial_composite() {
    let (lexer_data, ids) = build_lexer(false, vec![("A", re_string("a")), ("B", re_string("b"))]);
    let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
    let initial = lsd.initial_state();
    assert_eq!(lsd.state(initial).index(), Some(0));
    assert!(lsd.state(initial).is_composite());
    assert_eq!(lsd.method_name(initial), Some("NFA_COMPOSITE_0".to_string()));
    assert_eq!(lsd.moves_array_name(initial), Some("NFA_MOVES_COMPOSITE_0".to_string()));
    assert!(lsd.is_move_code_needed(initial));
    // higher ordinal of the next state first
    let ordered = lsd.ordered_states(initial, &lexer_data);
    let next_types = ordered.iter().map(|&s| lsd.state(lsd.state(s).next().unwrap()).ty().unwrap()).collect::<Vec<_>>();
    assert_eq!(next_types, vec![ids[1], ids[0]]);
    let indices = ordered.iter().map(|&s| lsd.state(s).index().unwrap()).collect::<BTreeSet<_>>();
    assert_eq!(indices, btreeset![1, 2]);
    assert!(!lsd.overlaps(ordered[0], &[ordered[1]]));
    assert!(lsd.overlaps(ordered[0], &[ordered[0]]));
}

#[test]
fn ordered_states_ties() {
    let (lexer_data, _) = build_lexer(false, vec![("AB", re_chars(segments!['a', 'c'-'d'], false))]);
    let mut lsd = lexer_data.lexical_state("DEFAULT").unwrap().clone();
    let target = lsd.state(lsd.initial_state()).next().unwrap();
    let x = lsd.new_state();
    let y = lsd.new_state();
    let z = lsd.new_state();
    lsd.states[x].moves = vec![seg!('b')];
    lsd.states[y].moves = vec![seg!('a'), seg!('c')];
    lsd.states[z].moves = vec![seg!('a')];
    for st in [x, y, z] {
        lsd.states[st].next = Some(target);
    }
    let untyped = lsd.new_state();
    let w = lsd.new_state();
    lsd.states[w].moves = vec![seg!('z')];
    lsd.states[w].next = Some(untyped);
    let composite = lsd.canonical_composite(btreeset![x, y, z, w]);
    assert_eq!(lsd.ordered_states(composite, &lexer_data), vec![w, y, z, x]);
}

#[test]
fn repetition_copies() {
    let tests = vec![
        (ReType::Repeat(2, Some(3)), 3),
        (ReType::Repeat(2, None), 3),
        (ReType::Repeat(0, Some(0)), 0),
        (ReType::Plus, 1),
        (ReType::Star, 1),
        (ReType::Maybe, 1),
    ];
    for (idx, (op, expected)) in tests.into_iter().enumerate() {
        let mut tree = ReTree::new();
        let root = tree.add_root(op);
        tree.add(Some(root), ReType::CharList(Box::new(segments!['a']), false));
        let mut lexer_data = LexerData::new(false);
        lexer_data.add_lexical_state("DEFAULT");
        let tp = lexer_data.add_token_production(TokenProduction::new(TokenKind::Token, vec!["DEFAULT".to_string()], false, true));
        let id = lexer_data.add_regex_spec(tp, "R", false, tree);
        lexer_data.add_regular_expression(id);
        lexer_data.build_data(&mut BufLog::new());
        let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
        assert_eq!(consuming_states(lsd), expected, "test {idx} failed");
    }
}

#[test]
fn references_are_not_shared() {
    let mut lexer_data = LexerData::new(false);
    lexer_data.add_lexical_state("DEFAULT");
    let tp = lexer_data.add_token_production(TokenProduction::new(TokenKind::Token, vec!["DEFAULT".to_string()], false, true));
    let digit = lexer_data.add_regex_spec(tp, "DIGIT", true, re_chars(segments!['0'-'9'], false));
    lexer_data.add_named_token("DIGIT", digit);
    let mut tree = ReTree::new();
    let root = tree.add_root(ReType::Concat);
    tree.add(Some(root), ReType::Ref(Box::new("DIGIT".to_string())));
    tree.add(Some(root), ReType::Ref(Box::new("DIGIT".to_string())));
    let number = lexer_data.add_regex_spec(tp, "NUMBER", false, tree);
    lexer_data.add_regular_expression(number);
    let mut log = BufLog::new();
    lexer_data.build_data(&mut log);
    assert!(log.has_no_errors());
    let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
    assert_eq!(consuming_states(lsd), 2);
    assert!(lsd.contains_regular_expression(number));
    assert!(!lsd.contains_regular_expression(digit));
    let s0 = lsd.initial_state();
    let s1 = lsd.canonical_state(lsd.state(s0).next().unwrap());
    assert_eq!(lsd.state(s1).moves(), &[seg!('0' - '9')]);
    assert_eq!(lsd.state(lsd.state(s1).next().unwrap()).ty(), Some(number));
}

#[test]
fn empty_string_literal() {
    let (lexer_data, ids) = build_lexer(false, vec![("EMPTY", re_string("")), ("X", re_string("x"))]);
    let lsd = lexer_data.lexical_state("DEFAULT").unwrap();
    assert_eq!(lsd.num_states(), 1);
    let initial = lsd.state(lsd.initial_state());
    assert_eq!(initial.moves(), &[seg!('x')]);
    assert_eq!(lsd.state(initial.next().unwrap()).ty(), Some(ids[1]));
}

#[test]
fn closure_inherits_type() {
    let mut lsd = LexicalStateData::new("DEFAULT");
    let p = lsd.new_state();
    let q = lsd.new_state();
    let r = lsd.new_state();
    lsd.states[r].add_range('r' as u32, 'r' as u32);
    lsd.states[q].ty = Some(7);
    lsd.add_epsilon_move(p, q);
    lsd.add_epsilon_move(q, r);
    lsd.epsilon_closure(p);
    assert_eq!(lsd.state(p).ty(), Some(7));
    assert_eq!(lsd.state(p).epsilon(), &btreeset![r]);
    assert_eq!(lsd.state(q).epsilon(), &btreeset![r]);
}

#[test]
#[should_panic]
fn closure_two_types() {
    let mut lsd = LexicalStateData::new("DEFAULT");
    let p = lsd.new_state();
    let q = lsd.new_state();
    lsd.states[q].add_range('q' as u32, 'q' as u32);
    lsd.states[p].ty = Some(1);
    lsd.states[q].ty = Some(2);
    lsd.add_epsilon_move(p, q);
    lsd.epsilon_closure(p);
}

#[test]
#[should_panic]
fn composite_of_singleton() {
    let mut lsd = LexicalStateData::new("DEFAULT");
    let a = lsd.new_state();
    lsd.canonical_composite(btreeset![a]);
}

#[test]
fn other_state_names() {
    let mut lsd = LexicalStateData::new("COMMENT");
    let a = lsd.new_state();
    lsd.states[a].index = Some(3);
    assert_eq!(lsd.method_name(a), Some("NFA_COMMENT_3".to_string()));
    let b = lsd.new_state();
    assert_eq!(lsd.method_name(b), None);
}
