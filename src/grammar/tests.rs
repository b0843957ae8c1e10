// Copyright (c) 2025 Redglyph (@gmail.com). All Rights Reserved.

#![cfg(test)]

use super::*;
use crate::{TokenId, UNBOUNDED};

fn tokens(set: &TokenSet) -> Vec<TokenId> {
    set.iter().collect()
}

/// `P ::= [ "a" ] ( "b" )* "c" "d"`
#[test]
fn sequence_sets() {
    let mut g = Grammar::default();
    let a = g.literal("a");
    let opt = g.zero_or_one(a);
    let b = g.literal("b");
    let star = g.zero_or_more(b);
    let c = g.literal("c");
    let d = g.literal("d");
    let seq = g.sequence(vec![opt, star, c, d]);
    g.add_production("P", seq);
    assert_eq!(g.analyze(), None);
    assert_eq!(tokens(&g.first_set(seq)), vec![1, 2, 3]);
    assert_eq!(tokens(&g.final_set(seq)), vec![4]);
    assert_eq!(tokens(&g.first_set(opt)), vec![1]);
    assert_eq!(g.minimum_size(seq), 2);
    assert_eq!(g.maximum_size(seq), UNBOUNDED);
    assert_eq!(g.maximum_size(opt), 1);
    assert!(!g.is_possibly_empty(seq));
    assert_eq!(g.lexer_data().token_name(1), "A");
    let p = g.production_id("P").unwrap();
    assert_eq!(tokens(&g.production_first_set(p)), vec![1, 2, 3]);
    assert_eq!(tokens(&g.production_final_set(p)), vec![4]);
}

#[test]
fn empty_iff_min_zero() {
    let mut g = Grammar::default();
    // P ::= P "x" | "y"
    let p_nt = g.non_terminal("P");
    let x = g.literal("x");
    let alt1 = g.sequence(vec![p_nt, x]);
    let y = g.literal("y");
    let alt2 = g.sequence(vec![y]);
    let p_root = g.choice(vec![alt1, alt2]);
    g.add_production("P", p_root);
    // Q ::= [ Q ] "z"
    let q_nt = g.non_terminal("Q");
    let q_opt = g.zero_or_one(q_nt);
    let z = g.literal("z");
    let q_root = g.sequence(vec![q_opt, z]);
    g.add_production("Q", q_root);
    // R ::= {} | ( "a" )+
    let empty = g.empty();
    let r_alt1 = g.sequence(vec![empty]);
    let a = g.literal("a");
    let plus = g.one_or_more(a);
    let r_alt2 = g.sequence(vec![plus]);
    let r_root = g.choice(vec![r_alt1, r_alt2]);
    g.add_production("R", r_root);
    // S ::= R R ( "b" | {} )*
    let r1 = g.non_terminal("R");
    let r2 = g.non_terminal("R");
    let b = g.literal("b");
    let empty2 = g.empty();
    let inner = g.choice(vec![b, empty2]);
    let star = g.zero_or_more(inner);
    let s_root = g.sequence(vec![r1, r2, star]);
    g.add_production("S", s_root);
    // T ::= FAIL | S
    let fail = g.failure();
    let s_nt = g.non_terminal("S");
    let t_root = g.choice(vec![fail, s_nt]);
    g.add_production("T", t_root);

    for exp in 0..g.num_nodes() {
        let min = g.minimum_size(exp);
        let max = g.maximum_size(exp);
        assert_eq!(g.is_possibly_empty(exp), min == 0, "{}: min = {min}", g.describe(NodeRef::Expansion(exp)));
        assert!(max != 0 || g.is_possibly_empty(exp), "{}: max = 0", g.describe(NodeRef::Expansion(exp)));
        assert!(min <= max, "{}: min {min} > max {max}", g.describe(NodeRef::Expansion(exp)));
    }
    assert!(!g.is_possibly_empty(p_root));
    assert_eq!(g.minimum_size(p_root), 1);
    assert_eq!(g.maximum_size(p_root), UNBOUNDED);
    assert_eq!(g.minimum_size(q_root), 1);
    assert!(g.is_possibly_empty(r_root));
    assert!(g.is_possibly_empty(s_root));
    assert!(g.is_possibly_empty(t_root));
}

#[test]
fn left_recursion() {
    // P ::= P "x" | "y"
    let mut g = Grammar::default();
    let p_nt = g.non_terminal("P");
    let x = g.literal("x");
    let alt1 = g.sequence(vec![p_nt, x]);
    let y = g.literal("y");
    let alt2 = g.sequence(vec![y]);
    let root = g.choice(vec![alt1, alt2]);
    let p = g.add_production("P", root);
    assert!(g.is_left_recursive(p));
    assert!(g.needs_left_recursion_check(p_nt));
    assert_eq!(g.analyze(), None);
    assert_eq!(g.get_warnings().cloned().collect::<Vec<_>>(), vec!["Production P is left recursive.".to_string()]);
    assert_eq!(tokens(&g.first_set(root)), vec![2]);
    assert_eq!(g.referring_non_terminals(p), vec![p_nt]);

    // P ::= "y" P | "y"
    let mut g = Grammar::default();
    let y1 = g.literal("y");
    let p_nt = g.non_terminal("P");
    let alt1 = g.sequence(vec![y1, p_nt]);
    let y2 = g.literal("y");
    let alt2 = g.sequence(vec![y2]);
    let root = g.choice(vec![alt1, alt2]);
    let p = g.add_production("P", root);
    assert!(!g.is_left_recursive(p));
    assert!(!g.needs_left_recursion_check(p_nt));
    assert_eq!(g.analyze(), None);
    assert!(g.has_no_warnings());
    assert_eq!(tokens(&g.final_set(root)), vec![1]);

    // A ::= B "x" ; B ::= [ "y" ] A
    let mut g = Grammar::default();
    let b_nt = g.non_terminal("B");
    let x = g.literal("x");
    let a_root = g.sequence(vec![b_nt, x]);
    let a = g.add_production("A", a_root);
    let y = g.literal("y");
    let opt = g.zero_or_one(y);
    let a_nt = g.non_terminal("A");
    let b_root = g.sequence(vec![opt, a_nt]);
    let b = g.add_production("B", b_root);
    assert!(g.is_left_recursive(a));
    assert!(g.is_left_recursive(b));
}

/// `P ::= "a" P | "b"`
#[test]
fn recursive_sets() {
    let mut g = Grammar::default();
    let a = g.literal("a");
    let p_nt = g.non_terminal("P");
    let alt1 = g.sequence(vec![a, p_nt]);
    let b = g.literal("b");
    let alt2 = g.sequence(vec![b]);
    let root = g.choice(vec![alt1, alt2]);
    g.add_production("P", root);
    assert_eq!(g.analyze(), None);
    assert_eq!(tokens(&g.first_set(root)), vec![1, 2]);
    assert_eq!(tokens(&g.final_set(root)), vec![2]);
    assert_eq!(tokens(&g.final_set(p_nt)), vec![2]);
    assert_eq!(g.minimum_size(root), 1);
    assert_eq!(g.minimum_size(alt1), 2);
    assert_eq!(g.maximum_size(root), UNBOUNDED);
    assert!(!g.is_always_successful(root));
}

#[test]
fn undefined_non_terminal() {
    let mut g = Grammar::default();
    let nt = g.non_terminal("NOWHERE");
    let root = g.sequence(vec![nt]);
    g.add_production("P", root);
    assert!(g.first_set(nt).is_empty());
    assert!(!g.is_possibly_empty(nt));
    assert_eq!(g.minimum_size(nt), UNBOUNDED);
    assert_eq!(g.maximum_size(nt), UNBOUNDED);
    assert_eq!(g.nested_expansion(nt), None);
}

/// `P ::= "a" ( "b" [ "c" ] )* ; Q ::= "a" "b"`
#[test]
fn follow_sets() {
    let mut g = Grammar::default();
    let a = g.literal("a");
    let b = g.literal("b");
    let c = g.literal("c");
    let opt = g.zero_or_one(c);
    let inner = g.sequence(vec![b, opt]);
    let star = g.zero_or_more(inner);
    let root = g.sequence(vec![a, star]);
    g.add_production("P", root);
    let qa = g.literal("a");
    let qb = g.literal("b");
    let q_root = g.sequence(vec![qa, qb]);
    g.add_production("Q", q_root);
    assert_eq!(g.analyze(), None);
    assert_eq!(g.lexer_data().num_regular_expressions(), 4);

    let follow = g.follow_set(a);
    assert_eq!(tokens(&follow), vec![2]);
    assert!(follow.is_incomplete());
    let follow = g.follow_set(opt);
    assert_eq!(tokens(&follow), vec![2]);
    assert!(follow.is_incomplete());
    let follow = g.follow_set(b);
    assert_eq!(tokens(&follow), vec![2, 3]);
    assert!(follow.is_incomplete());
    assert!(g.is_at_end_of_loop(b));
    assert!(!g.is_at_end_of_loop(a));
    assert_eq!(g.first_loop_ancestor(opt), Some(star));
    assert_eq!(g.first_loop_ancestor(a), None);

    let follow = g.follow_set(qa);
    assert_eq!(tokens(&follow), vec![2]);
    assert!(!follow.is_incomplete());
    assert!(g.follow_set(qb).is_incomplete());
    assert_eq!(g.following_expansion(qa), Some(qb));
    assert_eq!(g.preceding(qb), Some(qa));
    assert_eq!(g.preceding(qa), None);
}

/// `P ::= ( SCAN "q" => "x" ) | "w"`
#[test]
fn choice_first_set_uses_lookahead() {
    let mut g = Grammar::default();
    let q = g.literal("q");
    let la_seq = g.sequence(vec![q]);
    let x = g.literal("x");
    let alt1 = g.sequence(vec![x]);
    g.set_lookahead(alt1, Lookahead::syntactic(la_seq));
    let w = g.literal("w");
    let alt2 = g.sequence(vec![w]);
    let root = g.choice(vec![alt1, alt2]);
    g.add_production("P", root);
    assert_eq!(g.analyze(), None);
    assert_eq!(tokens(&g.first_set(root)), vec![1, 3]);
    assert_eq!(tokens(&g.first_set(alt1)), vec![2]);
    assert_eq!(g.lookahead_expansion(alt1), la_seq);
    assert_eq!(g.lookahead_expansion(alt2), alt2);
    assert!(g.is_inside_lookahead(q));
    assert!(!g.is_inside_lookahead(x));
    assert_eq!(g.containing_production(q), g.production_id("P"));
    assert!(g.has_separate_syntactic_lookahead(alt1));
    assert!(g.requires_scan_ahead(alt1));
    assert_eq!(g.lookahead_amount(alt1), UNBOUNDED);
    assert_eq!(g.lookahead_amount(alt2), 1);
    assert!(g.requires_predicate_method(alt1));
    assert!(!g.requires_predicate_method(alt2));
    assert!(!g.requires_predicate_method(la_seq));
    assert!(g.descendants(alt1).contains(&q));
}

#[test]
fn lookahead_amounts() {
    let mut g = Grammar::new(GrammarOptions { legacy_lookahead: true, ..Default::default() });
    // P ::= SCAN 2 "a" "b" | "a" "c" | "d" =>|| "e"
    let a = g.literal("a");
    let b = g.literal("b");
    let alt1 = g.sequence(vec![a, b]);
    g.set_lookahead(alt1, Lookahead::with_amount(2));
    let a2 = g.literal("a");
    let c = g.literal("c");
    let alt2 = g.sequence(vec![a2, c]);
    let d = g.literal("d");
    g.set_scan_limit(d, 0);
    let e = g.literal("e");
    let alt3 = g.sequence(vec![d, e]);
    let root = g.choice(vec![alt1, alt2, alt3]);
    g.add_production("P", root);
    assert_eq!(g.lookahead_amount(alt1), 2);
    assert!(g.has_explicit_numerical_lookahead(alt1));
    assert!(g.has_implicit_syntactic_lookahead(alt1));
    assert!(!g.has_implicit_syntactic_lookahead(alt2));
    assert!(g.has_implicit_syntactic_lookahead(alt3));
    assert!(g.has_scan_limit(alt3));
    assert!(g.has_explicit_scan_limit(alt3));
    assert!(g.requires_scan_ahead(alt3));
    assert!(g.requires_predicate_method(alt3));
    assert!(!g.requires_predicate_method(alt2));

    let la = Lookahead { semantic: Some("ok()".to_string()), legacy: true, ..Default::default() };
    let f = g.literal("f");
    let sem = g.sequence(vec![f]);
    g.set_lookahead(sem, la);
    let owner = g.lookahead_owner(sem).unwrap();
    assert_eq!(g.la_amount(owner), 0);
    assert!(!g.la_is_always_successful(owner));
    assert!(g.has_semantic_lookahead(sem));
}

#[test]
fn choice_points() {
    // P ::= ( "a" "b" ) "c" | "d"
    let mut g = Grammar::default();
    let a = g.literal("a");
    let b = g.literal("b");
    let inner = g.sequence(vec![a, b]);
    let paren = g.parentheses(inner);
    let c = g.literal("c");
    let alt1 = g.sequence(vec![paren, c]);
    let d = g.literal("d");
    let alt2 = g.sequence(vec![d]);
    let root = g.choice(vec![alt1, alt2]);
    let p = g.add_production("P", root);
    assert!(g.is_at_choice_point(root));
    assert!(g.is_at_choice_point(alt1));
    assert!(g.is_superfluous_parentheses(paren));
    assert!(g.is_at_choice_point(inner));
    assert!(!g.is_at_choice_point(c));
    assert!(!g.is_at_choice_point(a));
    assert_eq!(g.all_units(alt1), vec![paren, a, b, c]);
    assert_eq!(g.first_non_empty(alt1), Some(a));
    assert_eq!(g.non_superfluous_parent(inner), Parent::Expansion(root));
    assert_eq!(g.non_superfluous_parent(a), Parent::Expansion(inner));
    assert!(g.begins_sequence(paren));
    assert!(!g.begins_sequence(c));
    assert_eq!(g.parent(root), Parent::Production(p));
    assert_eq!(g.nested_expansion(paren), Some(inner));
}

#[test]
fn always_successful() {
    let mut g = Grammar::default();
    let tests = vec![
        ("optional + code", {
            let a = g.literal("a");
            let opt = g.zero_or_one(a);
            let code = g.code_block(false);
            g.sequence(vec![opt, code])
        }, true),
        ("fail child", {
            let a = g.literal("a");
            let opt = g.zero_or_one(a);
            let fail = g.failure();
            g.sequence(vec![opt, fail])
        }, false),
        ("semantic lookahead", {
            let a = g.literal("a");
            let opt = g.zero_or_one(a);
            let seq = g.sequence(vec![opt]);
            g.set_lookahead(seq, Lookahead::semantic("check()"));
            seq
        }, false),
        ("non-empty syntactic lookahead", {
            let b = g.literal("b");
            let nested = g.sequence(vec![b]);
            let a = g.literal("a");
            let opt = g.zero_or_one(a);
            let seq = g.sequence(vec![opt]);
            g.set_lookahead(seq, Lookahead::syntactic(nested));
            seq
        }, false),
        ("choice with empty", {
            let a = g.literal("a");
            let alt1 = g.sequence(vec![a]);
            let empty = g.empty();
            let alt2 = g.sequence(vec![empty]);
            g.choice(vec![alt1, alt2])
        }, true),
        ("terminal", g.literal("t"), false),
        ("fail", g.failure(), false),
        ("loop", {
            let a = g.literal("a");
            g.zero_or_more(a)
        }, true),
        ("non-terminal", {
            let empty = g.empty();
            let root = g.sequence(vec![empty]);
            g.add_production("E", root);
            g.non_terminal("E")
        }, true),
    ];
    for (name, exp, expected) in tests {
        assert_eq!(g.is_always_successful(exp), expected, "test {name} failed");
    }
}

#[test]
fn single_token() {
    let mut g = Grammar::default();
    let a_root = g.literal("a");
    let a_seq = g.sequence(vec![a_root]);
    g.add_production("A", a_seq);
    let tests = vec![
        ("terminal", g.literal("t"), true),
        ("sequence of one", {
            let a = g.literal("a");
            g.sequence(vec![a])
        }, true),
        ("sequence of two", {
            let a = g.literal("a");
            let b = g.literal("b");
            g.sequence(vec![a, b])
        }, false),
        ("choice", {
            let a = g.literal("a");
            let b = g.literal("b");
            let alt1 = g.sequence(vec![a]);
            let alt2 = g.sequence(vec![b]);
            g.choice(vec![alt1, alt2])
        }, true),
        ("non-terminal", g.non_terminal("A"), true),
        ("optional", {
            let a = g.literal("a");
            g.zero_or_one(a)
        }, false),
        ("with fail", {
            let a = g.literal("a");
            let fail = g.failure();
            g.sequence(vec![a, fail])
        }, false),
        ("with global action", {
            let a = g.literal("a");
            let code = g.code_block(true);
            g.sequence(vec![a, code])
        }, false),
    ];
    for (name, exp, expected) in tests {
        assert_eq!(g.is_single_token(exp), expected, "test {name} failed");
    }
}

#[test]
fn state_switches_and_activations() {
    let mut g = Grammar::default();
    g.add_lexical_state("OTHER");
    // P ::= ACTIVATE_TOKENS(X) "a" | "b"
    let act = g.token_activation(&["X"]);
    let a = g.literal("a");
    let alt1 = g.sequence(vec![act, a]);
    let b = g.literal("b");
    let alt2 = g.sequence(vec![b]);
    let root = g.choice(vec![alt1, alt2]);
    g.add_production("P", root);
    assert!(g.has_token_activation(alt1));
    assert!(!g.has_token_activation(alt2));
    assert!(g.requires_predicate_method(alt1));
    assert!(!g.requires_predicate_method(alt2));

    // Q ::= "a" LEXICAL_STATE OTHER "b" ; R (OTHER) ::= "c" ; S ::= "d" R
    let qa = g.literal("a");
    let switch = g.lexical_state_switch("OTHER");
    let qb = g.literal("b");
    let q_root = g.sequence(vec![qa, switch, qb]);
    g.add_production("Q", q_root);
    assert_eq!(g.is_before_lexical_state_switch(qa), Some(true));
    assert_eq!(g.is_before_lexical_state_switch(qb), None);
    assert!(!g.specifies_lexical_state_switch(q_root));
    assert!(g.specifies_lexical_state_switch(switch));

    let c = g.literal("c");
    let r_root = g.sequence(vec![c]);
    let r = g.add_production("R", r_root);
    g.set_production_lexical_state(r, "OTHER");
    assert_eq!(g.specified_lexical_state(r_root), Some("OTHER"));
    assert!(g.requires_predicate_method(r_root));
    let d = g.literal("d");
    let r_nt = g.non_terminal("R");
    let s_root = g.sequence(vec![d, r_nt]);
    g.add_production("S", s_root);
    assert!(g.specifies_lexical_state_switch(r_nt));
    assert_eq!(g.is_before_lexical_state_switch(d), Some(true));
    assert!(!g.is_single_token(r_nt));
}

#[test]
fn recover_methods() {
    // P ::= Q "b" "c" ; Q ::= "a"
    let mut g = Grammar::default();
    let q_nt = g.non_terminal("Q");
    let b = g.literal("b");
    let c = g.literal("c");
    let root = g.sequence(vec![q_nt, b, c]);
    g.add_production("P", root);
    let a = g.literal("a");
    let q_root = g.sequence(vec![a]);
    let q = g.add_production("Q", q_root);
    assert!(g.requires_recover_method(root));
    assert!(!g.requires_recover_method(b));
    g.set_tolerant(q_nt, true);
    assert!(g.requires_recover_method(q_nt));
    assert!(g.requires_recover_method(b));
    g.set_tolerant(b, true);
    assert!(!g.requires_recover_method(c));
    g.set_production_node_name(q, "scan");
    assert!(g.production(q).only_for_lookahead());
    assert!(!g.requires_recover_method(q_root));
    assert_eq!(g.production(q).node_name(), "Q");
}

#[test]
fn scan_to_end() {
    // P ::= A "x" | "y" A ; A ::= "a"
    let mut g = Grammar::default();
    let a_nt1 = g.non_terminal("A");
    let x = g.literal("x");
    let alt1 = g.sequence(vec![a_nt1, x]);
    let y = g.literal("y");
    let a_nt2 = g.non_terminal("A");
    let alt2 = g.sequence(vec![y, a_nt2]);
    let root = g.choice(vec![alt1, alt2]);
    g.add_production("P", root);
    let a = g.literal("a");
    let a_root = g.sequence(vec![a]);
    g.add_production("A", a_root);
    assert!(!g.scan_to_end(a_nt1));
    assert!(g.scan_to_end(a_nt2));
}

#[test]
fn generated_names() {
    let mut g = Grammar::default();
    let a = g.literal("a");
    let b = g.literal("b");
    let star = g.zero_or_more(b);
    let root = g.sequence(vec![a, star]);
    let p = g.add_production("P", root);
    g.set_location(NodeRef::Expansion(star), SrcLoc::new(3, 5));
    g.set_location(NodeRef::Expansion(b), SrcLoc::new(3, 5));
    g.set_location(NodeRef::Production(p), SrcLoc::new(1, 1));
    assert_eq!(g.first_set_var_name(root), "P_FIRST_SET");
    assert_eq!(g.final_set_var_name(root), "P_FINAL_SET");
    assert_eq!(g.follow_set_var_name(root), "P_FOLLOW_SET");
    assert_eq!(g.scan_routine_name(root), "check_P");
    assert_eq!(g.predicate_method_name(root), "scan_P");
    assert_eq!(g.recover_method_name(root), "recover_P");
    assert_eq!(g.recover_to_method_name(root), "recover_to_P");
    assert_eq!(g.first_set_var_name(star), "first_set_P_3_5");
    assert_eq!(g.final_set_var_name(star), "final_set_P_3_5");
    assert_eq!(g.follow_set_var_name(star), "follow_set_P_3_5");
    assert_eq!(g.first_set_var_name(b), "first_set_P_3_5_1");
    assert_eq!(g.scan_routine_name(star), "check_P_3_5");
    assert_eq!(g.predicate_method_name(star), "scan_P_3_5");
    assert_eq!(g.recover_to_method_name(star), "recover_to_P_3_5");
    assert_eq!(g.production_lookahead_method_name(p), "check_P");
    assert_eq!(g.describe(NodeRef::Production(p)), "production P on line 1, column 1");
    assert_eq!(g.describe(NodeRef::Expansion(star)), "(...)* on line 3, column 5");

    let mut g = Grammar::new(GrammarOptions { identifier_prefix: "x_".to_string(), ..Default::default() });
    let a = g.literal("a");
    let opt = g.zero_or_one(a);
    let root = g.sequence(vec![opt]);
    g.add_production("Q", root);
    assert_eq!(g.first_set_var_name(opt), "x_first_set_Q_0_0");
    assert_eq!(g.final_set_var_name(opt), "x_final_set_Q_0_0");
    assert_eq!(g.predicate_method_name(opt), "x_scan_Q_0_0");
    assert_eq!(g.production(0).first_set_var_name(), "Q_FIRST_SET");
}

#[test]
fn try_analyze() {
    let mut g = Grammar::default();
    let nt = g.non_terminal("MISSING");
    let root = g.sequence(vec![nt]);
    g.add_production("P", root);
    match g.try_analyze() {
        Ok(_) => panic!("errors were expected"),
        Err(e) => {
            assert_eq!(e.get_source(), BuildErrorSource::SanityChecker);
            let log = e.get_log();
            assert_eq!(log.get_errors().cloned().collect::<Vec<_>>(), vec!["Non-terminal MISSING has not been defined.".to_string()]);
        }
    }

    let mut g = Grammar::default();
    g.add_lexical_state("UNUSED");
    let a = g.literal("a");
    let root = g.sequence(vec![a]);
    g.add_production("P", root);
    match g.try_analyze() {
        Ok(_) => panic!("errors were expected"),
        Err(e) => assert_eq!(e.get_source(), BuildErrorSource::LexerData),
    }
}
