use crate::{
    Action, AttrKey, ComparatorChain, CompiledPattern, Element, Environment, FindType, GroupId, MatchError,
    MatchOptions, MultiPatternMatcher, NodeFunction, NodePattern, PredicateError, Span, StringMatchFlags, Token, Value,
    Verdict, by_offset, compile, compile_with, default_order, select_non_overlapping, tokens_from_str,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

fn words(text: &str) -> Vec<Token> {
    text.split_whitespace().map(Token::new).collect()
}

fn spans(pattern: &CompiledPattern, tokens: &[Token]) -> Vec<(usize, usize)> {
    pattern.matcher(tokens).find_all().map(|m| m.map(|m| (m.start(), m.end()))).collect::<Result<_, _>>().unwrap()
}

#[test]
fn literal_sequence_scenario() {
    let tokens = words("the quick brown fox");
    let pattern = compile(r#""quick" "brown""#).unwrap();
    let mut matcher = pattern.matcher(&tokens);
    let m = matcher.find().unwrap().unwrap();
    assert_eq!((m.start(), m.end()), (1, 3));
    assert_eq!(m.group(0).unwrap().as_deref(), Some("quick brown"));
    assert!(matcher.find().unwrap().is_none());
}

#[test]
fn named_alternation_scenario() {
    let tokens = words("the quick brown fox");
    let pattern = compile(r#"(?$color "brown"|"red") []"#).unwrap();
    let m = pattern.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!((m.start(), m.end()), (2, 4));
    assert_eq!(m.var_group("color").as_deref(), Some("brown"));
    assert_eq!(m.group(1).unwrap().as_deref(), Some("brown"));
}

#[test]
fn multi_element_span_scenario() {
    let tokens = words("the quick brown fox");
    let hit = compile("(?m){2,2} /qu.*wn/").unwrap();
    let m = hit.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.span(), Span::new(1, 3));
    let miss = compile("(?m){2,2} /^wn/").unwrap();
    assert!(miss.matcher(&tokens).find().unwrap().is_none());
}

#[test]
fn multi_element_spans_backtrack_over_lengths() {
    let tokens = words("the quick brown fox");
    let greedy = compile(r#"((?m){1,3} /.*/) "brown""#).unwrap();
    let m = greedy.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.group(1).unwrap().as_deref(), Some("the quick"));
    assert_eq!(m.span(), Span::new(0, 3));

    let shortened = compile(r#"(?m){1,3} /q.*/ "fox""#).unwrap();
    let m = shortened.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.span(), Span::new(1, 4));
}

#[test]
fn multi_element_spans_follow_reluctant_context() {
    let tokens = words("the quick brown fox");
    let reluctant = compile("((?m){1,3}? /.*/) []").unwrap();
    let m = reluctant.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.group(1).unwrap().as_deref(), Some("the"));
    assert_eq!(m.span(), Span::new(0, 2));

    let greedy = compile("((?m){1,3} /.*/) []").unwrap();
    let m = greedy.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.group(1).unwrap().as_deref(), Some("the quick brown"));
}

#[test]
fn greedy_versus_reluctant_before_a_literal() {
    let tokens = tokens_from_str("big/JJ red/JJ old/JJ car/NN");
    let greedy = compile(r#"(?$mods [tag:JJ]+) [tag:JJ|tag:NN]"#).unwrap();
    let m = greedy.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.var_group("mods").as_deref(), Some("big red old"));
    assert_eq!(m.span(), Span::new(0, 4));

    let lazy = compile(r#"(?$mods [tag:JJ]+?) [tag:JJ|tag:NN]"#).unwrap();
    let m = lazy.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.var_group("mods").as_deref(), Some("big"));
    assert_eq!(m.span(), Span::new(0, 2));
}

#[test]
fn backreference_consistency() {
    let pattern = compile(r"([]) (\1)").unwrap();
    let tokens = words("go go");
    let m = pattern.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.span(), Span::new(0, 2));
    assert_eq!(m.group(2).unwrap().as_deref(), Some("go"));
    assert!(pattern.matcher(&words("go stop")).find().unwrap().is_none());
}

#[test]
fn backreference_to_an_open_group_fails() {
    let pattern = compile(r#"("a" \1)"#).unwrap();
    assert!(pattern.matcher(&words("a a")).find().unwrap().is_none());
}

#[test]
fn backreference_spans_several_elements() {
    let pattern = compile(r#"([]{2}) "and" \1"#).unwrap();
    let tokens = words("salt pepper and salt pepper");
    let m = pattern.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.span(), Span::new(0, 5));
    assert!(pattern.matcher(&words("salt pepper and pepper salt")).find().unwrap().is_none());
}

#[test]
fn failed_branches_do_not_leak_groups() {
    // The first alternative opens group 1 and then fails on "z".
    let pattern = compile(r#"("x" ("y") "z") | ("x" "y")"#).unwrap();
    let tokens = words("x y w");
    let m = pattern.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.span(), Span::new(0, 2));
    assert_eq!(m.group_span(1).unwrap(), None);
    assert_eq!(m.group_span(2).unwrap(), None);
    assert_eq!(m.group_span(3).unwrap(), Some(Span::new(0, 2)));
}

#[test]
fn group_spans_lie_within_the_match() {
    let tokens = tokens_from_str("a/DT very/RB very/RB big/JJ dog/NN barked/VBD");
    let pattern = compile(r#"([tag:DT]) ((?$adv [tag:RB])* ([tag:JJ])) ([tag:NN])"#).unwrap();
    for m in pattern.matcher(&tokens).find_all() {
        let m = m.unwrap();
        let whole = m.group_span(0).unwrap().unwrap();
        assert_eq!(whole, Span::new(m.start(), m.end()));
        for g in 1..m.group_count() {
            if let Some(span) = m.group_span(g).unwrap() {
                assert!(whole.contains(&span), "group {g} {span:?} escapes {whole:?}");
            }
        }
        // The last iteration of a repeated group wins.
        assert_eq!(m.var_span("adv"), Some(Span::new(2, 3)));
    }
}

#[test]
fn pseudo_groups_and_range_errors() {
    let tokens = words("the quick brown fox");
    let m = compile(r#""quick""#).unwrap().matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.group(GroupId::BeforeMatch).unwrap().as_deref(), Some("the"));
    assert_eq!(m.group(GroupId::AfterMatch).unwrap().as_deref(), Some("brown fox"));
    assert_eq!(m.group_span(1).unwrap_err(), MatchError::GroupOutOfRange { group: 1, count: 1 });
    assert_eq!(m.var_start("missing"), None);
}

#[test]
fn compiling_twice_gives_identical_results() {
    let mut env = Environment::new();
    env.bind_pattern("ADJ", "[tag:JJ]");
    let tokens = tokens_from_str("a/DT big/JJ red/JJ ball/NN and/CC a/DT small/JJ cup/NN");
    let source = r#"[tag:DT] (?$adj $ADJ+) [tag:NN]"#;
    let first = compile_with(&env, source).unwrap();
    let second = compile_with(&env, source).unwrap();
    assert_eq!(spans(&first, &tokens), spans(&second, &tokens));
    assert_eq!(spans(&first, &tokens), vec![(0, 4), (5, 8)]);
}

#[test]
fn actions_fire_once_per_accepted_match() {
    let seen: Arc<Mutex<Vec<(String, usize)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let mut env = Environment::new();
    env.bind_action(Action::new("collect", move |m, group| {
        if let Ok(Some(text)) = m.group(group) {
            sink.lock().unwrap().push((text, group));
        }
    }));
    // Greedy [] backtracks several times before "fox" matches.
    let pattern = compile_with(&env, r#"[]* (?$animal "fox") => collect($animal)"#).unwrap();
    let tokens = words("the quick fox saw a fox");
    let found: Vec<_> = pattern.matcher(&tokens).find_all().collect::<Result<_, _>>().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].span(), Span::new(0, 6));
    assert_eq!(*seen.lock().unwrap(), vec![("fox".to_string(), 1)]);
}

#[test]
fn actions_do_not_fire_on_failed_searches() {
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let mut env = Environment::new();
    env.bind_action(Action::new("count", move |_, _| *counter.lock().unwrap() += 1));
    let pattern = compile_with(&env, r#""a" "b" => count"#).unwrap();
    assert!(pattern.matcher(&words("a a c")).find().unwrap().is_none());
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn custom_functions_attach_node_results() {
    let mut env = Environment::new();
    env.bind_function(
        "NUM",
        NodePattern::custom(NodeFunction::new("NUM", |el| {
            Ok(match el.text().parse::<f64>() {
                Ok(n) => Verdict::AcceptWith(Value::Number(n)),
                Err(_) => Verdict::Reject,
            })
        })),
    );
    let pattern = compile_with(&env, r#"#NUM "apples""#).unwrap();
    let tokens = words("buy 12 apples");
    let m = pattern.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(m.span(), Span::new(1, 3));
    assert_eq!(m.node_result(1), Some(&Value::Number(12.0)));
    assert_eq!(m.node_result(2), None);
}

#[test]
fn hard_predicate_failures_propagate() {
    let mut env = Environment::new();
    env.bind_function(
        "LOOKUP",
        NodePattern::custom(NodeFunction::new("LOOKUP", |el| {
            if el.text() == "boom" {
                Err(PredicateError::new("LOOKUP", "lexicon missing"))
            } else {
                Ok(Verdict::Reject)
            }
        })),
    );
    let pattern = compile_with(&env, "#LOOKUP").unwrap();
    let err = pattern.matcher(&words("fine boom")).find().unwrap_err();
    assert_eq!(err, MatchError::Predicate(PredicateError::new("LOOKUP", "lexicon missing")));
}

#[test]
fn environment_controls_defaults() {
    let mut env = Environment::new();
    env.set_default_key(AttrKey::named("lemma")).set_string_flags(StringMatchFlags::CASE_INSENSITIVE);
    let tokens = vec![Token::new("Ran").with("lemma", "run"), Token::new("home").with("lemma", "home")];
    let pattern = compile_with(&env, r#""RUN" /HO.E/"#).unwrap();
    assert_eq!(spans(&pattern, &tokens), vec![(0, 2)]);
}

#[test]
fn punctuated_tags_need_no_quotes() {
    let tokens = tokens_from_str("(/-LRB- her/PRP$ 3rd/JJ dog/NN )/-RRB-");
    let mut env = Environment::new();
    env.bind_attribute("word", AttrKey::Text);
    let pattern = compile_with(&env, "[tag:-LRB-] [tag:PRP$] [word:3rd] [] [tag:-RRB-]").unwrap();
    assert_eq!(spans(&pattern, &tokens), vec![(0, 5)]);
    let quoted = compile(r#"[tag:"PRP$"]"#).unwrap();
    assert_eq!(spans(&quoted, &tokens), vec![(1, 2)]);
}

#[test]
fn predicates_bound_by_name() {
    let mut env = Environment::new();
    env.bind_predicate("CAPS", |el| el.text().chars().next().is_some_and(char::is_uppercase));
    let pattern = compile_with(&env, "#CAPS+").unwrap();
    assert_eq!(spans(&pattern, &words("in New York City now")), vec![(1, 4)]);
}

#[test]
fn negated_and_existence_tests() {
    let tokens = vec![
        Token::new("Paris").with("ner", "LOC"),
        Token::new("is"),
        Token::new("nice").with("ner", ""),
    ];
    let pattern = compile("!{ner::EXISTS}").unwrap();
    assert_eq!(spans(&pattern, &tokens), vec![(1, 2)]);
    let pattern = compile("[ner::EXISTS & !ner:LOC]").unwrap();
    assert_eq!(spans(&pattern, &tokens), vec![(2, 3)]);
}

#[test]
fn numeric_relations_in_patterns() {
    let tokens = vec![Token::new("a").with("n", "1"), Token::new("b").with("n", "5"), Token::new("c").with("n", "9")];
    let pattern = compile("[n>1 & n<=9]+").unwrap();
    assert_eq!(spans(&pattern, &tokens), vec![(1, 3)]);
}

#[test]
fn anchors_pin_the_match() {
    let tokens = words("a b a");
    assert_eq!(spans(&compile(r#"^ "a""#).unwrap(), &tokens), vec![(0, 1)]);
    assert_eq!(spans(&compile(r#""a" $"#).unwrap(), &tokens), vec![(2, 3)]);
}

#[test]
fn find_from_and_exhaustion() {
    let tokens = words("a b a b");
    let pattern = compile(r#""a""#).unwrap();
    let mut matcher = pattern.matcher(&tokens);
    assert_eq!(matcher.find_from(1).unwrap().map(|m| m.start()), Some(2));
    assert!(matcher.find().unwrap().is_none());
    assert_eq!(matcher.find().unwrap_err(), MatchError::Exhausted);
    assert_eq!(matcher.find_from(0).unwrap().map(|m| m.start()), Some(0));
    assert_eq!(matcher.find_from(5).unwrap_err(), MatchError::PositionOutOfRange { pos: 5, len: 4 });
}

#[test]
fn overlapping_search_mode() {
    let tokens = words("a a a");
    let pattern = compile(r#""a" "a""#).unwrap();
    let all = MatchOptions { find_type: FindType::All, max_steps: None };
    let found: Vec<_> = pattern.matcher(&tokens).with_options(all).find_all().map(|m| m.unwrap().span()).collect();
    assert_eq!(found, vec![Span::new(0, 2), Span::new(1, 3)]);
    assert_eq!(spans(&pattern, &tokens), vec![(0, 2)]);
}

#[test]
fn step_budget_bounds_pathological_patterns() {
    let tokens = words("a a a a a a a a a a a a a a a a a a a a b");
    let pattern = compile(r#"("a"+)+ "c""#).unwrap();
    let options = MatchOptions { max_steps: Some(10_000), ..MatchOptions::default() };
    let err = pattern.matcher(&tokens).with_options(options).find().unwrap_err();
    assert_eq!(err, MatchError::StepLimit { limit: 10_000 });
}

#[test]
fn custom_stringifier() {
    fn glue(elements: &[&dyn Element]) -> String {
        elements.iter().map(|el| el.text()).collect::<Vec<_>>().concat()
    }
    let tokens = words("New York is big");
    let pattern = compile("(?m){2} /NewYork/").unwrap();
    let m = pattern.matcher(&tokens).with_stringifier(glue).find().unwrap().unwrap();
    assert_eq!(m.span(), Span::new(0, 2));
    assert_eq!(m.text(), "NewYork");
}

#[test]
fn ranking_prefers_longer_span_at_equal_score() {
    let tokens = words("a b c d e");
    let short = compile("[]{3}").unwrap().with_score(0.9);
    let long = compile("[]{5}").unwrap().with_score(0.9);
    let a = short.matcher(&tokens).find().unwrap().unwrap();
    let b = long.matcher(&tokens).find().unwrap().unwrap();
    assert_eq!(default_order(&b, &a), std::cmp::Ordering::Less);
    let kept = select_non_overlapping(vec![a, b], default_order);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].span(), Span::new(0, 5));
}

#[test]
fn multi_pattern_run_with_custom_ranking() {
    let tokens = tokens_from_str("New/NNP York/NNP City/NNP");
    let multi = MultiPatternMatcher::new(vec![
        compile("[tag:NNP]{2}").unwrap().with_score(0.2),
        compile(r#""York" "City""#).unwrap().with_score(0.1),
    ]);
    // Offset-first ranking picks the leftmost candidate regardless of score.
    let by_position = ComparatorChain::new().then(by_offset);
    let run = multi.run(&tokens, &by_position).unwrap();
    assert_eq!(run.candidates.len(), 2);
    assert_eq!(run.selected.iter().map(|m| m.span()).collect::<Vec<_>>(), vec![Span::new(0, 2)]);
    assert_eq!(run.metrics.patterns_active, 2);
}
