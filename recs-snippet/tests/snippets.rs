//! End-to-end sessions running real snippets

use proptest::prelude::*;
use recs_runner::{SessionOptions, SessionOutcome};
use recs_snippet::SnippetEvaluator;
use recs_test_utils::{done, group_responses, init, record, run_transcript, run_transcript_with};
use serde_json::{json, Value};

fn run(code: &str, mode: &str, records: &[Value]) -> Vec<Value> {
    let mut lines = vec![init(code, mode)];
    lines.extend(records.iter().cloned().map(record));
    lines.push(done());
    let (summary, responses) = run_transcript(SnippetEvaluator, &lines);
    assert!(matches!(summary.outcome, SessionOutcome::Completed));
    responses
}

fn results(code: &str, records: &[Value]) -> Vec<Value> {
    run(code, "eval", records)
        .into_iter()
        .filter(|m| m["type"] == "result")
        .map(|m| m["data"].clone())
        .collect()
}

#[test]
fn grep_filters_on_expression() {
    let responses = run("r.age > 20", "grep", &[json!({"age": 30}), json!({"age": 10})]);
    assert_eq!(
        responses,
        vec![
            json!({"type": "filter", "passed": true}),
            json!({"type": "record_done"}),
            json!({"type": "filter", "passed": false}),
            json!({"type": "record_done"}),
        ]
    );
}

#[test]
fn eval_sets_computed_field() {
    let responses = run("r.computed = r.age * 2", "eval", &[json!({"age": 30})]);
    assert_eq!(
        responses,
        vec![
            json!({"type": "result", "data": {"age": 30, "computed": 60}}),
            json!({"type": "record_done"}),
        ]
    );
}

#[test]
fn xform_emits_in_order() {
    let responses = run(
        "emit({\"a\": 1}); emit({\"b\": 2})",
        "xform",
        &[json!({"name": "alice"})],
    );
    assert_eq!(
        responses,
        vec![
            json!({"type": "emit", "data": {"a": 1}}),
            json!({"type": "emit", "data": {"b": 2}}),
            json!({"type": "record_done"}),
        ]
    );
}

#[test]
fn generate_builds_records_from_loops() {
    let code = "for tag in r.tags {\n  out = Record()\n  out.tag = tag\n  out.n = line_num\n  emit(out)\n}";
    let responses = run(code, "generate", &[json!({"tags": ["x", "y"]})]);
    let (groups, trailing) = group_responses(responses);
    assert!(trailing.is_empty());
    assert_eq!(
        groups[0].emitted(),
        vec![&json!({"tag": "x", "n": 1}), &json!({"tag": "y", "n": 1})]
    );
}

#[test]
fn runtime_fault_is_isolated_to_its_record() {
    let responses = run("r.total = r.price * 2", "eval", &[json!({}), json!({"price": 4})]);
    let (groups, trailing) = group_responses(responses);
    assert!(trailing.is_empty());
    assert_eq!(groups.len(), 2);
    assert_eq!(
        groups[0].error(),
        Some("Error processing record 1:   line 1, column 1: r.total = r.price * 2\nKeyError: 'price'")
    );
    assert_eq!(groups[0].kinds(), vec!["error"]);
    assert_eq!(
        groups[1].messages,
        vec![json!({"type": "result", "data": {"price": 4, "total": 8}})]
    );
}

#[test]
fn grep_rejects_statements() {
    let (summary, responses) = run_transcript(
        SnippetEvaluator,
        &[init("x = r.a", "grep"), record(json!({"a": 1}))],
    );
    assert!(summary.outcome.is_failure());
    assert_eq!(
        responses,
        vec![json!({
            "type": "error",
            "message": "SyntaxError in snippet: line 1, column 1: grep snippets must be a single expression"
        })]
    );
}

#[test]
fn syntax_error_is_reported_once() {
    let (summary, responses) = run_transcript(
        SnippetEvaluator,
        &[init("r.a = (1 +", "eval"), record(json!({})), done()],
    );
    assert!(summary.outcome.is_failure());
    assert_eq!(responses.len(), 1);
    let message = responses[0]["message"].as_str().unwrap();
    assert!(message.starts_with("SyntaxError in snippet: line 1, column 11:"), "{message}");
}

#[test]
fn invalid_mode_reports_before_compiling() {
    let (_, responses) = run_transcript(
        SnippetEvaluator,
        &[init("this is not ( valid", "bad_mode"), record(json!({}))],
    );
    assert_eq!(
        responses,
        vec![json!({
            "type": "error",
            "message": "Invalid mode: \"bad_mode\". Must be one of [eval, generate, grep, xform]"
        })]
    );
}

#[test]
fn templates_read_write_and_update_fuzzily() {
    let code = "{{Full}} = {{first}} + ' ' + {{last}}\n{{visit}} += 1\n{{geo/city}} = 'Oslo'";
    let out = results(
        code,
        &[json!({"first_name": "Ada", "last_name": "Lovelace", "full": "", "Visit_count": 2})],
    );
    assert_eq!(
        out,
        vec![json!({
            "first_name": "Ada",
            "last_name": "Lovelace",
            "full": "Ada Lovelace",
            "Visit_count": 3,
            "geo": {"city": "Oslo"}
        })]
    );
}

#[test]
fn template_on_missing_field_reads_null() {
    let out = results("r.seen = {{nothing}} == null", &[json!({"a": 1})]);
    assert_eq!(out, vec![json!({"a": 1, "seen": true})]);
}

#[test]
fn eval_merges_final_object_expression() {
    let out = results("total = r.a + r.b\n{\"sum\": total}", &[json!({"a": 1, "b": 2})]);
    assert_eq!(out, vec![json!({"a": 1, "b": 2, "sum": 3})]);
}

#[test]
fn eval_ignores_non_object_final_value() {
    let out = results("r.a = 5\nr.a", &[json!({})]);
    assert_eq!(out, vec![json!({"a": 5})]);
}

#[test]
fn control_flow_classifies_records() {
    let code = "if r.score >= 90 {\n  r.grade = 'A'\n} elif r.score >= 75 {\n  r.grade = 'B'\n} else {\n  r.grade = 'C'\n}";
    let out = results(code, &[json!({"score": 95}), json!({"score": 80}), json!({"score": 3})]);
    let grades: Vec<&Value> = out.iter().map(|r| &r["grade"]).collect();
    assert_eq!(grades, vec![&json!("A"), &json!("B"), &json!("C")]);
}

#[test]
fn truthiness_drives_grep() {
    let records = [
        json!({"v": null}),
        json!({"v": 0}),
        json!({"v": 0.0}),
        json!({"v": ""}),
        json!({"v": []}),
        json!({"v": {}}),
        json!({"v": false}),
        json!({"v": "x"}),
        json!({"v": [0]}),
    ];
    let passed: Vec<bool> = run("r.v", "grep", &records)
        .into_iter()
        .filter(|m| m["type"] == "filter")
        .map(|m| m["passed"].as_bool().unwrap())
        .collect();
    assert_eq!(
        passed,
        vec![false, false, false, false, false, false, false, true, true]
    );
}

#[test]
fn division_semantics() {
    let out = results(
        "r.exact = 10 / 2; r.frac = 7 / 2; r.rem = -7 % 3",
        &[json!({})],
    );
    assert_eq!(out, vec![json!({"exact": 5, "frac": 3.5, "rem": 2})]);

    let responses = run("r.x = r.a / r.b", "eval", &[json!({"a": 1, "b": 0})]);
    let (groups, _) = group_responses(responses);
    let error = groups[0].error().unwrap();
    assert!(error.ends_with("ZeroDivisionError: division by zero"), "{error}");
}

#[test]
fn integer_overflow_is_a_fault() {
    let responses = run("r.x = r.big * 2", "eval", &[json!({"big": i64::MAX})]);
    let (groups, _) = group_responses(responses);
    assert!(groups[0]
        .error()
        .unwrap()
        .ends_with("OverflowError: integer overflow"));
}

#[test]
fn regex_and_membership_in_grep() {
    let code = "r.name =~ '^[ab]' and 'admin' in r.roles";
    let records = [
        json!({"name": "alice", "roles": ["admin"]}),
        json!({"name": "bob", "roles": []}),
        json!({"name": "carol", "roles": ["admin"]}),
    ];
    let passed: Vec<Value> = run(code, "grep", &records)
        .into_iter()
        .filter(|m| m["type"] == "filter")
        .map(|m| m["passed"].clone())
        .collect();
    assert_eq!(passed, vec![json!(true), json!(false), json!(false)]);
}

#[test]
fn record_methods_reshape_records() {
    let code = "r.rename('nm', 'name')\nr.set('meta/tags/#0', lower(r.get('kind', 'NONE')))\nr.prune_to('name', 'meta')";
    let out = results(code, &[json!({"nm": "x", "kind": "Widget", "junk": 1})]);
    assert_eq!(out, vec![json!({"name": "x", "meta": {"tags": ["widget"]}})]);
}

#[test]
fn filename_binding_comes_from_options() {
    let options = SessionOptions {
        filename: "people.json".to_string(),
    };
    let (_, responses) = run_transcript_with(
        SnippetEvaluator,
        &[
            init("r.src = filename; r.n = line_num", "eval"),
            record(json!({})),
            record(json!({})),
        ],
        options,
    );
    let data: Vec<&Value> = responses
        .iter()
        .filter(|m| m["type"] == "result")
        .map(|m| &m["data"])
        .collect();
    assert_eq!(
        data,
        vec![
            &json!({"src": "people.json", "n": 1}),
            &json!({"src": "people.json", "n": 2}),
        ]
    );
}

#[test]
fn locals_do_not_leak_between_records() {
    let code = "if r.first { seen = 1 }\nr.ok = seen";
    let responses = run(code, "eval", &[json!({"first": true}), json!({"first": false})]);
    let (groups, _) = group_responses(responses);
    assert_eq!(
        groups[0].messages,
        vec![json!({"type": "result", "data": {"first": true, "ok": 1}})]
    );
    assert!(groups[1]
        .error()
        .unwrap()
        .ends_with("NameError: name 'seen' is not defined"));
}

/// Runs `code` on a record that faults and then on a healthy one, checking
/// the fault stays inside the first record's response group.
fn assert_fault_isolated(code: &str, expected: &str) {
    let responses = run(code, "eval", &[json!({"ok": false}), json!({"ok": true})]);
    let record_done = responses
        .iter()
        .filter(|m| m["type"] == "record_done")
        .count();
    assert_eq!(record_done, 2, "{responses:?}");

    let (groups, trailing) = group_responses(responses);
    assert!(trailing.is_empty());
    assert_eq!(groups[0].kinds(), vec!["error"]);
    let error = groups[0].error().unwrap();
    assert!(error.starts_with("Error processing record 1:"), "{error}");
    assert!(error.ends_with(expected), "{error}");
    assert_eq!(groups[1].kinds(), vec!["result"]);
    assert_eq!(groups[1].messages[0]["data"]["ok"], json!(true));
}

#[test]
fn set_with_index_past_usize_is_isolated() {
    assert_fault_isolated(
        "if !r.ok { r.set('a/#18446744073709551615', 1) }",
        "Array index out of range: #18446744073709551615",
    );
}

#[test]
fn set_with_huge_index_is_isolated() {
    assert_fault_isolated(
        "if !r.ok { r.set('a/#1000000000000', 1) }",
        "Array index out of range: #1000000000000",
    );
}

#[test]
fn template_write_with_huge_index_is_isolated() {
    assert_fault_isolated(
        "if !r.ok { {{a/#1000000000000}} = 1 }",
        "Array index out of range: #1000000000000",
    );
}

#[test]
fn oversized_string_repeat_is_isolated() {
    assert_fault_isolated(
        "if !r.ok { r.x = 'ab' * 9223372036854775807 }",
        "OverflowError: repeated sequence is too long",
    );
}

#[test]
fn oversized_array_repeat_is_isolated() {
    assert_fault_isolated(
        "if !r.ok { r.x = [1, 2] * 9223372036854775807 }",
        "OverflowError: repeated sequence is too long",
    );
}

#[test]
fn oversized_range_is_isolated() {
    assert_fault_isolated(
        "if !r.ok { r.x = range(9223372036854775807) }",
        "OverflowError: range() result is too long",
    );
}

#[test]
fn deeply_nested_snippet_is_a_syntax_error() {
    let code = format!("r.x = {}1{}", "(".repeat(200_000), ")".repeat(200_000));
    let (summary, responses) = run_transcript(
        SnippetEvaluator,
        &[init(&code, "eval"), record(json!({})), done()],
    );
    assert!(summary.outcome.is_failure());
    assert_eq!(responses.len(), 1);
    let message = responses[0]["message"].as_str().unwrap();
    assert!(message.starts_with("SyntaxError in snippet: line 1, column "), "{message}");
    assert!(message.ends_with("snippet is nested too deeply"), "{message}");
}

#[test]
fn emit_rejects_scalars() {
    let responses = run("emit(5)", "xform", &[json!({})]);
    let (groups, _) = group_responses(responses);
    assert!(groups[0].error().unwrap().contains("TypeError"));
    assert!(groups[0].emitted().is_empty());
}

proptest! {
    #[test]
    fn integer_arithmetic_matches_checked_ops(a in any::<i64>(), b in any::<i64>()) {
        let out = results(
            "r.sum = r.a + r.b",
            &[json!({"a": a, "b": b})],
        );
        match a.checked_add(b) {
            Some(sum) => prop_assert_eq!(&out[0]["sum"], &json!(sum)),
            None => prop_assert!(out.is_empty()),
        }
    }

    #[test]
    fn comparisons_agree_with_rust(a in -1000i64..1000, b in -1000i64..1000) {
        let responses = run("r.a < r.b", "grep", &[json!({"a": a, "b": b})]);
        prop_assert_eq!(&responses[0], &json!({"type": "filter", "passed": a < b}));
    }
}
