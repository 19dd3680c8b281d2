//! Expectation evaluation against realistic action results

use chaos_trials::expectation::{Comparison, Expectation, ValueExtractor};
use chaos_trials::Error;
use serde_json::{json, Map, Value};

fn spec(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn check(spec_value: Value, result: &Value) -> chaos_trials::Result<()> {
    Expectation::build(&spec(spec_value))?.execute(result)
}

fn app_result() -> Value {
    json!({
        "name": "web",
        "state": "STARTED",
        "instances": 3,
        "memory": "512.0",
        "routes": [
            {"host": "web", "domain": "apps.test", "port": 443},
            {"host": "web-internal", "domain": "internal.test", "port": 8080}
        ],
        "env": {"LOG.LEVEL": "debug"}
    })
}

#[test]
fn test_operator_names_and_symbols() {
    for (name, symbol) in [("eq", "=="), ("ne", "!="), ("lt", "<"), ("le", "<="), ("gt", ">"), ("ge", ">=")] {
        let comparison = Comparison::from_name(name).unwrap();
        assert_eq!(comparison.symbol(), symbol);
        assert_eq!(Comparison::from_symbol(symbol), Some(comparison));
    }
    assert_eq!(Comparison::from_name("contains"), None);
}

#[test]
fn test_nested_and_indexed_paths() {
    let result = app_result();
    assert!(check(json!({"operator": "eq", "state": "STARTED"}), &result).is_ok());
    assert!(check(json!({"operator": "eq", "routes[1].port": 8080}), &result).is_ok());
    assert!(check(json!({"operator": "eq", "$.routes[-1].host": "web-internal"}), &result).is_ok());
    assert!(check(json!({"operator": "eq", "env['LOG.LEVEL']": "debug"}), &result).is_ok());
}

#[test]
fn test_filter_paths() {
    let result = app_result();
    assert!(check(json!({"operator": "eq", "routes[?(@.port == 443)].domain": "apps.test"}), &result).is_ok());
    assert!(check(json!({"operator": "regex", "routes[?host='web-internal'].domain": "^internal"}), &result).is_ok());
}

#[test]
fn test_numeric_strings_compare_as_floats() {
    let result = app_result();
    assert!(check(json!({"operator": "ge", "memory": 256}), &result).is_ok());
    assert!(check(json!({"operator": "lt", "instances": "10"}), &result).is_ok());
    assert!(check(json!({"operator": "eq", "memory": "512"}), &result).is_ok());
}

#[test]
fn test_failed_comparison_message() {
    let err = check(json!({"operator": "gt", "instances": 5}), &app_result()).unwrap_err();
    assert!(matches!(err, Error::FailedExpectation(ref message) if message == "3 > 5"));
    assert_eq!(err.to_string(), "Expectation failed(3 > 5)");
}

#[test]
fn test_ordering_between_unrelated_types() {
    let err = check(json!({"operator": "lt", "state": 1}), &app_result()).unwrap_err();
    assert!(matches!(err, Error::IncomparableValues { .. }));

    assert!(check(json!({"operator": "ne", "state": 1}), &app_result()).is_ok());
}

#[test]
fn test_missing_key_path() {
    let err = check(json!({"operator": "eq", "health.status": "UP"}), &app_result()).unwrap_err();
    let Error::KeyNotFound { key_path, .. } = err else {
        panic!("expected KeyNotFound");
    };
    assert_eq!(key_path, "health.status");
}

#[test]
fn test_scalar_results_use_value_key() {
    assert!(check(json!({"operator": "eq", "value": 200}), &json!(200)).is_ok());
    assert!(check(json!({"operator": "regex", "value": "ok"}), &json!("all ok")).is_ok());
    assert!(check(json!({"operator": "eq", "status": 200}), &json!(200)).is_err());
}

#[test]
fn test_regex_failure_message() {
    let err = check(json!({"operator": "regex", "state": "^STOP"}), &app_result()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Expectation failed(Regex pattern ^STOP does not match STARTED.)"
    );
}

#[test]
fn test_invalid_specs() {
    let err = Expectation::build(&spec(json!({"state": "STARTED"}))).unwrap_err();
    assert_eq!(err.to_string(), "Invalid operator: None");

    let err = Expectation::build(&spec(json!({"operator": "like", "state": "S"}))).unwrap_err();
    assert_eq!(err.to_string(), "Invalid operator: like");

    let err = Expectation::build(&spec(json!({"operator": "regex", "state": "("}))).unwrap_err();
    assert!(matches!(err, Error::Regex(_)));
}

#[test]
fn test_build_all_stops_at_first_error() {
    let specs = vec![
        spec(json!({"operator": "eq", "state": "STARTED"})),
        spec(json!({"operator": "bogus", "state": "STARTED"})),
    ];
    assert!(Expectation::build_all(&specs).is_err());
    assert_eq!(Expectation::build_all(&specs[..1]).unwrap().len(), 1);
}

#[test]
fn test_extractor_directly() {
    let result = app_result();
    let port = ValueExtractor::new(&result, "routes[0].port").extract().unwrap();
    assert_eq!(port, &json!(443));
    assert!(ValueExtractor::new(&result, "routes[5]").extract().is_err());
}
