use signalbox::core::expression::{
    resolve_computed_parameters, ComputedSpec, ExprValue, ExpressionEngine,
};
use std::collections::HashMap;

fn engine(vars: &[(&str, ExprValue)]) -> ExpressionEngine {
    let mut engine = ExpressionEngine::new();
    for (name, value) in vars {
        engine.set_variable(*name, value.clone());
    }
    engine
}

// P1: evaluate is a pure function of expression and context.
#[test]
fn evaluation_is_deterministic_across_repeats() {
    let engine = engine(&[
        ("leg_angle", ExprValue::Number(0.32)),
        ("width", ExprValue::Number(2.0)),
    ]);
    let expr = "round(width * cos(leg_angle), 3) if leg_angle > 0 else 0";
    let first = engine.evaluate(expr).unwrap();
    for _ in 0..25 {
        assert_eq!(engine.evaluate(expr).unwrap(), first);
    }
}

#[test]
fn python_style_operator_semantics() {
    let engine = ExpressionEngine::new();
    assert_eq!(engine.evaluate_as_float("7 // 2").unwrap(), 3.0);
    assert_eq!(engine.evaluate_as_float("-7 // 2").unwrap(), -4.0);
    assert_eq!(engine.evaluate_as_float("-7 % 3").unwrap(), 2.0);
    assert_eq!(engine.evaluate_as_float("2 ** 10").unwrap(), 1024.0);
    assert_eq!(engine.evaluate_as_float("-2 ** 2").unwrap(), -4.0);
    assert_eq!(engine.evaluate_as_float("2 ** -1").unwrap(), 0.5);
}

#[test]
fn chained_comparisons_behave_like_pairwise_and() {
    let engine = engine(&[("x", ExprValue::Number(3.0))]);
    assert!(engine.evaluate_as_bool("1 < x < 5").unwrap());
    assert!(engine.evaluate_as_bool("1 <= x <= 3").unwrap());
    assert!(!engine.evaluate_as_bool("1 < x < 3").unwrap());
    assert!(!engine.evaluate_as_bool("5 > x > 3").unwrap());
}

#[test]
fn ternary_and_boolean_results_are_floats() {
    let engine = engine(&[("n", ExprValue::Number(0.0))]);
    assert_eq!(
        engine.evaluate("1 if n else 2").unwrap(),
        ExprValue::Number(2.0)
    );
    assert_eq!(engine.evaluate("n == 0").unwrap(), ExprValue::Number(1.0));
    assert_eq!(
        engine.evaluate("not (n == 0)").unwrap(),
        ExprValue::Number(0.0)
    );
}

#[test]
fn all_whitelisted_functions_are_callable() {
    let engine = ExpressionEngine::new();
    let cases: &[(&str, f64)] = &[
        ("abs(-3)", 3.0),
        ("min(4, 2, 9)", 2.0),
        ("max(4, 2, 9)", 9.0),
        ("round(2.5)", 3.0),
        ("floor(2.9)", 2.0),
        ("ceil(2.1)", 3.0),
        ("sqrt(16)", 4.0),
        ("trunc(-2.7)", -2.0),
        ("sin(0)", 0.0),
        ("cos(0)", 1.0),
        ("tan(0)", 0.0),
        ("asin(1) * 2", std::f64::consts::PI),
        ("acos(1)", 0.0),
        ("atan(0)", 0.0),
        ("atan2(0, 1)", 0.0),
        ("degrees(0)", 0.0),
        ("radians(0)", 0.0),
        ("log(exp(1))", 1.0),
        ("log10(1000)", 3.0),
        ("exp(0)", 1.0),
        ("pow(2, 8)", 256.0),
        ("hypot(3, 4)", 5.0),
    ];
    for (expr, expected) in cases {
        let result = engine.evaluate_as_float(expr).unwrap();
        assert!(
            (result - expected).abs() < 1e-9,
            "{} = {}, expected {}",
            expr,
            result,
            expected
        );
    }
}

#[test]
fn disallowed_constructs_raise() {
    let engine = ExpressionEngine::new();
    assert!(engine.evaluate("__import__('os')").is_err());
    assert!(engine.evaluate("x = 1").is_err());
    assert!(engine.evaluate("values[0]").is_err());
    assert!(engine.evaluate("lambda x").is_err());
    assert!(engine.evaluate("open('f')").is_err());
}

#[test]
fn unknown_variables_raise_and_safe_returns_default() {
    let engine = ExpressionEngine::new();
    assert!(engine.evaluate("missing + 1").is_err());
    assert_eq!(
        engine.evaluate_safe("missing + 1", ExprValue::Number(-1.0)),
        ExprValue::Number(-1.0)
    );
}

#[test]
fn strings_compare_for_equality_only() {
    let mut engine = ExpressionEngine::new();
    engine.set_variable("current_mode", ExprValue::Str("edit".to_string()));
    assert!(engine.evaluate_as_bool("current_mode == 'edit'").unwrap());
    assert!(engine.evaluate_as_bool("current_mode != 'object'").unwrap());
    assert!(engine.evaluate("current_mode * 2").is_err());
    assert!(engine.evaluate("current_mode >= 'a'").is_err());
}

// P2: computed resolution is declaration-order independent and rejects
// cycles.
#[test]
fn computed_resolution_is_order_independent() {
    let initial = HashMap::from([("width".to_string(), ExprValue::Number(2.0))]);
    let forward = vec![
        ComputedSpec {
            name: "half".to_string(),
            expr: "width / 2".to_string(),
            depends_on: vec!["width".to_string()],
        },
        ComputedSpec {
            name: "quarter".to_string(),
            expr: "half / 2".to_string(),
            depends_on: vec!["half".to_string()],
        },
        ComputedSpec {
            name: "eighth".to_string(),
            expr: "quarter / 2".to_string(),
            depends_on: vec!["quarter".to_string()],
        },
    ];

    let mut shuffled = forward.clone();
    shuffled.reverse();
    shuffled.swap(0, 1);

    let a = resolve_computed_parameters(&forward, &initial).unwrap();
    let b = resolve_computed_parameters(&shuffled, &initial).unwrap();
    assert_eq!(a.get("eighth"), b.get("eighth"));
    assert_eq!(a.get("eighth"), Some(&ExprValue::Number(0.25)));
}

#[test]
fn computed_cycles_raise_with_members() {
    let specs = vec![
        ComputedSpec {
            name: "alpha".to_string(),
            expr: "beta + 1".to_string(),
            depends_on: vec!["beta".to_string()],
        },
        ComputedSpec {
            name: "beta".to_string(),
            expr: "gamma + 1".to_string(),
            depends_on: vec!["gamma".to_string()],
        },
        ComputedSpec {
            name: "gamma".to_string(),
            expr: "alpha + 1".to_string(),
            depends_on: vec!["alpha".to_string()],
        },
    ];
    let err = resolve_computed_parameters(&specs, &HashMap::new()).unwrap_err();
    for member in ["alpha", "beta", "gamma"] {
        assert!(err.message.contains(member), "missing {}", member);
    }
}
