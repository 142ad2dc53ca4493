//! Expression engine for `$CALCULATE(...)` step parameters, step
//! `condition` guards, and `computed` workflow parameters.
//!
//! The language is a small, side-effect-free expression grammar: float
//! arithmetic (`+ - * / // % **`), chained comparisons, short-circuit
//! `and`/`or`/`not`, the ternary `x if c else y`, string literals for
//! equality tests, and a whitelist of 21 math functions. No attribute
//! access, subscription, imports, assignment, comprehensions, or lambdas.

mod computed;
mod lexer;
mod parser;

pub use computed::{resolve_computed_parameters, ComputedSpec};
pub use parser::{parse, Expr};

use crate::core::error::AppError;
use parser::{BinaryOp, BoolOp, CompareOp, UnaryOp};
use regex::Regex;
use serde_json::{Map, Number, Value};
use signalbox_types::ErrorCategory;
use std::collections::HashMap;
use std::sync::OnceLock;

static CALCULATE_RE: OnceLock<Regex> = OnceLock::new();
static VAR_RE: OnceLock<Regex> = OnceLock::new();

/// If `text` is a `$CALCULATE(expr)` form, return the inner expression.
pub fn calculate_expression(text: &str) -> Option<&str> {
    let re = CALCULATE_RE
        .get_or_init(|| Regex::new(r"^\$CALCULATE\((.+)\)$").expect("static regex"));
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// If `text` is a `$var` reference, return the variable name.
pub fn variable_reference(text: &str) -> Option<&str> {
    let re = VAR_RE
        .get_or_init(|| Regex::new(r"^\$([A-Za-z_][A-Za-z0-9_]*)$").expect("static regex"));
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Runtime value of an expression: a float or a string.
///
/// Booleans are stored as `1.0` / `0.0`; strings participate only in
/// equality comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Number(f64),
    Str(String),
}

impl ExprValue {
    pub const TRUE: ExprValue = ExprValue::Number(1.0);
    pub const FALSE: ExprValue = ExprValue::Number(0.0);

    pub fn from_bool(flag: bool) -> ExprValue {
        if flag {
            ExprValue::TRUE
        } else {
            ExprValue::FALSE
        }
    }

    /// Convert a JSON scalar into an expression value. Arrays, objects and
    /// null have no expression representation.
    pub fn from_json(value: &Value) -> Option<ExprValue> {
        match value {
            Value::Bool(b) => Some(ExprValue::from_bool(*b)),
            Value::Number(n) => n.as_f64().map(ExprValue::Number),
            Value::String(s) => Some(ExprValue::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExprValue::Number(n) => Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ExprValue::Str(s) => Value::String(s.clone()),
        }
    }

    pub fn as_number(&self) -> Result<f64, AppError> {
        match self {
            ExprValue::Number(n) => Ok(*n),
            ExprValue::Str(s) => Err(type_error(format!(
                "expected a number, found string '{}'",
                s
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, AppError> {
        match self {
            ExprValue::Number(n) => Ok(*n != 0.0),
            ExprValue::Str(_) => Err(type_error(
                "strings have no boolean value in expressions".to_string(),
            )),
        }
    }
}

fn type_error(message: String) -> AppError {
    AppError::new(ErrorCategory::ExpressionError, message).with_code("RTR-EXPR-003")
}

fn unknown_variable(name: &str) -> AppError {
    AppError::new(
        ErrorCategory::ExpressionError,
        format!("unknown variable '{}'", name),
    )
    .with_code("RTR-EXPR-002")
}

/// Expression evaluator with a variable context.
#[derive(Debug, Default, Clone)]
pub struct ExpressionEngine {
    context: HashMap<String, ExprValue>,
}

impl ExpressionEngine {
    pub fn new() -> Self {
        ExpressionEngine::default()
    }

    /// Replace the variable context.
    pub fn set_context(&mut self, vars: HashMap<String, ExprValue>) {
        self.context = vars;
    }

    /// Merge variables into the existing context, later values winning.
    pub fn update_context(&mut self, vars: HashMap<String, ExprValue>) {
        self.context.extend(vars);
    }

    /// Merge JSON scalars into the context; non-scalar values are skipped.
    pub fn update_context_json(&mut self, vars: &Map<String, Value>) {
        for (name, value) in vars {
            if let Some(converted) = ExprValue::from_json(value) {
                self.context.insert(name.clone(), converted);
            }
        }
    }

    pub fn set_variable<T: Into<String>>(&mut self, name: T, value: ExprValue) {
        self.context.insert(name.into(), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<&ExprValue> {
        self.context.get(name)
    }

    /// Parse the expression without evaluating it.
    pub fn compile(&self, expr: &str) -> Result<Expr, AppError> {
        parser::parse(expr)
    }

    pub fn evaluate(&self, expr: &str) -> Result<ExprValue, AppError> {
        let ast = parser::parse(expr)?;
        self.evaluate_ast(&ast)
    }

    /// Evaluate, substituting `default` for any failure.
    pub fn evaluate_safe(&self, expr: &str, default: ExprValue) -> ExprValue {
        self.evaluate(expr).unwrap_or(default)
    }

    pub fn evaluate_as_bool(&self, expr: &str) -> Result<bool, AppError> {
        self.evaluate(expr)?.as_bool()
    }

    pub fn evaluate_as_float(&self, expr: &str) -> Result<f64, AppError> {
        self.evaluate(expr)?.as_number()
    }

    pub fn evaluate_ast(&self, expr: &Expr) -> Result<ExprValue, AppError> {
        match expr {
            Expr::Number(n) => Ok(ExprValue::Number(*n)),
            Expr::Str(s) => Ok(ExprValue::Str(s.clone())),
            Expr::Bool(b) => Ok(ExprValue::from_bool(*b)),
            Expr::Var(name) => self
                .context
                .get(name)
                .cloned()
                .ok_or_else(|| unknown_variable(name)),
            Expr::Unary { op, operand } => {
                let value = self.evaluate_ast(operand)?;
                match op {
                    UnaryOp::Plus => Ok(ExprValue::Number(value.as_number()?)),
                    UnaryOp::Minus => Ok(ExprValue::Number(-value.as_number()?)),
                    UnaryOp::Not => Ok(ExprValue::from_bool(!value.as_bool()?)),
                }
            }
            Expr::Binary { op, left, right } => {
                let a = self.evaluate_ast(left)?.as_number()?;
                let b = self.evaluate_ast(right)?.as_number()?;
                let result = apply_binary(*op, a, b)?;
                Ok(ExprValue::Number(result))
            }
            Expr::Compare { first, rest } => {
                let mut left = self.evaluate_ast(first)?;
                for (op, right_expr) in rest {
                    let right = self.evaluate_ast(right_expr)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(ExprValue::FALSE);
                    }
                    left = right;
                }
                Ok(ExprValue::TRUE)
            }
            Expr::BoolChain { op, left, right } => {
                let left_truth = self.evaluate_ast(left)?.as_bool()?;
                match op {
                    BoolOp::And => {
                        if !left_truth {
                            return Ok(ExprValue::FALSE);
                        }
                        Ok(ExprValue::from_bool(self.evaluate_ast(right)?.as_bool()?))
                    }
                    BoolOp::Or => {
                        if left_truth {
                            return Ok(ExprValue::TRUE);
                        }
                        Ok(ExprValue::from_bool(self.evaluate_ast(right)?.as_bool()?))
                    }
                }
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                if self.evaluate_ast(condition)?.as_bool()? {
                    self.evaluate_ast(then)
                } else {
                    self.evaluate_ast(otherwise)
                }
            }
            Expr::Call { function, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate_ast(arg)?.as_number()?);
                }
                call_function(function, &values).map(ExprValue::Number)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, a: f64, b: f64) -> Result<f64, AppError> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(type_error("division by zero".to_string()));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(type_error("division by zero".to_string()));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(type_error("modulo by zero".to_string()));
            }
            // sign follows the divisor
            a - b * (a / b).floor()
        }
        BinaryOp::Pow => a.powf(b),
    };
    Ok(result)
}

fn compare(op: CompareOp, left: &ExprValue, right: &ExprValue) -> Result<bool, AppError> {
    match (left, right) {
        (ExprValue::Number(a), ExprValue::Number(b)) => Ok(match op {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
        }),
        (ExprValue::Str(a), ExprValue::Str(b)) => match op {
            CompareOp::Eq => Ok(a == b),
            CompareOp::Ne => Ok(a != b),
            _ => Err(type_error(
                "strings support only == and != comparisons".to_string(),
            )),
        },
        // Mixed types are never equal, and never ordered.
        _ => match op {
            CompareOp::Eq => Ok(false),
            CompareOp::Ne => Ok(true),
            _ => Err(type_error(
                "cannot order a string against a number".to_string(),
            )),
        },
    }
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, AppError> {
    let arity_error = |expected: &str| {
        AppError::new(
            ErrorCategory::ExpressionError,
            format!(
                "{}() expects {} argument(s), got {}",
                name,
                expected,
                args.len()
            ),
        )
        .with_code("RTR-EXPR-004")
    };

    let one = || -> Result<f64, AppError> {
        match args {
            [x] => Ok(*x),
            _ => Err(arity_error("1")),
        }
    };
    let two = || -> Result<(f64, f64), AppError> {
        match args {
            [x, y] => Ok((*x, *y)),
            _ => Err(arity_error("2")),
        }
    };

    let result = match name {
        "abs" => one()?.abs(),
        "min" => {
            if args.is_empty() {
                return Err(arity_error("at least 1"));
            }
            args.iter().copied().fold(f64::INFINITY, f64::min)
        }
        "max" => {
            if args.is_empty() {
                return Err(arity_error("at least 1"));
            }
            args.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        }
        "round" => match args {
            [x] => x.round(),
            [x, digits] => {
                let factor = 10f64.powi(*digits as i32);
                (x * factor).round() / factor
            }
            _ => return Err(arity_error("1 or 2")),
        },
        "floor" => one()?.floor(),
        "ceil" => one()?.ceil(),
        "sqrt" => one()?.sqrt(),
        "trunc" => one()?.trunc(),
        "sin" => one()?.sin(),
        "cos" => one()?.cos(),
        "tan" => one()?.tan(),
        "asin" => one()?.asin(),
        "acos" => one()?.acos(),
        "atan" => one()?.atan(),
        "atan2" => {
            let (y, x) = two()?;
            y.atan2(x)
        }
        "degrees" => one()?.to_degrees(),
        "radians" => one()?.to_radians(),
        "log" => match args {
            [x] => x.ln(),
            [x, base] => x.log(*base),
            _ => return Err(arity_error("1 or 2")),
        },
        "log10" => one()?.log10(),
        "exp" => one()?.exp(),
        "pow" => {
            let (x, y) = two()?;
            x.powf(y)
        }
        "hypot" => {
            let (x, y) = two()?;
            x.hypot(y)
        }
        _ => {
            return Err(AppError::new(
                ErrorCategory::ExpressionError,
                format!("unknown or disallowed function '{}'", name),
            )
            .with_code("RTR-EXPR-004"))
        }
    };

    if result.is_nan() {
        return Err(type_error(format!("math domain error in {}()", name)));
    }
    Ok(result)
}
