use std::collections::HashMap;

use crate::errors::{ExprError, ExprErrorKind};

use super::env::Environment;
use super::functions::register_builtins;
use super::parser::{parse, BinaryOp, Expr, UnaryOp};
use super::value::Value;

pub type BuiltinFn =
    Box<dyn Fn(&Environment, &[Value]) -> Result<Value, ExprError> + Send + Sync>;

/// Tree-walking evaluator with an extensible function table.
///
/// The table ships with the string/response helpers templates rely on
/// (`contains`, `status()`, `header(name)`, …); callers can register
/// additional functions before handing the evaluator to the engine.
pub struct Evaluator {
    functions: HashMap<String, BuiltinFn>,
}

impl Evaluator {
    pub fn new() -> Self {
        let mut evaluator = Self {
            functions: HashMap::new(),
        };
        register_builtins(&mut evaluator);
        evaluator
    }

    pub fn register(&mut self, name: impl Into<String>, function: BuiltinFn) {
        self.functions.insert(name.into(), function);
    }

    pub fn eval(&self, input: &str, env: &Environment) -> Result<Value, ExprError> {
        let ast = parse(input)?;
        self.eval_node(&ast, env)
    }

    fn eval_node(&self, expr: &Expr, env: &Environment) -> Result<Value, ExprError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident { name, pos } => env.get(name).cloned().ok_or_else(|| {
                ExprError::new(
                    *pos,
                    ExprErrorKind::UndefinedName,
                    format!("no such variable '{name}'"),
                )
            }),
            Expr::Unary { op, operand, pos } => {
                let value = self.eval_node(operand, env)?;
                match (op, value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Not, other) => Err(type_err(*pos, "!", &other)),
                    (UnaryOp::Neg, other) => Err(type_err(*pos, "unary -", &other)),
                }
            }
            Expr::Binary { op, lhs, rhs, pos } => self.eval_binary(*op, lhs, rhs, *pos, env),
            Expr::Ternary {
                cond,
                then,
                otherwise,
                pos,
            } => match self.eval_node(cond, env)? {
                Value::Bool(true) => self.eval_node(then, env),
                Value::Bool(false) => self.eval_node(otherwise, env),
                other => Err(type_err(*pos, "?:", &other)),
            },
            Expr::Index { object, index, pos } => {
                let object = self.eval_node(object, env)?;
                let index = self.eval_node(index, env)?;
                match (&object, &index) {
                    (Value::Map(entries), Value::Str(key)) => {
                        entries.get(key).cloned().ok_or_else(|| {
                            ExprError::new(
                                *pos,
                                ExprErrorKind::UndefinedName,
                                format!("no such key '{key}'"),
                            )
                        })
                    }
                    (Value::List(items), Value::Int(n)) => {
                        let idx = usize::try_from(*n).ok().filter(|i| *i < items.len());
                        idx.map(|i| items[i].clone()).ok_or_else(|| {
                            ExprError::new(
                                *pos,
                                ExprErrorKind::UndefinedName,
                                format!("index {n} out of bounds (len {})", items.len()),
                            )
                        })
                    }
                    _ => Err(ExprError::new(
                        *pos,
                        ExprErrorKind::TypeMismatch,
                        format!(
                            "cannot index {} with {}",
                            object.type_name(),
                            index.type_name()
                        ),
                    )),
                }
            }
            Expr::Member { object, field, pos } => {
                let object = self.eval_node(object, env)?;
                match &object {
                    Value::Map(entries) => entries.get(field).cloned().ok_or_else(|| {
                        ExprError::new(
                            *pos,
                            ExprErrorKind::UndefinedName,
                            format!("no such field '{field}'"),
                        )
                    }),
                    other => Err(ExprError::new(
                        *pos,
                        ExprErrorKind::TypeMismatch,
                        format!("cannot access field '{field}' on {}", other.type_name()),
                    )),
                }
            }
            Expr::Call { name, args, pos } => {
                let function = self.functions.get(name).ok_or_else(|| {
                    ExprError::new(
                        *pos,
                        ExprErrorKind::UndefinedName,
                        format!("no such function '{name}'"),
                    )
                })?;
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval_node(arg, env)?);
                }
                function(env, &evaluated).map_err(|mut err| {
                    err.position = *pos;
                    err
                })
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: usize,
        env: &Environment,
    ) -> Result<Value, ExprError> {
        // Logical operators short-circuit, so evaluate lazily.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let left = match self.eval_node(lhs, env)? {
                Value::Bool(b) => b,
                other => return Err(type_err(pos, "logical operator", &other)),
            };
            if op == BinaryOp::And && !left {
                return Ok(Value::Bool(false));
            }
            if op == BinaryOp::Or && left {
                return Ok(Value::Bool(true));
            }
            return match self.eval_node(rhs, env)? {
                Value::Bool(b) => Ok(Value::Bool(b)),
                other => Err(type_err(pos, "logical operator", &other)),
            };
        }

        let left = self.eval_node(lhs, env)?;
        let right = self.eval_node(rhs, env)?;

        match op {
            BinaryOp::Add => add(pos, left, right),
            BinaryOp::Sub => arithmetic(pos, "-", left, right, |a, b| a.checked_sub(b), |a, b| a - b),
            BinaryOp::Mul => arithmetic(pos, "*", left, right, |a, b| a.checked_mul(b), |a, b| a * b),
            BinaryOp::Div => divide(pos, left, right),
            BinaryOp::Rem => remainder(pos, left, right),
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
            BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                compare(pos, op, left, right)
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn type_err(pos: usize, what: &str, value: &Value) -> ExprError {
    ExprError::new(
        pos,
        ExprErrorKind::TypeMismatch,
        format!("{what} is not defined for {}", value.type_name()),
    )
}

fn add(pos: usize, left: Value, right: Value) -> Result<Value, ExprError> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or_else(|| {
            ExprError::new(pos, ExprErrorKind::TypeMismatch, "integer overflow in '+'")
        }),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
        (a, b) => Err(ExprError::new(
            pos,
            ExprErrorKind::TypeMismatch,
            format!("'+' is not defined for {} and {}", a.type_name(), b.type_name()),
        )),
    }
}

fn arithmetic(
    pos: usize,
    what: &str,
    left: Value,
    right: Value,
    int_op: impl Fn(i64, i64) -> Option<i64>,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, ExprError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(a, b).map(Value::Int).ok_or_else(|| {
            ExprError::new(
                pos,
                ExprErrorKind::TypeMismatch,
                format!("integer overflow in '{what}'"),
            )
        }),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(a, b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(a as f64, b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(a, b as f64))),
        (a, b) => Err(ExprError::new(
            pos,
            ExprErrorKind::TypeMismatch,
            format!(
                "'{what}' is not defined for {} and {}",
                a.type_name(),
                b.type_name()
            ),
        )),
    }
}

fn divide(pos: usize, left: Value, right: Value) -> Result<Value, ExprError> {
    let zero = matches!(right, Value::Int(0)) || matches!(right, Value::Float(f) if f == 0.0);
    if zero {
        return Err(ExprError::new(
            pos,
            ExprErrorKind::DivisionByZero,
            "division by zero",
        ));
    }
    arithmetic(pos, "/", left, right, |a, b| a.checked_div(b), |a, b| a / b)
}

fn remainder(pos: usize, left: Value, right: Value) -> Result<Value, ExprError> {
    let zero = matches!(right, Value::Int(0)) || matches!(right, Value::Float(f) if f == 0.0);
    if zero {
        return Err(ExprError::new(
            pos,
            ExprErrorKind::DivisionByZero,
            "division by zero",
        ));
    }
    arithmetic(pos, "%", left, right, |a, b| a.checked_rem(b), |a, b| a % b)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        (a, b) => a == b,
    }
}

fn compare(pos: usize, op: BinaryOp, left: Value, right: Value) -> Result<Value, ExprError> {
    let ordering = match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let ordering = ordering.ok_or_else(|| {
        ExprError::new(
            pos,
            ExprErrorKind::TypeMismatch,
            format!(
                "cannot compare {} and {}",
                left.type_name(),
                right.type_name()
            ),
        )
    })?;
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}
