//! Evaluation of parsed command blocks
//!
//! Each block gets a fresh [`Scope`]. The only name available up front is
//! the tool handle, and it can only be used to call `execute`.

use super::{BinaryOp, Expr, Invocation, Script, Stmt, UnaryOp};
use crate::error::{ExecutorError, ScriptError};
use crate::tools::{Tool, ToolArgs};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::debug;

/// Bindings for one block plus the pre-bound tool handle
pub struct Scope<'t> {
    handle_name: &'t str,
    handle: &'t dyn Tool,
    bindings: HashMap<String, Value>,
}

impl<'t> Scope<'t> {
    pub fn new(handle_name: &'t str, handle: &'t dyn Tool) -> Self {
        Self {
            handle_name,
            handle,
            bindings: HashMap::new(),
        }
    }

    /// Value bound to `name`, if any
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Run every statement of `script` in order
    pub async fn run(&mut self, script: &Script) -> Result<(), ExecutorError> {
        for stmt in &script.statements {
            match stmt {
                Stmt::Assign { target, value, .. } => {
                    self.check_target(target)?;
                    let value = self.eval(value)?;
                    self.bindings.insert(target.clone(), value);
                }
                Stmt::Invoke(invocation) => {
                    self.check_target(&invocation.target)?;
                    let value = self.invoke(invocation).await?;
                    self.bindings.insert(invocation.target.clone(), value);
                }
            }
        }
        Ok(())
    }

    fn check_target(&self, target: &str) -> Result<(), ScriptError> {
        if target == self.handle_name {
            return Err(ScriptError::Evaluation(format!(
                "cannot rebind the tool handle '{}'",
                target
            )));
        }
        Ok(())
    }

    async fn invoke(&self, invocation: &Invocation) -> Result<Value, ExecutorError> {
        if invocation.object != self.handle_name {
            let err = if self.bindings.contains_key(&invocation.object) {
                ScriptError::NotInvocable(invocation.object.clone())
            } else {
                ScriptError::UnboundName(invocation.object.clone())
            };
            return Err(err.into());
        }

        let mut args = ToolArgs::new();
        for (name, expr) in &invocation.kwargs {
            args.insert(name.clone(), self.eval(expr)?);
        }
        self.handle.definition().validate_args(&args)?;

        debug!(
            "Invoking {} (line {}) with arguments {:?}",
            self.handle.definition().name,
            invocation.line,
            args.keys().collect::<Vec<_>>()
        );
        Ok(self.handle.execute(args).await?)
    }

    fn lookup(&self, name: &str) -> Result<&Value, ScriptError> {
        if name == self.handle_name {
            return Err(ScriptError::Evaluation(format!(
                "the tool handle '{}' can only be used to call execute",
                name
            )));
        }
        self.bindings
            .get(name)
            .ok_or_else(|| ScriptError::UnboundName(name.to_string()))
    }

    fn eval(&self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup(name).cloned(),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Dict(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::String(s) => s,
                        other => {
                            return Err(ScriptError::Evaluation(format!(
                                "dictionary keys must be strings, got {}",
                                type_name(&other)
                            )))
                        }
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Unary(op, operand) => unary(*op, self.eval(operand)?),
            Expr::Binary(op, left, right) => binary(*op, self.eval(left)?, self.eval(right)?),
            Expr::Index(container, index) => subscript(self.eval(container)?, self.eval(index)?),
        }
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(Num::Int)
                .or_else(|| n.as_f64().map(Num::Float)),
            _ => None,
        }
    }

    fn as_f64(&self) -> f64 {
        match *self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn float(f: f64) -> Result<Value, ScriptError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ScriptError::Evaluation("result is not a finite number".to_string()))
}

fn overflow() -> ScriptError {
    ScriptError::Evaluation("integer overflow".to_string())
}

fn unsupported(op: &str, left: &Value, right: &Value) -> ScriptError {
    ScriptError::Evaluation(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op,
        type_name(left),
        type_name(right)
    ))
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, ScriptError> {
    let sign = match op {
        UnaryOp::Neg => "-",
        UnaryOp::Pos => "+",
    };
    match (op, Num::of(&value)) {
        (UnaryOp::Pos, Some(_)) => Ok(value),
        (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Value::from).ok_or_else(overflow),
        (UnaryOp::Neg, Some(Num::Float(f))) => float(-f),
        (_, None) => Err(ScriptError::Evaluation(format!(
            "bad operand type for unary {}: '{}'",
            sign,
            type_name(&value)
        ))),
    }
}

/// Largest string (in bytes) or list a single operation may build
const MAX_SEQUENCE_LEN: usize = 10_000_000;

fn sequence_len(len: Option<usize>) -> Result<usize, ScriptError> {
    len.filter(|&len| len <= MAX_SEQUENCE_LEN)
        .ok_or_else(|| ScriptError::Evaluation("repetition result too large".to_string()))
}

/// Validated repeat count for a sequence of `len` elements
fn repeat_count(len: usize, n: &Number) -> Result<usize, ScriptError> {
    let count = n.as_i64().ok_or_else(|| {
        ScriptError::Evaluation("can't multiply sequence by non-int".to_string())
    })?;
    if len == 0 {
        return Ok(0);
    }
    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    sequence_len(len.checked_mul(count))?;
    Ok(count)
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ScriptError> {
    if let (Some(a), Some(b)) = (Num::of(&left), Num::of(&right)) {
        return arithmetic(op, a, b);
    }

    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => {
            sequence_len(a.len().checked_add(b.len()))?;
            Ok(Value::String(a + &b))
        }
        (BinaryOp::Add, Value::Array(mut a), Value::Array(b)) => {
            sequence_len(a.len().checked_add(b.len()))?;
            a.extend(b);
            Ok(Value::Array(a))
        }
        (BinaryOp::Mul, Value::String(s), Value::Number(n))
        | (BinaryOp::Mul, Value::Number(n), Value::String(s)) => {
            let count = repeat_count(s.len(), &n)?;
            Ok(Value::String(s.repeat(count)))
        }
        (BinaryOp::Mul, Value::Array(items), Value::Number(n))
        | (BinaryOp::Mul, Value::Number(n), Value::Array(items)) => {
            let count = repeat_count(items.len(), &n)?;
            Ok(Value::Array(
                std::iter::repeat(items).take(count).flatten().collect(),
            ))
        }
        (op, left, right) => {
            let symbol = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
            };
            Err(unsupported(symbol, &left, &right))
        }
    }
}

fn arithmetic(op: BinaryOp, a: Num, b: Num) -> Result<Value, ScriptError> {
    match (op, a, b) {
        (BinaryOp::Div, a, b) => {
            let divisor = b.as_f64();
            if divisor == 0.0 {
                return Err(ScriptError::Evaluation("division by zero".to_string()));
            }
            float(a.as_f64() / divisor)
        }
        (op, Num::Int(a), Num::Int(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                _ => a.checked_mul(b),
            };
            result.map(Value::from).ok_or_else(overflow)
        }
        (op, a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => a * b,
            })
        }
    }
}

fn subscript(container: Value, index: Value) -> Result<Value, ScriptError> {
    match (container, index) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n.as_i64().ok_or_else(|| {
                ScriptError::Evaluation("list indices must be integers".to_string())
            })?;
            let len = items.len() as i64;
            let position = if i < 0 { len + i } else { i };
            if position < 0 || position >= len {
                return Err(ScriptError::Evaluation("list index out of range".to_string()));
            }
            Ok(items[position as usize].clone())
        }
        (Value::String(s), Value::Number(n)) => {
            let i = n.as_i64().ok_or_else(|| {
                ScriptError::Evaluation("string indices must be integers".to_string())
            })?;
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let position = if i < 0 { len + i } else { i };
            if position < 0 || position >= len {
                return Err(ScriptError::Evaluation("string index out of range".to_string()));
            }
            Ok(Value::String(chars[position as usize].to_string()))
        }
        (Value::Object(map), Value::String(key)) => map
            .get(&key)
            .cloned()
            .ok_or_else(|| ScriptError::Evaluation(format!("key not found: '{}'", key))),
        (container, index) => Err(ScriptError::Evaluation(format!(
            "'{}' object is not subscriptable with '{}'",
            type_name(&container),
            type_name(&index)
        ))),
    }
}
