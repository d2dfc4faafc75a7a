//! Name checking and tree-walking evaluation.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::Local;

use super::parser::{BinaryOp, Expr, Stmt, Target, TargetStep, UnaryOp};
use super::{CompiledScript, Global, ScriptScope, INPUT};
use crate::context::{Context, Value};
use crate::errors::ScriptError;

/// Helper functions and their accepted argument counts.
const FUNCTIONS: &[(&str, usize, usize)] = &[
    ("len", 1, 1),
    ("lower", 1, 1),
    ("upper", 1, 1),
    ("trim", 1, 1),
    ("contains", 2, 2),
    ("str", 1, 1),
    ("int", 1, 1),
    ("float", 1, 1),
    ("now", 0, 0),
    ("today", 0, 0),
    ("is_null", 1, 1),
    ("coalesce", 1, usize::MAX),
    ("query", 1, 2),
    ("execute", 1, 2),
];

/// A checked program ready to run.
#[derive(Debug)]
pub struct Program {
    statements: Vec<Stmt>,
    /// Declared global name to writability.
    globals: HashMap<String, bool>,
}

impl Program {
    /// Resolves every name in the program against `input`, the declared
    /// globals and the script's own assignments.
    pub fn check(statements: Vec<Stmt>, globals: &[Global]) -> Result<Self, ScriptError> {
        let globals: HashMap<String, bool> = globals
            .iter()
            .map(|g| (g.name.to_lowercase(), g.writable))
            .collect();

        let mut known: HashSet<String> = globals.keys().cloned().collect();
        known.insert(INPUT.to_string());

        let program = Self {
            statements,
            globals,
        };
        program.check_block(&program.statements, &mut known)?;
        Ok(program)
    }

    fn check_block(&self, block: &[Stmt], known: &mut HashSet<String>) -> Result<(), ScriptError> {
        for stmt in block {
            match stmt {
                Stmt::Let(name, value) => {
                    check_expr(value, known)?;
                    if name == INPUT || self.globals.contains_key(name) {
                        return Err(ScriptError::compile(format!(
                            "cannot redeclare '{name}'"
                        )));
                    }
                    known.insert(name.clone());
                }
                Stmt::Assign(target, value) => {
                    check_expr(value, known)?;
                    for step in &target.steps {
                        if let TargetStep::Index(index) = step {
                            check_expr(index, known)?;
                        }
                    }
                    self.check_target(target, known)?;
                }
                Stmt::If(condition, then_block, else_block) => {
                    check_expr(condition, known)?;
                    self.check_block(then_block, known)?;
                    self.check_block(else_block, known)?;
                }
                Stmt::Return(Some(value)) | Stmt::Expr(value) => check_expr(value, known)?,
                Stmt::Return(None) => {}
            }
        }
        Ok(())
    }

    fn check_target(&self, target: &Target, known: &mut HashSet<String>) -> Result<(), ScriptError> {
        let root = &target.root;
        if self.globals.get(root) == Some(&false) {
            return Err(ScriptError::compile(format!("'{root}' is read-only")));
        }
        if !known.contains(root) {
            if !target.steps.is_empty() {
                return Err(ScriptError::compile(format!("unknown variable '{root}'")));
            }
            known.insert(root.clone());
        }
        Ok(())
    }
}

fn check_expr(expr: &Expr, known: &HashSet<String>) -> Result<(), ScriptError> {
    match expr {
        Expr::Literal(_) => Ok(()),
        Expr::Var(name) => {
            if known.contains(name) {
                Ok(())
            } else {
                Err(ScriptError::compile(format!("unknown variable '{name}'")))
            }
        }
        Expr::Member(base, _) | Expr::Unary(_, base) => check_expr(base, known),
        Expr::Index(base, index) => {
            check_expr(base, known)?;
            check_expr(index, known)
        }
        Expr::Binary(_, left, right) => {
            check_expr(left, known)?;
            check_expr(right, known)
        }
        Expr::Call(name, args) => {
            let (_, min, max) = FUNCTIONS
                .iter()
                .find(|(f, _, _)| *f == name.as_str())
                .ok_or_else(|| ScriptError::compile(format!("unknown function '{name}'")))?;
            if args.len() < *min || args.len() > *max {
                return Err(ScriptError::compile(format!(
                    "function '{name}' takes {} argument(s), got {}",
                    if min == max { min.to_string() } else { format!("at least {min}") },
                    args.len()
                )));
            }
            args.iter().try_for_each(|arg| check_expr(arg, known))
        }
    }
}

impl CompiledScript for Program {
    fn invoke(&self, scope: &mut ScriptScope<'_>) -> Result<Value, ScriptError> {
        let mut interpreter = Interpreter {
            program: self,
            scope,
            locals: HashMap::new(),
            last: None,
        };
        match interpreter.run_block(&self.statements)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(interpreter.last.unwrap_or(Value::Bool(false))),
        }
    }
}

enum Flow {
    Next,
    Return(Value),
}

enum Root {
    Name(String),
    Value(Value),
}

struct Interpreter<'p, 's, 'a> {
    program: &'p Program,
    scope: &'s mut ScriptScope<'a>,
    locals: HashMap<String, Value>,
    last: Option<Value>,
}

impl Interpreter<'_, '_, '_> {
    fn run_block(&mut self, block: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in block {
            match stmt {
                Stmt::Let(name, value) => {
                    let value = self.eval(value)?;
                    self.locals.insert(name.clone(), value);
                }
                Stmt::Assign(target, value) => {
                    let value = self.eval(value)?;
                    self.assign(target, value)?;
                }
                Stmt::If(condition, then_block, else_block) => {
                    let branch = if self.eval(condition)?.is_truthy() {
                        then_block
                    } else {
                        else_block
                    };
                    if let Flow::Return(value) = self.run_block(branch)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Stmt::Return(value) => {
                    let value = match value {
                        Some(expr) => self.eval(expr)?,
                        None => Value::Null,
                    };
                    return Ok(Flow::Return(value));
                }
                Stmt::Expr(expr) => {
                    self.last = Some(self.eval(expr)?);
                }
            }
        }
        Ok(Flow::Next)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Var(_) | Expr::Member(..) | Expr::Index(..) => {
                let (root, keys) = self.flatten(expr)?;
                Ok(match root {
                    Root::Name(name) => self.read(&name, &keys),
                    Root::Value(value) => walk(&value, &keys),
                })
            }
            Expr::Unary(UnaryOp::Not, operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
            Expr::Unary(UnaryOp::Neg, operand) => match self.eval(operand)? {
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| ScriptError::runtime("integer overflow")),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ScriptError::runtime(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            Expr::Binary(BinaryOp::And, left, right) => {
                let result = self.eval(left)?.is_truthy() && self.eval(right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                let result = self.eval(left)?.is_truthy() || self.eval(right)?.is_truthy();
                Ok(Value::Bool(result))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, args)
            }
        }
    }

    fn flatten(&mut self, expr: &Expr) -> Result<(Root, Vec<Value>), ScriptError> {
        match expr {
            Expr::Var(name) => Ok((Root::Name(name.clone()), Vec::new())),
            Expr::Member(base, key) => {
                let (root, mut keys) = self.flatten(base)?;
                keys.push(Value::String(key.clone()));
                Ok((root, keys))
            }
            Expr::Index(base, index) => {
                let (root, mut keys) = self.flatten(base)?;
                keys.push(self.eval(index)?);
                Ok((root, keys))
            }
            other => Ok((Root::Value(self.eval(other)?), Vec::new())),
        }
    }

    fn read(&self, root: &str, keys: &[Value]) -> Value {
        if root == INPUT {
            return match keys.split_first() {
                None => Value::Map(self.scope.input.clone()),
                Some((first, rest)) => self
                    .scope
                    .input
                    .get(&key_string(first))
                    .map_or(Value::Null, |value| walk(value, rest)),
            };
        }
        if let Some(value) = self.locals.get(root) {
            return walk(value, keys);
        }
        self.scope
            .globals
            .get(root)
            .map_or(Value::Null, |value| walk(value, keys))
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), ScriptError> {
        let mut keys = Vec::with_capacity(target.steps.len());
        for step in &target.steps {
            keys.push(match step {
                TargetStep::Key(key) => Value::String(key.clone()),
                TargetStep::Index(index) => self.eval(index)?,
            });
        }

        let root = target.root.as_str();
        if root == INPUT {
            if keys.is_empty() {
                return match value {
                    Value::Map(ctx) => {
                        self.scope.input = ctx;
                        Ok(())
                    }
                    other => Err(ScriptError::runtime(format!(
                        "input must be a map, got {}",
                        other.type_name()
                    ))),
                };
            }
            return set_in_context(&mut self.scope.input, &keys, value);
        }

        if self.program.globals.contains_key(root) {
            let mut path = vec![Value::String(root.to_string())];
            path.extend(keys);
            return set_in_context(&mut self.scope.globals, &path, value);
        }

        if keys.is_empty() {
            self.locals.insert(root.to_string(), value);
            return Ok(());
        }
        let slot = self
            .locals
            .get_mut(root)
            .ok_or_else(|| ScriptError::runtime(format!("variable '{root}' is not set")))?;
        set_path(slot, &keys, value)
    }

    fn call(&mut self, name: &str, mut args: Vec<Value>) -> Result<Value, ScriptError> {
        let arg = |args: &[Value], i: usize| args.get(i).cloned().unwrap_or_default();
        let text = |args: &[Value]| arg(args, 0).to_string();

        let value = match name {
            "len" => {
                let len = match &arg(&args, 0) {
                    Value::Null => 0,
                    Value::String(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(ctx) => ctx.len(),
                    Value::Bytes(bytes) => bytes.len(),
                    other => other.to_string().chars().count(),
                };
                Value::Integer(i64::try_from(len).unwrap_or(i64::MAX))
            }
            "lower" => Value::String(text(&args).to_lowercase()),
            "upper" => Value::String(text(&args).to_uppercase()),
            "trim" => Value::String(text(&args).trim().to_string()),
            "str" => Value::String(text(&args)),
            "contains" => {
                let needle = arg(&args, 1);
                let found = match &arg(&args, 0) {
                    Value::List(items) => items.iter().any(|item| equals(item, &needle)),
                    Value::Map(ctx) => ctx.contains_key(&key_string(&needle)),
                    Value::Null => false,
                    haystack => haystack.to_string().contains(&needle.to_string()),
                };
                Value::Bool(found)
            }
            "int" => match arg(&args, 0) {
                Value::Null => Value::Null,
                other => other.as_i64().map(Value::Integer).ok_or_else(|| {
                    ScriptError::runtime(format!("cannot convert '{other}' to integer"))
                })?,
            },
            "float" => match arg(&args, 0) {
                Value::Null => Value::Null,
                other => other.as_f64().map(Value::Float).ok_or_else(|| {
                    ScriptError::runtime(format!("cannot convert '{other}' to float"))
                })?,
            },
            "now" => Value::DateTime(Local::now().naive_local()),
            "today" => Local::now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .map_or(Value::Null, Value::DateTime),
            "is_null" => Value::Bool(arg(&args, 0).is_null()),
            "coalesce" => args.into_iter().find(|v| !v.is_null()).unwrap_or_default(),
            "query" | "execute" => {
                let sql = text(&args);
                let params = match args.get_mut(1).map(std::mem::take) {
                    None => self.scope.input.clone(),
                    Some(Value::Map(ctx)) => ctx,
                    Some(other) => {
                        return Err(ScriptError::runtime(format!(
                            "{name} parameters must be a map, got {}",
                            other.type_name()
                        )))
                    }
                };
                let db_error = |e: crate::errors::DbError| ScriptError::runtime(e.to_string());
                if name == "query" {
                    let rows = self.scope.db.query(&sql, &params).map_err(db_error)?;
                    Value::List(rows.into_iter().map(Value::Map).collect())
                } else {
                    let affected = self.scope.db.execute(&sql, &params).map_err(db_error)?;
                    Value::Integer(i64::try_from(affected).unwrap_or(i64::MAX))
                }
            }
            other => return Err(ScriptError::runtime(format!("unknown function '{other}'"))),
        };
        Ok(value)
    }
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn walk(value: &Value, keys: &[Value]) -> Value {
    let mut current = value;
    for key in keys {
        let next = match current {
            Value::Map(ctx) => ctx.get(&key_string(key)),
            Value::List(items) => key
                .as_i64()
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn set_in_context(ctx: &mut Context, keys: &[Value], value: Value) -> Result<(), ScriptError> {
    let Some((first, rest)) = keys.split_first() else {
        return Err(ScriptError::runtime("empty assignment path"));
    };
    let key = key_string(first);
    if rest.is_empty() {
        ctx.insert(&key, value);
        return Ok(());
    }
    if !ctx.contains_key(&key) {
        ctx.insert(&key, Value::Null);
    }
    let slot = ctx
        .get_mut(&key)
        .ok_or_else(|| ScriptError::runtime(format!("cannot assign '{key}'")))?;
    set_path(slot, rest, value)
}

fn set_path(slot: &mut Value, keys: &[Value], value: Value) -> Result<(), ScriptError> {
    let Some((first, rest)) = keys.split_first() else {
        *slot = value;
        return Ok(());
    };
    if slot.is_null() {
        *slot = Value::Map(Context::new());
    }
    match slot {
        Value::Map(ctx) => set_in_context(ctx, keys, value),
        Value::List(items) => {
            let len = items.len();
            let index = first
                .as_i64()
                .and_then(|i| usize::try_from(i).ok())
                .filter(|i| *i < len)
                .ok_or_else(|| {
                    ScriptError::runtime(format!("index {first} out of range for list of {len}"))
                })?;
            set_path(&mut items[index], rest, value)
        }
        other => Err(ScriptError::runtime(format!(
            "cannot assign a member of {}",
            other.type_name()
        ))),
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    if left.is_number() && right.is_number() {
        return compare(left, right) == Some(Ordering::Equal);
    }
    left == right
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ if left.is_number() && right.is_number() => left.as_f64()?.partial_cmp(&right.as_f64()?),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let overflow = || ScriptError::runtime("integer overflow");
    let mismatch = |verb: &str| {
        ScriptError::runtime(format!(
            "cannot {verb} {} and {}",
            left.type_name(),
            right.type_name()
        ))
    };

    let value = match op {
        BinaryOp::Eq => Value::Bool(equals(left, right)),
        BinaryOp::NotEq => Value::Bool(!equals(left, right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let ordering = compare(left, right).ok_or_else(|| mismatch("compare"))?;
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::LtEq => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::Add => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => {
                Value::Integer(a.checked_add(*b).ok_or_else(overflow)?)
            }
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{left}{right}"))
            }
            (Value::List(a), Value::List(b)) => Value::List(a.iter().chain(b).cloned().collect()),
            _ => float_op(left, right, |a, b| a + b).ok_or_else(|| mismatch("add"))?,
        },
        BinaryOp::Sub => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => {
                Value::Integer(a.checked_sub(*b).ok_or_else(overflow)?)
            }
            _ => float_op(left, right, |a, b| a - b).ok_or_else(|| mismatch("subtract"))?,
        },
        BinaryOp::Mul => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => {
                Value::Integer(a.checked_mul(*b).ok_or_else(overflow)?)
            }
            _ => float_op(left, right, |a, b| a * b).ok_or_else(|| mismatch("multiply"))?,
        },
        BinaryOp::Div | BinaryOp::Rem => {
            if right.is_number() && !right.is_truthy() {
                return Err(ScriptError::runtime("division by zero"));
            }
            match (left, right, op) {
                (Value::Integer(a), Value::Integer(b), BinaryOp::Div) => {
                    Value::Integer(a.checked_div(*b).ok_or_else(overflow)?)
                }
                (Value::Integer(a), Value::Integer(b), _) => {
                    Value::Integer(a.checked_rem(*b).ok_or_else(overflow)?)
                }
                (_, _, BinaryOp::Div) => {
                    float_op(left, right, |a, b| a / b).ok_or_else(|| mismatch("divide"))?
                }
                _ => float_op(left, right, |a, b| a % b).ok_or_else(|| mismatch("divide"))?,
            }
        }
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
    };
    Ok(value)
}

fn float_op(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    if left.is_number() && right.is_number() {
        Some(Value::Float(f(left.as_f64()?, right.as_f64()?)))
    } else {
        None
    }
}
