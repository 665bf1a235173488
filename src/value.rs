//! # Value Representation for the ZAM Virtual Machine
//!
//! This module defines [`Value`], the tagged runtime type that flows
//! through the accumulator, the operand stack, and every closure
//! environment.
//!
//! ## Variants
//! - `Int(i64)` — signed 64-bit integer; the only operand type arithmetic
//!   and ordering operators accept.
//! - `Bool(bool)` — the two canonical truth values; `BRANCHIFNOT` tests
//!   against canonical `false`.
//! - `Unit` — the single canonical "no value" result (e.g. of `SETVECTITEM`
//!   and `ASSIGN`).
//! - `Block(Rc<RefCell<Vec<Value>>>)` — a mutable, shared, 0-indexed
//!   sequence of values; the target of `GETFIELD`/`SETFIELD`/`MAKEBLOCK`.
//! - `Closure(usize, Rc<Vec<Value>>)` — a code pointer into the program
//!   plus a captured, immutable environment.
//!
//! ## Equality and ordering
//! `=`/`<>` are polymorphic: `Int`/`Bool`/`Unit` compare structurally;
//! `Block`/`Closure` compare by reference identity, so two blocks built
//! separately are never equal even with identical cell contents (§5 of the
//! design doc). `<`/`<=`/`>`/`>=` require both operands to be `Int`.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::error::VmError;

/// Tagged value type for the VM accumulator, operand stack, and environments.
#[derive(Clone)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// Boolean truth value.
    Bool(bool),
    /// The single canonical unit value.
    Unit,
    /// Mutable, reference-counted, 0-indexed sequence of values.
    Block(Rc<RefCell<Vec<Value>>>),
    /// Code pointer plus captured environment.
    Closure(usize, Rc<Vec<Value>>),
}

impl Value {
    /// Build a fresh heap block from the given cells.
    pub fn block(cells: Vec<Value>) -> Value {
        Value::Block(Rc::new(RefCell::new(cells)))
    }

    /// Require an `Int`, failing with [`VmError::TypeMismatch`] otherwise.
    pub fn as_int(&self) -> Result<i64, VmError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(VmError::TypeMismatch(format!(
                "expected Int, found {}",
                other.type_name()
            ))),
        }
    }

    /// Require a `Bool`, failing with [`VmError::TypeMismatch`] otherwise.
    pub fn as_bool(&self) -> Result<bool, VmError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(VmError::TypeMismatch(format!(
                "expected Bool, found {}",
                other.type_name()
            ))),
        }
    }

    /// Require a `Block`, failing with [`VmError::TypeMismatch`] otherwise.
    pub fn as_block(&self) -> Result<&Rc<RefCell<Vec<Value>>>, VmError> {
        match self {
            Value::Block(cells) => Ok(cells),
            other => Err(VmError::TypeMismatch(format!(
                "expected Block, found {}",
                other.type_name()
            ))),
        }
    }

    /// Require a `Closure`, failing with [`VmError::TypeMismatch`] otherwise.
    pub fn as_closure(&self) -> Result<(usize, &Rc<Vec<Value>>), VmError> {
        match self {
            Value::Closure(pc, env) => Ok((*pc, env)),
            other => Err(VmError::TypeMismatch(format!(
                "expected Closure, found {}",
                other.type_name()
            ))),
        }
    }

    /// The test `BRANCHIFNOT` branches on. True for the canonical `false`
    /// singleton and, matching the ZAM convention this machine follows (a
    /// real ZINC/OCaml bytecode interpreter represents booleans as the
    /// small integers 0/1 at this layer), for `Int(0)` as well — so a
    /// conditional fed straight from `CONST 0` branches the same way one
    /// fed from a `PRIM` comparison does.
    pub fn is_falsy(&self) -> bool {
        matches!(self, Value::Bool(false) | Value::Int(0))
    }

    /// A short tag name, used in type-mismatch messages.
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Bool(_) => "Bool",
            Value::Unit => "Unit",
            Value::Block(_) => "Block",
            Value::Closure(..) => "Closure",
        }
    }

    /// Polymorphic equality: structural on `Int`/`Bool`/`Unit`, reference
    /// identity on `Block`/`Closure` (§9 of the design doc).
    pub fn values_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Unit, Value::Unit) => true,
            (Value::Block(a), Value::Block(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(pa, ea), Value::Closure(pb, eb)) => pa == pb && Rc::ptr_eq(ea, eb),
            _ => false,
        }
    }

    /// Human-readable rendering, used by `PRIM print` and error messages.
    /// Block cycles (possible via `SETFIELD`/`SETVECTITEM` aliasing) render
    /// as `[...]` rather than recursing forever.
    pub fn display(&self) -> String {
        fn helper(val: &Value, seen: &mut HashSet<usize>) -> String {
            match val {
                Value::Int(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Unit => "()".to_string(),
                Value::Block(cells) => {
                    let ptr = Rc::as_ptr(cells) as usize;
                    if !seen.insert(ptr) {
                        return "[...]".to_string();
                    }
                    let inner: Vec<String> =
                        cells.borrow().iter().map(|v| helper(v, seen)).collect();
                    format!("[{}]", inner.join(", "))
                }
                Value::Closure(pc, _) => format!("<closure@{}>", pc),
            }
        }

        let mut seen = HashSet::new();
        helper(self, &mut seen)
    }
}
