//! # Primitive Operators
//!
//! Implements `PRIM op`: the unary and binary primitives named in §4.3 of
//! the design doc. Binary operators read the accumulator as the left-hand
//! side and the popped stack top as the right-hand side (`ACC op stack`),
//! then leave the result in ACC.
//!
//! Arithmetic (`+ - * /`) and ordering (`< <= > >=`) require both operands
//! to be `Int`; `and`/`or` require both operands to be `Bool`; `=`/`<>` are
//! polymorphic via [`Value::values_equal`]. Division truncates toward zero,
//! which is exactly what Rust's `/` on `i64` already does.

use super::Vm;
use crate::error::VmError;
use crate::program::PrimOp;
use crate::value::Value;

pub(super) fn handle_prim(vm: &mut Vm, op: PrimOp) -> Result<(), VmError> {
    match op {
        PrimOp::Not => {
            let b = vm.acc.as_bool()?;
            vm.acc = Value::Bool(!b);
        }
        PrimOp::Print => {
            println!("{}", vm.acc.display());
        }
        PrimOp::Add => binary_int(vm, |a, b| Ok(a + b))?,
        PrimOp::Sub => binary_int(vm, |a, b| Ok(a - b))?,
        PrimOp::Mul => binary_int(vm, |a, b| Ok(a * b))?,
        PrimOp::Div => binary_int(vm, |a, b| {
            if b == 0 {
                Err(VmError::TypeMismatch("division by zero".to_string()))
            } else {
                Ok(a / b)
            }
        })?,
        PrimOp::And => binary_bool(vm, |a, b| a && b)?,
        PrimOp::Or => binary_bool(vm, |a, b| a || b)?,
        PrimOp::Eq => {
            let rhs = vm.stack.pop_one()?;
            vm.acc = Value::Bool(vm.acc.values_equal(&rhs));
        }
        PrimOp::Ne => {
            let rhs = vm.stack.pop_one()?;
            vm.acc = Value::Bool(!vm.acc.values_equal(&rhs));
        }
        PrimOp::Lt => compare_int(vm, |a, b| a < b)?,
        PrimOp::Le => compare_int(vm, |a, b| a <= b)?,
        PrimOp::Gt => compare_int(vm, |a, b| a > b)?,
        PrimOp::Ge => compare_int(vm, |a, b| a >= b)?,
    }
    Ok(())
}

fn binary_int(vm: &mut Vm, f: impl Fn(i64, i64) -> Result<i64, VmError>) -> Result<(), VmError> {
    let rhs = vm.stack.pop_one()?.as_int()?;
    let lhs = vm.acc.as_int()?;
    vm.acc = Value::Int(f(lhs, rhs)?);
    Ok(())
}

fn compare_int(vm: &mut Vm, f: impl Fn(i64, i64) -> bool) -> Result<(), VmError> {
    let rhs = vm.stack.pop_one()?.as_int()?;
    let lhs = vm.acc.as_int()?;
    vm.acc = Value::Bool(f(lhs, rhs));
    Ok(())
}

fn binary_bool(vm: &mut Vm, f: impl Fn(bool, bool) -> bool) -> Result<(), VmError> {
    let rhs = vm.stack.pop_one()?.as_bool()?;
    let lhs = vm.acc.as_bool()?;
    vm.acc = Value::Bool(f(lhs, rhs));
    Ok(())
}
