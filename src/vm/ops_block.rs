//! # Block Opcodes
//!
//! `MAKEBLOCK`, `GETFIELD`, `SETFIELD`, `VECTLENGTH`, `GETVECTITEM`, and
//! `SETVECTITEM` — allocation, indexed read, and indexed (in-place,
//! alias-visible) write over the VM's one heap type.

use super::Vm;
use crate::error::VmError;
use crate::value::Value;

pub(super) fn handle_makeblock(vm: &mut Vm, n: usize) -> Result<(), VmError> {
    if n == 0 {
        vm.acc = Value::block(Vec::new());
        return Ok(());
    }
    let rest = vm.stack.pop_n(n - 1);
    let mut cells = Vec::with_capacity(n);
    cells.push(vm.acc.clone());
    cells.extend(rest);
    vm.acc = Value::block(cells);
    Ok(())
}

pub(super) fn handle_getfield(vm: &mut Vm, n: usize) -> Result<(), VmError> {
    let block = vm.acc.as_block()?;
    let v = block
        .borrow()
        .get(n)
        .cloned()
        .ok_or_else(|| VmError::OutOfRange(format!("GETFIELD {} out of bounds", n)))?;
    vm.acc = v;
    Ok(())
}

pub(super) fn handle_setfield(vm: &mut Vm, n: usize) -> Result<(), VmError> {
    let v = vm.stack.pop_one()?;
    let block = vm.acc.as_block()?;
    let mut cells = block.borrow_mut();
    if n >= cells.len() {
        return Err(VmError::OutOfRange(format!(
            "SETFIELD {} out of bounds",
            n
        )));
    }
    cells[n] = v;
    Ok(())
}

pub(super) fn handle_vectlength(vm: &mut Vm) -> Result<(), VmError> {
    let block = vm.acc.as_block()?;
    let len = block.borrow().len();
    vm.acc = Value::Int(len as i64);
    Ok(())
}

pub(super) fn handle_getvectitem(vm: &mut Vm) -> Result<(), VmError> {
    let idx = vm.stack.pop_one()?.as_int()?;
    let idx = usize::try_from(idx)
        .map_err(|_| VmError::OutOfRange(format!("GETVECTITEM negative index {}", idx)))?;
    let block = vm.acc.as_block()?;
    let v = block
        .borrow()
        .get(idx)
        .cloned()
        .ok_or_else(|| VmError::OutOfRange(format!("GETVECTITEM {} out of bounds", idx)))?;
    vm.acc = v;
    Ok(())
}

pub(super) fn handle_setvectitem(vm: &mut Vm) -> Result<(), VmError> {
    let idx = vm.stack.pop_one()?.as_int()?;
    let idx = usize::try_from(idx)
        .map_err(|_| VmError::OutOfRange(format!("SETVECTITEM negative index {}", idx)))?;
    let v = vm.stack.pop_one()?;
    let block = vm.acc.as_block()?;
    {
        let mut cells = block.borrow_mut();
        if idx >= cells.len() {
            return Err(VmError::OutOfRange(format!(
                "SETVECTITEM {} out of bounds",
                idx
            )));
        }
        cells[idx] = v;
    }
    vm.acc = Value::Unit;
    Ok(())
}
