//! # Exception Trap Chain
//!
//! `PUSHTRAP`, `POPTRAP`, and `RAISE`. The four-cell trap record described
//! in §3/§4.3 of the design doc (`handler_pc`, previous marker, saved env,
//! saved extra args) is kept off the real operand stack, in a side vector
//! ([`TrapFrame`], on [`Vm::trap_frames`]) — the same side-channel
//! treatment `APPLY`/`RETURN` give the call-return frame, and justified the
//! same way (§9 of the design doc's "trap chain" note already allows an
//! opaque marker in place of literal cells). What *does* live on the real
//! stack is whatever values the protected block pushed before raising;
//! `RAISE` must still unwind those, so every [`TrapFrame`] records the
//! stack depth at the moment of `PUSHTRAP` and `RAISE` truncates back to
//! it.

use std::rc::Rc;

use super::Vm;
use crate::error::VmError;
use crate::value::Value;

pub(super) struct TrapFrame {
    pub(super) handler_pc: usize,
    pub(super) saved_env: Rc<Vec<Value>>,
    pub(super) saved_extra_args: usize,
    pub(super) stack_depth: usize,
}

pub(super) fn handle_pushtrap(vm: &mut Vm, handler_pc: usize) -> Result<(), VmError> {
    vm.trap_frames.push(TrapFrame {
        handler_pc,
        saved_env: vm.env.clone(),
        saved_extra_args: vm.extra_args,
        stack_depth: vm.stack.len(),
    });
    Ok(())
}

pub(super) fn handle_poptrap(vm: &mut Vm) -> Result<(), VmError> {
    vm.trap_frames
        .pop()
        .ok_or_else(|| VmError::OutOfRange("POPTRAP with no installed trap".to_string()))?;
    Ok(())
}

pub(super) fn handle_raise(vm: &mut Vm) -> Result<(), VmError> {
    match vm.trap_frames.pop() {
        None => Err(VmError::UncaughtException(vm.acc.clone())),
        Some(frame) => {
            vm.stack.truncate_to(frame.stack_depth);
            vm.pc = frame.handler_pc;
            vm.env = frame.saved_env;
            vm.extra_args = frame.saved_extra_args;
            Ok(())
        }
    }
}
