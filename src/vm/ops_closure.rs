//! # Calling Convention
//!
//! `CLOSURE`, `CLOSUREREC`, `OFFSETCLOSURE`, `APPLY`, `APPTERM`, `RETURN`,
//! `RESTART`, and `GRAB` — construction of closures and the curried,
//! `EXTRA_ARGS`-driven calling convention described in §4.3 of the design
//! doc.
//!
//! ## Return frames
//! `APPLY` conceptually pushes a three-cell return frame (`saved_pc`,
//! `saved_env`, `saved_extra_args`) onto the operand stack ahead of the
//! call. This implementation keeps that frame in a side vector
//! ([`CallFrame`], on [`Vm::call_frames`]) instead of interleaving it with
//! real operand-stack cells. Every ordinary opcode addresses the stack only
//! through `peek`/`pop`/`set_at` relative to the current top, and the
//! re-pushed call arguments always land back at that top — so no opcode
//! can observe the difference between a literal in-stack frame and a
//! side-channel one; only `APPLY`/`GRAB`/`RETURN`/`APPTERM` ever touch a
//! frame, and they agree on where it lives.
//!
//! ## Partial application environments
//! A partially applied closure's environment is `[old_env_as_block, arg0,
//! arg1, ...]` — the suspended environment wrapped as a `Value::Block` so
//! it can occupy environment slot 0 alongside ordinary captured values.
//! `RESTART` is the exact dual: it unwraps slot 0 back into `ENV` and
//! re-pushes the remaining slots as arguments. This mirrors the
//! `[env] + args` list-nesting trick of the reference ZAM interpreter this
//! machine is modelled on.
//!
//! ## RESTART placement
//! A curried function's assembled body is `RESTART; GRAB m; <body>`. A
//! fresh closure (`CLOSURE`/`CLOSUREREC`) targets the `GRAB`, skipping
//! `RESTART` on the function's first entry. `GRAB`'s partial-application
//! path targets the `RESTART` one slot earlier instead, so a later call
//! into the rebuilt closure unpacks the stashed arguments and re-enters
//! `GRAB` with `EXTRA_ARGS` already accounting for them.

use std::cell::RefCell;
use std::rc::Rc;

use super::Vm;
use crate::error::VmError;
use crate::value::Value;

/// A saved caller context, recorded by `APPLY` and restored by `RETURN`
/// once `EXTRA_ARGS` reaches zero.
pub(super) struct CallFrame {
    pub(super) saved_pc: usize,
    pub(super) saved_env: Rc<Vec<Value>>,
    pub(super) saved_extra_args: usize,
}

pub(super) fn handle_closure(vm: &mut Vm, target: usize, n: usize) -> Result<(), VmError> {
    let cells = if n == 0 {
        Vec::new()
    } else {
        vm.stack.push(vm.acc.clone());
        vm.stack.pop_n(n)
    };
    vm.acc = Value::Closure(target, Rc::new(cells));
    Ok(())
}

pub(super) fn handle_closurerec(vm: &mut Vm, target: usize, n: usize) -> Result<(), VmError> {
    let mut cells = Vec::with_capacity(n + 1);
    cells.push(Value::Int(target as i64));
    if n > 0 {
        vm.stack.push(vm.acc.clone());
        cells.extend(vm.stack.pop_n(n));
    }
    let closure = Value::Closure(target, Rc::new(cells));
    vm.acc = closure.clone();
    vm.stack.push(closure);
    Ok(())
}

pub(super) fn handle_offsetclosure(vm: &mut Vm) -> Result<(), VmError> {
    let self_pc = vm
        .env
        .first()
        .ok_or_else(|| VmError::OutOfRange("OFFSETCLOSURE on an empty environment".to_string()))?
        .as_int()?;
    let self_pc = usize::try_from(self_pc)
        .map_err(|_| VmError::TypeMismatch("negative self code pointer".to_string()))?;
    vm.acc = Value::Closure(self_pc, vm.env.clone());
    Ok(())
}

pub(super) fn handle_apply(vm: &mut Vm, n: usize) -> Result<(), VmError> {
    if n == 0 {
        return Err(VmError::OutOfRange("APPLY 0 is not a valid call".to_string()));
    }
    let args = vm.stack.pop_n(n);
    vm.call_frames.push(CallFrame {
        saved_pc: vm.pc,
        saved_env: vm.env.clone(),
        saved_extra_args: vm.extra_args,
    });
    let (closure_pc, closure_env) = vm.acc.as_closure()?;
    vm.pc = closure_pc;
    vm.env = closure_env.clone();
    vm.extra_args = n - 1;
    vm.stack.push_many(args);
    Ok(())
}

pub(super) fn handle_appterm(vm: &mut Vm, n: usize, m: usize) -> Result<(), VmError> {
    if n == 0 {
        return Err(VmError::OutOfRange("APPTERM 0 is not a valid call".to_string()));
    }
    let args = vm.stack.pop_n(n);
    let discard = m.saturating_sub(n);
    if discard > 0 {
        vm.stack.pop_n(discard);
    }
    vm.stack.push_many(args);
    let (closure_pc, closure_env) = vm.acc.as_closure()?;
    vm.pc = closure_pc;
    vm.env = closure_env.clone();
    vm.extra_args += n - 1;
    Ok(())
}

pub(super) fn handle_return(vm: &mut Vm, n: usize) -> Result<(), VmError> {
    vm.stack.pop_n(n);
    if vm.extra_args == 0 {
        let frame = vm
            .call_frames
            .pop()
            .ok_or_else(|| VmError::OutOfRange("RETURN with no caller frame".to_string()))?;
        vm.pc = frame.saved_pc;
        vm.env = frame.saved_env;
        vm.extra_args = frame.saved_extra_args;
    } else {
        vm.extra_args -= 1;
        let (closure_pc, closure_env) = vm.acc.as_closure()?;
        vm.pc = closure_pc;
        vm.env = closure_env.clone();
    }
    Ok(())
}

pub(super) fn handle_restart(vm: &mut Vm) -> Result<(), VmError> {
    if vm.env.is_empty() {
        return Err(VmError::OutOfRange(
            "RESTART on an empty environment".to_string(),
        ));
    }
    let saved_env_block = vm.env[0].as_block()?;
    let restored_env = saved_env_block.borrow().clone();
    let extra = vm.env[1..].to_vec();
    let extra_len = extra.len();
    vm.stack.push_many(extra);
    vm.extra_args += extra_len;
    vm.env = Rc::new(restored_env);
    Ok(())
}

pub(super) fn handle_grab(vm: &mut Vm, m: usize) -> Result<(), VmError> {
    if vm.extra_args >= m {
        vm.extra_args -= m;
        return Ok(());
    }

    // Point the rebuilt closure at the RESTART that must precede this GRAB
    // in the assembled function body (two slots back: one for GRAB itself,
    // one for RESTART). A closure built fresh by CLOSURE/CLOSUREREC targets
    // GRAB directly, skipping RESTART on a function's first entry; only a
    // closure rebuilt here, on re-entry with stashed args, needs RESTART to
    // unpack them before GRAB re-checks EXTRA_ARGS. See DESIGN.md.
    let grab_pc = vm.pc - 2;
    let n_popped = vm.extra_args + 1;
    let popped = vm.stack.pop_n(n_popped);
    let wrapped_env = Value::Block(Rc::new(RefCell::new(vm.env.as_ref().clone())));
    let mut new_env = Vec::with_capacity(n_popped + 1);
    new_env.push(wrapped_env);
    new_env.extend(popped);
    vm.acc = Value::Closure(grab_pc, Rc::new(new_env));

    let frame = vm
        .call_frames
        .pop()
        .ok_or_else(|| VmError::OutOfRange("GRAB with no caller frame".to_string()))?;
    vm.pc = frame.saved_pc;
    vm.env = frame.saved_env;
    vm.extra_args = frame.saved_extra_args;
    Ok(())
}
