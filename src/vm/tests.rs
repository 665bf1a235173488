//! End-to-end scenarios over the full fetch-execute loop, mirroring the
//! worked examples in the design doc: arithmetic, conditional branching,
//! closures (plain, partially applied, and self-recursive), block mutation,
//! and the exception trap chain.

use super::*;
use crate::program::Program;

fn run_src(src: &str) -> Value {
    let program = Program::load(src).unwrap();
    run(&program).unwrap()
}

#[test]
fn arithmetic_adds_two_constants() {
    let src = "\tCONST 3\n\tPUSH\n\tCONST 4\n\tPRIM +\n\tSTOP\n";
    assert_eq!(run_src(src).as_int().unwrap(), 7);
}

#[test]
fn branchifnot_skips_to_label_on_false() {
    let src = concat!(
        "\tCONST 0\n",
        "\tBRANCHIFNOT L\n",
        "\tCONST 1\n",
        "\tSTOP\n",
        "L:\tCONST 42\n",
        "\tSTOP\n",
    );
    assert_eq!(run_src(src).as_int().unwrap(), 42);
}

#[test]
fn identity_closure_returns_its_argument() {
    // id = fun x -> x ; id 5
    let src = concat!(
        "\tCLOSURE ID,0\n",
        "\tPUSH\n",      // stack: [id]
        "\tCONST 5\n",
        "\tPUSH\n",      // stack: [5, id]
        "\tACC 1\n",     // ACC <- id
        "\tAPPLY 1\n",
        "\tSTOP\n",
        "ID:\tGRAB 0\n",
        "\tACC 0\n",
        "\tRETURN 1\n",
    );
    assert_eq!(run_src(src).as_int().unwrap(), 5);
}

#[test]
fn recursive_tailrec_factorial_of_five_is_120() {
    // facto(acc, n) = if n = 0 then acc else facto(n*acc, n-1)
    // top level: facto(1, 5). PRIM computes ACC <op> stack-top, so every
    // arithmetic step here loads its right-hand operand first and its
    // left-hand operand into ACC last, immediately before the PRIM.
    let src = concat!(
        "\tCLOSUREREC FACT,0\n", // also pushes fact onto the stack itself
        "\tPUSH\n",          // stack: [fact, fact] (CLOSUREREC's own push, then this one)
        "\tCONST 5\n",       // n = 5
        "\tPUSH\n",          // stack: [5, fact, fact]
        "\tCONST 1\n",       // acc = 1
        "\tPUSH\n",          // stack: [1, 5, fact, fact]
        "\tACC 3\n",         // ACC <- fact
        "\tAPPLY 2\n",       // args popped top-first: [acc, n]
        "\tSTOP\n",
        "FACT:\tGRAB 1\n",
        // stack on entry: [acc, n, ...]; env[0] = Int(FACT's own pc)
        "\tACC 1\n",         // ACC <- n
        "\tBRANCHIFNOT BASE\n",
        "\tCONST 1\n",
        "\tPUSH\n",          // stack: [1, acc, n, ...]
        "\tACC 2\n",         // ACC <- n
        "\tPRIM -\n",        // ACC <- n-1
        "\tPUSH\n",          // stack: [n-1, acc, n, ...]
        "\tACC 1\n",         // ACC <- acc
        "\tPUSH\n",          // stack: [acc, n-1, acc, n, ...]
        "\tACC 3\n",         // ACC <- n
        "\tPRIM *\n",        // ACC <- n*acc
        "\tPUSH\n",          // stack: [n*acc, n-1, acc, n, ...]
        "\tOFFSETCLOSURE\n", // ACC <- self closure (env[0] is FACT's own pc)
        "\tAPPLY 2\n",       // args popped top-first: [n*acc, n-1]
        "\tRETURN 2\n",
        "BASE:\tACC 0\n",    // ACC <- acc
        "\tRETURN 2\n",
    );
    assert_eq!(run_src(src).as_int().unwrap(), 120);
}

#[test]
fn partial_application_of_a_two_argument_function() {
    // add = fun x y -> x + y ; inc = add 1 ; inc 41
    let src = concat!(
        "\tCLOSURE ADD,0\n",
        "\tPUSH\n",          // stack: [add]
        "\tCONST 1\n",
        "\tPUSH\n",          // stack: [1, add]
        "\tACC 1\n",         // ACC <- add
        "\tAPPLY 1\n",       // ACC <- inc (a Closure: add applied to just x=1)
        "\tPUSH\n",          // stack: [inc]
        "\tCONST 41\n",
        "\tPUSH\n",          // stack: [41, inc]
        "\tACC 1\n",         // ACC <- inc
        "\tAPPLY 1\n",
        "\tSTOP\n",
        "\tRESTART\n",
        "ADD:\tGRAB 1\n",
        "\tACC 1\n",         // ACC <- x
        "\tPRIM +\n",        // pops y as RHS: ACC <- x + y
        "\tRETURN 2\n",
    );
    assert_eq!(run_src(src).as_int().unwrap(), 42);
}

#[test]
fn under_applying_a_curried_function_yields_a_closure_value() {
    let src = concat!(
        "\tCLOSURE ADD,0\n",
        "\tPUSH\n",
        "\tCONST 1\n",
        "\tPUSH\n",
        "\tACC 1\n",
        "\tAPPLY 1\n",
        "\tSTOP\n",
        "\tRESTART\n",
        "ADD:\tGRAB 1\n",
        "\tACC 1\n",
        "\tPRIM +\n",
        "\tRETURN 2\n",
    );
    assert!(matches!(run_src(src), Value::Closure(..)));
}

#[test]
fn exception_roundtrip_returns_to_trap_handler() {
    let src = "\tPUSHTRAP L\n\tCONST 7\n\tRAISE\n\tCONST 0\n\tSTOP\nL:\tSTOP\n";
    assert_eq!(run_src(src).as_int().unwrap(), 7);
}

#[test]
fn exception_roundtrip_leaves_stack_empty() {
    let src = "\tPUSHTRAP L\n\tCONST 7\n\tRAISE\n\tCONST 0\n\tSTOP\nL:\tSTOP\n";
    let program = Program::load(src).unwrap();
    let mut vm = Vm::new(&program);
    loop {
        let instr = vm.fetch().unwrap();
        vm.pc += 1;
        if let Instr::Stop = instr {
            break;
        }
        vm.step(instr).unwrap();
    }
    assert_eq!(vm.acc.as_int().unwrap(), 7);
    assert!(vm.stack.is_empty());
}

#[test]
fn block_mutation_is_visible_through_getfield() {
    let src = concat!(
        "\tCONST 10\n",
        "\tPUSH\n",
        "\tCONST 20\n",
        "\tMAKEBLOCK 2\n",  // ACC <- [20, 10] (cells = [ACC] ++ popped-below)
        "\tPUSH\n",         // stack: [block]
        "\tCONST 99\n",
        "\tPUSH\n",         // stack: [99, block]
        "\tACC 1\n",        // ACC <- block
        "\tSETFIELD 1\n",   // pops 99, block.cells[1] <- 99
        "\tGETFIELD 1\n",   // ACC <- block.cells[1]
        "\tSTOP\n",
    );
    assert_eq!(run_src(src).as_int().unwrap(), 99);
}

#[test]
fn uncaught_raise_is_a_fatal_error() {
    let src = "\tCONST 7\n\tRAISE\n\tSTOP\n";
    let program = Program::load(src).unwrap();
    let err = run(&program).unwrap_err();
    match err {
        VmError::UncaughtException(v) => assert_eq!(v.as_int().unwrap(), 7),
        other => panic!("expected UncaughtException, got {:?}", other),
    }
}

#[test]
fn peephole_optimized_program_is_observationally_equal() {
    // call_inc(x) = inc(x), a tail call the loader can fuse into APPTERM;
    // top level calls call_inc(10).
    let src = concat!(
        "\tCLOSURE CALL_INC,0\n",
        "\tPUSH\n",
        "\tCONST 10\n",
        "\tPUSH\n",
        "\tACC 1\n",
        "\tAPPLY 1\n",
        "\tSTOP\n",
        "CALL_INC:\tGRAB 0\n",
        "\tACC 0\n",
        "\tPUSH\n",
        "\tCLOSURE INC,0\n",
        "\tAPPLY 1\n",
        "\tRETURN 1\n",
        "INC:\tGRAB 0\n",
        "\tACC 0\n",
        "\tPUSH\n",
        "\tCONST 1\n",
        "\tPRIM +\n",
        "\tRETURN 1\n",
    );
    let plain = Program::load(src).unwrap();
    let optimized = plain.peephole_optimize();
    // CALL_INC's closing APPLY 1/RETURN 1 is exactly the pattern
    // `peephole_optimize` fuses into APPTERM 1,2 — confirm it actually did.
    assert!(optimized
        .code
        .iter()
        .any(|i| matches!(i, Instr::AppTerm(1, 2))));

    let result_plain = run(&plain).unwrap();
    let result_optimized = run(&optimized).unwrap();
    assert_eq!(result_plain.as_int().unwrap(), 11);
    assert_eq!(result_optimized.as_int().unwrap(), 11);
}
