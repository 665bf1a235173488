//! # Bytecode Loader and Program Store
//!
//! Turns the textual bytecode format (§6 of the design doc) into a
//! [`Program`]: an indexed, immutable array of decoded [`Instr`]s plus the
//! `label -> index` map built while scanning it.
//!
//! ## Line grammar
//! Each non-blank line is `(LABEL:)?\tOPCODE operand, operand, ...` — an
//! optional label, a literal tab, an opcode mnemonic, and a comma-separated
//! operand list. Blank lines are skipped entirely and do not occupy a
//! program index.
//!
//! ## Two-pass resolution
//! Pass one walks every line, assigning each instruction its final index
//! and recording any label at that index. Pass two re-walks the same lines,
//! parsing each opcode's operands into their typed form; label operands are
//! resolved against the completed map from pass one, so forward references
//! work. A label that never resolves is an [`LoadError::UnknownLabel`]; a
//! line that doesn't fit its opcode's grammar is a
//! [`LoadError::MalformedInstruction`].

use std::collections::HashMap;

use crate::error::LoadError;

/// One ZAM-style unary or binary primitive, as named by a `PRIM` operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Not,
    Print,
}

impl PrimOp {
    fn from_token(token: &str) -> Option<PrimOp> {
        match token {
            "+" => Some(PrimOp::Add),
            "-" => Some(PrimOp::Sub),
            "*" => Some(PrimOp::Mul),
            "/" => Some(PrimOp::Div),
            "and" => Some(PrimOp::And),
            "or" => Some(PrimOp::Or),
            "=" => Some(PrimOp::Eq),
            "<>" => Some(PrimOp::Ne),
            "<" => Some(PrimOp::Lt),
            "<=" => Some(PrimOp::Le),
            ">" => Some(PrimOp::Gt),
            ">=" => Some(PrimOp::Ge),
            "not" => Some(PrimOp::Not),
            "print" => Some(PrimOp::Print),
            _ => None,
        }
    }
}

/// A single decoded instruction. Label operands are already resolved to
/// program indices; there is no representation left for a textual label
/// once a [`Program`] exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Const(i64),
    Prim(PrimOp),
    Branch(usize),
    BranchIfNot(usize),
    Push,
    Pop,
    Acc(usize),
    EnvAcc(usize),
    Closure(usize, usize),
    ClosureRec(usize, usize),
    OffsetClosure,
    Apply(usize),
    AppTerm(usize, usize),
    Return(usize),
    Restart,
    Grab(usize),
    MakeBlock(usize),
    GetField(usize),
    SetField(usize),
    VectLength,
    GetVectItem,
    SetVectItem,
    Assign(usize),
    PushTrap(usize),
    PopTrap,
    Raise,
    Stop,
}

/// A fully loaded, immutable program: the decoded instruction array plus
/// the label map recorded while loading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub code: Vec<Instr>,
    pub labels: HashMap<String, usize>,
}

/// One physically parsed line: its 1-based source line number, optional
/// label, opcode mnemonic, and raw (unsplit) operand text.
struct RawLine<'a> {
    lineno: usize,
    label: Option<String>,
    opcode: &'a str,
    operands: &'a str,
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn malformed(lineno: usize, detail: impl Into<String>) -> LoadError {
    LoadError::MalformedInstruction {
        line: lineno,
        detail: detail.into(),
    }
}

fn parse_raw_line(raw: &str, lineno: usize) -> Result<RawLine<'_>, LoadError> {
    let tab_pos = raw
        .find('\t')
        .ok_or_else(|| malformed(lineno, "missing tab separator before opcode"))?;
    let (prefix, after_tab) = raw.split_at(tab_pos);
    let after_tab = &after_tab[1..];

    let label = if prefix.is_empty() {
        None
    } else {
        let name = prefix
            .strip_suffix(':')
            .ok_or_else(|| malformed(lineno, format!("malformed label prefix '{}'", prefix)))?;
        if !is_ident(name) {
            return Err(malformed(lineno, format!("invalid label name '{}'", name)));
        }
        Some(name.to_string())
    };

    let rest = after_tab.trim_start();
    let (opcode, operands) = match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], rest[idx..].trim()),
        None => (rest, ""),
    };
    if !is_ident(opcode) {
        return Err(malformed(lineno, format!("invalid opcode '{}'", opcode)));
    }

    Ok(RawLine {
        lineno,
        label,
        opcode,
        operands,
    })
}

fn split_operands(s: &str) -> Vec<&str> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split(',').map(|p| p.trim()).collect()
    }
}

fn parse_int(s: &str, lineno: usize) -> Result<i64, LoadError> {
    s.parse::<i64>()
        .map_err(|_| malformed(lineno, format!("expected integer, found '{}'", s)))
}

fn parse_index(s: &str, lineno: usize) -> Result<usize, LoadError> {
    let n = parse_int(s, lineno)?;
    usize::try_from(n).map_err(|_| malformed(lineno, format!("expected non-negative integer, found '{}'", n)))
}

fn resolve_label(
    s: &str,
    lineno: usize,
    labels: &HashMap<String, usize>,
) -> Result<usize, LoadError> {
    labels
        .get(s)
        .copied()
        .ok_or_else(|| LoadError::UnknownLabel {
            line: lineno,
            label: s.to_string(),
        })
}

fn expect_arity(
    line: &RawLine<'_>,
    parts: &[&str],
    n: usize,
) -> Result<(), LoadError> {
    if parts.len() != n {
        return Err(malformed(
            line.lineno,
            format!(
                "{} expects {} operand(s), found {}",
                line.opcode,
                n,
                parts.len()
            ),
        ));
    }
    Ok(())
}

fn decode(line: &RawLine<'_>, labels: &HashMap<String, usize>) -> Result<Instr, LoadError> {
    let lineno = line.lineno;
    match line.opcode {
        "CONST" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::Const(parse_int(parts[0], lineno)?))
        }
        "PRIM" => {
            let token = line.operands.trim();
            let op = PrimOp::from_token(token)
                .ok_or_else(|| malformed(lineno, format!("unknown PRIM operator '{}'", token)))?;
            Ok(Instr::Prim(op))
        }
        "BRANCH" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::Branch(resolve_label(parts[0], lineno, labels)?))
        }
        "BRANCHIFNOT" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::BranchIfNot(resolve_label(parts[0], lineno, labels)?))
        }
        "PUSH" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::Push)
        }
        "POP" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::Pop)
        }
        "ACC" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::Acc(parse_index(parts[0], lineno)?))
        }
        "ENVACC" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::EnvAcc(parse_index(parts[0], lineno)?))
        }
        "CLOSURE" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 2)?;
            let target = resolve_label(parts[0], lineno, labels)?;
            let n = parse_index(parts[1], lineno)?;
            Ok(Instr::Closure(target, n))
        }
        "CLOSUREREC" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 2)?;
            let target = resolve_label(parts[0], lineno, labels)?;
            let n = parse_index(parts[1], lineno)?;
            Ok(Instr::ClosureRec(target, n))
        }
        "OFFSETCLOSURE" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::OffsetClosure)
        }
        "APPLY" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::Apply(parse_index(parts[0], lineno)?))
        }
        "APPTERM" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 2)?;
            let n = parse_index(parts[0], lineno)?;
            let m = parse_index(parts[1], lineno)?;
            Ok(Instr::AppTerm(n, m))
        }
        "RETURN" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::Return(parse_index(parts[0], lineno)?))
        }
        "RESTART" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::Restart)
        }
        "GRAB" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::Grab(parse_index(parts[0], lineno)?))
        }
        "MAKEBLOCK" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::MakeBlock(parse_index(parts[0], lineno)?))
        }
        "GETFIELD" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::GetField(parse_index(parts[0], lineno)?))
        }
        "SETFIELD" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::SetField(parse_index(parts[0], lineno)?))
        }
        "VECTLENGTH" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::VectLength)
        }
        "GETVECTITEM" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::GetVectItem)
        }
        "SETVECTITEM" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::SetVectItem)
        }
        "ASSIGN" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::Assign(parse_index(parts[0], lineno)?))
        }
        "PUSHTRAP" => {
            let parts = split_operands(line.operands);
            expect_arity(line, &parts, 1)?;
            Ok(Instr::PushTrap(resolve_label(parts[0], lineno, labels)?))
        }
        "POPTRAP" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::PopTrap)
        }
        "RAISE" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::Raise)
        }
        "STOP" => {
            expect_arity(line, &split_operands(line.operands), 0)?;
            Ok(Instr::Stop)
        }
        other => Err(malformed(lineno, format!("unknown opcode '{}'", other))),
    }
}

impl Program {
    /// Parse the textual bytecode format into a loaded program.
    pub fn load(source: &str) -> Result<Program, LoadError> {
        let mut raw_lines = Vec::new();
        let mut labels = HashMap::new();

        for (offset, line) in source.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let lineno = offset + 1;
            let raw = parse_raw_line(line, lineno)?;
            if let Some(name) = &raw.label {
                labels.insert(name.clone(), raw_lines.len());
            }
            raw_lines.push(raw);
        }

        let code = raw_lines
            .iter()
            .map(|line| decode(line, &labels))
            .collect::<Result<Vec<Instr>, LoadError>>()?;

        Ok(Program { code, labels })
    }

    /// Fuse every `APPLY N` immediately followed by `RETURN R` into a single
    /// `APPTERM N (N+R)`, remapping every jump-target operand and the label
    /// map through the resulting index shift.
    pub fn peephole_optimize(&self) -> Program {
        let mut new_code = Vec::with_capacity(self.code.len());
        let mut old_to_new = vec![0usize; self.code.len() + 1];

        let mut i = 0;
        while i < self.code.len() {
            old_to_new[i] = new_code.len();
            if let (Instr::Apply(n), Some(Instr::Return(r))) = (&self.code[i], self.code.get(i + 1)) {
                old_to_new[i + 1] = new_code.len();
                new_code.push(Instr::AppTerm(*n, n + r));
                i += 2;
            } else {
                new_code.push(self.code[i].clone());
                i += 1;
            }
        }
        old_to_new[self.code.len()] = new_code.len();

        for instr in new_code.iter_mut() {
            match instr {
                Instr::Branch(t) | Instr::BranchIfNot(t) | Instr::PushTrap(t) => {
                    *t = old_to_new[*t];
                }
                Instr::Closure(t, _) | Instr::ClosureRec(t, _) => {
                    *t = old_to_new[*t];
                }
                _ => {}
            }
        }

        let labels = self
            .labels
            .iter()
            .map(|(k, &v)| (k.clone(), old_to_new[v]))
            .collect();

        Program {
            code: new_code,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_arithmetic_program() {
        let src = "\tCONST 3\n\tPUSH\n\tCONST 4\n\tPRIM +\n\tSTOP\n";
        let program = Program::load(src).unwrap();
        assert_eq!(
            program.code,
            vec![
                Instr::Const(3),
                Instr::Push,
                Instr::Const(4),
                Instr::Prim(PrimOp::Add),
                Instr::Stop,
            ]
        );
    }

    #[test]
    fn resolves_forward_label_reference() {
        let src = "\tCONST 0\n\tBRANCHIFNOT L\n\tCONST 1\n\tSTOP\nL:\tCONST 42\n\tSTOP\n";
        let program = Program::load(src).unwrap();
        assert_eq!(program.code[1], Instr::BranchIfNot(4));
        assert_eq!(program.labels.get("L"), Some(&4));
    }

    #[test]
    fn unknown_label_is_an_error() {
        let src = "\tBRANCH MISSING\n\tSTOP\n";
        let err = Program::load(src).unwrap_err();
        assert_eq!(
            err,
            LoadError::UnknownLabel {
                line: 1,
                label: "MISSING".to_string(),
            }
        );
    }

    #[test]
    fn malformed_instruction_is_an_error() {
        let src = "\tCONST notanumber\n";
        match Program::load(src) {
            Err(LoadError::MalformedInstruction { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected MalformedInstruction, got {:?}", other),
        }
    }

    #[test]
    fn loader_is_idempotent() {
        let src = "\tCONST 3\n\tPUSH\n\tCONST 4\n\tPRIM +\n\tSTOP\n";
        let a = Program::load(src).unwrap();
        let b = Program::load(src).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn peephole_fuses_apply_return_and_remaps_jumps() {
        // L: GRAB 1 ; ACC 0 ; RETURN 1   -- callee
        // entry: CLOSURE L,0 ; PUSH ; CONST 5 ; APPLY 1 ; RETURN 0
        let src = concat!(
            "\tCLOSURE L,0\n",
            "\tPUSH\n",
            "\tCONST 5\n",
            "\tAPPLY 1\n",
            "\tRETURN 0\n",
            "L:\tGRAB 1\n",
            "\tACC 0\n",
            "\tRETURN 1\n",
        );
        let program = Program::load(src).unwrap();
        let optimized = program.peephole_optimize();

        // APPLY 1 / RETURN 0 at indices 3,4 fuse into one APPTERM at index 3.
        assert_eq!(optimized.code[3], Instr::AppTerm(1, 1));
        assert_eq!(optimized.code.len(), program.code.len() - 1);
        // The label L shifts down by one slot to account for the fusion.
        assert_eq!(optimized.labels.get("L"), Some(&4));
        assert_eq!(optimized.code[0], Instr::Closure(4, 0));
    }
}
