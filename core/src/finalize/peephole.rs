//! Peephole rewriter.
//!
//! Scans the list front to back. At each instruction the rules below are
//! tried in order over a window of up to three instructions; the first match
//! rewrites the window and scanning resumes two instructions before it, so
//! one rewrite can enable the next. Passes repeat until one applies nothing.
//!
//! Rules never add, remove or move labels, so the label index built at the
//! start stays valid for the liveness queries.

use hashbrown::HashMap;

use crate::{
    bytecode::{
        Condition, InstrRef, Instruction, InstructionList, JumpTarget, LabelId, PTR_SIZE, Var,
    },
    finalize::{
        FinalizeError, FinalizeOptions,
        labels::label_index,
        liveness::{is_temp_reg_used, is_temp_var_read},
    },
};

/// Rewrites `list` in place and returns the number of rewrites applied.
pub fn optimize(
    list: &mut InstructionList,
    options: &FinalizeOptions,
) -> Result<usize, FinalizeError> {
    let labels = label_index(list)?;
    let mut peephole = Peephole {
        list,
        labels,
        include_jit_entries: options.include_jit_entries,
        rewrites: 0,
    };

    let mut passes = 0usize;
    loop {
        let before = peephole.rewrites;
        peephole.pass();
        passes += 1;
        if peephole.rewrites == before {
            break;
        }
    }

    tracing::debug!(
        rewrites = peephole.rewrites,
        passes,
        remaining = peephole.list.len(),
        "peephole rewriting done"
    );
    Ok(peephole.rewrites)
}

/// Where scanning continues after a rewrite. `None` once the list is empty.
type Resume = Option<InstrRef>;

/// How a two-instruction window collapses.
enum Fusion {
    /// Replace the first instruction, delete the second.
    IntoCurr(Instruction),
    /// Delete the first instruction, replace the second.
    IntoNext(Instruction),
    DropCurr,
    DropBoth,
}

struct Peephole<'a> {
    list: &'a mut InstructionList,
    labels: HashMap<LabelId, InstrRef>,
    include_jit_entries: bool,
    rewrites: usize,
}

impl Peephole<'_> {
    fn pass(&mut self) {
        let mut cursor = self.list.head();
        while let Some(curr) = cursor {
            cursor = match self.rewrite_at(curr) {
                Some(resume) => resume,
                None => self.list.next(curr),
            };
        }
    }

    fn rewrite_at(&mut self, curr: InstrRef) -> Option<Resume> {
        if let Some(resume) = self.remove_unused_value(curr) {
            return Some(resume);
        }
        if let Some(resume) = self.postpone_init_of_temp(curr) {
            return Some(resume);
        }
        if let Some(resume) = self.reorder_swapped_pushes(curr) {
            return Some(resume);
        }
        if let Some(resume) = self.simplify_triple(curr) {
            return Some(resume);
        }
        self.simplify_pair(curr)
    }

    // === Helpers ===

    /// Whether `var` is a temporary whose current value is not read after `at`.
    fn temp_is_dead_after(&self, at: InstrRef, var: Var) -> bool {
        self.list.is_temporary(var) && !is_temp_var_read(self.list, &self.labels, at, var)
    }

    fn back_two(&self, from: Option<InstrRef>) -> Resume {
        let Some(mut at) = from else {
            return self.list.head();
        };
        for _ in 0..2 {
            match self.list.prev(at) {
                Some(prev) => at = prev,
                None => break,
            }
        }
        Some(at)
    }

    fn record(&mut self, rule: &'static str) {
        self.rewrites += 1;
        tracing::trace!(rule, "peephole rewrite");
    }

    fn delete(&mut self, at: InstrRef, rule: &'static str) -> Resume {
        let resume = self.list.remove(at);
        self.record(rule);
        self.back_two(resume)
    }

    fn apply(
        &mut self,
        curr: InstrRef,
        next: InstrRef,
        fusion: Fusion,
        rule: &'static str,
    ) -> Resume {
        let resume = match fusion {
            Fusion::IntoCurr(with) => {
                self.list.replace(curr, with);
                self.list.remove(next);
                Some(curr)
            }
            Fusion::IntoNext(with) => {
                self.list.replace(next, with);
                self.list.remove(curr)
            }
            Fusion::DropCurr => self.list.remove(curr),
            Fusion::DropBoth => {
                self.list.remove(next);
                self.list.remove(curr)
            }
        };
        self.record(rule);
        self.back_two(resume)
    }

    // === Temporaries ===

    /// Dead-value elimination, constant folding into consumers and copy
    /// propagation. All of them hinge on a temporary not being read again.
    fn remove_unused_value(&mut self, curr: InstrRef) -> Option<Resume> {
        use Instruction::*;

        let instr = self.list[curr];
        if let Some(var) = instr.var_access().write {
            if self.temp_is_dead_after(curr, var) {
                if let LoadGlobalReadReg4 { global, .. } = instr {
                    if is_temp_reg_used(self.list, curr) {
                        self.list.replace(curr, LoadGlobal(global));
                        self.record("dead temporary, register still needed");
                        return Some(self.back_two(Some(curr)));
                    }
                }
                return Some(self.delete(curr, "dead temporary"));
            }
        }

        let next = self.list.next(curr)?;
        let (fusion, rule) = match (instr, self.list[next]) {
            (SetVar4 { dst: t, value }, Cmp { kind, lhs, rhs })
                if rhs == t
                    && lhs != t
                    && kind.immediate_form().is_some()
                    && self.temp_is_dead_after(next, t) =>
            {
                let kind = kind.immediate_form()?;
                (
                    Fusion::IntoNext(CmpImm {
                        kind,
                        lhs,
                        imm: value,
                    }),
                    "compare with constant",
                )
            }
            (SetVar4 { dst: t, value }, BinOp { op, dst, lhs, rhs })
                if rhs == t
                    && lhs != t
                    && op.immediate_form().is_some()
                    && (dst == t || self.temp_is_dead_after(next, t)) =>
            {
                let op = op.immediate_form()?;
                (
                    Fusion::IntoNext(BinOpImm {
                        op,
                        dst,
                        lhs,
                        imm: value,
                    }),
                    "arithmetic with constant",
                )
            }
            (SetVar4 { dst: t, value }, BinOp { op, dst, lhs, rhs })
                if lhs == t
                    && rhs != t
                    && op.is_commutative()
                    && op.immediate_form().is_some()
                    && (dst == t || self.temp_is_dead_after(next, t)) =>
            {
                let op = op.immediate_form()?;
                (
                    Fusion::IntoNext(BinOpImm {
                        op,
                        dst,
                        lhs: rhs,
                        imm: value,
                    }),
                    "commuted arithmetic with constant",
                )
            }
            (BinOp { dst: t, .. } | BinOpImm { dst: t, .. }, CopyVar4 { dst, src })
                if src == t && self.temp_is_dead_after(next, t) =>
            {
                (
                    Fusion::IntoCurr(instr.with_write_var(dst)?),
                    "produce into copy destination",
                )
            }
            (SetVar4 { dst: t, value }, CopyVar4 { dst, src })
                if src == t && self.temp_is_dead_after(next, t) =>
            {
                (
                    Fusion::IntoCurr(SetVar4 { dst, value }),
                    "set copy destination",
                )
            }
            (CopyRegToVar4(t), CopyVarToReg4(src))
                if src == t && self.temp_is_dead_after(next, t) =>
            {
                (Fusion::DropBoth, "register round trip")
            }
            (CopyGlobalToVar4 { dst: t, global }, PushVar(src))
                if src == t && self.temp_is_dead_after(next, t) =>
            {
                (Fusion::IntoNext(PushGlobal(global)), "push global")
            }
            (SetVar4 { dst: t, value }, PushVar(src))
                if src == t && self.temp_is_dead_after(next, t) =>
            {
                (Fusion::IntoNext(PushConst(value)), "push constant")
            }
            (SetVar4 { dst: t, value }, CopyVarToGlobal4 { global, src })
                if src == t && self.temp_is_dead_after(next, t) =>
            {
                (Fusion::IntoNext(SetGlobal4 { global, value }), "set global")
            }
            _ => return None,
        };
        Some(self.apply(curr, next, fusion, rule))
    }

    /// Moves a constant store to a temporary down to the instruction reading
    /// it, when that lets [`Self::remove_unused_value`] fold the two.
    /// Otherwise the store is moved back.
    fn postpone_init_of_temp(&mut self, curr: InstrRef) -> Option<Resume> {
        let Instruction::SetVar4 { dst: t, .. } = self.list[curr] else {
            return None;
        };
        if !self.list.is_temporary(t) {
            return None;
        }

        let after = self.list.next(curr)?;
        let mut cursor = Some(after);
        let use_site = loop {
            let at = cursor?;
            let instruction = &self.list[at];
            let access = instruction.var_access();
            if access.reads_var(t) {
                break at;
            }
            if access.writes_var(t)
                || instruction.ends_temporaries()
                || instruction.is_jump_or_label()
            {
                return None;
            }
            cursor = self.list.next(at);
        };
        if use_site == after {
            return None;
        }

        self.list.move_before(curr, use_site);
        if let Some(resume) = self.remove_unused_value(curr) {
            return Some(resume);
        }
        self.list.move_before(curr, after);
        None
    }

    // === Stack ===

    /// `push a; push b; swap` becomes `push b; push a`.
    fn reorder_swapped_pushes(&mut self, curr: InstrRef) -> Option<Resume> {
        fn swappable(instruction: &Instruction) -> bool {
            matches!(
                instruction,
                Instruction::PushConst(_) | Instruction::PushVar(_) | Instruction::PushFrameAddr(_)
            )
        }

        let next = self.list.next(curr)?;
        let swap = self.list.next(next)?;
        if !swappable(&self.list[curr])
            || !swappable(&self.list[next])
            || self.list[swap] != Instruction::Swap4
        {
            return None;
        }

        self.list.remove(swap);
        self.list.move_before(next, curr);
        self.record("reorder pushes instead of swapping");
        Some(self.back_two(Some(next)))
    }

    fn simplify_triple(&mut self, curr: InstrRef) -> Option<Resume> {
        use Instruction::*;

        let next = self.list.next(curr)?;
        let third = self.list.next(next)?;
        let rule = match (self.list[curr], self.list[next], self.list[third]) {
            (Suspend, JitEntry(_), Suspend) | (Line { .. }, JitEntry(_), Line { .. }) => {
                self.list.remove(next);
                let resume = self.list.remove(curr);
                self.record("collapse checkpoints around jit entry");
                return Some(self.back_two(resume));
            }
            (PushFrameAddr(v), ChkRefS, ReadStack4) => {
                self.list.replace(curr, PushVar(v));
                self.list.replace(next, ChkRef);
                self.list.remove(third);
                "checked read of frame slot"
            }
            (PushFrameAddr(v), ChkRefS, Pop(n)) if n as i32 >= PTR_SIZE => {
                self.list.replace(curr, ChkNullV(v));
                self.list.remove(next);
                self.list.replace(third, Pop(n - PTR_SIZE as u16));
                "null check of frame slot address"
            }
            (PushVar(v), ChkRef, Pop(n)) if n >= 1 => {
                self.list.replace(curr, ChkNullV(v));
                self.list.remove(next);
                self.list.replace(third, Pop(n - 1));
                "null check of pushed slot"
            }
            _ => return None,
        };
        self.record(rule);
        Some(self.back_two(Some(curr)))
    }

    fn simplify_pair(&mut self, curr: InstrRef) -> Option<Resume> {
        use Instruction::*;

        let instr = self.list[curr];
        match instr {
            JitEntry(_) if !self.include_jit_entries => {
                return Some(self.delete(curr, "drop jit entry"));
            }
            Pop(0) | Push(0) => return Some(self.delete(curr, "empty stack adjustment")),
            _ => {}
        }

        let next = self.list.next(curr)?;
        let (fusion, rule) = match (instr, self.list[next]) {
            (PushFrameAddr(v), ReadStack4) => (Fusion::IntoCurr(PushVar(v)), "push slot value"),
            (ReadStack4, Pop(n)) if n >= 1 => (Fusion::DropCurr, "discard unread dereference"),
            (LoadGlobal(global), WriteVar4(src)) if !is_temp_reg_used(self.list, next) => (
                Fusion::IntoCurr(CopyVarToGlobal4 { global, src }),
                "store slot to global",
            ),
            (LoadGlobal(global), ReadReg4(dst)) => {
                if is_temp_reg_used(self.list, next) {
                    (
                        Fusion::IntoCurr(LoadGlobalReadReg4 { dst, global }),
                        "load global keeping address",
                    )
                } else {
                    (
                        Fusion::IntoCurr(CopyGlobalToVar4 { dst, global }),
                        "load global into slot",
                    )
                }
            }
            (LoadVar(v), IncI) if !is_temp_reg_used(self.list, next) => {
                (Fusion::IntoCurr(IncVi(v)), "increment slot in place")
            }
            (LoadVar(v), DecI) if !is_temp_reg_used(self.list, next) => {
                (Fusion::IntoCurr(DecVi(v)), "decrement slot in place")
            }
            (Pop(_), Ret(_)) => (Fusion::DropCurr, "discard before return"),
            (Suspend, Suspend) | (Line { .. }, Line { .. }) => {
                (Fusion::DropCurr, "duplicate checkpoint")
            }
            (Push(a), Push(b)) => (Fusion::IntoCurr(Push(a.checked_add(b)?)), "fuse reserves"),
            (PushConst(slot), GetRef(0)) => {
                let slot = Var::try_from(slot as i32).ok()?;
                (Fusion::IntoCurr(PushFrameAddr(slot)), "push slot address")
            }
            (PushVar(_) | PushConst(_), Pop(n)) if n >= 1 => {
                (Fusion::IntoNext(Pop(n - 1)), "push then discard")
            }
            (PushRegPtr | PushFrameAddr(_) | PushVarRef(_), Pop(n)) if n as i32 >= PTR_SIZE => (
                Fusion::IntoNext(Pop(n - PTR_SIZE as u16)),
                "push pointer then discard",
            ),
            (ReadStack8, Pop(n)) if n > 1 => (
                Fusion::IntoNext(Pop(n - (2 - PTR_SIZE) as u16)),
                "discard unread wide dereference",
            ),
            (PushConst8(_), Pop(n)) if n > 1 => {
                (Fusion::IntoNext(Pop(n - 2)), "push wide then discard")
            }
            (Test(cond), Branch {
                cond: Condition::Zero,
                target,
            }) if !is_temp_reg_used(self.list, next) => (
                Fusion::IntoNext(Branch {
                    cond: cond.negate(),
                    target,
                }),
                "fuse test into branch",
            ),
            (Test(cond), Branch {
                cond: Condition::NotZero,
                target,
            }) if !is_temp_reg_used(self.list, next) => (
                Fusion::IntoNext(Branch { cond, target }),
                "fuse test into branch",
            ),
            (Jump(JumpTarget::Label(to)), Label(label)) if to == label => {
                (Fusion::DropCurr, "jump to next instruction")
            }
            _ => return None,
        };
        Some(self.apply(curr, next, fusion, rule))
    }
}
