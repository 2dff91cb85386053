//! Random well-formed instruction lists and a reference evaluator for them.
//!
//! Programs are built from segments that leave the stack as they found it,
//! and labels only sit between segments, so every jump and every label is
//! at depth zero. Temporaries are always written before they are read
//! within a segment.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};

use corvid_core::bytecode::{
    ArithOp, CallKind, CmpKind, Condition, ImmCmpKind, ImmOp, InstrRef, Instruction,
    InstructionList, JumpTarget, LabelId, Var,
};
use proptest::prelude::*;

pub const LABELS: u32 = 4;
pub const TEMPORARIES: [Var; 3] = [10, 11, 12];

#[derive(Debug, Clone)]
pub enum Segment {
    Constant { temp: Var, value: u32, dst: Var },
    PushTemp { temp: Var, value: u32, func: u32 },
    Delayed { temp: Var, value: u32, var: Var, func: u32 },
    Arith { temp: Var, value: u32, op: ArithOp, dst: Var, other: Var, temp_left: bool },
    Compare { temp: Var, value: u32, lhs: Var, cond: Condition, target: u32 },
    TestBranch { var: Var, test: Condition, branch: Condition, target: u32 },
    Reserve { a: u16, b: u16 },
    Discard { value: u32, extra: u16 },
    Swap { value: u32, var: Var, func: u32 },
    Store { temp: Var, value: u32, global: u16 },
    Count { var: Var, up: bool },
    Jump(u32),
    Line(u32),
    Suspend,
    Ret,
}

impl Segment {
    fn emit(&self, list: &mut InstructionList) {
        use Instruction::*;

        match *self {
            Segment::Constant { temp, value, dst } => {
                list.emit(SetVar4 { dst: temp, value });
                list.emit(CopyVar4 { dst, src: temp });
            }
            Segment::PushTemp { temp, value, func } => {
                list.emit(SetVar4 { dst: temp, value });
                list.emit(PushVar(temp));
                list.call(CallKind::Script, func, 1);
            }
            Segment::Delayed {
                temp,
                value,
                var,
                func,
            } => {
                list.emit(SetVar4 { dst: temp, value });
                list.emit(IncVi(var));
                list.emit(PushVar(temp));
                list.call(CallKind::System, func, 1);
            }
            Segment::Arith {
                temp,
                value,
                op,
                dst,
                other,
                temp_left,
            } => {
                let (lhs, rhs) = if temp_left { (temp, other) } else { (other, temp) };
                list.emit(SetVar4 { dst: temp, value });
                list.emit(BinOp { op, dst, lhs, rhs });
            }
            Segment::Compare {
                temp,
                value,
                lhs,
                cond,
                target,
            } => {
                list.emit(SetVar4 { dst: temp, value });
                list.emit(Cmp {
                    kind: CmpKind::Int,
                    lhs,
                    rhs: temp,
                });
                list.branch(cond, LabelId(target));
            }
            Segment::TestBranch {
                var,
                test,
                branch,
                target,
            } => {
                list.emit(CmpImm {
                    kind: ImmCmpKind::Int,
                    lhs: var,
                    imm: 0,
                });
                list.emit(Test(test));
                list.branch(branch, LabelId(target));
            }
            Segment::Reserve { a, b } => {
                list.push(a);
                list.push(b);
                list.pop(a + b);
            }
            Segment::Discard { value, extra } => {
                list.push(extra);
                list.emit(PushConst(value));
                list.pop(extra + 1);
            }
            Segment::Swap { value, var, func } => {
                list.emit(PushConst(value));
                list.emit(PushVar(var));
                list.emit(Swap4);
                list.call(CallKind::Script, func, 2);
            }
            Segment::Store {
                temp,
                value,
                global,
            } => {
                list.emit(SetVar4 { dst: temp, value });
                list.emit(CopyVarToGlobal4 { global, src: temp });
            }
            Segment::Count { var, up } => {
                list.emit(if up { IncVi(var) } else { DecVi(var) });
            }
            Segment::Jump(target) => {
                list.jump(LabelId(target));
            }
            Segment::Line(line) => {
                list.line(line, 0);
            }
            Segment::Suspend => {
                list.emit(Suspend);
            }
            Segment::Ret => {
                list.ret(0);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub segments: Vec<Segment>,
    /// Segment index each label is placed in front of, modulo the length.
    pub labels: [usize; LABELS as usize],
}

impl Program {
    pub fn build(&self) -> InstructionList {
        let mut list = InstructionList::new();
        for temp in TEMPORARIES {
            list.define_temporary(temp);
        }
        let slots = self.segments.len() + 1;
        for index in 0..slots {
            for (label, &at) in self.labels.iter().enumerate() {
                if at % slots == index {
                    list.label(LabelId(label as u32));
                }
            }
            if let Some(segment) = self.segments.get(index) {
                segment.emit(&mut list);
            }
        }
        list.ret(0);
        list
    }
}

fn named() -> impl Strategy<Value = Var> {
    0i16..6
}

fn temp() -> impl Strategy<Value = Var> {
    prop::sample::select(TEMPORARIES.to_vec())
}

fn small() -> impl Strategy<Value = u32> {
    (-3i32..4).prop_map(|value| value as u32)
}

fn target() -> impl Strategy<Value = u32> {
    0..LABELS
}

fn condition() -> impl Strategy<Value = Condition> {
    prop::sample::select(vec![
        Condition::Zero,
        Condition::NotZero,
        Condition::Negative,
        Condition::NotNegative,
        Condition::Positive,
        Condition::NotPositive,
    ])
}

fn arith_op() -> impl Strategy<Value = ArithOp> {
    prop::sample::select(vec![ArithOp::AddI, ArithOp::SubI, ArithOp::MulI, ArithOp::And])
}

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        (temp(), small(), named()).prop_map(|(temp, value, dst)| Segment::Constant {
            temp,
            value,
            dst
        }),
        (temp(), small(), 0u32..4).prop_map(|(temp, value, func)| Segment::PushTemp {
            temp,
            value,
            func
        }),
        (temp(), small(), named(), 0u32..4).prop_map(|(temp, value, var, func)| {
            Segment::Delayed {
                temp,
                value,
                var,
                func,
            }
        }),
        (temp(), small(), arith_op(), named(), named(), any::<bool>()).prop_map(
            |(temp, value, op, dst, other, temp_left)| Segment::Arith {
                temp,
                value,
                op,
                dst,
                other,
                temp_left,
            }
        ),
        (temp(), small(), named(), condition(), target()).prop_map(
            |(temp, value, lhs, cond, target)| Segment::Compare {
                temp,
                value,
                lhs,
                cond,
                target,
            }
        ),
        (
            named(),
            condition(),
            prop::sample::select(vec![Condition::Zero, Condition::NotZero]),
            target()
        )
            .prop_map(|(var, test, branch, target)| Segment::TestBranch {
                var,
                test,
                branch,
                target,
            }),
        (0u16..3, 0u16..3).prop_map(|(a, b)| Segment::Reserve { a, b }),
        (small(), 0u16..3).prop_map(|(value, extra)| Segment::Discard { value, extra }),
        (small(), named(), 0u32..4).prop_map(|(value, var, func)| Segment::Swap {
            value,
            var,
            func
        }),
        (temp(), small(), 0u16..3).prop_map(|(temp, value, global)| Segment::Store {
            temp,
            value,
            global
        }),
        (named(), any::<bool>()).prop_map(|(var, up)| Segment::Count { var, up }),
        target().prop_map(Segment::Jump),
        (1u32..50).prop_map(Segment::Line),
        Just(Segment::Suspend),
        Just(Segment::Ret),
    ]
}

pub fn program() -> impl Strategy<Value = Program> {
    (
        prop::collection::vec(segment(), 0..24),
        prop::array::uniform4(0usize..32),
    )
        .prop_map(|(segments, labels)| Program { segments, labels })
}

// === Reference evaluator ===

/// Something a caller of the function could observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Call { func: u32, args: Vec<u32> },
    Global { global: u16, value: u32 },
    Return { vars: BTreeMap<Var, u32> },
    OutOfFuel,
}

/// Label passes after which a run is cut off. Loops always go through a
/// label and optimization never adds or removes one, so two runs of the
/// same program stop at the same point.
const FUEL: usize = 64;

/// Runs a list whose jumps still target labels.
pub fn run(list: &InstructionList) -> Vec<Event> {
    let labels: HashMap<LabelId, InstrRef> = list
        .iter()
        .filter_map(|(at, instruction)| match instruction {
            Instruction::Label(label) => Some((*label, at)),
            _ => None,
        })
        .collect();

    let mut vars: BTreeMap<Var, u32> = BTreeMap::new();
    let mut stack: Vec<u32> = Vec::new();
    let mut register: i32 = 0;
    let mut events = Vec::new();
    let mut fuel = FUEL;
    let mut cursor = list.head();

    let var = |vars: &BTreeMap<Var, u32>, slot: Var| vars.get(&slot).copied().unwrap_or(0);
    let jump = |target: JumpTarget| match target {
        JumpTarget::Label(label) => Some(labels[&label]),
        JumpTarget::Offset(_) => panic!("evaluator runs unresolved lists only"),
    };

    while let Some(at) = cursor {
        let mut next = list.next(at);
        match list[at] {
            Instruction::Label(_) => {
                if fuel == 0 {
                    events.push(Event::OutOfFuel);
                    return events;
                }
                fuel -= 1;
            }
            Instruction::Line { .. } | Instruction::JitEntry(_) | Instruction::Suspend => {}
            Instruction::SetVar4 { dst, value } => {
                vars.insert(dst, value);
            }
            Instruction::CopyVar4 { dst, src } => {
                let value = var(&vars, src);
                vars.insert(dst, value);
            }
            Instruction::IncVi(slot) => {
                let value = var(&vars, slot).wrapping_add(1);
                vars.insert(slot, value);
            }
            Instruction::DecVi(slot) => {
                let value = var(&vars, slot).wrapping_sub(1);
                vars.insert(slot, value);
            }
            Instruction::BinOp { op, dst, lhs, rhs } => {
                let value = arith(op, var(&vars, lhs), var(&vars, rhs));
                vars.insert(dst, value);
            }
            Instruction::BinOpImm { op, dst, lhs, imm } => {
                let op = match op {
                    ImmOp::AddI => ArithOp::AddI,
                    ImmOp::SubI => ArithOp::SubI,
                    ImmOp::MulI => ArithOp::MulI,
                    other => panic!("no integer semantics for {other:?}"),
                };
                let value = arith(op, var(&vars, lhs), imm);
                vars.insert(dst, value);
            }
            Instruction::Cmp { lhs, rhs, .. } => {
                register = compare(var(&vars, lhs), var(&vars, rhs));
            }
            Instruction::CmpImm { lhs, imm, .. } => {
                register = compare(var(&vars, lhs), imm);
            }
            Instruction::Test(cond) => register = cond.holds(register) as i32,
            Instruction::Branch { cond, target } => {
                if cond.holds(register) {
                    next = jump(target);
                }
            }
            Instruction::Jump(target) => next = jump(target),
            Instruction::Push(units) => stack.extend((0..units).map(|_| 0)),
            Instruction::Pop(units) => {
                let len = stack.len() - units as usize;
                stack.truncate(len);
            }
            Instruction::PushConst(value) => stack.push(value),
            Instruction::PushVar(slot) => stack.push(var(&vars, slot)),
            Instruction::Swap4 => {
                let len = stack.len();
                stack.swap(len - 1, len - 2);
            }
            Instruction::Call { func, pop, .. } => {
                let args = stack.split_off(stack.len() - pop as usize);
                events.push(Event::Call { func, args });
            }
            Instruction::CopyVarToGlobal4 { global, src } => {
                events.push(Event::Global {
                    global,
                    value: var(&vars, src),
                });
            }
            Instruction::SetGlobal4 { global, value } => {
                events.push(Event::Global { global, value });
            }
            Instruction::Ret(_) => break,
            other => panic!("evaluator does not model {other}"),
        }
        cursor = next;
    }

    vars.retain(|&slot, _| !list.is_temporary(slot));
    events.push(Event::Return { vars });
    events
}

fn arith(op: ArithOp, lhs: u32, rhs: u32) -> u32 {
    match op {
        ArithOp::AddI => lhs.wrapping_add(rhs),
        ArithOp::SubI => lhs.wrapping_sub(rhs),
        ArithOp::MulI => lhs.wrapping_mul(rhs),
        ArithOp::And => lhs & rhs,
        other => panic!("no integer semantics for {other:?}"),
    }
}

fn compare(lhs: u32, rhs: u32) -> i32 {
    (lhs as i32).cmp(&(rhs as i32)) as i32
}
