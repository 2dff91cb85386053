//! Liveness queries backing the peephole rewriter.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::bytecode::{InstrRef, Instruction, InstructionList, JumpTarget, LabelId, Var};

/// Whether the value written to temporary `var` by `def` may be read later.
///
/// Explores every path out of `def`. A path stops at a return or suspend
/// and at an instruction that overwrites `var`. Conditional jumps fork the
/// search; a shared closed set keeps back edges from looping. A computed
/// jump, or a jump whose target cannot be found, answers `true`: the
/// optimization relying on the answer is then skipped.
pub fn is_temp_var_read(
    list: &InstructionList,
    labels: &HashMap<LabelId, InstrRef>,
    def: InstrRef,
    var: Var,
) -> bool {
    let Some(start) = list.next(def) else {
        return false;
    };

    let mut open: SmallVec<[InstrRef; 8]> = SmallVec::new();
    let mut seen: HashSet<InstrRef> = HashSet::new();
    open.push(start);
    seen.insert(start);

    while let Some(entry) = open.pop() {
        let mut cursor = Some(entry);
        while let Some(at) = cursor {
            let instruction = &list[at];
            let access = instruction.var_access();
            if access.reads_var(var) {
                return true;
            }
            if access.writes_var(var) || instruction.ends_temporaries() {
                break;
            }

            match *instruction {
                Instruction::Jump(target) => {
                    match jump_dest(labels, target) {
                        Some(dest) => {
                            if seen.insert(dest) {
                                open.push(dest);
                            }
                        }
                        None => return true,
                    }
                    break;
                }
                Instruction::Branch { target, .. } => match jump_dest(labels, target) {
                    Some(dest) => {
                        if seen.insert(dest) {
                            open.push(dest);
                        }
                    }
                    None => return true,
                },
                Instruction::JumpPtr { .. } => return true,
                _ => {}
            }

            cursor = list.next(at);
        }
    }

    false
}

fn jump_dest(labels: &HashMap<LabelId, InstrRef>, target: JumpTarget) -> Option<InstrRef> {
    match target {
        JumpTarget::Label(label) => labels.get(&label).copied(),
        JumpTarget::Offset(_) => None,
    }
}

/// Whether the value register set by `def` is read before it is clobbered.
///
/// Straight-line scan only: any jump or label ends it.
pub fn is_temp_reg_used(list: &InstructionList, def: InstrRef) -> bool {
    let mut cursor = list.next(def);
    while let Some(at) = cursor {
        let instruction = &list[at];
        if instruction.reads_register() {
            return true;
        }
        if instruction.clobbers_register() {
            return false;
        }
        cursor = list.next(at);
    }
    false
}
