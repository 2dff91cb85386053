//! Tests for label resolution.

use pretty_assertions::assert_eq;

use crate::{
    Vec,
    bytecode::{Condition, Instruction, InstructionList, JumpTarget, LabelId, SourcePos},
    finalize::{FinalizeError, resolve_labels},
};

fn contents(list: &InstructionList) -> Vec<Instruction> {
    list.iter().map(|(_, instruction)| *instruction).collect()
}

#[test]
fn test_forward_jump() {
    let mut list = InstructionList::new();
    list.branch(Condition::Zero, LabelId(0));
    list.emit(Instruction::PushConst(1));
    list.label(LabelId(0));
    list.ret(0);

    assert_eq!(resolve_labels(&mut list), Ok(1));
    assert_eq!(
        contents(&list)[0],
        Instruction::Branch {
            cond: Condition::Zero,
            target: JumpTarget::Offset(2),
        }
    );
}

#[test]
fn test_backward_jump() {
    let mut list = InstructionList::new();
    list.label(LabelId(0));
    list.emit(Instruction::Suspend);
    list.jump(LabelId(0));

    resolve_labels(&mut list).unwrap();

    assert_eq!(
        contents(&list)[2],
        Instruction::Jump(JumpTarget::Offset(-3))
    );
}

#[test]
fn test_jump_to_following_label_has_zero_distance() {
    let mut list = InstructionList::new();
    list.jump(LabelId(4));
    list.label(LabelId(4));
    list.ret(0);

    resolve_labels(&mut list).unwrap();

    assert_eq!(contents(&list)[0], Instruction::Jump(JumpTarget::Offset(0)));
}

#[test]
fn test_cued_line_markers_count() {
    let mut list: InstructionList = [
        Instruction::Jump(JumpTarget::Label(LabelId(0))),
        Instruction::Line {
            pos: SourcePos::new(3, 0),
            cue: true,
        },
        Instruction::Line {
            pos: SourcePos::new(4, 0),
            cue: false,
        },
        Instruction::Label(LabelId(0)),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    resolve_labels(&mut list).unwrap();

    assert_eq!(contents(&list)[0], Instruction::Jump(JumpTarget::Offset(1)));
}

#[test]
fn test_dangling_label_leaves_list_untouched() {
    let mut list = InstructionList::new();
    list.jump(LabelId(0));
    list.jump(LabelId(7));
    list.label(LabelId(0));
    let before = contents(&list);

    assert_eq!(
        resolve_labels(&mut list),
        Err(FinalizeError::DanglingLabel(LabelId(7)))
    );
    assert_eq!(contents(&list), before);
}

#[test]
fn test_resolved_jumps_are_left_alone() {
    let mut list: InstructionList = [
        Instruction::Jump(JumpTarget::Offset(5)),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    assert_eq!(resolve_labels(&mut list), Ok(0));
    assert_eq!(contents(&list)[0], Instruction::Jump(JumpTarget::Offset(5)));
}
