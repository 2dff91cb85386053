//! Tests for reachability and stack-depth analysis.

use pretty_assertions::assert_eq;

use crate::{
    Vec,
    bytecode::{Condition, Instruction, InstructionList, JumpTarget, LabelId},
    finalize::{FinalizeError, Severity, analyze},
    test_utils::init_test_logging,
};

fn label(n: u32) -> JumpTarget {
    JumpTarget::Label(LabelId(n))
}

fn depths(list: &InstructionList) -> Vec<Option<i32>> {
    list.iter().map(|(at, _)| list.depth(at)).collect()
}

#[test]
fn test_straight_line_depths() {
    init_test_logging();
    let mut list: InstructionList = [
        Instruction::Push(2),
        Instruction::PushConst(1),
        Instruction::Pop(3),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    let analysis = analyze(&mut list).unwrap();

    assert_eq!(depths(&list), [Some(0), Some(2), Some(3), Some(0)]);
    assert_eq!(analysis.max_stack_depth, 3);
    assert_eq!(list.max_stack_depth(), 3);
    assert_eq!(analysis.removed, 0);
    assert!(analysis.diagnostics.is_empty());
}

#[test]
fn test_branch_paths_merge_with_equal_depth() {
    let mut list: InstructionList = [
        Instruction::Push(1),
        Instruction::Branch {
            cond: Condition::Zero,
            target: label(0),
        },
        Instruction::Push(1),
        Instruction::Pop(1),
        Instruction::Label(LabelId(0)),
        Instruction::Pop(1),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    let analysis = analyze(&mut list).unwrap();

    assert_eq!(
        depths(&list),
        [Some(0), Some(1), Some(1), Some(2), Some(1), Some(1), Some(0)]
    );
    assert_eq!(analysis.max_stack_depth, 2);
}

#[test]
fn test_branch_paths_merge_with_different_depth() {
    let mut list: InstructionList = [
        Instruction::Push(1),
        Instruction::Branch {
            cond: Condition::Zero,
            target: label(0),
        },
        Instruction::Push(1),
        Instruction::Label(LabelId(0)),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    let err = analyze(&mut list).unwrap_err();

    assert_eq!(
        err,
        FinalizeError::StackDepthMismatch {
            instruction: "L0:".into(),
            recorded: 2,
            incoming: 1,
        }
    );
}

#[test]
fn test_unreachable_code_is_removed() {
    init_test_logging();
    let mut list: InstructionList = [
        Instruction::Ret(0),
        Instruction::PushConst(1),
        Instruction::Pop(1),
        Instruction::Label(LabelId(9)),
    ]
    .into_iter()
    .collect();

    let analysis = analyze(&mut list).unwrap();

    assert_eq!(analysis.removed, 3);
    assert_eq!(list.len(), 1);
    assert_eq!(list.last(), Some(&Instruction::Ret(0)));
    assert_eq!(analysis.diagnostics.len(), 1);
    assert_eq!(analysis.diagnostics[0].severity, Severity::Info);
}

#[test]
fn test_code_skipped_by_jump_is_removed() {
    let mut list: InstructionList = [
        Instruction::Jump(label(0)),
        Instruction::PushConst(5),
        Instruction::Label(LabelId(0)),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    let analysis = analyze(&mut list).unwrap();

    assert_eq!(analysis.removed, 1);
    let remaining: Vec<Instruction> = list.iter().map(|(_, i)| *i).collect();
    assert_eq!(
        remaining,
        [
            Instruction::Jump(label(0)),
            Instruction::Label(LabelId(0)),
            Instruction::Ret(0),
        ]
    );
    assert!(list.iter().all(|(at, _)| list.visited(at)));
}

#[test]
fn test_stack_address_becomes_frame_address() {
    let mut list: InstructionList = [
        Instruction::Push(3),
        Instruction::PushStackAddr(1),
        Instruction::Pop(4),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    analyze(&mut list).unwrap();

    let rewritten: Vec<Instruction> = list.iter().map(|(_, i)| *i).collect();
    assert_eq!(rewritten[1], Instruction::PushFrameAddr(4));
}

#[test]
fn test_stack_address_outside_frame() {
    let mut list: InstructionList = [
        Instruction::Push(2),
        Instruction::PushStackAddr(i16::MAX),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    let err = analyze(&mut list).unwrap_err();
    assert_eq!(
        err,
        FinalizeError::FrameSlotOutOfRange {
            offset: i16::MAX,
            depth: 2,
        }
    );
    assert_eq!(err.code(), "F010");
}

#[test]
fn test_jump_to_missing_label() {
    let mut list: InstructionList = [Instruction::Jump(label(5)), Instruction::Ret(0)]
        .into_iter()
        .collect();

    assert_eq!(
        analyze(&mut list),
        Err(FinalizeError::DanglingLabel(LabelId(5)))
    );
}

#[test]
fn test_duplicate_label() {
    let mut list: InstructionList = [
        Instruction::Label(LabelId(0)),
        Instruction::Label(LabelId(0)),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    assert_eq!(
        analyze(&mut list),
        Err(FinalizeError::DuplicateLabel(LabelId(0)))
    );
}

#[test]
fn test_stack_underflow() {
    let mut list: InstructionList = [Instruction::Pop(1), Instruction::Ret(0)]
        .into_iter()
        .collect();

    let err = analyze(&mut list).unwrap_err();
    assert!(matches!(err, FinalizeError::StackUnderflow { depth: -1, .. }));
}

#[test]
fn test_computed_jump_reaches_whole_table() {
    let mut list = InstructionList::new();
    list.emit(Instruction::SetVar4 { dst: 1, value: 0 });
    list.jump_ptr(1, 2);
    list.jump(LabelId(0));
    list.jump(LabelId(1));
    list.label(LabelId(0));
    list.ret(0);
    list.label(LabelId(1));
    list.ret(0);

    let analysis = analyze(&mut list).unwrap();

    assert_eq!(analysis.removed, 0);
    assert_eq!(list.len(), 8);
}

#[test]
fn test_computed_jump_table_too_short() {
    let mut list = InstructionList::new();
    list.jump_ptr(1, 3);
    list.jump(LabelId(0));
    list.label(LabelId(0));

    assert_eq!(
        analyze(&mut list),
        Err(FinalizeError::FanOutExceeded {
            declared: 3,
            available: 2,
        })
    );
}

#[test]
fn test_resolved_offsets_are_followed() {
    // Jump over the two-unit constant push to the return.
    let mut list: InstructionList = [
        Instruction::Jump(JumpTarget::Offset(2)),
        Instruction::PushConst(7),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    let analysis = analyze(&mut list).unwrap();
    assert_eq!(analysis.removed, 1);

    let mut list: InstructionList = [Instruction::Jump(JumpTarget::Offset(40)), Instruction::Ret(0)]
        .into_iter()
        .collect();
    assert_eq!(
        analyze(&mut list),
        Err(FinalizeError::JumpOutOfRange { offset: 40 })
    );
}

#[test]
fn test_reanalysis_is_stable() {
    let mut list: InstructionList = [
        Instruction::Push(1),
        Instruction::Jump(label(0)),
        Instruction::Pop(1),
        Instruction::Label(LabelId(0)),
        Instruction::Pop(1),
        Instruction::Ret(0),
    ]
    .into_iter()
    .collect();

    let first = analyze(&mut list).unwrap();
    let second = analyze(&mut list).unwrap();

    assert_eq!(first.removed, 1);
    assert_eq!(second.removed, 0);
    assert_eq!(first.max_stack_depth, second.max_stack_depth);
}
