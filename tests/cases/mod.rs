#![allow(dead_code)]

use corvid::bytecode::{Condition, Instruction, JumpTarget, LabelId};

/// Declares a test that finalizes `input` and checks the encoded stream, or
/// the error the pipeline stops with.
///
/// ```ignore
/// finalize_case!(
///     name,
///     temporaries: [1],
///     input: [Instruction::SetVar4 { dst: 1, value: 5 }, Instruction::Ret(0)],
///     options: FinalizeOptions::default().with_optimize(false),  // optional
///     code: [0x0001_0020, 5, 0x7D],
/// );
/// ```
macro_rules! finalize_case {
    (@options) => {
        corvid::FinalizeOptions::default()
    };
    (@options $options:expr) => {
        $options
    };
    (
        $name:ident,
        temporaries: [$($temp:expr),* $(,)?],
        input: [$($instr:expr),* $(,)?],
        $(options: $options:expr,)?
        code: $code:expr $(,)?
    ) => {
        #[test]
        fn $name() {
            let mut list = corvid::InstructionList::new();
            $(list.define_temporary($temp);)*
            $(list.emit($instr);)*
            let options = finalize_case!(@options $($options)?);

            let code = match corvid::finalize(&mut list, &options) {
                Ok(code) => code,
                Err(err) => panic!("finalize failed: {err}"),
            };
            pretty_assertions::assert_eq!(code.code, $code);
            pretty_assertions::assert_eq!(code.code.len() as u32, list.code_size());
        }
    };
    (
        $name:ident,
        temporaries: [$($temp:expr),* $(,)?],
        input: [$($instr:expr),* $(,)?],
        $(options: $options:expr,)?
        error: $err:pat $(,)?
    ) => {
        #[test]
        fn $name() {
            let mut list = corvid::InstructionList::new();
            $(list.define_temporary($temp);)*
            $(list.emit($instr);)*
            let options = finalize_case!(@options $($options)?);

            let result = corvid::finalize(&mut list, &options);
            assert!(matches!(result, Err($err)), "unexpected result: {result:?}");
        }
    };
}

pub fn label(n: u32) -> Instruction {
    Instruction::Label(LabelId(n))
}

pub fn jump(n: u32) -> Instruction {
    Instruction::Jump(JumpTarget::Label(LabelId(n)))
}

pub fn branch(cond: Condition, n: u32) -> Instruction {
    Instruction::Branch {
        cond,
        target: JumpTarget::Label(LabelId(n)),
    }
}
