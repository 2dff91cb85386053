//! Control-flow reachability and stack-depth analysis.

use hashbrown::HashMap;

use crate::{
    ToString, Vec, format,
    bytecode::{InstrRef, Instruction, InstructionList, JumpTarget, LabelId, Var},
    finalize::{
        Diagnostic, FinalizeError,
        labels::{label_index, positions},
    },
};

/// Result of [`analyze`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    /// Largest stack depth on any path, in code units.
    pub max_stack_depth: u32,
    /// Number of unreachable instructions deleted.
    pub removed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Walks every path from the head of the list, annotating each reachable
/// instruction with its incoming stack depth, then deletes the rest.
///
/// Stack-relative address placeholders are turned into frame addresses on
/// the way, since the depth at that point is now known.
///
/// Fails if two paths reach an instruction with different depths, if the
/// depth drops below zero, if a jump target does not exist, or if a
/// computed jump declares more targets than there are instructions after it.
pub fn analyze(list: &mut InstructionList) -> Result<Analysis, FinalizeError> {
    list.clear_depths();
    let targets = Targets::new(list)?;

    let mut walker = Walker {
        targets: &targets,
        worklist: Vec::new(),
        max_depth: 0,
    };
    if let Some(head) = list.head() {
        walker.worklist.push((head, 0));
    }
    while let Some((entry, depth)) = walker.worklist.pop() {
        walker.walk(list, entry, depth)?;
    }

    let unreachable: Vec<InstrRef> = list
        .iter()
        .filter(|&(at, _)| !list.visited(at))
        .map(|(at, _)| at)
        .collect();
    for &at in &unreachable {
        list.remove(at);
    }

    let max_stack_depth = walker.max_depth as u32;
    list.set_max_stack_depth(max_stack_depth);

    let mut diagnostics = Vec::new();
    if !unreachable.is_empty() {
        tracing::debug!(removed = unreachable.len(), "removed unreachable instructions");
        diagnostics.push(Diagnostic::info(format!(
            "removed {} unreachable instruction(s)",
            unreachable.len()
        )));
    }
    tracing::debug!(max_stack_depth, "stack depth analysis done");

    Ok(Analysis {
        max_stack_depth,
        removed: unreachable.len(),
        diagnostics,
    })
}

/// Lookup of jump destinations, both symbolic and already resolved.
struct Targets {
    labels: HashMap<LabelId, InstrRef>,
    positions: HashMap<InstrRef, u32>,
    /// First instruction at each code position.
    at_position: HashMap<u32, InstrRef>,
}

impl Targets {
    fn new(list: &InstructionList) -> Result<Self, FinalizeError> {
        let labels = label_index(list)?;
        let positions = positions(list);
        let mut at_position = HashMap::with_capacity(positions.len());
        for (at, _) in list.iter() {
            at_position.entry(positions[&at]).or_insert(at);
        }
        Ok(Self {
            labels,
            positions,
            at_position,
        })
    }

    fn resolve(
        &self,
        jump: InstrRef,
        size: u32,
        target: JumpTarget,
    ) -> Result<InstrRef, FinalizeError> {
        match target {
            JumpTarget::Label(label) => self
                .labels
                .get(&label)
                .copied()
                .ok_or(FinalizeError::DanglingLabel(label)),
            JumpTarget::Offset(offset) => {
                let after_jump = self.positions[&jump] + size;
                let position = after_jump as i64 + offset as i64;
                u32::try_from(position)
                    .ok()
                    .and_then(|position| self.at_position.get(&position).copied())
                    .ok_or(FinalizeError::JumpOutOfRange { offset })
            }
        }
    }
}

struct Walker<'a> {
    targets: &'a Targets,
    worklist: Vec<(InstrRef, i32)>,
    max_depth: i32,
}

impl Walker<'_> {
    /// Follows one path until it ends or merges into an analyzed instruction.
    fn walk(
        &mut self,
        list: &mut InstructionList,
        entry: InstrRef,
        incoming: i32,
    ) -> Result<(), FinalizeError> {
        let mut cursor = Some(entry);
        let mut depth = incoming;

        while let Some(at) = cursor {
            if let Some(recorded) = list.depth(at) {
                if recorded != depth {
                    return Err(FinalizeError::StackDepthMismatch {
                        instruction: list[at].to_string(),
                        recorded,
                        incoming: depth,
                    });
                }
                return Ok(());
            }
            list.set_depth(at, depth);

            let mut instruction = list[at];
            if let Instruction::PushStackAddr(offset) = instruction {
                let slot = Var::try_from(offset as i32 + depth)
                    .map_err(|_| FinalizeError::FrameSlotOutOfRange { offset, depth })?;
                instruction = Instruction::PushFrameAddr(slot);
                list.replace(at, instruction);
            }

            depth += instruction.stack_effect();
            if depth < 0 {
                return Err(FinalizeError::StackUnderflow {
                    instruction: instruction.to_string(),
                    depth,
                });
            }
            self.max_depth = self.max_depth.max(depth);

            match instruction {
                Instruction::Jump(target) => {
                    let dest = self.targets.resolve(at, instruction.size(), target)?;
                    self.worklist.push((dest, depth));
                    return Ok(());
                }
                Instruction::Branch { target, .. } => {
                    let dest = self.targets.resolve(at, instruction.size(), target)?;
                    self.worklist.push((dest, depth));
                }
                Instruction::JumpPtr { fan_out, .. } => {
                    let mut next = list.next(at);
                    for taken in 0..fan_out {
                        let Some(dest) = next else {
                            return Err(FinalizeError::FanOutExceeded {
                                declared: fan_out,
                                available: taken,
                            });
                        };
                        self.worklist.push((dest, depth));
                        next = list.next(dest);
                    }
                    return Ok(());
                }
                Instruction::Ret(_) => return Ok(()),
                _ => {}
            }

            cursor = list.next(at);
        }

        Ok(())
    }
}
