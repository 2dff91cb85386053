//! Arena-backed doubly linked instruction list.
//!
//! Nodes live in a flat slot vector and link to each other through indices.
//! Every slot carries a generation counter that is bumped when the slot is
//! freed, so an [`InstrRef`] to a removed instruction can never observe the
//! instruction that later reuses its slot.

use core::fmt;
use core::ops::Index;

use hashbrown::HashSet;

use crate::{
    Vec,
    bytecode::{Instruction, LineTable, SourcePos, Var},
};

/// Sentinel index standing in for "no node".
const NONE: u32 = u32::MAX;

/// Generation-checked handle to an instruction in an [`InstructionList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrRef {
    index: u32,
    generation: u32,
}

struct Node {
    instruction: Instruction,
    prev: u32,
    next: u32,
    /// Stack depth on entry, recorded by the analyzer. `None` until visited.
    depth: Option<i32>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Ordered, owned instruction stream of one function body.
///
/// Insert-before, remove, move and replace are O(1). Besides the
/// instructions the list carries the set of compiler-private temporaries,
/// the line table and the maximum stack depth found by the analyzer.
pub struct InstructionList {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    len: usize,
    temporaries: HashSet<Var>,
    line_table: LineTable,
    max_stack_depth: u32,
}

impl InstructionList {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: NONE,
            tail: NONE,
            len: 0,
            temporaries: HashSet::new(),
            line_table: LineTable::new(),
            max_stack_depth: 0,
        }
    }

    // === Node storage ===

    fn allocate(&mut self, instruction: Instruction) -> u32 {
        let node = Node {
            instruction,
            prev: NONE,
            next: NONE,
            depth: None,
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                (self.slots.len() - 1) as u32
            }
        }
    }

    fn handle(&self, index: u32) -> Option<InstrRef> {
        if index == NONE {
            return None;
        }
        Some(InstrRef {
            index,
            generation: self.slots[index as usize].generation,
        })
    }

    fn try_node(&self, at: InstrRef) -> Option<&Node> {
        let slot = self.slots.get(at.index as usize)?;
        if slot.generation != at.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node(&self, at: InstrRef) -> &Node {
        match self.try_node(at) {
            Some(node) => node,
            None => panic!("stale instruction reference {:?}", at),
        }
    }

    fn node_mut(&mut self, at: InstrRef) -> &mut Node {
        let slot = match self.slots.get_mut(at.index as usize) {
            Some(slot) if slot.generation == at.generation => slot,
            _ => panic!("stale instruction reference {:?}", at),
        };
        match &mut slot.node {
            Some(node) => node,
            None => panic!("stale instruction reference {:?}", at),
        }
    }

    fn raw(&self, index: u32) -> &Node {
        match &self.slots[index as usize].node {
            Some(node) => node,
            None => panic!("instruction list link points at a vacant slot"),
        }
    }

    fn raw_mut(&mut self, index: u32) -> &mut Node {
        match &mut self.slots[index as usize].node {
            Some(node) => node,
            None => panic!("instruction list link points at a vacant slot"),
        }
    }

    /// Links a detached node in front of `before`, or at the tail if `before` is `NONE`.
    fn link_before(&mut self, index: u32, before: u32) {
        let prev = if before == NONE {
            self.tail
        } else {
            self.raw(before).prev
        };
        {
            let node = self.raw_mut(index);
            node.prev = prev;
            node.next = before;
        }
        if prev == NONE {
            self.head = index;
        } else {
            self.raw_mut(prev).next = index;
        }
        if before == NONE {
            self.tail = index;
        } else {
            self.raw_mut(before).prev = index;
        }
        self.len += 1;
    }

    fn unlink(&mut self, index: u32) -> (u32, u32) {
        let (prev, next) = {
            let node = self.raw(index);
            (node.prev, node.next)
        };
        if prev == NONE {
            self.head = next;
        } else {
            self.raw_mut(prev).next = next;
        }
        if next == NONE {
            self.tail = prev;
        } else {
            self.raw_mut(next).prev = prev;
        }
        self.len -= 1;
        (prev, next)
    }

    // === Insertion ===

    /// Appends an instruction at the tail.
    pub fn push_back(&mut self, instruction: Instruction) -> InstrRef {
        let index = self.allocate(instruction);
        self.link_before(index, NONE);
        InstrRef {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Prepends an instruction at the head.
    pub fn push_front(&mut self, instruction: Instruction) -> InstrRef {
        let head = self.head;
        let index = self.allocate(instruction);
        self.link_before(index, head);
        InstrRef {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Inserts an instruction immediately before `at`.
    ///
    /// # Panics
    ///
    /// Panics if `at` no longer refers to an instruction of this list.
    pub fn insert_before(&mut self, at: InstrRef, instruction: Instruction) -> InstrRef {
        self.node(at);
        let index = self.allocate(instruction);
        self.link_before(index, at.index);
        InstrRef {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    /// Moves an existing instruction in front of `before`. The handle stays valid.
    pub fn move_before(&mut self, at: InstrRef, before: InstrRef) {
        if at == before {
            return;
        }
        self.node(at);
        self.node(before);
        self.unlink(at.index);
        self.link_before(at.index, before.index);
    }

    /// Splices every instruction of `other` onto the tail of this list,
    /// leaving `other` empty. Temporaries of `other` become temporaries here
    /// and its line table rows are shifted to their new code positions.
    ///
    /// The two lists own separate arenas, so this moves each node and costs
    /// O(`other.len()`). Handles into `other` are invalidated.
    pub fn append(&mut self, other: &mut InstructionList) {
        let shift = self.code_size();
        for entry in other.line_table.entries() {
            self.line_table.record(
                shift + entry.position,
                SourcePos::new(entry.line, entry.column),
            );
        }

        let mut cursor = other.head;
        while cursor != NONE {
            let node = other.raw(cursor);
            let next = node.next;
            self.push_back(node.instruction);
            cursor = next;
        }
        self.temporaries.extend(other.temporaries.drain());
        *other = InstructionList::new();
    }

    // === Removal ===

    /// Removes `at` and returns where a traversal positioned on it should
    /// resume: its predecessor, or its successor when it was the head.
    ///
    /// # Panics
    ///
    /// Panics if `at` no longer refers to an instruction of this list.
    pub fn remove(&mut self, at: InstrRef) -> Option<InstrRef> {
        self.node(at);
        let (prev, next) = self.unlink(at.index);
        let slot = &mut self.slots[at.index as usize];
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(at.index);
        if prev != NONE {
            self.handle(prev)
        } else {
            self.handle(next)
        }
    }

    /// Overwrites an instruction as a whole, returning the previous one.
    pub fn replace(&mut self, at: InstrRef, instruction: Instruction) -> Instruction {
        core::mem::replace(&mut self.node_mut(at).instruction, instruction)
    }

    pub fn last(&self) -> Option<&Instruction> {
        self.tail().map(|at| &self[at])
    }

    pub fn remove_last(&mut self) -> Option<Instruction> {
        let tail = self.tail()?;
        let instruction = self[tail];
        self.remove(tail);
        Some(instruction)
    }

    // === Navigation ===

    pub fn head(&self) -> Option<InstrRef> {
        self.handle(self.head)
    }

    pub fn tail(&self) -> Option<InstrRef> {
        self.handle(self.tail)
    }

    pub fn next(&self, at: InstrRef) -> Option<InstrRef> {
        self.handle(self.node(at).next)
    }

    pub fn prev(&self, at: InstrRef) -> Option<InstrRef> {
        self.handle(self.node(at).prev)
    }

    /// Returns the instruction `at` refers to, or `None` for a stale handle.
    pub fn get(&self, at: InstrRef) -> Option<&Instruction> {
        self.try_node(at).map(|node| &node.instruction)
    }

    pub fn contains(&self, at: InstrRef) -> bool {
        self.try_node(at).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Sum of the encoded sizes of all instructions.
    pub fn code_size(&self) -> u32 {
        self.iter().map(|(_, instruction)| instruction.size()).sum()
    }

    // === Analysis annotations ===

    /// Stack depth on entry to `at`, available once the analyzer has visited it.
    pub fn depth(&self, at: InstrRef) -> Option<i32> {
        self.node(at).depth
    }

    pub fn visited(&self, at: InstrRef) -> bool {
        self.depth(at).is_some()
    }

    pub(crate) fn set_depth(&mut self, at: InstrRef, depth: i32) {
        self.node_mut(at).depth = Some(depth);
    }

    pub(crate) fn clear_depths(&mut self) {
        for slot in &mut self.slots {
            if let Some(node) = &mut slot.node {
                node.depth = None;
            }
        }
    }

    /// Largest stack depth reached on any path, in code units.
    pub fn max_stack_depth(&self) -> u32 {
        self.max_stack_depth
    }

    pub(crate) fn set_max_stack_depth(&mut self, depth: u32) {
        self.max_stack_depth = depth;
    }

    pub fn line_table(&self) -> &LineTable {
        &self.line_table
    }

    pub(crate) fn line_table_mut(&mut self) -> &mut LineTable {
        &mut self.line_table
    }

    // === Variables ===

    /// Marks `var` as a compiler-private temporary.
    pub fn define_temporary(&mut self, var: Var) {
        self.temporaries.insert(var);
    }

    pub fn is_temporary(&self, var: Var) -> bool {
        self.temporaries.contains(&var)
    }

    /// Every slot mentioned by any instruction, sorted.
    pub fn vars_used(&self) -> Vec<Var> {
        let mut vars: HashSet<Var> = HashSet::new();
        for (_, instruction) in self.iter() {
            let access = instruction.var_access();
            vars.extend(access.write);
            vars.extend(access.reads.iter().flatten().copied());
        }
        let mut vars: Vec<Var> = vars.into_iter().collect();
        vars.sort_unstable();
        vars
    }

    pub fn is_var_used(&self, var: Var) -> bool {
        self.iter().any(|(_, instruction)| {
            let access = instruction.var_access();
            access.writes_var(var) || access.reads_var(var)
        })
    }

    /// Renames every occurrence of slot `old` to `new`.
    pub fn exchange_var(&mut self, old: Var, new: Var) {
        let mut cursor = self.head;
        while cursor != NONE {
            let node = self.raw_mut(cursor);
            node.instruction = node
                .instruction
                .map_vars(|var| if var == old { new } else { var });
            cursor = node.next;
        }
    }

    /// Human-readable listing with code positions and analyzed depths.
    pub fn listing(&self) -> Listing<'_> {
        Listing { list: self }
    }
}

impl Default for InstructionList {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<InstrRef> for InstructionList {
    type Output = Instruction;

    fn index(&self, at: InstrRef) -> &Instruction {
        &self.node(at).instruction
    }
}

impl FromIterator<Instruction> for InstructionList {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        let mut list = InstructionList::new();
        for instruction in iter {
            list.push_back(instruction);
        }
        list
    }
}

impl fmt::Debug for InstructionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(_, instruction)| instruction))
            .finish()
    }
}

/// Iterator over `(handle, instruction)` pairs in list order.
pub struct Iter<'a> {
    list: &'a InstructionList,
    cursor: u32,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InstrRef, &'a Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        let at = self.list.handle(self.cursor)?;
        let node = self.list.raw(self.cursor);
        self.cursor = node.next;
        Some((at, &node.instruction))
    }
}

/// Display adapter produced by [`InstructionList::listing`].
pub struct Listing<'a> {
    list: &'a InstructionList,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "temporaries: {:?}", sorted_temporaries(self.list))?;
        writeln!(f, "max_stack_depth: {}", self.list.max_stack_depth)?;
        let mut position = 0u32;
        for (at, instruction) in self.list.iter() {
            if let Instruction::Label(label) = instruction {
                writeln!(f, "          {}:", label)?;
                continue;
            }
            match self.list.depth(at) {
                Some(depth) => write!(f, "{:5} {:3} ", position, depth)?,
                None => write!(f, "{:5}   - ", position)?,
            }
            writeln!(f, "  {}", instruction)?;
            position += instruction.size();
        }
        Ok(())
    }
}

fn sorted_temporaries(list: &InstructionList) -> Vec<Var> {
    let mut vars: Vec<Var> = list.temporaries.iter().copied().collect();
    vars.sort_unstable();
    vars
}
