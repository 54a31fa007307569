use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::types::ValueType;

/// One entry on the operand type stack: either a concrete type or the
/// sticky polymorphic "any" sentinel used to model unreachable code
/// (§4.4, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StackType {
    Known(ValueType),
    Any,
}

/// The per-function operand type stack (§3, §4.4).
///
/// `push`/`pop` implement the "any" sentinel's sticky semantics: once an
/// `Any` is on top, further pushes are suppressed and further pops keep
/// returning `Any` without shrinking the stack. This is what lets
/// unreachable code after `unreachable`/`br`/`return`/`br_table` validate
/// without the validator having to special-case every subsequent operator.
#[derive(Debug, Default)]
pub struct TypeStack {
    entries: Vec<StackType>,
}

/// A popped operand: either a known type or the polymorphic sentinel,
/// which compares equal to any expected type (§4.4 `check_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popped {
    Known(ValueType),
    Any,
}

impl Popped {
    pub fn check(self, expected: ValueType) -> Result<()> {
        match self {
            Popped::Any => Ok(()),
            Popped::Known(actual) if actual == expected => Ok(()),
            Popped::Known(actual) => Err(Error::validation(alloc::format!(
                "type mismatch: expected {}, found {}",
                expected, actual
            ))),
        }
    }

    pub fn value_type(self) -> Option<ValueType> {
        match self {
            Popped::Known(t) => Some(t),
            Popped::Any => None,
        }
    }
}

impl TypeStack {
    pub fn new() -> Self {
        TypeStack::default()
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn top_is_any(&self) -> bool {
        matches!(self.entries.last(), Some(StackType::Any))
    }

    pub fn push(&mut self, value_type: ValueType) {
        if self.top_is_any() {
            return;
        }
        self.entries.push(StackType::Known(value_type));
    }

    pub fn push_any(&mut self) {
        self.entries.push(StackType::Any);
    }

    /// Pops one operand, returning `Any` without shrinking if `Any` is on
    /// top, matching the sticky-polymorphism rule of §4.4.
    pub fn pop(&mut self) -> Result<Popped> {
        match self.entries.last().copied() {
            None => Err(Error::validation("operand stack underflow")),
            Some(StackType::Any) => Ok(Popped::Any),
            Some(StackType::Known(t)) => {
                self.entries.pop();
                Ok(Popped::Known(t))
            }
        }
    }

    pub fn pop_expect(&mut self, expected: ValueType) -> Result<()> {
        self.pop()?.check(expected)
    }

    /// Truncates to `floor`, discarding anything above it (used on frame
    /// entry to unreachable-mode and by `reset_to_floor`).
    pub fn truncate_to(&mut self, floor: u32) {
        self.entries.truncate(floor as usize);
    }

    /// Enters polymorphic/unreachable mode for the current frame: resets
    /// to `floor` and pushes the sticky `Any` sentinel (§4.4).
    pub fn mark_unreachable(&mut self, floor: u32) {
        self.truncate_to(floor);
        self.push_any();
    }

    /// The exact count of entries above `floor`, used by `end`'s "exact
    /// excess count" check (§4.5).
    pub fn height_above(&self, floor: u32) -> u32 {
        self.len() - floor
    }

    pub fn nth_from_top(&self, depth_from_top: u32) -> Option<ValueType> {
        let index = self.entries.len().checked_sub(1 + depth_from_top as usize)?;
        match self.entries.get(index)? {
            StackType::Known(t) => Some(*t),
            StackType::Any => None,
        }
    }
}

/// The kind of a control frame (§3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Func,
    Block,
    Loop,
    If,
    Else,
}

/// One entry on the per-function control frame stack (§3, §4.4).
#[derive(Debug, Clone, Copy)]
pub struct ControlFrame {
    pub kind: FrameKind,
    pub signature: Option<ValueType>,
    /// `type_stack` length recorded at frame entry.
    pub floor: u32,
    /// Loop: istream offset of the loop's entry point, resolved
    /// immediately. Block/If/Else (mid-construction): `None`, resolved
    /// later via the depth-fixup list.
    pub offset: Option<u32>,
    /// If/Else only: istream offset of the pending conditional/unconditional
    /// jump operand that must be patched when the frame transitions or closes.
    pub fixup_offset: Option<u32>,
}

impl ControlFrame {
    /// Arity of a branch targeting this frame: 0 for `Loop` (back-edges
    /// carry no value), else the frame's signature size (§4.4 glossary).
    pub fn branch_arity(&self) -> u32 {
        if self.kind == FrameKind::Loop {
            0
        } else {
            self.signature.is_some() as u32
        }
    }
}

/// The per-function control frame stack plus its per-depth fixup lists
/// (§3, §4.7).
#[derive(Debug, Default)]
pub struct ControlStack {
    frames: Vec<ControlFrame>,
    /// `depth_fixups[i]` holds istream offsets of forward branch targets
    /// still pending resolution for the frame at stack index `i`.
    depth_fixups: Vec<Vec<u32>>,
}

impl ControlStack {
    pub fn new() -> Self {
        ControlStack::default()
    }

    pub fn depth(&self) -> u32 {
        self.frames.len() as u32
    }

    pub fn push(&mut self, frame: ControlFrame) {
        self.frames.push(frame);
        self.depth_fixups.push(Vec::new());
    }

    pub fn top(&self) -> Result<&ControlFrame> {
        self.frames
            .last()
            .ok_or_else(|| Error::validation("control frame stack underflow"))
    }

    pub fn top_mut(&mut self) -> Result<&mut ControlFrame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::validation("control frame stack underflow"))
    }

    /// Translates a Wasm "levels up" branch depth into a bottom-up frame
    /// index (§4.5 `br depth`).
    pub fn frame_index_for_branch_depth(&self, depth: u32) -> Result<u32> {
        let len = self.depth();
        if depth >= len {
            return Err(Error::validation("branch depth exceeds control stack"));
        }
        Ok(len - 1 - depth)
    }

    pub fn frame_at(&self, index: u32) -> &ControlFrame {
        &self.frames[index as usize]
    }

    /// Records a forward fixup site for the frame at `frame_index`.
    pub fn add_depth_fixup(&mut self, frame_index: u32, istream_offset: u32) {
        self.depth_fixups[frame_index as usize].push(istream_offset);
    }

    /// Pops the top frame, returning it along with its now-final fixup
    /// list (drained — §4.7 "Drained on `end`").
    pub fn pop(&mut self) -> Result<(ControlFrame, Vec<u32>)> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::validation("control frame stack underflow"))?;
        let fixups = self
            .depth_fixups
            .pop()
            .unwrap_or_default();
        Ok((frame, fixups))
    }
}
