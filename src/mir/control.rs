//! The control stack used while lowering.
//!
//! While the builder walks the AST, a stack of tagged frames tracks each
//! enclosing function, block, and loop: its kind, its label, the slot its
//! yielded value is stored into, and the blocks that `break`, `continue`,
//! and `return` jump to. Frame lookups mirror the local checker's
//! resolution rules: an unlabelled `yield` targets the innermost block, a
//! `break` the innermost loop, and loop lookups never cross a function
//! boundary.
//!
//! Lookup failures here are invariant violations: the checker has already
//! verified every `yield`/`break`/`continue` target, so a miss means the
//! builder and checker disagree. All of them panic.

use super::{BlockId, Value};

/// What a control frame was pushed for.
#[derive(Debug, Clone)]
pub enum FrameKind {
    /// The implicit function holding top-level statements.
    Script { exit: BlockId },
    Function { exit: BlockId, name: String },
    Plain,
    Loop {
        merge: BlockId,
        continue_block: BlockId,
    },
}

/// One enclosing block/loop/function during lowering.
#[derive(Debug, Clone)]
pub struct ControlFrame {
    pub kind: FrameKind,
    pub label: Option<String>,
    /// Pointer-typed slot the frame's yielded value is stored into, when the
    /// frame produces a value.
    pub yield_slot: Option<Value>,
}

/// A stack of [`ControlFrame`]s; the innermost frame is last.
#[derive(Debug, Default)]
pub struct ControlStack {
    frames: Vec<ControlFrame>,
}

impl ControlStack {
    pub fn new() -> Self {
        ControlStack::default()
    }

    pub fn push(&mut self, frame: ControlFrame) {
        if matches!(frame.kind, FrameKind::Script { .. }) && !self.frames.is_empty() {
            panic!("ControlStack::push: cannot add a script frame inside another frame");
        }
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> ControlFrame {
        self.frames
            .pop()
            .unwrap_or_else(|| panic!("ControlStack::pop: no frame to pop"))
    }

    /// The name of the function currently being lowered.
    pub fn current_function_name(&self) -> &str {
        for frame in self.frames.iter().rev() {
            match &frame.kind {
                FrameKind::Function { name, .. } => return name,
                FrameKind::Script { .. } => return "script",
                _ => {}
            }
        }
        panic!("ControlStack::current_function_name: no function in stack");
    }

    /// The frame a `yield` targets: the innermost frame, or the innermost
    /// frame with the matching label. Mirrors the checker's resolution.
    pub fn yield_target(&self, label: Option<&str>) -> &ControlFrame {
        self.innermost_block(label)
    }

    /// The block a `return` jumps to.
    pub fn function_exit(&self) -> BlockId {
        match &self.function_frame().kind {
            FrameKind::Function { exit, .. } | FrameKind::Script { exit } => *exit,
            _ => unreachable!(),
        }
    }

    /// The function frame's yield slot, i.e. the return-value slot.
    pub fn function_yield_slot(&self) -> Option<&Value> {
        self.function_frame().yield_slot.as_ref()
    }

    /// The merge block a `break` jumps to.
    pub fn loop_merge(&self, label: Option<&str>) -> BlockId {
        match &self.loop_frame(label).kind {
            FrameKind::Loop { merge, .. } => *merge,
            _ => unreachable!(),
        }
    }

    /// The loop frame's yield slot, written by `break value`.
    pub fn loop_yield_slot(&self, label: Option<&str>) -> Option<&Value> {
        self.loop_frame(label).yield_slot.as_ref()
    }

    /// The block a `continue` jumps to.
    pub fn loop_continue(&self, label: Option<&str>) -> BlockId {
        match &self.loop_frame(label).kind {
            FrameKind::Loop { continue_block, .. } => *continue_block,
            _ => unreachable!(),
        }
    }

    /// Innermost frame, or the innermost frame with a matching label.
    fn innermost_block(&self, label: Option<&str>) -> &ControlFrame {
        for frame in self.frames.iter().rev() {
            match label {
                None => return frame,
                Some(wanted) if frame.label.as_deref() == Some(wanted) => return frame,
                Some(_) => {}
            }
        }
        panic!("ControlStack::innermost_block: target block not found in stack");
    }

    fn function_frame(&self) -> &ControlFrame {
        for frame in self.frames.iter().rev() {
            if matches!(
                frame.kind,
                FrameKind::Function { .. } | FrameKind::Script { .. }
            ) {
                return frame;
            }
        }
        panic!("ControlStack::function_frame: no function in stack");
    }

    /// Innermost loop frame, without crossing a function boundary.
    fn loop_frame(&self, label: Option<&str>) -> &ControlFrame {
        for frame in self.frames.iter().rev() {
            match &frame.kind {
                FrameKind::Loop { .. } => match label {
                    None => return frame,
                    Some(wanted) if frame.label.as_deref() == Some(wanted) => return frame,
                    Some(_) => {}
                },
                FrameKind::Function { .. } | FrameKind::Script { .. } => break,
                FrameKind::Plain => {}
            }
        }
        panic!("ControlStack::loop_frame: target loop not found in stack");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn slot(name: &str) -> Value {
        Value::Temp {
            ty: Type::Pointer {
                base: Box::new(Type::I32),
                mutable: true,
            },
            name: name.to_string(),
        }
    }

    fn stack_with_loop() -> ControlStack {
        let mut stack = ControlStack::new();
        stack.push(ControlFrame {
            kind: FrameKind::Script { exit: BlockId(1) },
            label: None,
            yield_slot: Some(slot("ret")),
        });
        stack.push(ControlFrame {
            kind: FrameKind::Loop {
                merge: BlockId(4),
                continue_block: BlockId(3),
            },
            label: Some("outer".to_string()),
            yield_slot: None,
        });
        stack
    }

    #[test]
    fn unlabelled_break_finds_innermost_loop() {
        let stack = stack_with_loop();
        assert_eq!(stack.loop_merge(None), BlockId(4));
        assert_eq!(stack.loop_continue(None), BlockId(3));
    }

    #[test]
    fn labelled_lookup_matches_frame_label() {
        let mut stack = stack_with_loop();
        stack.push(ControlFrame {
            kind: FrameKind::Loop {
                merge: BlockId(8),
                continue_block: BlockId(7),
            },
            label: None,
            yield_slot: None,
        });
        assert_eq!(stack.loop_merge(None), BlockId(8));
        assert_eq!(stack.loop_merge(Some("outer")), BlockId(4));
    }

    #[test]
    #[should_panic(expected = "target loop not found")]
    fn loop_lookup_stops_at_function_boundary() {
        let mut stack = stack_with_loop();
        stack.push(ControlFrame {
            kind: FrameKind::Function {
                exit: BlockId(9),
                name: "f".to_string(),
            },
            label: None,
            yield_slot: None,
        });
        stack.loop_merge(None);
    }

    #[test]
    fn return_targets_enclosing_function_exit() {
        let mut stack = stack_with_loop();
        stack.push(ControlFrame {
            kind: FrameKind::Function {
                exit: BlockId(9),
                name: "f".to_string(),
            },
            label: None,
            yield_slot: None,
        });
        assert_eq!(stack.function_exit(), BlockId(9));
        assert_eq!(stack.current_function_name(), "f");
    }

    #[test]
    #[should_panic(expected = "cannot add a script frame inside another frame")]
    fn nested_script_frame_panics() {
        let mut stack = stack_with_loop();
        stack.push(ControlFrame {
            kind: FrameKind::Script { exit: BlockId(0) },
            label: None,
            yield_slot: None,
        });
    }
}
