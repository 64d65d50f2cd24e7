use pylon_wire::{FrameIndex, FramePayload, ThreadId, ValuePayload};

/// Python language level of the target interpreter, as reported at launch
/// or discovered during attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LanguageVersion {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A module loaded by the target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Module {
    pub id: i32,
    pub filename: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub description: String,
}

/// Default-mode plus per-type overrides for when the target should break
/// on a raised exception.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionBreakOverride {
    pub name: String,
    pub mode: i32,
}

/// A thread inside the target process.
///
/// The frame list is transient: it is replaced wholesale every time a
/// frame-list response arrives and is never updated incrementally.
#[derive(Clone, Debug)]
pub struct DebugThread {
    pub id: ThreadId,
    /// The implicitly created initial thread, corresponding to the process
    /// main thread. Every later thread is a worker.
    pub is_main: bool,
    pub frames: Vec<StackFrame>,
}

/// One frame of a thread's call stack at a point in time.
#[derive(Clone, Debug)]
pub struct StackFrame {
    pub thread_id: ThreadId,
    pub name: String,
    pub file: String,
    /// First and last line of the enclosing code block.
    pub start_line: i32,
    pub end_line: i32,
    /// Current line. Mutable: a successful set-line operation rewrites the
    /// active statement of frame 0.
    pub line: i32,
    pub arg_count: i32,
    pub frame_index: FrameIndex,
    /// Locals and arguments, evaluated eagerly by the target and
    /// transmitted inline with the frame list.
    pub variables: Vec<EvaluationResult>,
}

impl StackFrame {
    pub(crate) fn from_payload(
        thread_id: ThreadId,
        frame_index: FrameIndex,
        payload: &FramePayload,
    ) -> Self {
        let variables = payload
            .variables
            .iter()
            .map(|(name, value)| {
                EvaluationResult::from_value(name.clone(), value, thread_id, frame_index)
            })
            .collect();
        Self {
            thread_id,
            name: payload.name.clone(),
            file: payload.file.clone(),
            start_line: payload.start_line,
            end_line: payload.end_line,
            line: payload.line,
            arg_count: payload.arg_count,
            frame_index,
            variables,
        }
    }
}

/// The outcome of evaluating one expression or enumerating one child.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationResult {
    /// The expression that produced this value.
    pub expression: String,
    pub repr: String,
    /// Hex rendering for numeric display; empty for non-numerics.
    pub hex_repr: String,
    pub type_name: String,
    /// Access-expression fragment for a child member (`[0]`, `.field`);
    /// empty for top-level results.
    pub child_expression: String,
    pub is_index_child: bool,
    pub is_enumerate_child: bool,
    /// Whether the value has children worth an EnumChildren request.
    pub expandable: bool,
    /// Set when the evaluation raised instead of producing a value; the
    /// exception text replaces the representation.
    pub exception_text: Option<String>,
    pub thread_id: ThreadId,
    pub frame_index: FrameIndex,
}

impl EvaluationResult {
    pub(crate) fn from_value(
        expression: String,
        value: &ValuePayload,
        thread_id: ThreadId,
        frame_index: FrameIndex,
    ) -> Self {
        Self {
            expression,
            repr: value.repr.clone(),
            hex_repr: value.hex_repr.clone(),
            type_name: value.type_name.clone(),
            child_expression: String::new(),
            is_index_child: false,
            is_enumerate_child: false,
            expandable: value.expandable,
            exception_text: None,
            thread_id,
            frame_index,
        }
    }

    pub(crate) fn child(
        expression: String,
        child_expression: String,
        value: &ValuePayload,
        is_index_child: bool,
        is_enumerate_child: bool,
        thread_id: ThreadId,
        frame_index: FrameIndex,
    ) -> Self {
        Self {
            child_expression,
            is_index_child,
            is_enumerate_child,
            ..Self::from_value(expression, value, thread_id, frame_index)
        }
    }

    pub(crate) fn error(
        expression: String,
        exception_text: String,
        thread_id: ThreadId,
        frame_index: FrameIndex,
    ) -> Self {
        Self {
            expression,
            repr: String::new(),
            hex_repr: String::new(),
            type_name: String::new(),
            child_expression: String::new(),
            is_index_child: false,
            is_enumerate_child: false,
            expandable: false,
            exception_text: Some(exception_text),
            thread_id,
            frame_index,
        }
    }

    pub fn is_error(&self) -> bool {
        self.exception_text.is_some()
    }
}
