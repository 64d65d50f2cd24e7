use pylon_wire::{BreakpointId, ThreadId};

use crate::model::{ExceptionInfo, Module};

/// Session notifications raised by the receive loop.
///
/// These are the only feedback channel for fire-and-forget operations
/// (breakpoint binds, steps, async breaks) and for everything the target
/// initiates on its own.
#[derive(Clone, Debug)]
pub enum DebugEvent {
    /// The process is up and broken into the debugger before any user code
    /// has run.
    ProcessLoaded { thread_id: ThreadId },
    ThreadCreated { thread_id: ThreadId },
    ThreadExited { thread_id: ThreadId },
    StepComplete { thread_id: ThreadId },
    AsyncBreakComplete { thread_id: ThreadId },
    ProcessExited { exit_code: i32 },
    ModuleLoaded { module: Module },
    ExceptionRaised {
        thread_id: ThreadId,
        exception: ExceptionInfo,
    },
    BreakpointHit {
        breakpoint_id: BreakpointId,
        thread_id: ThreadId,
    },
    BreakpointBindSucceeded { breakpoint_id: BreakpointId },
    BreakpointBindFailed { breakpoint_id: BreakpointId },
    /// Redirected stdout/stderr, tagged with the originating thread.
    Output { thread_id: ThreadId, text: String },
}
