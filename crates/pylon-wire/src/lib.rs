//! Wire-level implementation of the Pylon debug protocol.
//!
//! The protocol is a private, bidirectional, length-unframed binary stream
//! over TCP: every message starts with a fixed 4-byte ASCII tag and is
//! followed by a tag-specific payload of little-endian `i32`s and
//! length-prefixed UTF-8 strings. There is no outer frame length, so the
//! receiver must know each payload layout and read it field by field; an
//! unrecognized tag means the stream can never be resynchronized and is a
//! fatal decode error.
//!
//! `pylon-debugger` consumes this crate to talk to the debuggee-side
//! bootstrap running inside the target interpreter.

mod codec;
mod event;

use std::io;

use thiserror::Error;

pub use codec::{read_i32, read_string, read_tag_bytes, WireWriter};
pub use event::{Event, FramePayload, ValuePayload};

// The mock debuggee is only needed for tests and downstream integration
// suites. Compile it for pylon-wire's own unit tests unconditionally (via
// `cfg(test)`), while keeping it behind the `test-support` feature for
// normal builds and for downstream crates.
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub type ThreadId = i32;
pub type BreakpointId = i32;
pub type CorrelationId = i32;
pub type FrameIndex = i32;

pub type Result<T> = std::result::Result<T, WireError>;

#[derive(Error, Debug)]
pub enum WireError {
    /// Four tag bytes that match no known message. The stream is
    /// irrecoverably desynchronized once this happens.
    #[error("unknown wire tag {:?}", String::from_utf8_lossy(.0))]
    UnknownTag([u8; 4]),
    #[error("wire protocol error: {0}")]
    Protocol(String),
    #[error("wire string was not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Messages sent by the debugger to the debuggee.
///
/// The four lowercase bytes of each tag are the public wire contract and
/// must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandTag {
    /// Acknowledge the debuggee's exit notification.
    ExitAck,
    StepInto,
    StepOut,
    StepOver,
    BreakAll,
    SetBreakpoint,
    SetBreakpointCondition,
    RemoveBreakpoint,
    ResumeAll,
    RequestFrames,
    Execute,
    ResumeThread,
    ClearStepping,
    SetLineNumber,
    EnumChildren,
    Detach,
    SetExceptionInfo,
    SetExceptionHandlerInfo,
}

impl CommandTag {
    pub fn bytes(self) -> [u8; 4] {
        match self {
            CommandTag::ExitAck => *b"exit",
            CommandTag::StepInto => *b"stpi",
            CommandTag::StepOut => *b"stpo",
            CommandTag::StepOver => *b"stpv",
            CommandTag::BreakAll => *b"brka",
            CommandTag::SetBreakpoint => *b"brkp",
            CommandTag::SetBreakpointCondition => *b"brkc",
            CommandTag::RemoveBreakpoint => *b"brkr",
            CommandTag::ResumeAll => *b"resa",
            CommandTag::RequestFrames => *b"thrf",
            CommandTag::Execute => *b"exec",
            CommandTag::ResumeThread => *b"rest",
            CommandTag::ClearStepping => *b"clst",
            CommandTag::SetLineNumber => *b"setl",
            CommandTag::EnumChildren => *b"chld",
            CommandTag::Detach => *b"detc",
            CommandTag::SetExceptionInfo => *b"sexi",
            CommandTag::SetExceptionHandlerInfo => *b"sehi",
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self> {
        Ok(match &bytes {
            b"exit" => CommandTag::ExitAck,
            b"stpi" => CommandTag::StepInto,
            b"stpo" => CommandTag::StepOut,
            b"stpv" => CommandTag::StepOver,
            b"brka" => CommandTag::BreakAll,
            b"brkp" => CommandTag::SetBreakpoint,
            b"brkc" => CommandTag::SetBreakpointCondition,
            b"brkr" => CommandTag::RemoveBreakpoint,
            b"resa" => CommandTag::ResumeAll,
            b"thrf" => CommandTag::RequestFrames,
            b"exec" => CommandTag::Execute,
            b"rest" => CommandTag::ResumeThread,
            b"clst" => CommandTag::ClearStepping,
            b"setl" => CommandTag::SetLineNumber,
            b"chld" => CommandTag::EnumChildren,
            b"detc" => CommandTag::Detach,
            b"sexi" => CommandTag::SetExceptionInfo,
            b"sehi" => CommandTag::SetExceptionHandlerInfo,
            _ => return Err(WireError::UnknownTag(bytes)),
        })
    }
}

/// Messages sent by the debuggee to the debugger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventTag {
    ExceptionRaised,
    BreakpointHit,
    ThreadCreated,
    ThreadExited,
    ModuleLoaded,
    StepDone,
    ProcessExited,
    BreakpointBindSucceeded,
    BreakpointBindFailed,
    ProcessLoaded,
    ThreadFrameList,
    EvaluationResult,
    EvaluationError,
    AsyncBreakComplete,
    SetLineResult,
    Children,
    Output,
    HandlersRequested,
    Detached,
}

impl EventTag {
    pub fn bytes(self) -> [u8; 4] {
        match self {
            EventTag::ExceptionRaised => *b"EXCP",
            EventTag::BreakpointHit => *b"BRKH",
            EventTag::ThreadCreated => *b"NEWT",
            EventTag::ThreadExited => *b"EXTT",
            EventTag::ModuleLoaded => *b"MODL",
            EventTag::StepDone => *b"STPD",
            EventTag::ProcessExited => *b"EXIT",
            EventTag::BreakpointBindSucceeded => *b"BRKS",
            EventTag::BreakpointBindFailed => *b"BRKF",
            EventTag::ProcessLoaded => *b"LOAD",
            EventTag::ThreadFrameList => *b"THRF",
            EventTag::EvaluationResult => *b"EXCR",
            EventTag::EvaluationError => *b"EXCE",
            EventTag::AsyncBreakComplete => *b"ASBR",
            EventTag::SetLineResult => *b"SETL",
            EventTag::Children => *b"CHLD",
            EventTag::Output => *b"OUTP",
            EventTag::HandlersRequested => *b"REQH",
            EventTag::Detached => *b"DETC",
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self> {
        Ok(match &bytes {
            b"EXCP" => EventTag::ExceptionRaised,
            b"BRKH" => EventTag::BreakpointHit,
            b"NEWT" => EventTag::ThreadCreated,
            b"EXTT" => EventTag::ThreadExited,
            b"MODL" => EventTag::ModuleLoaded,
            b"STPD" => EventTag::StepDone,
            b"EXIT" => EventTag::ProcessExited,
            b"BRKS" => EventTag::BreakpointBindSucceeded,
            b"BRKF" => EventTag::BreakpointBindFailed,
            b"LOAD" => EventTag::ProcessLoaded,
            b"THRF" => EventTag::ThreadFrameList,
            b"EXCR" => EventTag::EvaluationResult,
            b"EXCE" => EventTag::EvaluationError,
            b"ASBR" => EventTag::AsyncBreakComplete,
            b"SETL" => EventTag::SetLineResult,
            b"CHLD" => EventTag::Children,
            b"OUTP" => EventTag::Output,
            b"REQH" => EventTag::HandlersRequested,
            b"DETC" => EventTag::Detached,
            _ => return Err(WireError::UnknownTag(bytes)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for tag in [
            CommandTag::ExitAck,
            CommandTag::SetBreakpoint,
            CommandTag::SetExceptionHandlerInfo,
        ] {
            assert_eq!(CommandTag::from_bytes(tag.bytes()).unwrap(), tag);
        }
        for tag in [
            EventTag::ExceptionRaised,
            EventTag::ThreadFrameList,
            EventTag::Detached,
        ] {
            assert_eq!(EventTag::from_bytes(tag.bytes()).unwrap(), tag);
        }
    }

    #[test]
    fn unknown_tag_is_a_typed_error() {
        match EventTag::from_bytes(*b"WHAT") {
            Err(WireError::UnknownTag(bytes)) => assert_eq!(&bytes, b"WHAT"),
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }
}
