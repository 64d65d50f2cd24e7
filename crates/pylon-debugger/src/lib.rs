//! Debugger back end for Python targets.
//!
//! A [`DebugController`] owns one debuggee: it launches (or attaches to) a
//! target interpreter, rendezvouses with the socket the in-process
//! bootstrap opens back to the [`ConnectionListener`], and then mediates
//! breakpoints, stepping, exception handling, stack inspection, and
//! expression evaluation over the `pylon-wire` protocol.
//!
//! Inbound frames are decoded on a per-controller receive task and surface
//! as [`DebugEvent`]s on a broadcast channel — the sole notification
//! channel; there is no polling API. Outbound commands are issued from the
//! caller's task and serialize onto the socket through a send lock.

mod attach;
mod breakpoint;
mod config;
mod controller;
mod error;
mod events;
mod ids;
mod listener;
mod model;
mod path_map;

pub use attach::{AttachError, AttachStart, Attacher};
pub use breakpoint::Breakpoint;
pub use config::DebuggerConfig;
pub use controller::{DebugController, DebugOptions, LaunchOptions};
pub use error::{DebugError, Result};
pub use events::DebugEvent;
pub use listener::ConnectionListener;
pub use model::{
    DebugThread, EvaluationResult, ExceptionBreakOverride, ExceptionInfo, LanguageVersion, Module,
    StackFrame,
};
pub use path_map::{PathMapping, PathMappings};

pub use pylon_wire::{BreakpointId, CorrelationId, FrameIndex, ThreadId};
