//! A scriptable fake debuggee used for unit/integration testing.
//!
//! It connects back to a listener the way the real bootstrap does (socket
//! plus debug-id string), then lets tests push event frames to the debugger
//! and decode the commands the debugger sends in return, without requiring
//! a Python interpreter on the system.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::TcpStream;

use crate::codec::{read_i32, read_string, read_tag_bytes, WireWriter};
use crate::{
    BreakpointId, CommandTag, CorrelationId, EventTag, FrameIndex, FramePayload, Result, ThreadId,
    ValuePayload,
};

pub struct MockDebuggee {
    stream: TcpStream,
}

/// A debugger-to-debuggee command, decoded from the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceivedCommand {
    ExitAck,
    StepInto { identity: i32 },
    StepOut { identity: i32 },
    StepOver { identity: i32 },
    BreakAll,
    SetBreakpoint {
        breakpoint_id: BreakpointId,
        line: i32,
        file: String,
        condition: String,
        break_when_changed: bool,
    },
    SetBreakpointCondition {
        breakpoint_id: BreakpointId,
        condition: String,
        break_when_changed: bool,
    },
    RemoveBreakpoint {
        line: i32,
        breakpoint_id: BreakpointId,
    },
    ResumeAll,
    RequestFrames { thread_id: ThreadId },
    Execute {
        text: String,
        thread_id: ThreadId,
        frame_index: FrameIndex,
        correlation_id: CorrelationId,
    },
    ResumeThread { thread_id: ThreadId },
    ClearStepping { thread_id: ThreadId },
    SetLineNumber {
        thread_id: ThreadId,
        frame_index: FrameIndex,
        line: i32,
    },
    EnumChildren {
        text: String,
        thread_id: ThreadId,
        frame_index: FrameIndex,
        correlation_id: CorrelationId,
        is_enumerate: bool,
    },
    Detach,
    SetExceptionInfo {
        default_mode: i32,
        overrides: Vec<(i32, String)>,
    },
    SetExceptionHandlerInfo {
        file: String,
        ranges: Vec<(i32, i32, Vec<String>)>,
    },
}

impl MockDebuggee {
    /// Dial the listener and perform the rendezvous handshake: the target
    /// connects and immediately sends its debug-id string.
    pub async fn connect(port: u16, debug_id: &str) -> Result<Self> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let mut stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);

        let mut w = WireWriter::raw();
        w.write_string(debug_id);
        w.send(&mut stream).await?;
        Ok(Self { stream })
    }

    pub async fn send_thread_created(&mut self, thread_id: ThreadId) -> Result<()> {
        self.send_i32(EventTag::ThreadCreated, thread_id).await
    }

    pub async fn send_thread_exited(&mut self, thread_id: ThreadId) -> Result<()> {
        self.send_i32(EventTag::ThreadExited, thread_id).await
    }

    pub async fn send_process_loaded(&mut self, thread_id: ThreadId) -> Result<()> {
        self.send_i32(EventTag::ProcessLoaded, thread_id).await
    }

    pub async fn send_step_done(&mut self, thread_id: ThreadId) -> Result<()> {
        self.send_i32(EventTag::StepDone, thread_id).await
    }

    pub async fn send_async_break(&mut self, thread_id: ThreadId) -> Result<()> {
        self.send_i32(EventTag::AsyncBreakComplete, thread_id).await
    }

    pub async fn send_process_exited(&mut self, exit_code: i32) -> Result<()> {
        self.send_i32(EventTag::ProcessExited, exit_code).await
    }

    pub async fn send_breakpoint_hit(
        &mut self,
        breakpoint_id: BreakpointId,
        thread_id: ThreadId,
    ) -> Result<()> {
        let mut w = WireWriter::event(EventTag::BreakpointHit);
        w.write_i32(breakpoint_id);
        w.write_i32(thread_id);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_breakpoint_bound(&mut self, breakpoint_id: BreakpointId) -> Result<()> {
        self.send_i32(EventTag::BreakpointBindSucceeded, breakpoint_id)
            .await
    }

    pub async fn send_breakpoint_bind_failed(&mut self, breakpoint_id: BreakpointId) -> Result<()> {
        self.send_i32(EventTag::BreakpointBindFailed, breakpoint_id)
            .await
    }

    pub async fn send_module_loaded(&mut self, module_id: i32, filename: &str) -> Result<()> {
        let mut w = WireWriter::event(EventTag::ModuleLoaded);
        w.write_i32(module_id);
        w.write_string(filename);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_exception(
        &mut self,
        exc_type: &str,
        thread_id: ThreadId,
        description: &str,
    ) -> Result<()> {
        let mut w = WireWriter::event(EventTag::ExceptionRaised);
        w.write_string(exc_type);
        w.write_i32(thread_id);
        w.write_string(description);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_output(&mut self, thread_id: ThreadId, text: &str) -> Result<()> {
        let mut w = WireWriter::event(EventTag::Output);
        w.write_i32(thread_id);
        w.write_string(text);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_frame_list(
        &mut self,
        thread_id: ThreadId,
        frames: &[FramePayload],
    ) -> Result<()> {
        let mut w = WireWriter::event(EventTag::ThreadFrameList);
        w.write_i32(thread_id);
        w.write_i32(frames.len() as i32);
        for frame in frames {
            w.write_i32(frame.start_line);
            w.write_i32(frame.end_line);
            w.write_i32(frame.line);
            w.write_string(&frame.name);
            w.write_string(&frame.file);
            w.write_i32(frame.arg_count);
            w.write_i32(frame.variables.len() as i32);
            for (name, value) in &frame.variables {
                w.write_string(name);
                write_value(&mut w, value);
            }
        }
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_evaluation_result(
        &mut self,
        correlation_id: CorrelationId,
        value: &ValuePayload,
    ) -> Result<()> {
        let mut w = WireWriter::event(EventTag::EvaluationResult);
        w.write_i32(correlation_id);
        write_value(&mut w, value);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_evaluation_error(
        &mut self,
        correlation_id: CorrelationId,
        text: &str,
    ) -> Result<()> {
        let mut w = WireWriter::event(EventTag::EvaluationError);
        w.write_i32(correlation_id);
        w.write_string(text);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_children(
        &mut self,
        correlation_id: CorrelationId,
        is_index: bool,
        is_enumerate: bool,
        children: &[(String, ValuePayload)],
    ) -> Result<()> {
        let mut w = WireWriter::event(EventTag::Children);
        w.write_i32(correlation_id);
        w.write_i32(children.len() as i32);
        w.write_bool(is_index);
        w.write_bool(is_enumerate);
        for (expr, value) in children {
            w.write_string(expr);
            write_value(&mut w, value);
        }
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_set_line_result(
        &mut self,
        ok: bool,
        thread_id: ThreadId,
        new_line: i32,
    ) -> Result<()> {
        let mut w = WireWriter::event(EventTag::SetLineResult);
        w.write_bool(ok);
        w.write_i32(thread_id);
        w.write_i32(new_line);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_handlers_request(&mut self, filename: &str) -> Result<()> {
        let mut w = WireWriter::event(EventTag::HandlersRequested);
        w.write_string(filename);
        Ok(w.send(&mut self.stream).await?)
    }

    pub async fn send_detached(&mut self) -> Result<()> {
        WireWriter::event(EventTag::Detached)
            .send(&mut self.stream)
            .await?;
        Ok(())
    }

    /// Close the debuggee side of the connection without an EXIT frame,
    /// simulating an abrupt process death.
    pub fn drop_connection(self) {
        drop(self.stream);
    }

    /// Read and decode the next debugger-to-debuggee command.
    pub async fn recv_command(&mut self) -> Result<ReceivedCommand> {
        let tag = CommandTag::from_bytes(read_tag_bytes(&mut self.stream).await?)?;
        let stream = &mut self.stream;
        Ok(match tag {
            CommandTag::ExitAck => ReceivedCommand::ExitAck,
            CommandTag::BreakAll => ReceivedCommand::BreakAll,
            CommandTag::ResumeAll => ReceivedCommand::ResumeAll,
            CommandTag::Detach => ReceivedCommand::Detach,
            CommandTag::StepInto => ReceivedCommand::StepInto {
                identity: read_i32(stream).await?,
            },
            CommandTag::StepOut => ReceivedCommand::StepOut {
                identity: read_i32(stream).await?,
            },
            CommandTag::StepOver => ReceivedCommand::StepOver {
                identity: read_i32(stream).await?,
            },
            CommandTag::SetBreakpoint => ReceivedCommand::SetBreakpoint {
                breakpoint_id: read_i32(stream).await?,
                line: read_i32(stream).await?,
                file: read_string(stream).await?,
                condition: read_string(stream).await?,
                break_when_changed: read_i32(stream).await? != 0,
            },
            CommandTag::SetBreakpointCondition => ReceivedCommand::SetBreakpointCondition {
                breakpoint_id: read_i32(stream).await?,
                condition: read_string(stream).await?,
                break_when_changed: read_i32(stream).await? != 0,
            },
            CommandTag::RemoveBreakpoint => ReceivedCommand::RemoveBreakpoint {
                line: read_i32(stream).await?,
                breakpoint_id: read_i32(stream).await?,
            },
            CommandTag::RequestFrames => ReceivedCommand::RequestFrames {
                thread_id: read_i32(stream).await?,
            },
            CommandTag::Execute => ReceivedCommand::Execute {
                text: read_string(stream).await?,
                thread_id: read_i32(stream).await?,
                frame_index: read_i32(stream).await?,
                correlation_id: read_i32(stream).await?,
            },
            CommandTag::ResumeThread => ReceivedCommand::ResumeThread {
                thread_id: read_i32(stream).await?,
            },
            CommandTag::ClearStepping => ReceivedCommand::ClearStepping {
                thread_id: read_i32(stream).await?,
            },
            CommandTag::SetLineNumber => ReceivedCommand::SetLineNumber {
                thread_id: read_i32(stream).await?,
                frame_index: read_i32(stream).await?,
                line: read_i32(stream).await?,
            },
            CommandTag::EnumChildren => ReceivedCommand::EnumChildren {
                text: read_string(stream).await?,
                thread_id: read_i32(stream).await?,
                frame_index: read_i32(stream).await?,
                correlation_id: read_i32(stream).await?,
                is_enumerate: read_i32(stream).await? != 0,
            },
            CommandTag::SetExceptionInfo => {
                let default_mode = read_i32(stream).await?;
                let count = read_i32(stream).await?.max(0) as usize;
                let mut overrides = Vec::with_capacity(count);
                for _ in 0..count {
                    let mode = read_i32(stream).await?;
                    let name = read_string(stream).await?;
                    overrides.push((mode, name));
                }
                ReceivedCommand::SetExceptionInfo {
                    default_mode,
                    overrides,
                }
            }
            CommandTag::SetExceptionHandlerInfo => {
                let file = read_string(stream).await?;
                let count = read_i32(stream).await?.max(0) as usize;
                let mut ranges = Vec::with_capacity(count);
                for _ in 0..count {
                    let start = read_i32(stream).await?;
                    let end = read_i32(stream).await?;
                    let mut names = Vec::new();
                    loop {
                        let name = read_string(stream).await?;
                        if name == "-" {
                            break;
                        }
                        names.push(name);
                    }
                    ranges.push((start, end, names));
                }
                ReceivedCommand::SetExceptionHandlerInfo { file, ranges }
            }
        })
    }

    async fn send_i32(&mut self, tag: EventTag, v: i32) -> Result<()> {
        let mut w = WireWriter::event(tag);
        w.write_i32(v);
        Ok(w.send(&mut self.stream).await?)
    }
}

fn write_value(w: &mut WireWriter, value: &ValuePayload) {
    w.write_string(&value.repr);
    w.write_string(&value.hex_repr);
    w.write_string(&value.type_name);
    w.write_bool(value.expandable);
}
