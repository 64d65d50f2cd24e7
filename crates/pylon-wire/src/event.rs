use tokio::io::AsyncRead;

use crate::codec::{read_i32, read_string};
use crate::{BreakpointId, CorrelationId, EventTag, Result, ThreadId, WireError};

/// One evaluated value as transmitted by the debuggee: the textual
/// representation, a hex rendering for numeric display, the runtime type
/// name, and whether the value has children worth expanding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuePayload {
    pub repr: String,
    pub hex_repr: String,
    pub type_name: String,
    pub expandable: bool,
}

/// One stack frame from a THRF frame-list response, including the inline
/// local/argument values the debuggee evaluates eagerly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePayload {
    pub start_line: i32,
    pub end_line: i32,
    pub line: i32,
    pub name: String,
    pub file: String,
    pub arg_count: i32,
    /// `(name, value)` pairs, in transmission order.
    pub variables: Vec<(String, ValuePayload)>,
}

/// A fully decoded debuggee-to-debugger message.
///
/// Decoding happens before dispatch so that a malformed or unknown frame is
/// a typed error instead of a silent fallthrough that desynchronizes the
/// stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    ExceptionRaised {
        exc_type: String,
        thread_id: ThreadId,
        description: String,
    },
    BreakpointHit {
        breakpoint_id: BreakpointId,
        thread_id: ThreadId,
    },
    ThreadCreated {
        thread_id: ThreadId,
    },
    ThreadExited {
        thread_id: ThreadId,
    },
    ModuleLoaded {
        module_id: i32,
        filename: String,
    },
    StepDone {
        thread_id: ThreadId,
    },
    ProcessExited {
        exit_code: i32,
    },
    BreakpointBindSucceeded {
        breakpoint_id: BreakpointId,
    },
    BreakpointBindFailed {
        breakpoint_id: BreakpointId,
    },
    /// The process is loaded and broken in before any user code has run.
    ProcessLoaded {
        thread_id: ThreadId,
    },
    ThreadFrameList {
        thread_id: ThreadId,
        frames: Vec<FramePayload>,
    },
    EvaluationResult {
        correlation_id: CorrelationId,
        value: ValuePayload,
    },
    EvaluationError {
        correlation_id: CorrelationId,
        text: String,
    },
    AsyncBreakComplete {
        thread_id: ThreadId,
    },
    SetLineResult {
        ok: bool,
        thread_id: ThreadId,
        new_line: i32,
    },
    Children {
        correlation_id: CorrelationId,
        is_index: bool,
        is_enumerate: bool,
        /// `(child access expression, value)` pairs.
        children: Vec<(String, ValuePayload)>,
    },
    Output {
        thread_id: ThreadId,
        text: String,
    },
    /// The debuggee asks which exception handlers cover a source file; the
    /// debugger answers with a `sehi` command.
    HandlersRequested {
        filename: String,
    },
    Detached,
}

impl Event {
    /// Read the payload for `tag` from the stream.
    ///
    /// The payload layout must match the debuggee exactly; any divergence
    /// is unrecoverable because nothing frames a message's end.
    pub async fn read<R: AsyncRead + Unpin>(tag: EventTag, reader: &mut R) -> Result<Event> {
        Ok(match tag {
            EventTag::ExceptionRaised => {
                let exc_type = read_string(reader).await?;
                let thread_id = read_i32(reader).await?;
                let description = read_string(reader).await?;
                Event::ExceptionRaised {
                    exc_type,
                    thread_id,
                    description,
                }
            }
            EventTag::BreakpointHit => Event::BreakpointHit {
                breakpoint_id: read_i32(reader).await?,
                thread_id: read_i32(reader).await?,
            },
            EventTag::ThreadCreated => Event::ThreadCreated {
                thread_id: read_i32(reader).await?,
            },
            EventTag::ThreadExited => Event::ThreadExited {
                thread_id: read_i32(reader).await?,
            },
            EventTag::ModuleLoaded => Event::ModuleLoaded {
                module_id: read_i32(reader).await?,
                filename: read_string(reader).await?,
            },
            EventTag::StepDone => Event::StepDone {
                thread_id: read_i32(reader).await?,
            },
            EventTag::ProcessExited => Event::ProcessExited {
                exit_code: read_i32(reader).await?,
            },
            EventTag::BreakpointBindSucceeded => Event::BreakpointBindSucceeded {
                breakpoint_id: read_i32(reader).await?,
            },
            EventTag::BreakpointBindFailed => Event::BreakpointBindFailed {
                breakpoint_id: read_i32(reader).await?,
            },
            EventTag::ProcessLoaded => Event::ProcessLoaded {
                thread_id: read_i32(reader).await?,
            },
            EventTag::ThreadFrameList => {
                let thread_id = read_i32(reader).await?;
                let frame_count = read_count(reader, "frame").await?;
                let mut frames = Vec::with_capacity(frame_count);
                for _ in 0..frame_count {
                    frames.push(read_frame(reader).await?);
                }
                Event::ThreadFrameList { thread_id, frames }
            }
            EventTag::EvaluationResult => Event::EvaluationResult {
                correlation_id: read_i32(reader).await?,
                value: read_value(reader).await?,
            },
            EventTag::EvaluationError => Event::EvaluationError {
                correlation_id: read_i32(reader).await?,
                text: read_string(reader).await?,
            },
            EventTag::AsyncBreakComplete => Event::AsyncBreakComplete {
                thread_id: read_i32(reader).await?,
            },
            EventTag::SetLineResult => Event::SetLineResult {
                ok: read_i32(reader).await? != 0,
                thread_id: read_i32(reader).await?,
                new_line: read_i32(reader).await?,
            },
            EventTag::Children => {
                let correlation_id = read_i32(reader).await?;
                let child_count = read_count(reader, "child").await?;
                let is_index = read_i32(reader).await? == 1;
                let is_enumerate = read_i32(reader).await? == 1;
                let mut children = Vec::with_capacity(child_count);
                for _ in 0..child_count {
                    let expr = read_string(reader).await?;
                    children.push((expr, read_value(reader).await?));
                }
                Event::Children {
                    correlation_id,
                    is_index,
                    is_enumerate,
                    children,
                }
            }
            EventTag::Output => Event::Output {
                thread_id: read_i32(reader).await?,
                text: read_string(reader).await?,
            },
            EventTag::HandlersRequested => Event::HandlersRequested {
                filename: read_string(reader).await?,
            },
            EventTag::Detached => Event::Detached,
        })
    }
}

async fn read_count<R: AsyncRead + Unpin>(reader: &mut R, what: &str) -> Result<usize> {
    let count = read_i32(reader).await?;
    if count < 0 {
        return Err(WireError::Protocol(format!("negative {what} count {count}")));
    }
    Ok(count as usize)
}

async fn read_value<R: AsyncRead + Unpin>(reader: &mut R) -> Result<ValuePayload> {
    Ok(ValuePayload {
        repr: read_string(reader).await?,
        hex_repr: read_string(reader).await?,
        type_name: read_string(reader).await?,
        expandable: read_i32(reader).await? == 1,
    })
}

async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<FramePayload> {
    let start_line = read_i32(reader).await?;
    let end_line = read_i32(reader).await?;
    let line = read_i32(reader).await?;
    let name = read_string(reader).await?;
    let file = read_string(reader).await?;
    let arg_count = read_i32(reader).await?;
    let var_count = read_count(reader, "variable").await?;
    let mut variables = Vec::with_capacity(var_count);
    for _ in 0..var_count {
        let name = read_string(reader).await?;
        variables.push((name, read_value(reader).await?));
    }
    Ok(FramePayload {
        start_line,
        end_line,
        line,
        name,
        file,
        arg_count,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireWriter;

    fn value(repr: &str) -> ValuePayload {
        ValuePayload {
            repr: repr.to_string(),
            hex_repr: String::new(),
            type_name: "int".to_string(),
            expandable: false,
        }
    }

    fn write_value(w: &mut WireWriter, v: &ValuePayload) {
        w.write_string(&v.repr);
        w.write_string(&v.hex_repr);
        w.write_string(&v.type_name);
        w.write_bool(v.expandable);
    }

    #[tokio::test]
    async fn decodes_breakpoint_hit() {
        let mut w = WireWriter::event(EventTag::BreakpointHit);
        w.write_i32(3);
        w.write_i32(7);
        let buf = w.into_vec();
        let mut slice = &buf[4..];
        let event = Event::read(EventTag::BreakpointHit, &mut slice).await.unwrap();
        assert_eq!(
            event,
            Event::BreakpointHit {
                breakpoint_id: 3,
                thread_id: 7
            }
        );
    }

    #[tokio::test]
    async fn decodes_frame_list_with_variables() {
        let mut w = WireWriter::event(EventTag::ThreadFrameList);
        w.write_i32(9); // thread
        w.write_i32(1); // frame count
        w.write_i32(10); // start line
        w.write_i32(20); // end line
        w.write_i32(14); // current line
        w.write_string("main");
        w.write_string("/app/main.py");
        w.write_i32(2); // arg count
        w.write_i32(1); // var count
        w.write_string("x");
        write_value(&mut w, &value("42"));
        let buf = w.into_vec();
        let mut slice = &buf[4..];

        let event = Event::read(EventTag::ThreadFrameList, &mut slice).await.unwrap();
        let Event::ThreadFrameList { thread_id, frames } = event else {
            panic!("wrong variant");
        };
        assert_eq!(thread_id, 9);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].line, 14);
        assert_eq!(frames[0].name, "main");
        assert_eq!(frames[0].variables, vec![("x".to_string(), value("42"))]);
    }

    #[tokio::test]
    async fn decodes_children() {
        let mut w = WireWriter::event(EventTag::Children);
        w.write_i32(5); // correlation id
        w.write_i32(2); // child count
        w.write_i32(1); // is index
        w.write_i32(0); // is enumerate
        w.write_string("[0]");
        write_value(&mut w, &value("1"));
        w.write_string("[1]");
        write_value(&mut w, &value("2"));
        let buf = w.into_vec();
        let mut slice = &buf[4..];

        let event = Event::read(EventTag::Children, &mut slice).await.unwrap();
        let Event::Children {
            correlation_id,
            is_index,
            is_enumerate,
            children,
        } = event
        else {
            panic!("wrong variant");
        };
        assert_eq!(correlation_id, 5);
        assert!(is_index);
        assert!(!is_enumerate);
        assert_eq!(children[1].0, "[1]");
    }

    #[tokio::test]
    async fn negative_frame_count_is_a_protocol_error() {
        let mut w = WireWriter::event(EventTag::ThreadFrameList);
        w.write_i32(1);
        w.write_i32(-2);
        let buf = w.into_vec();
        let mut slice = &buf[4..];
        assert!(matches!(
            Event::read(EventTag::ThreadFrameList, &mut slice).await,
            Err(WireError::Protocol(_))
        ));
    }
}
