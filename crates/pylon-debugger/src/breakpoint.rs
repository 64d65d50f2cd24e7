use std::collections::HashMap;
use std::sync::Arc;

use pylon_wire::{BreakpointId, CommandTag, WireWriter};

use crate::controller::Inner;
use crate::error::Result;

#[derive(Debug, Clone)]
pub(crate) struct BreakpointState {
    pub(crate) file: String,
    pub(crate) line: i32,
    pub(crate) condition: String,
    pub(crate) break_when_changed: bool,
}

/// All breakpoints of one controller, keyed by their wire id.
///
/// Ids are handed out monotonically for the lifetime of the session; a
/// removed breakpoint's id is never reused, so a late bind notification
/// for it can be recognised as stale.
#[derive(Debug, Default)]
pub(crate) struct BreakpointTable {
    map: HashMap<BreakpointId, BreakpointState>,
    next_id: BreakpointId,
}

impl BreakpointTable {
    pub(crate) fn insert(&mut self, state: BreakpointState) -> BreakpointId {
        let id = self.next_id;
        self.next_id += 1;
        self.map.insert(id, state);
        id
    }

    pub(crate) fn get(&self, id: BreakpointId) -> Option<&BreakpointState> {
        self.map.get(&id)
    }

    pub(crate) fn contains(&self, id: BreakpointId) -> bool {
        self.map.contains_key(&id)
    }

    pub(crate) fn remove(&mut self, id: BreakpointId) -> Option<BreakpointState> {
        self.map.remove(&id)
    }
}

/// Handle to a single source breakpoint.
///
/// Creating the handle only reserves an id; nothing reaches the target
/// until [`Breakpoint::bind`] is called. Whether binding actually took is
/// reported asynchronously through `BreakpointBindSucceeded` /
/// `BreakpointBindFailed` events carrying this breakpoint's id.
#[derive(Clone)]
pub struct Breakpoint {
    inner: Arc<Inner>,
    id: BreakpointId,
}

impl Breakpoint {
    pub(crate) fn new(inner: Arc<Inner>, id: BreakpointId) -> Self {
        Self { inner, id }
    }

    pub fn id(&self) -> BreakpointId {
        self.id
    }

    pub fn file(&self) -> Option<String> {
        self.inner
            .breakpoints
            .lock()
            .get(self.id)
            .map(|s| s.file.clone())
    }

    pub fn line(&self) -> Option<i32> {
        self.inner.breakpoints.lock().get(self.id).map(|s| s.line)
    }

    /// Ask the target to install this breakpoint. The file path is
    /// translated through the controller's path mappings before it goes
    /// on the wire.
    pub async fn bind(&self) -> Result<()> {
        let (state, file) = {
            let table = self.inner.breakpoints.lock();
            let Some(state) = table.get(self.id) else {
                return Ok(());
            };
            (state.clone(), self.inner.mappings.map_to_debuggee(&state.file))
        };

        let mut w = WireWriter::command(CommandTag::SetBreakpoint);
        w.write_i32(self.id);
        w.write_i32(state.line);
        w.write_string(&file);
        w.write_string(&state.condition);
        w.write_bool(state.break_when_changed);
        self.inner.send(w).await
    }

    /// Uninstall the breakpoint in the target without forgetting it
    /// locally; a later [`Breakpoint::bind`] re-installs it. Does nothing
    /// when the target is not connected.
    pub async fn disable(&self) -> Result<()> {
        let Some(line) = self.line() else {
            return Ok(());
        };
        let mut w = WireWriter::command(CommandTag::RemoveBreakpoint);
        w.write_i32(line);
        w.write_i32(self.id);
        self.inner.send_if_connected(w).await
    }

    /// Uninstall the breakpoint and drop it from the controller's table.
    pub async fn remove(&self) -> Result<()> {
        let removed = self.inner.breakpoints.lock().remove(self.id);
        let Some(state) = removed else {
            return Ok(());
        };
        let mut w = WireWriter::command(CommandTag::RemoveBreakpoint);
        w.write_i32(state.line);
        w.write_i32(self.id);
        self.inner.send_if_connected(w).await
    }

    /// Replace the condition. The new condition is pushed to the target
    /// immediately when connected, and is included in any later bind.
    pub async fn set_condition(&self, condition: &str, break_when_changed: bool) -> Result<()> {
        {
            let mut table = self.inner.breakpoints.lock();
            let Some(state) = table.map.get_mut(&self.id) else {
                return Ok(());
            };
            state.condition = condition.to_owned();
            state.break_when_changed = break_when_changed;
        }

        let mut w = WireWriter::command(CommandTag::SetBreakpointCondition);
        w.write_i32(self.id);
        w.write_string(condition);
        w.write_bool(break_when_changed);
        self.inner.send_if_connected(w).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut table = BreakpointTable::default();
        let state = BreakpointState {
            file: "a.py".into(),
            line: 1,
            condition: String::new(),
            break_when_changed: false,
        };
        let a = table.insert(state.clone());
        let b = table.insert(state.clone());
        assert!(b > a);
        table.remove(a);
        let c = table.insert(state);
        assert!(c > b);
        assert!(!table.contains(a));
    }
}
