use pylon_wire::CorrelationId;

/// Dispenses correlation ids for evaluate/enumerate requests.
///
/// Ids are recycled: freeing returns an id to the pool for reuse. An id
/// must be freed exactly once, on whichever path completes the request
/// (result, error, or the process-exit drain).
#[derive(Debug, Default)]
pub(crate) struct IdDispenser {
    free: Vec<CorrelationId>,
    next: CorrelationId,
}

impl IdDispenser {
    pub(crate) fn allocate(&mut self) -> CorrelationId {
        match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        }
    }

    pub(crate) fn free(&mut self, id: CorrelationId) {
        self.free.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_ids_are_unique() {
        let mut ids = IdDispenser::default();
        let a = ids.allocate();
        let b = ids.allocate();
        let c = ids.allocate();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn freed_ids_are_recycled() {
        let mut ids = IdDispenser::default();
        let a = ids.allocate();
        let _b = ids.allocate();
        ids.free(a);
        assert_eq!(ids.allocate(), a);
    }
}
