use std::fmt;

/// Identity of one outgoing request. A completion whose id no longer matches
/// the slot's active id belongs to a cancelled request and is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// At most one outstanding request per slot, plus at most one remembered
/// follow-up that is replayed once the outstanding request completes.
///
/// A cancelled request stops being tracked but keeps the slot occupied until
/// its completion comes back, so a blocking call that cannot be interrupted
/// never overlaps with its successor.
#[derive(Debug, Default)]
pub struct SingleFlight {
    next_id: u64,
    active: Option<RequestId>,
    abandoned: Option<RequestId>,
    pending: bool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Something is on the wire, tracked or not.
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.abandoned.is_some()
    }

    /// A tracked request is outstanding.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Only a cancelled request is still outstanding.
    pub fn is_draining(&self) -> bool {
        self.active.is_none() && self.abandoned.is_some()
    }

    /// Claims the slot. `None` while any request is outstanding.
    pub fn begin(&mut self) -> Option<RequestId> {
        if self.is_busy() {
            return None;
        }
        self.next_id = self.next_id.wrapping_add(1);
        let id = RequestId(self.next_id);
        self.active = Some(id);
        Some(id)
    }

    /// Releases the slot for `id`. Returns true only when `id` was the tracked
    /// request; a cancelled one frees the slot but its result must be dropped.
    pub fn finish(&mut self, id: RequestId) -> bool {
        if self.active == Some(id) {
            self.active = None;
            true
        } else {
            if self.abandoned == Some(id) {
                self.abandoned = None;
            }
            false
        }
    }

    /// Stops tracking the outstanding request. Its completion is discarded
    /// and the slot stays busy until that completion arrives.
    pub fn cancel(&mut self) -> Option<RequestId> {
        let id = self.active.take()?;
        self.abandoned = Some(id);
        Some(id)
    }

    pub fn defer(&mut self) {
        self.pending = true;
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}
