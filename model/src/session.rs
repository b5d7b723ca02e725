use crate::zones::ZoneID;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    /// The next click on the map creates a zone
    Adding,
    Selected(ZoneID),
}

/// Edit state for one map. Every edit bumps `edit_version`; a save snapshots the version it
/// sends, so a late response can tell whether it still describes the local state.
pub struct Session {
    pub mode: Mode,
    dirty: bool,
    edit_version: u64,
    in_flight: Option<u64>,
    save_queued: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Everything local is on the host
    Clean,
    /// The save went through, but edits happened in the meantime
    Stale,
    Failed,
}

impl Session {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            dirty: false,
            edit_version: 0,
            in_flight: None,
            save_queued: false,
        }
    }

    /// After (re)loading zones from the host. A save that's still in flight stays tracked.
    pub fn reset(&mut self) {
        self.mode = Mode::Idle;
        self.dirty = false;
        self.edit_version += 1;
        self.save_queued = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn edit_version(&self) -> u64 {
        self.edit_version
    }

    pub fn save_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.edit_version += 1;
    }

    /// Returns the version to send, or None if a save is already in flight. In that case, one
    /// more save happens after the current one finishes, however many times this is called.
    pub fn begin_save(&mut self) -> Option<u64> {
        if self.in_flight.is_some() {
            self.save_queued = true;
            return None;
        }
        self.in_flight = Some(self.edit_version);
        Some(self.edit_version)
    }

    pub fn cancel_queued_save(&mut self) {
        self.save_queued = false;
    }

    /// The second value is true if a queued save should start now.
    pub fn finish_save(&mut self, version: u64, ok: bool) -> (SaveOutcome, bool) {
        if self.in_flight == Some(version) {
            self.in_flight = None;
        }
        let outcome = if !ok {
            SaveOutcome::Failed
        } else if version == self.edit_version {
            self.dirty = false;
            SaveOutcome::Clean
        } else {
            SaveOutcome::Stale
        };
        let resend = self.in_flight.is_none() && std::mem::take(&mut self.save_queued);
        (outcome, resend)
    }
}
