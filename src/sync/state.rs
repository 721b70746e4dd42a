use crate::sync::error::{SyncError, SyncResult};
use crate::sync::plan::BlockRange;

/// Position of a push within its pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassState {
    Start,
    SizeKnown { remote_size: u64 },
    Scanning { offset: u64 },
    Comparing { offset: u64, length: u64 },
    Done,
    Failed { error: String },
}

impl PassState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PassState::Done | PassState::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub enum PassEvent {
    SizeQueried { remote_size: u64 },
    ScanStarted,
    BlockLoaded(BlockRange),
    BlockSkipped,
    BlockWritten,
    Finished,
    Abort { error: String },
}

/// Linear state machine for one push.
///
/// Blocks must be loaded in order and each must start where the previous one
/// ended; `Finished` is only accepted once the scan has reached the source
/// length.
pub struct PassStateMachine {
    state: PassState,
    source_len: u64,
}

impl PassStateMachine {
    pub fn new(source_len: u64) -> Self {
        Self {
            state: PassState::Start,
            source_len,
        }
    }

    pub fn current_state(&self) -> &PassState {
        &self.state
    }

    pub fn transition(&mut self, event: PassEvent) -> SyncResult<&PassState> {
        let new_state = match (&self.state, &event) {
            (PassState::Start, PassEvent::SizeQueried { remote_size }) => PassState::SizeKnown {
                remote_size: *remote_size,
            },

            (PassState::SizeKnown { .. }, PassEvent::ScanStarted) => {
                PassState::Scanning { offset: 0 }
            }

            (PassState::Scanning { offset }, PassEvent::BlockLoaded(range))
                if range.offset == *offset
                    && range.length > 0
                    && range.end() <= self.source_len =>
            {
                PassState::Comparing {
                    offset: range.offset,
                    length: range.length,
                }
            }

            (
                PassState::Comparing { offset, length },
                PassEvent::BlockSkipped | PassEvent::BlockWritten,
            ) => PassState::Scanning {
                offset: offset + length,
            },

            (PassState::Scanning { offset }, PassEvent::Finished)
                if *offset == self.source_len =>
            {
                PassState::Done
            }

            (state, PassEvent::Abort { error }) if !state.is_terminal() => PassState::Failed {
                error: error.clone(),
            },

            _ => {
                return Err(SyncError::InvalidStateTransition(format!(
                    "Cannot handle {:?} in state {:?}",
                    event, self.state
                )));
            }
        };

        self.state = new_state;
        Ok(&self.state)
    }
}
