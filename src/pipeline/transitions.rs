use crate::model::ProcessingStatus::{self, Completed, Failed, Pending, Processing};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Ai,
    Congestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Start,
    Succeed,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{track:?} track cannot handle {event:?} from {from:?}")]
pub struct TransitionError {
    pub track: Track,
    pub from: ProcessingStatus,
    pub event: StageEvent,
}

/// The AI track passes through PROCESSING; the congestion track goes
/// straight from PENDING to a terminal state.
pub const TRANSITIONS: &[(Track, ProcessingStatus, StageEvent, ProcessingStatus)] = &[
    (Track::Ai, Pending, StageEvent::Start, Processing),
    // a worker died mid-stage; the stage is run again from the top
    (Track::Ai, Processing, StageEvent::Start, Processing),
    (Track::Ai, Processing, StageEvent::Succeed, Completed),
    (Track::Ai, Processing, StageEvent::Fail, Failed),
    (Track::Congestion, Pending, StageEvent::Succeed, Completed),
    (Track::Congestion, Pending, StageEvent::Fail, Failed),
];

pub fn transition(
    track: Track,
    from: ProcessingStatus,
    event: StageEvent,
) -> Result<ProcessingStatus, TransitionError> {
    TRANSITIONS
        .iter()
        .find(|(t, f, e, _)| *t == track && *f == from && *e == event)
        .map(|(_, _, _, to)| *to)
        .ok_or(TransitionError { track, from, event })
}
