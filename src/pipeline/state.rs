use std::fmt;

/// Step within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Generate,
    ScoreEachSample,
    PersistBatch,
    ReleaseBatchMemory,
}

/// Where a run currently is.
///
/// `Init → Loading → (ProcessingBatch)* → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Init,
    Loading,
    ProcessingBatch { index: usize, phase: BatchPhase },
    Done,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use BatchPhase::*;
        use RunState::*;

        match (*self, next) {
            (Init, Loading) => true,
            (Loading, ProcessingBatch { phase: Generate, .. }) => true,
            (Loading, Done) => true,
            (
                ProcessingBatch { index: a, phase: Generate },
                ProcessingBatch { index: b, phase: ScoreEachSample },
            ) => a == b,
            (
                ProcessingBatch { index: a, phase: ScoreEachSample },
                ProcessingBatch { index: b, phase: PersistBatch },
            ) => a == b,
            (
                ProcessingBatch { index: a, phase: PersistBatch },
                ProcessingBatch { index: b, phase: ReleaseBatchMemory },
            ) => a == b,
            // A skipped batch goes straight from Generate to the next batch.
            (
                ProcessingBatch {
                    index: a,
                    phase: Generate | ReleaseBatchMemory,
                },
                ProcessingBatch {
                    index: b,
                    phase: Generate,
                },
            ) => b > a,
            (ProcessingBatch { phase: Generate | ReleaseBatchMemory, .. }, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => f.write_str("INIT"),
            RunState::Loading => f.write_str("LOADING"),
            RunState::ProcessingBatch { index, phase } => {
                write!(f, "PROCESSING_BATCH[{}]::{:?}", index, phase)
            }
            RunState::Done => f.write_str("DONE"),
        }
    }
}
