//! Lifecycle of one pipeline invocation: Idle → Extracting → Translating →
//! Reconstructing → Done, with Error reachable from any working state.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Extracting,
    Translating,
    Reconstructing,
    Done,
    Error,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::Translating => "translating",
            PipelineState::Reconstructing => "reconstructing",
            PipelineState::Done => "done",
            PipelineState::Error => "error",
        };
        f.write_str(name)
    }
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (PipelineState::Idle, PipelineState::Extracting)
                | (PipelineState::Extracting, PipelineState::Translating)
                | (PipelineState::Translating, PipelineState::Reconstructing)
                | (PipelineState::Reconstructing, PipelineState::Done)
                | (PipelineState::Extracting, PipelineState::Error)
                | (PipelineState::Translating, PipelineState::Error)
                // cancellation may land while the image is being redrawn
                | (PipelineState::Reconstructing, PipelineState::Error)
        )
    }

    /// True from extracting through reconstructing.
    pub fn is_processing(self) -> bool {
        matches!(
            self,
            PipelineState::Extracting | PipelineState::Translating | PipelineState::Reconstructing
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [PipelineState; 6] = [
        PipelineState::Idle,
        PipelineState::Extracting,
        PipelineState::Translating,
        PipelineState::Reconstructing,
        PipelineState::Done,
        PipelineState::Error,
    ];

    #[test]
    fn happy_path_is_linear() {
        let path = [
            PipelineState::Idle,
            PipelineState::Extracting,
            PipelineState::Translating,
            PipelineState::Reconstructing,
            PipelineState::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!PipelineState::Idle.can_transition_to(PipelineState::Translating));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for terminal in [PipelineState::Done, PipelineState::Error] {
            assert!(terminal.is_terminal());
            assert!(!terminal.is_processing());
            for next in ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn processing_flag_covers_working_states() {
        let processing = ALL
            .iter()
            .filter(|state| state.is_processing())
            .copied()
            .collect::<Vec<_>>();
        assert_eq!(
            processing,
            vec![
                PipelineState::Extracting,
                PipelineState::Translating,
                PipelineState::Reconstructing,
            ]
        );
    }
}
