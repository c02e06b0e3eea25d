/// Mirrors `junction_core::SpliceHint`'s variants but lives on the
/// padding/unpadding pipe itself rather than the session: a `Session`'s
/// hint is the outcome a dispatcher reads once; a stream's `TrafficState`
/// is the live state machine that produces it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrafficState {
    /// Still deciding whether this stream is eligible for padding.
    Unknown,
    /// Eligible; padded frames are being written/read.
    Eligible,
    /// Padding has formally ended (`Command::PaddingEnd` seen/sent); raw
    /// bytes follow and a splice hand-off can happen.
    InProgress,
    /// Padding will never apply to this stream (e.g. non-TLS traffic).
    Disabled,
}

impl TrafficState {
    pub fn to_splice_hint(self) -> junction_core::SpliceHint {
        match self {
            TrafficState::Unknown => junction_core::SpliceHint::Unknown,
            TrafficState::Eligible => junction_core::SpliceHint::Eligible,
            TrafficState::InProgress => junction_core::SpliceHint::InProgress,
            TrafficState::Disabled => junction_core::SpliceHint::Disabled,
        }
    }

    /// Valid transitions: `Unknown -> {Eligible, Disabled}`,
    /// `Eligible -> InProgress`. Every other transition (including
    /// self-transitions not listed) is rejected so a caller's bug in
    /// sequencing shows up immediately rather than silently reordering
    /// the stream.
    pub fn can_transition_to(self, next: TrafficState) -> bool {
        matches!(
            (self, next),
            (TrafficState::Unknown, TrafficState::Eligible)
                | (TrafficState::Unknown, TrafficState::Disabled)
                | (TrafficState::Eligible, TrafficState::InProgress)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_are_accepted() {
        assert!(TrafficState::Unknown.can_transition_to(TrafficState::Eligible));
        assert!(TrafficState::Unknown.can_transition_to(TrafficState::Disabled));
        assert!(TrafficState::Eligible.can_transition_to(TrafficState::InProgress));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(!TrafficState::Disabled.can_transition_to(TrafficState::Eligible));
        assert!(!TrafficState::InProgress.can_transition_to(TrafficState::Eligible));
        assert!(!TrafficState::Unknown.can_transition_to(TrafficState::InProgress));
    }
}
