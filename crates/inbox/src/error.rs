/// Tracker signals the reader steers on. These are expected conditions,
/// not failures; the reader downcasts to them to drive its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    #[error("accumulator not found")]
    AccumulatorNotFound,
    #[error("delayed messages don't match sequencer batch")]
    DelayedMessagesMismatch,
}

pub fn is_accumulator_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TrackerError>(),
        Some(TrackerError::AccumulatorNotFound)
    )
}

pub fn is_delayed_messages_mismatch(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TrackerError>(),
        Some(TrackerError::DelayedMessagesMismatch)
    )
}
