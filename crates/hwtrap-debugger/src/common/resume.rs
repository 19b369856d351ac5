use super::event::ContinueDecision;
use super::target::{Signal, TargetControl};

/// Resumes a stopped thread, suppressing or delivering its pending signal.
///
/// A stop signal is never delivered, since it would stop the thread again.
pub fn resume_thread<T: TargetControl>(
    target: &mut T,
    thread_id: u64,
    decision: ContinueDecision,
) -> crate::Result<()> {
    let to_error = |source| crate::Error::Resume { thread_id, source };

    let signal = target.pending_signal(thread_id).map_err(to_error)?;

    let delivered = match decision {
        ContinueDecision::Handled => None,
        ContinueDecision::NotHandled => Some(signal),
    }
    .filter(|s| *s != Signal::Stop);

    tracing::trace!(thread_id, ?signal, ?delivered, "resuming thread");

    target.resume(thread_id, delivered).map_err(to_error)
}
