use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag.
///
/// Clones observe the same flag, so cancelling any clone cancels them all.
/// Guarded work checks the token as its first action, which guarantees that
/// nothing runs after `cancel` even if an invocation was already scheduled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One recurring, cancellable unit of work re-scheduled once per display
/// refresh.
///
/// The task owns no thread or timer; the host invokes the work once per
/// refresh, and each invocation runs to completion before the next is
/// considered.
#[derive(Debug, Default)]
pub struct FrameTask {
    token: CancellationToken,
    frames: u64,
}

impl FrameTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token shared with whoever needs to cancel this task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Records one completed invocation.
    pub(crate) fn advance(&mut self) {
        self.frames += 1;
    }

    /// Number of invocations that ran to completion so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn task_tracks_completed_frames() {
        let mut task = FrameTask::new();
        task.advance();
        task.advance();
        assert_eq!(task.frames(), 2);

        let token = task.token();
        task.cancel();
        assert!(token.is_cancelled());
        assert!(task.is_cancelled());
    }
}
