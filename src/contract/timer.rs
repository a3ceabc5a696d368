use tokio::time::{sleep_until, Instant};

/// Cancellable one-shot deadline owned by a single actor.
///
/// The actor copies `deadline()` out before `select!`ing on [`until`], then
/// calls `fire()` when that branch wins. Cancelling after firing is a no-op.
#[derive(Debug, Default, Clone)]
pub struct DeadlineTimer {
    deadline: Option<Instant>,
}

impl DeadlineTimer {
    pub fn arm(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm after expiry. Returns false if the timer was already
    /// cancelled or fired.
    pub fn fire(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

/// Resolves at `deadline`, never when unarmed
pub async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_deadline() {
        let mut timer = DeadlineTimer::default();
        timer.arm(Instant::now() + Duration::from_secs(30));
        let start = Instant::now();
        until(timer.deadline()).await;
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        assert!(timer.fire());
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unarmed_never_resolves() {
        let timer = DeadlineTimer::default();
        let raced = tokio::time::timeout(Duration::from_secs(3600), until(timer.deadline())).await;
        assert!(raced.is_err());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut timer = DeadlineTimer::default();
        timer.arm(Instant::now());
        assert!(timer.fire());
        timer.cancel();
        assert!(!timer.fire());
    }
}
