use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Cooperative cancellation: a shared flag, a deadline, or both.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn from_watch(flag: watch::Receiver<bool>) -> Self {
        Self {
            flag: Some(flag),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_raised(&self) -> bool {
        let flagged = self.flag.as_ref().is_some_and(|flag| *flag.borrow());
        let expired = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
        flagged || expired
    }

    /// Sleeps for `duration`, waking early when the signal is raised.
    /// Returns whether the signal is raised afterwards.
    pub async fn pause(&mut self, duration: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        let mut until = Instant::now() + duration;
        if let Some(deadline) = self.deadline {
            until = until.min(deadline);
        }
        let timer = sleep_until(until);
        tokio::pin!(timer);
        match self.flag.as_mut() {
            Some(flag) => loop {
                tokio::select! {
                    _ = &mut timer => break,
                    changed = flag.changed() => {
                        if changed.is_err() {
                            // sender gone, the flag can no longer change
                            (&mut timer).await;
                            break;
                        }
                        if *flag.borrow() {
                            break;
                        }
                    }
                }
            },
            None => timer.await,
        }
        self.is_raised()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio::time::Instant;

    use super::StopSignal;

    #[tokio::test]
    async fn never_is_not_raised() {
        let mut stop = StopSignal::never();
        assert!(!stop.is_raised());
        assert!(!stop.pause(Duration::ZERO).await);
    }

    #[tokio::test]
    async fn flag_interrupts_pause() {
        let (tx, rx) = watch::channel(false);
        let mut stop = StopSignal::from_watch(rx);
        let started = Instant::now();
        let waiter = tokio::spawn(async move { stop.pause(Duration::from_secs(30)).await });
        tx.send(true).unwrap();
        assert!(waiter.await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn expired_deadline_is_raised() {
        let stop = StopSignal::never().with_deadline(Instant::now());
        assert!(stop.is_raised());
    }
}
