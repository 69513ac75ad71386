//! Periodic housekeeping: idle store sweeps and lease expiry.

use super::{BuilderCoordinator, LeaseReply, ResourceAuthority, ServerIngest};
use crate::coordination::ports::BuildProcess;
use crate::lifecycle::ports::TaskRepository;
use crate::relay::ports::TxScheduler;
use crate::store::{ports::StoreBackend, services::EventStoreCache};
use mockable::Clock;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Component with work to do on every housekeeping tick.
pub trait Housekeeping {
    /// What one pass produced.
    type Outcome;

    /// Runs one housekeeping pass.
    fn housekeep(&mut self) -> Self::Outcome;
}

impl<B, C> Housekeeping for EventStoreCache<B, C>
where
    B: StoreBackend,
    C: Clock + Send + Sync,
{
    /// Number of idle stores closed.
    type Outcome = usize;

    fn housekeep(&mut self) -> usize {
        self.sweep()
    }
}

impl<C> Housekeeping for ResourceAuthority<C>
where
    C: Clock + Send + Sync,
{
    /// Grants made possible by expired leases, to be sent to requesters.
    type Outcome = Vec<LeaseReply>;

    fn housekeep(&mut self) -> Vec<LeaseReply> {
        self.expire_due()
    }
}

impl<R, B, C, P, S, W> Housekeeping for BuilderCoordinator<R, B, C, P, S, W>
where
    R: TaskRepository,
    B: StoreBackend + Clone + Send + 'static,
    C: Clock + Send + Sync,
    P: BuildProcess,
    S: TxScheduler,
    W: AsyncWrite + Unpin,
{
    /// Number of idle stores closed.
    type Outcome = usize;

    fn housekeep(&mut self) -> usize {
        self.stores_mut().sweep()
    }
}

impl<B, C> Housekeeping for ServerIngest<B, C>
where
    B: StoreBackend + Clone + Send + 'static,
    C: Clock + Send + Sync,
{
    /// Number of idle stores closed.
    type Outcome = usize;

    fn housekeep(&mut self) -> usize {
        self.stores_mut().sweep()
    }
}

/// Fixed-period housekeeping timer.
///
/// The first tick comes one full period after creation. Ticks missed while
/// the owner was busy are not replayed in a burst.
#[derive(Debug)]
pub struct Housekeeper {
    interval: Interval,
    period: Duration,
}

impl Housekeeper {
    /// Creates a timer firing every `period`.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, period }
    }

    /// Returns the timer period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Waits for the next tick.
    ///
    /// Event loops owning their stores select on this next to their other
    /// sources and call [`Housekeeping::housekeep`] when it fires.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Runs `target` on every tick until `shutdown` turns `true` or its
    /// sender goes away, handing each pass's outcome to `on_outcome`.
    ///
    /// Returns the number of passes made.
    pub async fn run<T, F>(
        &mut self,
        target: &mut T,
        mut shutdown: watch::Receiver<bool>,
        mut on_outcome: F,
    ) -> u64
    where
        T: Housekeeping,
        F: FnMut(T::Outcome),
    {
        info!(period_secs = self.period.as_secs(), "housekeeping started");
        let mut passes = 0_u64;
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                () = self.tick() => {
                    passes += 1;
                    debug!(pass = passes, "housekeeping pass");
                    on_outcome(target.housekeep());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(passes, "housekeeping stopped");
        passes
    }
}
