//! A two-phase rendezvous between one controller and `N` long-lived
//! workers.
//!
//! `std::sync::Barrier` only knows how to make every party wait until all
//! have arrived; it has no notion of a controller that publishes work
//! between rounds, and no way for one party to wake the others without
//! also being a participant in the wait it triggers. This is a small
//! `Mutex` + two `Condvar` rendezvous built for that exact asymmetry: `N`
//! workers call [`Barrier::worker_wait`] and block until the controller has
//! published a new round; the controller calls [`Barrier::controller_wait`]
//! to block until every worker has finished the round it just released, and
//! [`Barrier::release`] to start the next one. The mutex's acquire/release
//! pairs give the cross-thread happens-before edges needed for workers to
//! safely see whatever buffer the controller wrote before calling
//! `release`.

use std::sync::{Condvar, Mutex};

struct State {
    /// Monotonically increasing round number. Workers compare this against
    /// the round they last observed to detect a new release without a
    /// separate "go" flag.
    round: u64,
    /// Number of workers that have called `worker_wait` and returned for
    /// the current round (i.e. finished their work and come back).
    arrived: usize,
    /// `true` once every input block has been released and workers should
    /// exit instead of waiting for another round.
    done: bool,
}

/// The shared rendezvous point. Cloned behind an `Arc` by the controller and
/// every worker.
pub struct Barrier {
    target: usize,
    state: Mutex<State>,
    round_published: Condvar,
    round_completed: Condvar,
}

impl Barrier {
    pub fn new(num_workers: usize) -> Self {
        Self {
            target: num_workers,
            state: Mutex::new(State {
                round: 0,
                arrived: 0,
                done: false,
            }),
            round_published: Condvar::new(),
            round_completed: Condvar::new(),
        }
    }

    /// Called by a worker between blocks. Blocks until the controller
    /// publishes the next round (or shuts the barrier down), then returns
    /// the round number the worker should now act on, or `None` if the run
    /// is finished.
    pub fn worker_wait(&self, last_seen_round: u64) -> Option<u64> {
        let mut state = self.state.lock().unwrap();
        while state.round == last_seen_round && !state.done {
            state = self.round_published.wait(state).unwrap();
        }
        if state.done && state.round == last_seen_round {
            return None;
        }
        Some(state.round)
    }

    /// Called by a worker once it has finished mutating the records it was
    /// handed for the current round.
    pub fn worker_done(&self) {
        let mut state = self.state.lock().unwrap();
        state.arrived += 1;
        if state.arrived == self.target {
            self.round_completed.notify_one();
        }
    }

    /// Called by the controller after writing the next block's buckets
    /// into shared state. Wakes every parked worker to begin the round.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.round += 1;
        state.arrived = 0;
        self.round_published.notify_all();
    }

    /// Called by the controller to block until every worker has called
    /// `worker_done` for the round currently in progress.
    pub fn controller_wait(&self) {
        let mut state = self.state.lock().unwrap();
        while state.arrived < self.target {
            state = self.round_completed.wait(state).unwrap();
        }
    }

    /// Tears the barrier down: parked workers wake up and see `done`,
    /// causing `worker_wait` to return `None` so their thread can exit.
    pub fn destroy(&self) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        self.round_published.notify_all();
    }
}
