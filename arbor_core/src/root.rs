// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The root of one rendered tree.

use crate::expiration::ExpirationTime;
use crate::fiber::FiberId;
use crate::host::HostConfig;

/// Bookkeeping for one container: which fiber is current and what work is
/// pending on the tree.
pub struct FiberRoot<H: HostConfig> {
    pub(crate) container: H::Container,
    pub(crate) current: FiberId,
    pub(crate) first_pending_time: ExpirationTime,
    pub(crate) finished_expiration_time: ExpirationTime,
    pub(crate) commits: u64,
}

impl<H: HostConfig> core::fmt::Debug for FiberRoot<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FiberRoot")
            .field("current", &self.current)
            .field("first_pending_time", &self.first_pending_time)
            .field("finished_expiration_time", &self.finished_expiration_time)
            .field("commits", &self.commits)
            .finish_non_exhaustive()
    }
}

impl<H: HostConfig> FiberRoot<H> {
    pub(crate) fn new(container: H::Container, current: FiberId) -> Self {
        Self {
            container,
            current,
            first_pending_time: ExpirationTime::NO_WORK,
            finished_expiration_time: ExpirationTime::NO_WORK,
            commits: 0,
        }
    }

    /// The host container.
    #[must_use]
    pub fn container(&self) -> &H::Container {
        &self.container
    }

    /// The root fiber of the committed tree.
    #[must_use]
    pub fn current(&self) -> FiberId {
        self.current
    }

    /// Most urgent pending work anywhere in the tree.
    #[must_use]
    pub fn first_pending_time(&self) -> ExpirationTime {
        self.first_pending_time
    }

    /// Expiration time of the last commit.
    #[must_use]
    pub fn finished_expiration_time(&self) -> ExpirationTime {
        self.finished_expiration_time
    }

    /// Number of commits so far.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    pub(crate) fn mark_pending(&mut self, t: ExpirationTime) {
        self.first_pending_time = self.first_pending_time.max(t);
    }

    pub(crate) fn mark_finished(&mut self, finished: ExpirationTime, remaining: ExpirationTime) {
        self.finished_expiration_time = finished;
        self.first_pending_time = remaining;
        self.commits += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHost;

    #[test]
    fn pending_time_only_rises_until_commit() {
        let id = FiberId {
            idx: 0,
            generation: 0,
        };
        let mut root = FiberRoot::<TestHost>::new(7, id);
        root.mark_pending(ExpirationTime::IDLE);
        root.mark_pending(ExpirationTime::SYNC);
        root.mark_pending(ExpirationTime::IDLE);
        assert_eq!(root.first_pending_time(), ExpirationTime::SYNC);

        root.mark_finished(ExpirationTime::SYNC, ExpirationTime::IDLE);
        assert_eq!(root.first_pending_time(), ExpirationTime::IDLE);
        assert_eq!(root.finished_expiration_time(), ExpirationTime::SYNC);
        assert_eq!(root.commit_count(), 1);
        assert_eq!(*root.container(), 7);
    }
}
