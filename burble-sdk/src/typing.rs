//! Typing-indicator coordination.
//!
//! Local side: one debounced state machine for the whole session. The
//! first keystroke of a burst emits `typing_start`, and an inactivity
//! deadline emits `typing_stop`. Remote side: per-peer state with a TTL, so
//! a lost `typing_stop` cannot leave a stale indicator forever.
//!
//! The coordinator is a pure state machine over injected instants; the
//! engine owns the actual timers and feeds deadlines back in.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Protocol signal produced by local activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Start,
    Stop,
}

#[derive(Debug)]
pub struct TypingCoordinator {
    idle_timeout: Duration,
    remote_ttl: Duration,
    local_active: bool,
    local_deadline: Option<Instant>,
    /// Peer -> instant their indicator expires without a refresh.
    remote: HashMap<String, Instant>,
}

impl TypingCoordinator {
    pub fn new(idle_timeout: Duration, remote_ttl: Duration) -> Self {
        Self {
            idle_timeout,
            remote_ttl,
            local_active: false,
            local_deadline: None,
            remote: HashMap::new(),
        }
    }

    /// Raw local input activity. Returns `Start` only when a burst begins;
    /// every call pushes the inactivity deadline out.
    pub fn local_activity(&mut self, now: Instant) -> Option<TypingSignal> {
        self.local_deadline = Some(now + self.idle_timeout);
        if self.local_active {
            None
        } else {
            self.local_active = true;
            Some(TypingSignal::Start)
        }
    }

    /// Deadline for the next inactivity check, while a burst is live.
    pub fn local_deadline(&self) -> Option<Instant> {
        self.local_deadline
    }

    /// Called when the inactivity deadline fires.
    pub fn local_idle(&mut self, now: Instant) -> Option<TypingSignal> {
        match self.local_deadline {
            Some(deadline) if now >= deadline => {
                self.local_active = false;
                self.local_deadline = None;
                Some(TypingSignal::Stop)
            }
            _ => None,
        }
    }

    /// Explicit end of a burst (a message was sent). Returns `Stop` if a
    /// start had gone out.
    pub fn local_finish(&mut self) -> Option<TypingSignal> {
        self.local_deadline = None;
        if self.local_active {
            self.local_active = false;
            Some(TypingSignal::Stop)
        } else {
            None
        }
    }

    /// Drop local state without emitting. Typing does not survive a
    /// disconnect.
    pub fn reset_local(&mut self) {
        self.local_active = false;
        self.local_deadline = None;
    }

    /// Apply a remote `typing_status`. Returns true if the visible set
    /// changed (a refresh of an already-typing peer only extends its TTL).
    pub fn remote_update(&mut self, peer: &str, is_typing: bool, now: Instant) -> bool {
        if is_typing {
            self.remote
                .insert(peer.to_string(), now + self.remote_ttl)
                .is_none()
        } else {
            self.remote.remove(peer).is_some()
        }
    }

    /// Earliest remote expiry, if any peer is typing.
    pub fn remote_deadline(&self) -> Option<Instant> {
        self.remote.values().copied().min()
    }

    /// Purge peers whose TTL lapsed. Returns true if any were dropped.
    pub fn expire_remote(&mut self, now: Instant) -> bool {
        let before = self.remote.len();
        self.remote.retain(|_, deadline| *deadline > now);
        self.remote.len() != before
    }

    /// Peers currently typing, sorted for stable display.
    pub fn remote_typing(&self) -> Vec<String> {
        let mut names: Vec<String> = self.remote.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop all remote state (disconnect). Returns true if anything was
    /// visible.
    pub fn reset_remote(&mut self) -> bool {
        let had_any = !self.remote.is_empty();
        self.remote.clear();
        had_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> TypingCoordinator {
        TypingCoordinator::new(Duration::from_millis(2000), Duration::from_millis(5000))
    }

    #[test]
    fn burst_emits_one_start_then_one_stop() {
        let mut typing = coordinator();
        let t0 = Instant::now();

        assert_eq!(typing.local_activity(t0), Some(TypingSignal::Start));
        for i in 1..10 {
            let at = t0 + Duration::from_millis(i * 100);
            assert_eq!(typing.local_activity(at), None);
        }

        // Deadline trails the last keystroke, not the first.
        let last = t0 + Duration::from_millis(900);
        assert_eq!(typing.local_deadline(), Some(last + Duration::from_millis(2000)));
        assert_eq!(typing.local_idle(last + Duration::from_millis(1999)), None);
        assert_eq!(
            typing.local_idle(last + Duration::from_millis(2000)),
            Some(TypingSignal::Stop)
        );
        assert_eq!(typing.local_deadline(), None);

        // A fresh burst starts over.
        let later = t0 + Duration::from_secs(10);
        assert_eq!(typing.local_activity(later), Some(TypingSignal::Start));
    }

    #[test]
    fn finish_stops_only_an_active_burst() {
        let mut typing = coordinator();
        assert_eq!(typing.local_finish(), None);
        typing.local_activity(Instant::now());
        assert_eq!(typing.local_finish(), Some(TypingSignal::Stop));
        assert_eq!(typing.local_finish(), None);
    }

    #[test]
    fn remote_peers_expire_without_a_stop() {
        let mut typing = coordinator();
        let t0 = Instant::now();

        assert!(typing.remote_update("bob", true, t0));
        assert_eq!(typing.remote_typing(), vec!["bob".to_string()]);

        // A refresh extends the TTL but the set is unchanged.
        assert!(!typing.remote_update("bob", true, t0 + Duration::from_millis(1000)));
        let deadline = typing.remote_deadline().unwrap();
        assert_eq!(deadline, t0 + Duration::from_millis(6000));

        assert!(!typing.expire_remote(deadline - Duration::from_millis(1)));
        assert!(typing.expire_remote(deadline + Duration::from_millis(1)));
        assert!(typing.remote_typing().is_empty());
        assert_eq!(typing.remote_deadline(), None);
    }

    #[test]
    fn remote_stop_clears_immediately() {
        let mut typing = coordinator();
        let t0 = Instant::now();
        typing.remote_update("bob", true, t0);
        typing.remote_update("carol", true, t0);
        assert_eq!(
            typing.remote_typing(),
            vec!["bob".to_string(), "carol".to_string()]
        );
        assert!(typing.remote_update("bob", false, t0));
        assert_eq!(typing.remote_typing(), vec!["carol".to_string()]);
        // Stopping a peer that is not typing changes nothing.
        assert!(!typing.remote_update("bob", false, t0));
    }

    #[test]
    fn reset_drops_everything_silently() {
        let mut typing = coordinator();
        let t0 = Instant::now();
        typing.local_activity(t0);
        typing.remote_update("bob", true, t0);

        typing.reset_local();
        assert_eq!(typing.local_deadline(), None);
        assert!(typing.reset_remote());
        assert!(!typing.reset_remote());
    }
}
