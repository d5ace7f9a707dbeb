//! Cluster membership bookkeeping.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::event::InboundEvent;

/// Liveness status of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Heard from recently.
    Alive,

    /// Silent past the suspicion window.
    Failed,

    /// Announced a graceful departure.
    Left,
}

/// A member of the cluster as seen on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Node name (identity UUID string).
    pub name: String,

    /// The member's bus address.
    pub addr: SocketAddr,

    /// Current liveness status.
    pub status: MemberStatus,
}

/// Internal table entry with local timing state.
#[derive(Debug, Clone)]
struct Entry {
    member: Member,
    last_heard: Instant,
    failed_at: Option<Instant>,
}

/// The membership table.
///
/// Mutated only by the bus's receive and probe paths; snapshots are
/// cloned out for callers. Lifecycle events produced by each mutation are
/// returned to the caller for delivery on the inbound queue.
#[derive(Debug)]
pub(crate) struct MemberTable {
    self_name: String,
    entries: HashMap<String, Entry>,
}

impl MemberTable {
    pub fn new(self_name: String, self_addr: SocketAddr) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            self_name.clone(),
            Entry {
                member: Member {
                    name: self_name.clone(),
                    addr: self_addr,
                    status: MemberStatus::Alive,
                },
                last_heard: Instant::now(),
                failed_at: None,
            },
        );
        Self {
            self_name,
            entries,
        }
    }

    /// Snapshot of all known members, self included.
    pub fn snapshot(&self) -> Vec<Member> {
        let mut members: Vec<_> = self.entries.values().map(|e| e.member.clone()).collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members
    }

    /// Alive members other than self.
    pub fn alive_peers(&self) -> Vec<Member> {
        self.entries
            .values()
            .filter(|e| e.member.name != self.self_name && e.member.status == MemberStatus::Alive)
            .map(|e| e.member.clone())
            .collect()
    }

    /// Looks up a member's address by name.
    pub fn addr_of(&self, name: &str) -> Option<SocketAddr> {
        self.entries.get(name).map(|e| e.member.addr)
    }

    /// Records a datagram received directly from `name` at `addr`.
    ///
    /// Returns the lifecycle event this observation produced, if any.
    pub fn observe_direct(&mut self, name: &str, addr: SocketAddr) -> Option<InboundEvent> {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.last_heard = Instant::now();
                let changed_addr = entry.member.addr != addr;
                entry.member.addr = addr;

                if entry.member.status != MemberStatus::Alive {
                    entry.member.status = MemberStatus::Alive;
                    entry.failed_at = None;
                    Some(InboundEvent::MemberUpdate(entry.member.clone()))
                } else if changed_addr {
                    Some(InboundEvent::MemberUpdate(entry.member.clone()))
                } else {
                    None
                }
            }
            None => {
                let member = Member {
                    name: name.to_string(),
                    addr,
                    status: MemberStatus::Alive,
                };
                self.entries.insert(
                    name.to_string(),
                    Entry {
                        member: member.clone(),
                        last_heard: Instant::now(),
                        failed_at: None,
                    },
                );
                Some(InboundEvent::MemberJoin(member))
            }
        }
    }

    /// Merges a gossiped member sample.
    ///
    /// Unknown members are adopted as alive; known members are left
    /// untouched so that only direct traffic refreshes liveness.
    pub fn merge_sample(&mut self, sample: Vec<Member>) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        for member in sample {
            if member.name == self.self_name || self.entries.contains_key(&member.name) {
                continue;
            }
            if member.status != MemberStatus::Alive {
                continue;
            }
            self.entries.insert(
                member.name.clone(),
                Entry {
                    member: member.clone(),
                    last_heard: Instant::now(),
                    failed_at: None,
                },
            );
            events.push(InboundEvent::MemberJoin(member));
        }
        events
    }

    /// Records a graceful departure; the entry is removed immediately.
    pub fn observe_leave(&mut self, name: &str) -> Option<InboundEvent> {
        let mut entry = self.entries.remove(name)?;
        entry.member.status = MemberStatus::Left;
        Some(InboundEvent::MemberLeave(entry.member))
    }

    /// Failure-detection sweep.
    ///
    /// Members silent past `suspicion` are marked failed; members failed
    /// for as long again are reaped.
    pub fn sweep(&mut self, suspicion: Duration) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        let mut reaped = Vec::new();

        for entry in self.entries.values_mut() {
            if entry.member.name == self.self_name {
                continue;
            }
            match entry.member.status {
                MemberStatus::Alive => {
                    if entry.last_heard.elapsed() > suspicion {
                        entry.member.status = MemberStatus::Failed;
                        entry.failed_at = Some(Instant::now());
                        events.push(InboundEvent::MemberFailed(entry.member.clone()));
                    }
                }
                MemberStatus::Failed => {
                    if entry.failed_at.is_some_and(|t| t.elapsed() > suspicion) {
                        reaped.push(entry.member.name.clone());
                    }
                }
                MemberStatus::Left => {}
            }
        }

        for name in reaped {
            if let Some(entry) = self.entries.remove(&name) {
                events.push(InboundEvent::MemberReap(entry.member));
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn table() -> MemberTable {
        MemberTable::new("self".to_string(), addr(7000))
    }

    #[test]
    fn test_snapshot_contains_self() {
        let table = table();
        let members = table.snapshot();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "self");
        assert_eq!(members[0].status, MemberStatus::Alive);
    }

    #[test]
    fn test_direct_observation_joins() {
        let mut table = table();
        let event = table.observe_direct("peer", addr(7001));
        assert!(matches!(event, Some(InboundEvent::MemberJoin(_))));
        assert_eq!(table.alive_peers().len(), 1);

        // A second observation is not a join.
        assert!(table.observe_direct("peer", addr(7001)).is_none());
    }

    #[test]
    fn test_failed_member_revives_on_direct_traffic() {
        let mut table = table();
        table.observe_direct("peer", addr(7001));
        table.sweep(Duration::ZERO);
        assert!(table.alive_peers().is_empty());

        let event = table.observe_direct("peer", addr(7001));
        assert!(matches!(event, Some(InboundEvent::MemberUpdate(_))));
        assert_eq!(table.alive_peers().len(), 1);
    }

    #[test]
    fn test_sweep_fails_then_reaps() {
        let mut table = table();
        table.observe_direct("peer", addr(7001));

        let events = table.sweep(Duration::ZERO);
        assert!(matches!(events.as_slice(), [InboundEvent::MemberFailed(_)]));

        let events = table.sweep(Duration::ZERO);
        assert!(matches!(events.as_slice(), [InboundEvent::MemberReap(_)]));
        assert!(table.addr_of("peer").is_none());
    }

    #[test]
    fn test_merge_adopts_unknown_only() {
        let mut table = table();
        table.observe_direct("known", addr(7001));

        let sample = vec![
            Member {
                name: "known".to_string(),
                addr: addr(9999),
                status: MemberStatus::Alive,
            },
            Member {
                name: "new".to_string(),
                addr: addr(7002),
                status: MemberStatus::Alive,
            },
            Member {
                name: "self".to_string(),
                addr: addr(1),
                status: MemberStatus::Alive,
            },
        ];

        let events = table.merge_sample(sample);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], InboundEvent::MemberJoin(m) if m.name == "new"));

        // Known member's address is not overwritten by rumor.
        assert_eq!(table.addr_of("known"), Some(addr(7001)));
    }

    #[test]
    fn test_leave_removes_entry() {
        let mut table = table();
        table.observe_direct("peer", addr(7001));

        let event = table.observe_leave("peer");
        assert!(matches!(event, Some(InboundEvent::MemberLeave(_))));
        assert!(table.addr_of("peer").is_none());
        assert!(table.observe_leave("peer").is_none());
    }
}
