use huddle_core::{PeerId, RoomCode};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub last_seen: Instant,
}

/// In-memory state of one room. All mutation goes through the registry,
/// which serializes access per room.
#[derive(Debug)]
pub struct RoomState {
    code: RoomCode,
    members: HashMap<PeerId, MemberInfo>,
    created_at: Instant,
    last_activity: Instant,
}

impl RoomState {
    pub fn new(code: RoomCode, now: Instant) -> Self {
        Self {
            code,
            members: HashMap::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Add a member (idempotent) and return the other members.
    pub fn join(&mut self, member: PeerId, now: Instant) -> Vec<PeerId> {
        self.last_activity = now;
        self.members
            .entry(member.clone())
            .and_modify(|m| m.last_seen = now)
            .or_insert(MemberInfo { last_seen: now });
        self.members
            .keys()
            .filter(|id| **id != member)
            .cloned()
            .collect()
    }

    /// Remove a member; returns whether it was present.
    pub fn leave(&mut self, member: &PeerId, now: Instant) -> bool {
        self.last_activity = now;
        self.members.remove(member).is_some()
    }

    pub fn touch(&mut self, member: &PeerId, now: Instant) {
        self.last_activity = now;
        if let Some(info) = self.members.get_mut(member) {
            info.last_seen = now;
        }
    }

    pub fn contains(&self, member: &PeerId) -> bool {
        self.members.contains_key(member)
    }

    pub fn member_ids(&self) -> Vec<PeerId> {
        self.members.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Eligible for removal: nobody left and idle past the threshold.
    pub fn expired(&self, now: Instant, idle_threshold: Duration) -> bool {
        self.members.is_empty()
            && now.saturating_duration_since(self.last_activity) >= idle_threshold
    }
}
