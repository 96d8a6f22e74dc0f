use crate::registry::room::RoomState;
use dashmap::DashMap;
use huddle_core::{CodeStyle, ErrorKind, PeerId, RoomCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub max_rooms: usize,
    pub idle_threshold: Duration,
    pub code_style: CodeStyle,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_rooms: 1024,
            idle_threshold: Duration::from_secs(5 * 60),
            code_style: CodeStyle::default(),
        }
    }
}

/// Owns every room. Per-room serialization comes from the map's entry
/// locking; no guard is ever held across an await point.
pub struct RoomRegistry {
    rooms: DashMap<RoomCode, RoomState>,
    config: RegistryConfig,
}

impl RoomRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            rooms: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Create an empty room under a fresh collision-checked code.
    pub fn create_room(&self) -> Result<RoomCode, ErrorKind> {
        if self.rooms.len() >= self.config.max_rooms {
            return Err(ErrorKind::CapacityExceeded);
        }

        let now = Instant::now();
        loop {
            let code = RoomCode::generate(self.config.code_style);
            match self.rooms.entry(code.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(RoomState::new(code.clone(), now));
                    info!("Created room {}", code);
                    return Ok(code);
                }
            }
        }
    }

    /// Add a member (idempotent) and return the current member list
    /// excluding the caller. A room stays joinable until the sweep
    /// removes it.
    pub fn join_room(&self, code: &RoomCode, member: &PeerId) -> Result<Vec<PeerId>, ErrorKind> {
        let mut room = self.rooms.get_mut(code).ok_or(ErrorKind::RoomNotFound)?;
        let others = room.join(member.clone(), Instant::now());
        debug!("Member {} joined room {} ({} others)", member, code, others.len());
        Ok(others)
    }

    /// Remove a member. An emptied room is left for the sweep: idle-timeout
    /// expiry, not immediate deletion.
    pub fn leave_room(&self, code: &RoomCode, member: &PeerId) {
        if let Some(mut room) = self.rooms.get_mut(code) {
            if room.leave(member, Instant::now()) {
                debug!("Member {} left room {}", member, code);
            }
        }
    }

    /// Refresh activity timestamps from relay traffic.
    pub fn touch(&self, code: &RoomCode, member: &PeerId) {
        if let Some(mut room) = self.rooms.get_mut(code) {
            room.touch(member, Instant::now());
        }
    }

    pub fn is_member(&self, code: &RoomCode, member: &PeerId) -> bool {
        self.rooms
            .get(code)
            .map(|room| room.contains(member))
            .unwrap_or(false)
    }

    /// Member list for the HTTP preflight. Distinguishes a room that is
    /// already past its idle threshold but not yet swept.
    pub fn lookup(&self, code: &RoomCode) -> Result<Vec<PeerId>, ErrorKind> {
        let room = self.rooms.get(code).ok_or(ErrorKind::RoomNotFound)?;
        if room.expired(Instant::now(), self.config.idle_threshold) {
            return Err(ErrorKind::RoomExpired);
        }
        Ok(room.member_ids())
    }

    pub fn members(&self, code: &RoomCode) -> Option<Vec<PeerId>> {
        self.rooms.get(code).map(|room| room.member_ids())
    }

    /// Remove every room that is empty and idle past the threshold.
    /// Safe to run concurrently with the mutators: `retain` takes the same
    /// per-entry locks.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.rooms.len();
        self.rooms
            .retain(|_, room| !room.expired(now, self.config.idle_threshold));
        let removed = before - self.rooms.len();
        if removed > 0 {
            info!("Sweep removed {} expired room(s)", removed);
        }
        removed
    }

    /// Background sweep on a fixed interval.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.sweep(Instant::now());
            }
        })
    }
}
