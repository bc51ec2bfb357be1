//! Boot-progress latch: remembers the furthest stage the system has reached.

/// Stages in the order a healthy boot passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SystemHealth {
    #[default]
    FirstEntry = 1,
    EnteredConfig,
    EnteredMain,
    EnteredWlanLoop,
    EnteredSetup,
    EnteredLoop,
    RanLoop,
    PreserveApp,
}

#[derive(Debug, Default)]
pub struct HealthMonitor {
    latched: SystemHealth,
}

impl HealthMonitor {
    pub const fn new() -> Self {
        Self {
            latched: SystemHealth::FirstEntry,
        }
    }

    /// Records `health` if it is further along than anything seen before.
    pub fn set(&mut self, health: SystemHealth) {
        if health > self.latched {
            log::trace!("system health {:?} -> {:?}", self.latched, health);
            self.latched = health;
        }
    }

    pub fn get(&self) -> SystemHealth {
        self.latched
    }
}
