//! Regional transmit duty-cycle accounting and admission control.

use crate::priority::Priority;
use shared::types::Region;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyCyclePreset {
    /// Fraction of the window a node may transmit, e.g. `0.01` for 1%.
    /// `None` means no duty-cycle cap applies (dwell-time regions).
    pub max_duty_cycle: Option<f64>,
    /// Maximum single-channel dwell time, if the region enforces one.
    pub max_dwell_time: Option<Duration>,
    /// Minimum channel count required when frequency hopping.
    pub min_hopping_channels: Option<u32>,
}

impl DutyCyclePreset {
    #[must_use]
    pub const fn for_region(region: Region) -> Self {
        match region {
            Region::Eu => Self { max_duty_cycle: Some(0.01), max_dwell_time: None, min_hopping_channels: None },
            Region::Us => Self { max_duty_cycle: None, max_dwell_time: Some(Duration::from_millis(400)), min_hopping_channels: Some(64) },
            _ => Self { max_duty_cycle: Some(0.01), max_dwell_time: None, min_hopping_channels: None },
        }
    }
}

#[derive(Debug, Clone)]
pub enum DutyCycleEvent {
    WindowAvailable,
    DutyCycleWarning { current_duty_cycle: f64 },
    DutyCycleViolation { attempted_duty_cycle: f64 },
}

#[derive(Debug, Clone)]
struct Transmission {
    started_at_secs: f64,
    duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct DutyCycleStats {
    pub current_duty_cycle: f64,
    pub transmission_count: u64,
    pub compliance_rate: f64,
}

/// Tracks per-region airtime usage in a sliding window and decides
/// whether a candidate transmission may proceed.
pub struct DutyCycleManager {
    preset: DutyCyclePreset,
    window: Duration,
    history: VecDeque<Transmission>,
    clock_secs: f64,
    total_transmissions: u64,
    compliant_transmissions: u64,
    emergency_override: bool,
}

impl DutyCycleManager {
    #[must_use]
    pub fn new(region: Region, window: Duration, emergency_override: bool) -> Self {
        Self {
            preset: DutyCyclePreset::for_region(region),
            window,
            history: VecDeque::new(),
            clock_secs: 0.0,
            total_transmissions: 0,
            compliant_transmissions: 0,
            emergency_override,
        }
    }

    /// Advances the manager's internal clock. Callers own wall-clock
    /// time; this keeps the manager deterministic and testable.
    pub fn advance(&mut self, by: Duration) {
        self.clock_secs += by.as_secs_f64();
        self.purge_expired();
    }

    fn purge_expired(&mut self) {
        let window_start = self.clock_secs - self.window.as_secs_f64();
        while let Some(front) = self.history.front() {
            if front.started_at_secs < window_start {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn used_airtime(&self) -> f64 {
        self.history.iter().map(|t| t.duration.as_secs_f64()).sum()
    }

    /// Whether a transmission of estimated duration `duration` may
    /// start now, at the given priority.
    #[must_use]
    pub fn can_transmit_now(&self, duration: Duration, priority: Priority, emergency: bool) -> bool {
        if self.emergency_override && emergency && priority == Priority::Critical {
            return true;
        }
        match self.preset.max_duty_cycle {
            Some(max) => {
                let projected = (self.used_airtime() + duration.as_secs_f64()) / self.window.as_secs_f64();
                projected < max
            }
            None => match self.preset.max_dwell_time {
                Some(dwell) => duration <= dwell,
                None => true,
            },
        }
    }

    /// Records an admitted transmission of `duration` on `channel`,
    /// returning any event the admission produced.
    pub fn record_transmission(&mut self, duration: Duration, priority: Priority, emergency: bool) -> Vec<DutyCycleEvent> {
        let mut events = Vec::new();
        let admitted = self.can_transmit_now(duration, priority, emergency);

        self.total_transmissions += 1;
        if admitted {
            self.compliant_transmissions += 1;
            self.history.push_back(Transmission { started_at_secs: self.clock_secs, duration });
        } else {
            let attempted = (self.used_airtime() + duration.as_secs_f64()) / self.window.as_secs_f64();
            events.push(DutyCycleEvent::DutyCycleViolation { attempted_duty_cycle: attempted });
            return events;
        }

        if let Some(max) = self.preset.max_duty_cycle {
            let current = self.used_airtime() / self.window.as_secs_f64();
            if current >= max * 0.8 {
                events.push(DutyCycleEvent::DutyCycleWarning { current_duty_cycle: current });
            }
            if current < max * 0.5 {
                events.push(DutyCycleEvent::WindowAvailable);
            }
        }
        events
    }

    #[must_use]
    pub fn stats(&self) -> DutyCycleStats {
        let current_duty_cycle = self.used_airtime() / self.window.as_secs_f64();
        let compliance_rate = if self.total_transmissions == 0 {
            1.0
        } else {
            self.compliant_transmissions as f64 / self.total_transmissions as f64
        };
        DutyCycleStats { current_duty_cycle, transmission_count: self.total_transmissions, compliance_rate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eu_preset_admits_transmissions_under_one_percent() {
        let mut manager = DutyCycleManager::new(Region::Eu, Duration::from_secs(3600), false);
        assert!(manager.can_transmit_now(Duration::from_secs(30), Priority::Normal, false));
        manager.record_transmission(Duration::from_secs(30), Priority::Normal, false);
        // 30s / 3600s = 0.83%, still under 1%.
        assert!(manager.can_transmit_now(Duration::from_secs(1), Priority::Normal, false));
    }

    #[test]
    fn eu_preset_rejects_transmission_exceeding_cap() {
        let manager = DutyCycleManager::new(Region::Eu, Duration::from_secs(3600), false);
        assert!(!manager.can_transmit_now(Duration::from_secs(40), Priority::Normal, false));
    }

    #[test]
    fn emergency_override_bypasses_the_cap_for_critical_traffic() {
        let mut manager = DutyCycleManager::new(Region::Eu, Duration::from_secs(3600), true);
        for _ in 0..5 {
            manager.record_transmission(Duration::from_secs(30), Priority::Normal, false);
        }
        assert!(manager.can_transmit_now(Duration::from_secs(40), Priority::Critical, true));
    }

    #[test]
    fn s5_eu_duty_cycle_rejects_transmission_landing_exactly_on_the_cap() {
        let mut manager = DutyCycleManager::new(Region::Eu, Duration::from_secs(3600), false);
        manager.record_transmission(Duration::from_millis(1000), Priority::Normal, false);
        // (1000ms + 35000ms) / 3600s == 0.01, exactly the 1% cap: must not be admitted.
        assert!(!manager.can_transmit_now(Duration::from_millis(35_000), Priority::Normal, false));
    }

    #[test]
    fn us_preset_checks_dwell_time_not_duty_cycle() {
        let manager = DutyCycleManager::new(Region::Us, Duration::from_secs(3600), false);
        assert!(manager.can_transmit_now(Duration::from_millis(400), Priority::Normal, false));
        assert!(!manager.can_transmit_now(Duration::from_millis(401), Priority::Normal, false));
    }

    #[test]
    fn window_roll_off_purges_old_entries() {
        let mut manager = DutyCycleManager::new(Region::Eu, Duration::from_secs(100), false);
        manager.record_transmission(Duration::from_secs(1), Priority::Normal, false);
        manager.advance(Duration::from_secs(200));
        assert_eq!(manager.stats().current_duty_cycle, 0.0);
    }
}
