use std::time::{Duration, Instant};

use crate::config::DetectorConfig;
use crate::platform::Point;

/// Polling mode. `Idle` polls at the slow interval, `Active` at the fast one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorMode {
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Wait,
    Probe(Point),
}

/// Tick-level state machine. Owns every flag the polling loop needs so the
/// loop itself stays a thin timer around [`DetectorState::on_tick`].
#[derive(Debug)]
pub struct DetectorState {
    mode: DetectorMode,
    last_position: Option<Point>,
    idle_ticks: u32,
    last_activity: Option<Instant>,
    last_probe: Option<Instant>,
    last_manual_request: Option<Instant>,
    last_surfaced: Option<String>,

    slow_interval: Duration,
    fast_interval: Duration,
    idle_ticks_threshold: u32,
    probe_cooldown: Duration,
    inactivity: Duration,
    manual_debounce: Duration,
}

impl DetectorState {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            mode: DetectorMode::Idle,
            last_position: None,
            idle_ticks: 0,
            last_activity: None,
            last_probe: None,
            last_manual_request: None,
            last_surfaced: None,
            slow_interval: config.slow_interval(),
            fast_interval: config.fast_interval(),
            idle_ticks_threshold: config.idle_ticks_threshold.max(1),
            probe_cooldown: config.probe_cooldown(),
            inactivity: config.inactivity(),
            manual_debounce: config.manual_probe_debounce(),
        }
    }

    pub fn mode(&self) -> DetectorMode {
        self.mode
    }

    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Delay until the next tick in the current mode.
    pub fn interval(&self) -> Duration {
        match self.mode {
            DetectorMode::Idle => self.slow_interval,
            DetectorMode::Active => self.fast_interval,
        }
    }

    pub fn last_surfaced(&self) -> Option<&str> {
        self.last_surfaced.as_deref()
    }

    pub fn on_tick(&mut self, position: Point, now: Instant, probe_blocked: bool) -> TickDecision {
        let Some(previous) = self.last_position.replace(position) else {
            return TickDecision::Wait;
        };

        if previous != position {
            self.mode = DetectorMode::Active;
            self.idle_ticks = 0;
            self.last_activity = Some(now);
            return TickDecision::Wait;
        }

        if self.mode == DetectorMode::Idle {
            return TickDecision::Wait;
        }

        let inactive_for = self
            .last_activity
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        if inactive_for > self.inactivity {
            self.mode = DetectorMode::Idle;
            self.idle_ticks = 0;
            return TickDecision::Wait;
        }

        self.idle_ticks = self.idle_ticks.saturating_add(1);

        if self.idle_ticks >= self.idle_ticks_threshold && self.cooldown_elapsed(now) && !probe_blocked
        {
            return TickDecision::Probe(position);
        }
        TickDecision::Wait
    }

    /// Explicit user request. Skips the idle counter and cooldown, but is
    /// debounced and still honours the gate.
    pub fn on_manual_request(
        &mut self,
        position: Point,
        now: Instant,
        probe_blocked: bool,
    ) -> TickDecision {
        if probe_blocked {
            return TickDecision::Wait;
        }
        if let Some(previous) = self.last_manual_request {
            if now.saturating_duration_since(previous) <= self.manual_debounce {
                return TickDecision::Wait;
            }
        }
        self.last_manual_request = Some(now);
        TickDecision::Probe(position)
    }

    pub fn on_probe_started(&mut self, now: Instant) {
        self.last_probe = Some(now);
    }

    /// Stays in fast polling with a fresh idle counter so the same gesture
    /// is not probed again right away.
    pub fn on_selection_surfaced(&mut self, text: &str) {
        self.last_surfaced = Some(text.to_string());
        self.idle_ticks = 0;
    }

    pub fn on_deselected(&mut self) {
        self.last_surfaced = None;
    }

    /// Forgets `text` as surfaced when nothing newer replaced it meanwhile.
    pub fn on_selection_rejected(&mut self, text: &str) {
        if self.last_surfaced.as_deref() == Some(text) {
            self.last_surfaced = None;
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_probe {
            Some(at) => now.saturating_duration_since(at) >= self.probe_cooldown,
            None => true,
        }
    }
}
