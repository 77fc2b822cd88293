//! Single-task countdown cycling between work and break phases.
//!
//! The engine never fails and never suspends: every operation is a short
//! synchronous transition returning the events it produced. Ticks are fed in by
//! an external one-second scheduler.

use crate::domain::models::TaskId;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Work,
    Break,
}

impl TimerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started(TimerPhase),
    Paused(TimerPhase),
    /// Countdown hit zero; `finished` is the phase that just ended.
    Expired {
        finished: TimerPhase,
        next: TimerPhase,
    },
    PomodoroCompleted,
    Reset,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub task_id: TaskId,
    pub phase: TimerPhase,
    pub remaining_seconds: u32,
    pub phase_total_seconds: u32,
    pub running: bool,
}

impl TimerSnapshot {
    /// Elapsed share of the current phase, 0.0 to 100.0.
    pub fn progress_percent(&self) -> f64 {
        if self.phase_total_seconds == 0 {
            return 0.0;
        }
        let elapsed = self.phase_total_seconds - self.remaining_seconds;
        f64::from(elapsed) / f64::from(self.phase_total_seconds) * 100.0
    }

    pub fn formatted_remaining(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone)]
pub struct TimerEngine {
    task_id: TaskId,
    phase: TimerPhase,
    remaining_seconds: u32,
    // Length of the phase as it was entered; bounds `remaining_seconds`.
    phase_total_seconds: u32,
    running: bool,
    work_minutes: NonZeroU32,
    break_minutes: NonZeroU32,
}

impl TimerEngine {
    pub fn new(task_id: TaskId, work_minutes: NonZeroU32, break_minutes: NonZeroU32) -> Self {
        let total = minutes_to_seconds(work_minutes);
        Self {
            task_id,
            phase: TimerPhase::Work,
            remaining_seconds: total,
            phase_total_seconds: total,
            running: false,
            work_minutes,
            break_minutes,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn duration(&self, phase: TimerPhase) -> NonZeroU32 {
        match phase {
            TimerPhase::Work => self.work_minutes,
            TimerPhase::Break => self.break_minutes,
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            task_id: self.task_id,
            phase: self.phase,
            remaining_seconds: self.remaining_seconds,
            phase_total_seconds: self.phase_total_seconds,
            running: self.running,
        }
    }

    pub fn start(&mut self) -> Vec<TimerEvent> {
        if self.running || self.remaining_seconds == 0 {
            return Vec::new();
        }
        self.running = true;
        vec![TimerEvent::Started(self.phase)]
    }

    pub fn pause(&mut self) -> Vec<TimerEvent> {
        if !self.running {
            return Vec::new();
        }
        self.running = false;
        vec![TimerEvent::Paused(self.phase)]
    }

    pub fn tick(&mut self) -> Vec<TimerEvent> {
        // A late tick after expiry, or one racing a pause, must not count.
        if !self.running || self.remaining_seconds == 0 {
            return Vec::new();
        }
        self.remaining_seconds -= 1;
        if self.remaining_seconds > 0 {
            return Vec::new();
        }
        self.expire()
    }

    pub fn reset(&mut self) -> Vec<TimerEvent> {
        self.enter(TimerPhase::Work);
        self.running = false;
        vec![TimerEvent::Reset]
    }

    /// Takes effect the next time `phase` is entered; an in-flight countdown
    /// keeps its remaining time.
    pub fn change_duration(&mut self, phase: TimerPhase, minutes: NonZeroU32) {
        match phase {
            TimerPhase::Work => self.work_minutes = minutes,
            TimerPhase::Break => self.break_minutes = minutes,
        }
    }

    /// Halts the countdown without changing phase or remaining time.
    pub fn stop(&mut self) {
        self.running = false;
    }

    fn expire(&mut self) -> Vec<TimerEvent> {
        let finished = self.phase;
        let next = match finished {
            TimerPhase::Work => TimerPhase::Break,
            TimerPhase::Break => TimerPhase::Work,
        };
        self.enter(next);
        self.running = false;

        let mut events = vec![TimerEvent::Expired { finished, next }];
        if finished == TimerPhase::Work {
            events.push(TimerEvent::PomodoroCompleted);
        }
        events
    }

    fn enter(&mut self, phase: TimerPhase) {
        let total = minutes_to_seconds(self.duration(phase));
        self.phase = phase;
        self.remaining_seconds = total;
        self.phase_total_seconds = total;
    }
}

fn minutes_to_seconds(minutes: NonZeroU32) -> u32 {
    minutes.get().saturating_mul(60)
}
