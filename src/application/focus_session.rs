use crate::application::sync_bridge::{PersistTicket, SyncBridge, SyncError};
use crate::domain::ambience::{
    AmbienceController, CueDirective, PlaybackDirective, expired_cue, is_known_sound,
};
use crate::domain::models::{Task, TaskDefaults, TaskPatch};
use crate::domain::timer::{TimerEngine, TimerEvent, TimerPhase, TimerSnapshot};
use crate::infrastructure::task_store::TaskStore;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub defaults: TaskDefaults,
    pub break_sound: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            defaults: TaskDefaults::default(),
            break_sound: AmbienceController::default().selected_sound().to_string(),
        }
    }
}

/// Everything a view needs to redraw after one operation.
#[derive(Debug)]
pub struct SessionUpdate {
    pub timer: TimerSnapshot,
    pub task: Task,
    pub playback: PlaybackDirective,
    pub cue: Option<CueDirective>,
    pub persist: Option<PersistTicket>,
}

/// Timer, task record and ambience for one open task view.
#[derive(Debug)]
pub struct FocusSession {
    engine: TimerEngine,
    bridge: SyncBridge,
    ambience: AmbienceController,
}

fn minutes_or(value: u32, fallback: u32) -> NonZeroU32 {
    NonZeroU32::new(value)
        .or(NonZeroU32::new(fallback))
        .unwrap_or(NonZeroU32::MIN)
}

fn validate_sound(sound_id: &str) -> Result<(), SyncError> {
    if !is_known_sound(sound_id) {
        return Err(SyncError::ValidationFailure(format!(
            "unknown break sound '{sound_id}'"
        )));
    }
    Ok(())
}

impl FocusSession {
    /// Must be called inside a tokio runtime (the bridge spawns its writer).
    pub fn new(
        store: Arc<dyn TaskStore>,
        task: Task,
        options: &SessionOptions,
    ) -> Result<Self, SyncError> {
        validate_sound(&options.break_sound)?;
        let engine = TimerEngine::new(
            task.id,
            minutes_or(task.work_duration, options.defaults.work_duration),
            minutes_or(task.break_duration, options.defaults.break_duration),
        );
        Ok(Self {
            engine,
            bridge: SyncBridge::new(store, task),
            ambience: AmbienceController::new(options.break_sound.clone()),
        })
    }

    pub fn task(&self) -> &Task {
        self.bridge.task()
    }

    pub fn timer(&self) -> TimerSnapshot {
        self.engine.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.bridge.is_closed()
    }

    pub fn selected_sound(&self) -> &str {
        self.ambience.selected_sound()
    }

    pub fn snapshot(&self) -> SessionUpdate {
        self.update(self.current_playback(), None, None)
    }

    pub fn start(&mut self) -> SessionUpdate {
        let events = self.engine.start();
        self.absorb(events)
    }

    pub fn pause(&mut self) -> SessionUpdate {
        let events = self.engine.pause();
        self.absorb(events)
    }

    /// `None` when the tick changed nothing (timer idle or already expired).
    pub fn tick(&mut self) -> Option<SessionUpdate> {
        let before = self.engine.remaining_seconds();
        let events = self.engine.tick();
        if events.is_empty() && before == self.engine.remaining_seconds() {
            return None;
        }
        Some(self.absorb(events))
    }

    pub fn reset(&mut self) -> SessionUpdate {
        let events = self.engine.reset();
        self.absorb(events)
    }

    /// Stores the new phase length on the task; the countdown in progress keeps
    /// its remaining time.
    pub fn change_duration(
        &mut self,
        phase: TimerPhase,
        minutes: u32,
    ) -> Result<SessionUpdate, SyncError> {
        let patch = match phase {
            TimerPhase::Work => TaskPatch::work_duration(minutes),
            TimerPhase::Break => TaskPatch::break_duration(minutes),
        };
        self.edit(patch)
    }

    pub fn select_sound(&mut self, sound_id: &str) -> Result<SessionUpdate, SyncError> {
        validate_sound(sound_id)?;
        let playback =
            self.ambience
                .select_sound(sound_id, self.engine.phase(), self.engine.is_running());
        Ok(self.update(playback, None, None))
    }

    /// Applies a user edit locally and queues it for the store.
    pub fn edit(&mut self, patch: TaskPatch) -> Result<SessionUpdate, SyncError> {
        let work = patch.work_duration.and_then(NonZeroU32::new);
        let rest = patch.break_duration.and_then(NonZeroU32::new);
        let (_, ticket) = self.bridge.submit(patch)?;
        if let Some(minutes) = work {
            self.engine.change_duration(TimerPhase::Work, minutes);
        }
        if let Some(minutes) = rest {
            self.engine.change_duration(TimerPhase::Break, minutes);
        }
        Ok(self.update(self.current_playback(), None, Some(ticket)))
    }

    pub fn toggle_complete(&mut self) -> Result<SessionUpdate, SyncError> {
        let patch = TaskPatch::toggle_completion(self.bridge.task());
        self.edit(patch)
    }

    pub fn retry_sync(&self) -> SessionUpdate {
        let ticket = self.bridge.retry();
        self.update(self.current_playback(), None, Some(ticket))
    }

    pub fn request_delete(&self) -> PersistTicket<()> {
        self.bridge.delete()
    }

    /// Final state after the store confirmed deletion: timer halted, audio off,
    /// later persistence results discarded.
    pub fn teardown(&mut self) -> SessionUpdate {
        self.engine.stop();
        self.bridge.close();
        info!(task_id = self.engine.task_id(), "session torn down after delete");
        self.update(self.ambience.rewind(self.engine.phase(), false), None, None)
    }

    /// Releases the session when its view closes.
    pub fn close(&mut self) -> PlaybackDirective {
        self.engine.stop();
        self.bridge.close();
        self.ambience.rewind(self.engine.phase(), false)
    }

    fn current_playback(&self) -> PlaybackDirective {
        self.ambience
            .directive(self.engine.phase(), self.engine.is_running())
    }

    fn absorb(&mut self, events: Vec<TimerEvent>) -> SessionUpdate {
        let mut cue = None;
        let mut persist = None;
        let mut playback = self.current_playback();

        for event in events {
            match event {
                TimerEvent::Expired { finished, next } => {
                    info!(
                        task_id = self.engine.task_id(),
                        finished = finished.as_str(),
                        next = next.as_str(),
                        "phase expired"
                    );
                    cue = Some(expired_cue());
                }
                TimerEvent::PomodoroCompleted => {
                    // A torn-down session has no record left to credit.
                    if !self.bridge.is_closed() {
                        persist = Some(self.bridge.record_pomodoro());
                    }
                }
                TimerEvent::Reset => {
                    playback = self
                        .ambience
                        .rewind(self.engine.phase(), self.engine.is_running());
                }
                TimerEvent::Started(_) | TimerEvent::Paused(_) => {}
            }
        }

        self.update(playback, cue, persist)
    }

    fn update(
        &self,
        playback: PlaybackDirective,
        cue: Option<CueDirective>,
        persist: Option<PersistTicket>,
    ) -> SessionUpdate {
        SessionUpdate {
            timer: self.engine.snapshot(),
            task: self.bridge.task().clone(),
            playback,
            cue,
            persist,
        }
    }
}
