//! An open task-detail view: one focus session plus the scheduler that ticks it.

use crate::application::focus_session::{FocusSession, SessionOptions, SessionUpdate};
use crate::application::sync_bridge::SyncError;
use crate::domain::ambience::PlaybackDirective;
use crate::domain::models::{TaskId, TaskPatch};
use crate::domain::timer::TimerPhase;
use crate::infrastructure::task_store::TaskStore;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

const TICK_PERIOD: Duration = Duration::from_secs(1);

pub type SessionUpdates = mpsc::UnboundedReceiver<SessionUpdate>;

pub struct TaskView {
    task_id: TaskId,
    session: Arc<Mutex<FocusSession>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl TaskView {
    /// Loads the task and opens a session for it. Tick-driven updates arrive on
    /// the returned receiver.
    pub async fn open(
        store: Arc<dyn TaskStore>,
        task_id: TaskId,
        options: &SessionOptions,
    ) -> Result<(Self, SessionUpdates), SyncError> {
        let task = store.get(task_id).await?;
        let session = FocusSession::new(store, task, options)?;
        let (updates, receiver) = mpsc::unbounded_channel();
        info!(task_id, "task view opened");
        Ok((
            Self {
                task_id,
                session: Arc::new(Mutex::new(session)),
                ticker: Mutex::new(None),
                updates,
            },
            receiver,
        ))
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn snapshot(&self) -> Result<SessionUpdate, SyncError> {
        Ok(self.lock_session()?.snapshot())
    }

    pub fn start(&self) -> Result<SessionUpdate, SyncError> {
        let update = self.lock_session()?.start();
        if update.timer.running {
            self.spawn_ticker()?;
        }
        Ok(update)
    }

    pub fn pause(&self) -> Result<SessionUpdate, SyncError> {
        self.stop_ticker()?;
        Ok(self.lock_session()?.pause())
    }

    pub fn reset(&self) -> Result<SessionUpdate, SyncError> {
        self.stop_ticker()?;
        Ok(self.lock_session()?.reset())
    }

    pub fn change_duration(&self, phase: TimerPhase, minutes: u32) -> Result<SessionUpdate, SyncError> {
        self.lock_session()?.change_duration(phase, minutes)
    }

    pub fn select_sound(&self, sound_id: &str) -> Result<SessionUpdate, SyncError> {
        self.lock_session()?.select_sound(sound_id)
    }

    pub fn edit(&self, patch: TaskPatch) -> Result<SessionUpdate, SyncError> {
        self.lock_session()?.edit(patch)
    }

    pub fn toggle_complete(&self) -> Result<SessionUpdate, SyncError> {
        self.lock_session()?.toggle_complete()
    }

    pub fn retry_sync(&self) -> Result<SessionUpdate, SyncError> {
        Ok(self.lock_session()?.retry_sync())
    }

    /// Deletes the task from the store. The session keeps running until the
    /// store acknowledges; on failure nothing local changes.
    pub async fn delete(&self) -> Result<SessionUpdate, SyncError> {
        let ticket = self.lock_session()?.request_delete();
        ticket.acknowledged().await?;
        // Halt the countdown before the ticker can take the lock again.
        let update = self.lock_session()?.teardown();
        self.stop_ticker()?;
        info!(task_id = self.task_id, "task deleted from open view");
        Ok(update)
    }

    /// Cancels the scheduler and silences audio. In-flight writes finish in the
    /// background with their results discarded.
    pub fn close(&self) -> Result<PlaybackDirective, SyncError> {
        self.stop_ticker()?;
        let directive = self.lock_session()?.close();
        info!(task_id = self.task_id, "task view closed");
        Ok(directive)
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, FocusSession>, SyncError> {
        self.session
            .lock()
            .map_err(|error| SyncError::TransientFailure(format!("session lock poisoned: {error}")))
    }

    fn lock_ticker(&self) -> Result<MutexGuard<'_, Option<JoinHandle<()>>>, SyncError> {
        self.ticker
            .lock()
            .map_err(|error| SyncError::TransientFailure(format!("ticker lock poisoned: {error}")))
    }

    fn spawn_ticker(&self) -> Result<(), SyncError> {
        let mut ticker = self.lock_ticker()?;
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }
        let session = Arc::clone(&self.session);
        let updates = self.updates.clone();
        let task_id = self.task_id;
        *ticker = Some(tokio::spawn(run_ticker(task_id, session, updates)));
        Ok(())
    }

    fn stop_ticker(&self) -> Result<(), SyncError> {
        if let Some(handle) = self.lock_ticker()?.take() {
            handle.abort();
        }
        Ok(())
    }
}

impl Drop for TaskView {
    fn drop(&mut self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(handle) = ticker.take() {
                handle.abort();
            }
        }
    }
}

async fn run_ticker(
    task_id: TaskId,
    session: Arc<Mutex<FocusSession>>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
) {
    let mut clock = interval(TICK_PERIOD);
    clock.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of an interval completes immediately.
    clock.tick().await;

    loop {
        clock.tick().await;
        let (update, running) = {
            let Ok(mut session) = session.lock() else {
                return;
            };
            let update = session.tick();
            (update, session.timer().running)
        };
        if let Some(update) = update {
            if updates.send(update).is_err() {
                debug!(task_id, "update receiver dropped; stopping ticker");
                return;
            }
        }
        if !running {
            debug!(task_id, "timer stopped; ticker exiting");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NewTask, TaskDefaults};
    use crate::infrastructure::testing::{ScriptedFailure, ScriptedTaskStore};

    async fn open_view(work: u32, brk: u32) -> (TaskView, SessionUpdates, Arc<ScriptedTaskStore>) {
        let mut new_task = NewTask::new("Write chapter", &TaskDefaults::default());
        new_task.work_duration = work;
        new_task.break_duration = brk;
        let (store, task) = ScriptedTaskStore::seeded(new_task).await;
        let store = Arc::new(store);
        let (view, updates) = TaskView::open(store.clone(), task.id, &SessionOptions::default())
            .await
            .expect("open view");
        (view, updates, store)
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_runs_work_phase_to_expiry() {
        let (view, mut updates, store) = open_view(1, 1).await;
        view.start().expect("start");

        let mut last = None;
        for _ in 0..60 {
            last = updates.recv().await;
        }
        let last = last.expect("expiry update");
        assert_eq!(last.timer.phase, TimerPhase::Break);
        assert!(!last.timer.running);
        assert!(last.cue.is_some());
        last.persist
            .expect("ticket")
            .outcome()
            .await
            .expect("open")
            .expect("stored");
        assert_eq!(
            store.get(view.task_id()).await.expect("get").completed_pomodoros,
            1
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticks() {
        let (view, mut updates, _store) = open_view(1, 1).await;
        view.start().expect("start");
        for _ in 0..3 {
            updates.recv().await.expect("tick");
        }
        let paused = view.pause().expect("pause");
        assert_eq!(paused.timer.remaining_seconds, 57);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(updates.try_recv().is_err());
        assert_eq!(view.snapshot().expect("snapshot").timer.remaining_seconds, 57);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_keeps_one_scheduler() {
        let (view, mut updates, _store) = open_view(1, 1).await;
        view.start().expect("start");
        view.start().expect("start again");
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let mut received = 0;
        while updates.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_scheduler_and_silences_audio() {
        let (view, mut updates, _store) = open_view(1, 1).await;
        view.start().expect("start");
        updates.recv().await.expect("tick");

        let directive = view.close().expect("close");
        assert!(!directive.should_play);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_delete_leaves_session_running() {
        let (view, _updates, store) = open_view(1, 1).await;
        store.fail_deletes(vec![ScriptedFailure::Network]);
        view.start().expect("start");

        assert!(matches!(view.delete().await, Err(SyncError::TransientFailure(_))));
        assert!(view.snapshot().expect("snapshot").timer.running);

        let update = view.delete().await.expect("delete");
        assert!(!update.timer.running);
        assert!(!update.playback.should_play);
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_near_expiry_credits_nothing_afterwards() {
        let (view, mut updates, store) = open_view(1, 1).await;
        view.start().expect("start");
        for _ in 0..59 {
            updates.recv().await.expect("tick");
        }

        let update = view.delete().await.expect("delete");
        assert!(!update.timer.running);
        assert_eq!(update.timer.remaining_seconds, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(updates.try_recv().is_err());
        assert_eq!(store.update_calls(), 0);
        assert_eq!(
            view.snapshot().expect("snapshot").task.completed_pomodoros,
            0
        );
    }

    #[tokio::test]
    async fn open_missing_task_reports_not_found() {
        let store: Arc<dyn TaskStore> = Arc::new(ScriptedTaskStore::default());
        let result = TaskView::open(store, 99, &SessionOptions::default()).await;
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }
}
