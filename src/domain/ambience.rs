use crate::domain::timer::TimerPhase;
use serde::Serialize;

pub const BREAK_SOUNDS: [&str; 4] = ["rain", "waves", "birds", "forest"];
pub const DEFAULT_BREAK_SOUND: &str = "rain";
pub const EXPIRED_CUE_CLIP: &str = "sounds/notification.mp3";

/// Desired state of the looping break clip. The audio resource itself belongs
/// to whoever renders the view.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlaybackDirective {
    pub sound_id: String,
    pub clip: String,
    pub should_play: bool,
    pub should_loop: bool,
    /// Load the clip again and seek to its start before applying `should_play`.
    pub restart: bool,
}

/// One-shot, non-looping cue fired when a phase runs out.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CueDirective {
    pub clip: &'static str,
    pub should_loop: bool,
}

pub fn playback_directive(phase: TimerPhase, running: bool, sound_id: &str) -> PlaybackDirective {
    PlaybackDirective {
        sound_id: sound_id.to_string(),
        clip: break_clip(sound_id),
        should_play: phase == TimerPhase::Break && running,
        should_loop: true,
        restart: false,
    }
}

pub fn expired_cue() -> CueDirective {
    CueDirective {
        clip: EXPIRED_CUE_CLIP,
        should_loop: false,
    }
}

pub fn break_clip(sound_id: &str) -> String {
    format!("sounds/break/{sound_id}.mp3")
}

pub fn is_known_sound(sound_id: &str) -> bool {
    BREAK_SOUNDS.contains(&sound_id)
}

#[derive(Debug, Clone)]
pub struct AmbienceController {
    selected_sound: String,
}

impl Default for AmbienceController {
    fn default() -> Self {
        Self::new(DEFAULT_BREAK_SOUND)
    }
}

impl AmbienceController {
    pub fn new(sound_id: impl Into<String>) -> Self {
        Self {
            selected_sound: sound_id.into(),
        }
    }

    pub fn selected_sound(&self) -> &str {
        &self.selected_sound
    }

    pub fn directive(&self, phase: TimerPhase, running: bool) -> PlaybackDirective {
        playback_directive(phase, running, &self.selected_sound)
    }

    /// Stops the clip and seeks it back to the start.
    pub fn rewind(&self, phase: TimerPhase, running: bool) -> PlaybackDirective {
        PlaybackDirective {
            restart: true,
            ..self.directive(phase, running)
        }
    }

    /// Swaps the selection. While the clip is audible the new one is loaded and
    /// started from its beginning; otherwise only the selection changes.
    pub fn select_sound(
        &mut self,
        sound_id: &str,
        phase: TimerPhase,
        running: bool,
    ) -> PlaybackDirective {
        self.selected_sound = sound_id.to_string();
        let directive = self.directive(phase, running);
        PlaybackDirective {
            restart: directive.should_play,
            ..directive
        }
    }
}
