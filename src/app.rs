//! Editor state and the transitions between idle, generating and failed.
//!
//! [`App`] is the single writer of [`AppState`]. Every mutation records a
//! [`Change`]; persisting preferences is done as a side effect of recording,
//! and the shell drains the change queue to decide when to re-render.

use crate::generate::{GenerateError, Generator};
use crate::kind::DiagramKind;
use crate::store::{
    KEY_DIAGRAM_KIND, KEY_DIAGRAM_SOURCE, KEY_NATURAL_TEXT, KEY_THEME, PreferenceStore,
    StorageBackend,
};
use crate::theme::Theme;
use tracing::{debug, info, warn};

pub const BLANK_INPUT_MESSAGE: &str = "Please enter some text.";
pub const GENERATION_FAILED_MESSAGE: &str =
    "Failed to generate the diagram. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Generating,
    GenerationError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub kind: DiagramKind,
    pub natural_text: String,
    pub diagram_source: String,
    pub theme: Theme,
    pub phase: Phase,
    pub error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            kind: DiagramKind::Flowchart,
            natural_text: DiagramKind::Flowchart.template().to_string(),
            diagram_source: String::new(),
            theme: Theme::Light,
            phase: Phase::Idle,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Kind,
    NaturalText,
    DiagramSource,
    Theme,
    Status,
}

impl Change {
    /// Whether the preview has to be rendered again after this change.
    pub fn affects_render(self) -> bool {
        matches!(self, Change::DiagramSource | Change::Theme)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    #[error("input text is blank")]
    BlankInput,
    #[error("a generation is already in progress")]
    InFlight,
}

/// Input captured when a generation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub input: String,
    pub kind: DiagramKind,
}

pub struct App<B> {
    state: AppState,
    store: PreferenceStore<B>,
    changes: Vec<Change>,
}

impl<B: StorageBackend> App<B> {
    /// Restore the persisted preferences, each key falling back to its own
    /// default.
    pub fn load(store: PreferenceStore<B>) -> Self {
        let defaults = AppState::default();
        let state = AppState {
            kind: store.get(KEY_DIAGRAM_KIND, defaults.kind),
            natural_text: store.get(KEY_NATURAL_TEXT, defaults.natural_text),
            diagram_source: store.get(KEY_DIAGRAM_SOURCE, defaults.diagram_source),
            theme: store.get(KEY_THEME, defaults.theme),
            phase: Phase::Idle,
            error: None,
        };
        debug!(kind = %state.kind, theme = %state.theme, "restored editor state");
        Self {
            state,
            store,
            changes: Vec::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn store(&self) -> &PreferenceStore<B> {
        &self.store
    }

    pub fn is_generating(&self) -> bool {
        self.state.phase == Phase::Generating
    }

    /// Drain the changes recorded since the last call.
    pub fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    pub fn set_natural_text(&mut self, text: impl Into<String>) {
        self.state.natural_text = text.into();
        self.record(Change::NaturalText);
    }

    /// Direct edit of the code pane. Not validated.
    pub fn set_diagram_source(&mut self, source: impl Into<String>) {
        self.state.diagram_source = source.into();
        self.record(Change::DiagramSource);
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if self.state.theme != theme {
            self.state.theme = theme;
            self.record(Change::Theme);
        }
    }

    pub fn toggle_theme(&mut self) {
        self.set_theme(self.state.theme.toggled());
    }

    /// Switch to `kind`, replacing the input with its template and clearing
    /// the code. Selecting the current kind does nothing and returns false.
    pub fn change_kind(&mut self, kind: DiagramKind) -> bool {
        if self.state.kind == kind {
            return false;
        }
        self.state.kind = kind;
        self.record(Change::Kind);
        self.restart_from_template();
        true
    }

    /// Back to the current kind's template with empty code.
    pub fn reset(&mut self) {
        self.restart_from_template();
    }

    /// Start a generation for the current input.
    ///
    /// Blank input never leaves `Idle`; it only sets the validation message.
    pub fn begin_generation(&mut self) -> Result<GenerationRequest, TriggerError> {
        if self.is_generating() {
            return Err(TriggerError::InFlight);
        }
        if self.state.natural_text.trim().is_empty() {
            self.state.phase = Phase::Idle;
            self.state.error = Some(BLANK_INPUT_MESSAGE.to_string());
            self.record(Change::Status);
            return Err(TriggerError::BlankInput);
        }

        self.state.phase = Phase::Generating;
        self.state.error = None;
        self.record(Change::Status);
        info!(kind = %self.state.kind, "generation started");
        Ok(GenerationRequest {
            input: self.state.natural_text.clone(),
            kind: self.state.kind,
        })
    }

    /// Complete the in-flight generation. On success the generated code
    /// replaces whatever is in the code pane; on failure the code is kept and
    /// only a generic message is shown.
    pub fn finish_generation(&mut self, result: Result<String, GenerateError>) {
        if !self.is_generating() {
            warn!("generation finished while none was in flight");
            return;
        }
        match result {
            Ok(code) => {
                self.state.phase = Phase::Idle;
                self.state.diagram_source = code;
                self.record(Change::DiagramSource);
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                self.state.phase = Phase::GenerationError;
                self.state.error = Some(GENERATION_FAILED_MESSAGE.to_string());
            }
        }
        self.record(Change::Status);
    }

    /// Run a whole generation on the current thread.
    pub fn generate<G: Generator + ?Sized>(&mut self, generator: &G) -> Result<(), TriggerError> {
        let request = self.begin_generation()?;
        let result = generator.generate(&request.input, request.kind);
        self.finish_generation(result);
        Ok(())
    }

    fn restart_from_template(&mut self) {
        self.state.natural_text = self.state.kind.template().to_string();
        self.record(Change::NaturalText);
        self.state.diagram_source.clear();
        self.record(Change::DiagramSource);
        if self.state.phase == Phase::GenerationError {
            self.state.phase = Phase::Idle;
        }
        self.state.error = None;
        self.record(Change::Status);
    }

    fn record(&mut self, change: Change) {
        match change {
            Change::Kind => self.store.set(KEY_DIAGRAM_KIND, &self.state.kind),
            Change::NaturalText => self.store.set(KEY_NATURAL_TEXT, &self.state.natural_text),
            Change::DiagramSource => self.store.set(KEY_DIAGRAM_SOURCE, &self.state.diagram_source),
            Change::Theme => self.store.set(KEY_THEME, &self.state.theme),
            Change::Status => {}
        }
        self.changes.push(change);
    }
}
