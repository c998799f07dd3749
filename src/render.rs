//! Turning diagram source into a displayable image, and keeping only the
//! newest result visible when renders overlap.

use crate::engine::DiagramEngine;
use crate::theme::Theme;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// Target id every render is keyed by; each render replaces the previous one.
pub const ELEMENT_ID: &str = "mermaid-diagram";

pub const GENERIC_RENDER_ERROR: &str = "Failed to render diagram. Check the Mermaid code.";

/// SVG markup produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub svg: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Source was blank; nothing to show and nothing wrong.
    Cleared,
    Image(RenderedImage),
    Failed(String),
}

pub struct RendererAdapter<E> {
    engine: E,
}

impl<E: DiagramEngine> RendererAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn render(&mut self, source: &str, theme: Theme) -> RenderOutcome {
        if source.trim().is_empty() {
            return RenderOutcome::Cleared;
        }

        self.engine.configure(&theme.engine_options());
        match self.engine.render(ELEMENT_ID, source) {
            Ok(svg) => RenderOutcome::Image(RenderedImage { svg }),
            Err(e) => {
                debug!(error = %e, "diagram render failed");
                RenderOutcome::Failed(
                    e.diagnostic
                        .unwrap_or_else(|| GENERIC_RENDER_ERROR.to_string()),
                )
            }
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

/// A render that has been asked for but not applied yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub seq: u64,
    pub source: String,
    pub theme: Theme,
}

/// The render result on display.
///
/// Every request gets a fresh sequence number; results are applied only when
/// they carry the latest one, so a slow render for stale input can never
/// overwrite a newer result.
#[derive(Debug, Default)]
pub struct Preview {
    latest: u64,
    applied: u64,
    image: Option<RenderedImage>,
    error: Option<String>,
}

impl Preview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, source: &str, theme: Theme) -> RenderJob {
        self.latest += 1;
        RenderJob {
            seq: self.latest,
            source: source.to_string(),
            theme,
        }
    }

    /// Apply `outcome` if it answers the newest request. Returns whether it
    /// was applied.
    pub fn apply(&mut self, seq: u64, outcome: RenderOutcome) -> bool {
        if seq != self.latest {
            debug!(seq, latest = self.latest, "dropping stale render result");
            return false;
        }
        self.applied = seq;
        match outcome {
            RenderOutcome::Cleared => {
                self.image = None;
                self.error = None;
            }
            RenderOutcome::Image(image) => {
                self.image = Some(image);
                self.error = None;
            }
            RenderOutcome::Failed(message) => {
                self.image = None;
                self.error = Some(message);
            }
        }
        true
    }

    pub fn is_rendering(&self) -> bool {
        self.applied != self.latest
    }

    pub fn image(&self) -> Option<&RenderedImage> {
        self.image.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Runs renders off the caller's thread and hands results back in whatever
/// order they finish. A job superseded by a newer submission before it gets
/// the engine is skipped.
pub struct RenderWorker<E> {
    adapter: Arc<Mutex<RendererAdapter<E>>>,
    latest: Arc<AtomicU64>,
    tx: Sender<(u64, RenderOutcome)>,
    rx: Receiver<(u64, RenderOutcome)>,
}

impl<E: DiagramEngine + 'static> RenderWorker<E> {
    pub fn new(adapter: RendererAdapter<E>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            adapter: Arc::new(Mutex::new(adapter)),
            latest: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
        }
    }

    pub fn submit(&self, job: RenderJob) {
        self.latest.fetch_max(job.seq, Ordering::SeqCst);
        let adapter = Arc::clone(&self.adapter);
        let latest = Arc::clone(&self.latest);
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let mut guard = adapter.lock();
            if job.seq < latest.load(Ordering::SeqCst) {
                debug!(seq = job.seq, "skipping superseded render");
                return;
            }
            let outcome = guard.render(&job.source, job.theme);
            drop(guard);
            // The receiver only goes away when the worker is dropped.
            let _ = tx.send((job.seq, outcome));
        });
    }

    /// Apply every finished render to `preview`. Returns true if the visible
    /// result changed.
    pub fn drain_into(&self, preview: &mut Preview) -> bool {
        let mut changed = false;
        while let Ok((seq, outcome)) = self.rx.try_recv() {
            changed |= preview.apply(seq, outcome);
        }
        changed
    }

    /// Block until the newest request issued by `preview` has been applied.
    pub fn wait_for_latest(&self, preview: &mut Preview) {
        while preview.is_rendering() {
            match self.rx.recv() {
                Ok((seq, outcome)) => {
                    preview.apply(seq, outcome);
                }
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::theme::EngineOptions;

    #[derive(Default)]
    struct RecordingEngine {
        configured: Vec<EngineOptions>,
        rendered: Vec<(String, String)>,
    }

    impl DiagramEngine for RecordingEngine {
        fn configure(&mut self, options: &EngineOptions) {
            self.configured.push(options.clone());
        }

        fn render(&mut self, element_id: &str, source: &str) -> Result<String, EngineError> {
            self.rendered.push((element_id.to_string(), source.to_string()));
            if source.contains("bad") {
                Err(EngineError::new("Parse error on line 1"))
            } else if source.contains("mute") {
                Err(EngineError::silent())
            } else {
                Ok(format!("<svg id=\"{}\"><text>{}</text></svg>", element_id, source))
            }
        }
    }

    #[test]
    fn blank_source_clears_without_touching_engine() {
        let mut adapter = RendererAdapter::new(RecordingEngine::default());
        assert_eq!(adapter.render("  \n", Theme::Light), RenderOutcome::Cleared);
        assert!(adapter.engine().rendered.is_empty());
        assert!(adapter.engine().configured.is_empty());
    }

    #[test]
    fn render_configures_theme_and_uses_fixed_id() {
        let mut adapter = RendererAdapter::new(RecordingEngine::default());
        adapter.render("flowchart TD\nA-->B", Theme::Dark);
        adapter.render("flowchart TD\nB-->C", Theme::Light);

        let engine = adapter.engine();
        assert_eq!(engine.configured[0], Theme::Dark.engine_options());
        assert_eq!(engine.configured[1], Theme::Light.engine_options());
        assert!(engine.rendered.iter().all(|(id, _)| id == ELEMENT_ID));
    }

    #[test]
    fn failures_surface_diagnostic_or_generic_message() {
        let mut adapter = RendererAdapter::new(RecordingEngine::default());
        assert_eq!(
            adapter.render("bad", Theme::Light),
            RenderOutcome::Failed("Parse error on line 1".into())
        );
        assert_eq!(
            adapter.render("mute", Theme::Light),
            RenderOutcome::Failed(GENERIC_RENDER_ERROR.into())
        );
    }

    #[test]
    fn preview_applies_only_latest_request() {
        let mut preview = Preview::new();
        let a = preview.request("A", Theme::Light);
        let b = preview.request("B", Theme::Light);
        assert!(preview.is_rendering());

        let image_b = RenderedImage { svg: "<svg>B</svg>".into() };
        assert!(preview.apply(b.seq, RenderOutcome::Image(image_b.clone())));
        assert!(!preview.apply(a.seq, RenderOutcome::Image(RenderedImage { svg: "<svg>A</svg>".into() })));

        assert_eq!(preview.image(), Some(&image_b));
        assert!(!preview.is_rendering());
    }

    #[test]
    fn late_stale_result_arriving_first_is_also_dropped() {
        let mut preview = Preview::new();
        let a = preview.request("A", Theme::Light);
        let b = preview.request("B", Theme::Light);

        assert!(!preview.apply(a.seq, RenderOutcome::Failed("from A".into())));
        assert_eq!(preview.error(), None);
        assert!(preview.apply(b.seq, RenderOutcome::Cleared));
        assert_eq!(preview.image(), None);
    }

    #[test]
    fn failure_clears_previous_image_and_success_clears_error() {
        let mut preview = Preview::new();
        let job = preview.request("x", Theme::Light);
        preview.apply(job.seq, RenderOutcome::Image(RenderedImage { svg: "<svg/>".into() }));

        let job = preview.request("bad", Theme::Light);
        preview.apply(job.seq, RenderOutcome::Failed("oops".into()));
        assert_eq!(preview.image(), None);
        assert_eq!(preview.error(), Some("oops"));

        let job = preview.request("ok", Theme::Light);
        preview.apply(job.seq, RenderOutcome::Image(RenderedImage { svg: "<svg/>".into() }));
        assert_eq!(preview.error(), None);
    }

    #[test]
    fn worker_shows_last_submitted_render() {
        let worker = RenderWorker::new(RendererAdapter::new(RecordingEngine::default()));
        let mut preview = Preview::new();

        for source in ["flowchart TD\nA", "flowchart TD\nB", "flowchart TD\nC"] {
            worker.submit(preview.request(source, Theme::Light));
        }
        worker.wait_for_latest(&mut preview);

        let svg = &preview.image().unwrap().svg;
        assert!(svg.contains("flowchart TD\nC"));
    }

    #[test]
    fn superseded_jobs_never_reach_the_engine() {
        let worker = RenderWorker::new(RendererAdapter::new(RecordingEngine::default()));
        let mut preview = Preview::new();

        let busy = worker.adapter.lock();
        for n in 0..8 {
            worker.submit(preview.request(&format!("flowchart TD\nN{n}"), Theme::Light));
        }
        drop(busy);
        worker.wait_for_latest(&mut preview);

        let adapter = worker.adapter.lock();
        let rendered = &adapter.engine().rendered;
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].1, "flowchart TD\nN7");
        assert!(preview.image().unwrap().svg.contains("N7"));
    }
}
