use draftmaid::app::{App, GENERATION_FAILED_MESSAGE, Phase};
use draftmaid::engine::{DiagramEngine, EngineError};
use draftmaid::export::{ExportFormat, Exporter, RASTER_PADDING};
use draftmaid::generate::{
    BackendError, CompletionBackend, CompletionRequest, GenerateError, GenerationClient, Generator,
};
use draftmaid::kind::DiagramKind;
use draftmaid::render::{Preview, RenderOutcome, RenderWorker, RendererAdapter};
use draftmaid::store::{JsonFileBackend, PreferenceStore};
use draftmaid::theme::{EngineOptions, Theme};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Replies with a fenced diagram, the way chat models tend to.
struct FencedBackend {
    calls: Arc<AtomicUsize>,
}

impl CompletionBackend for FencedBackend {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.prompt.contains("Input text:"));
        Ok("```mermaid\nflowchart TD\nA-->B\n```".to_string())
    }
}

/// Sized SVG whose width depends on the source, slow for sources marked `slow`.
struct SizedEngine {
    dark: bool,
}

impl DiagramEngine for SizedEngine {
    fn configure(&mut self, options: &EngineOptions) {
        self.dark = options.theme == "dark";
    }

    fn render(&mut self, element_id: &str, source: &str) -> Result<String, EngineError> {
        if source.contains("slow") {
            std::thread::sleep(Duration::from_millis(50));
        }
        if source.contains("-->>>") {
            return Err(EngineError::silent());
        }
        let width = 10 * source.lines().count();
        Ok(format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" id="{element_id}" width="{width}" height="30" data-dark="{}"><rect width="{width}" height="30" fill="#9ED8FF"/></svg>"##,
            self.dark
        ))
    }
}

#[test]
fn generate_render_and_export_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let prefs = dir.path().join("preferences.json");
    let calls = Arc::new(AtomicUsize::new(0));

    let client = GenerationClient::new(
        FencedBackend { calls: Arc::clone(&calls) },
        "gemini-2.5-flash",
        Some("test-key".to_string()),
    );
    let mut app = App::load(PreferenceStore::new(JsonFileBackend::open(&prefs)));
    app.set_theme(Theme::Dark);
    app.generate(&client).unwrap();

    assert_eq!(app.state().phase, Phase::Idle);
    assert_eq!(app.state().diagram_source, "flowchart TD\nA-->B");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let mut adapter = RendererAdapter::new(SizedEngine { dark: false });
    let image = match adapter.render(&app.state().diagram_source, app.state().theme) {
        RenderOutcome::Image(image) => image,
        other => panic!("expected image, got {other:?}"),
    };
    assert!(image.svg.contains("data-dark=\"true\""));

    let exporter = Exporter::new(dir.path());
    let png = exporter
        .export(Some(&image), app.state().theme, ExportFormat::Raster)
        .unwrap()
        .unwrap();
    let size = imagesize::size(&png).unwrap();
    assert_eq!(size.width, 20 + 2 * RASTER_PADDING as usize);
    assert_eq!(size.height, 30 + 2 * RASTER_PADDING as usize);

    let svg = exporter
        .export(Some(&image), app.state().theme, ExportFormat::Vector)
        .unwrap()
        .unwrap();
    assert_eq!(svg.file_name().unwrap(), "diagram.svg");

    let reloaded = App::load(PreferenceStore::new(JsonFileBackend::open(&prefs)));
    assert_eq!(reloaded.state().theme, Theme::Dark);
    assert_eq!(reloaded.state().diagram_source, "flowchart TD\nA-->B");
}

#[test]
fn missing_credential_fails_every_trigger_without_network() {
    let calls = Arc::new(AtomicUsize::new(0));
    let client = GenerationClient::new(
        FencedBackend { calls: Arc::clone(&calls) },
        "gemini-2.5-flash",
        None,
    );

    let mut app = App::load(PreferenceStore::new(draftmaid::store::MemoryBackend::new()));
    for _ in 0..3 {
        assert!(matches!(
            client.generate("anything", DiagramKind::Flowchart),
            Err(GenerateError::MissingCredential { .. })
        ));
        app.generate(&client).unwrap();
        assert_eq!(app.state().phase, Phase::GenerationError);
        assert_eq!(app.state().error.as_deref(), Some(GENERATION_FAILED_MESSAGE));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn rapid_source_changes_show_only_the_last_render() {
    let worker = RenderWorker::new(RendererAdapter::new(SizedEngine { dark: false }));
    let mut preview = Preview::new();

    worker.submit(preview.request("flowchart TD\nslow\nA\nB", Theme::Light));
    worker.submit(preview.request("flowchart TD\nB", Theme::Light));
    worker.wait_for_latest(&mut preview);
    std::thread::sleep(Duration::from_millis(120));
    worker.drain_into(&mut preview);

    let svg = &preview.image().expect("latest render applied").svg;
    assert!(svg.contains("width=\"20\""), "unexpected svg: {svg}");
    assert!(!preview.is_rendering());
}

#[test]
fn engine_without_diagnostic_gets_generic_message() {
    let mut preview = Preview::new();
    let job = preview.request("flowchart TD\nA-->>>B", Theme::Light);
    let mut adapter = RendererAdapter::new(SizedEngine { dark: false });
    preview.apply(job.seq, adapter.render(&job.source, job.theme));

    assert!(preview.image().is_none());
    assert_eq!(
        preview.error(),
        Some("Failed to render diagram. Check the Mermaid code.")
    );
}
