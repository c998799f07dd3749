//! Line-oriented editor session: input pane, code pane, preview status and
//! header controls, driven by typed commands.

use crate::app::{App, Phase};
use crate::engine::DiagramEngine;
use crate::export::{ExportFormat, Exporter};
use crate::generate::{GenerateError, Generator};
use crate::kind::DiagramKind;
use crate::render::{Preview, RenderWorker, RendererAdapter};
use crate::store::StorageBackend;
use crate::theme::Theme;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use tracing::{debug, error};

const HELP: &str = "\
Commands:
  text [LINE]       replace the description (without LINE: type lines, end with '.')
  append LINE       add a line to the description
  code [LINE]       replace the Mermaid code (without LINE: type lines, end with '.')
  kind [KIND]       show or switch diagram kind (flowchart, sequence, gantt, class, state)
  theme [THEME]     toggle or set the theme (light, dark)
  generate          turn the description into Mermaid code
  wait              wait for generation and preview to finish
  reset             restore the template and clear the code
  show              print the editor state
  export svg|png    write diagram.svg / diagram.png
  help              this text
  quit              leave";

pub struct Studio<B, G, E> {
    app: App<B>,
    generator: Arc<G>,
    preview: Preview,
    renders: RenderWorker<E>,
    exporter: Exporter,
    pending: Option<Receiver<Result<String, GenerateError>>>,
}

impl<B, G, E> Studio<B, G, E>
where
    B: StorageBackend,
    G: Generator + Send + Sync + 'static,
    E: DiagramEngine + 'static,
{
    pub fn new(app: App<B>, generator: G, engine: E, exporter: Exporter) -> Self {
        let mut studio = Self {
            app,
            generator: Arc::new(generator),
            preview: Preview::new(),
            renders: RenderWorker::new(RendererAdapter::new(engine)),
            exporter,
            pending: None,
        };
        studio.request_render();
        studio
    }

    pub fn app(&self) -> &App<B> {
        &self.app
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut out: W) -> io::Result<()> {
        writeln!(out, "draftmaid studio. Type 'help' for commands.")?;
        let mut lines = input.lines();

        loop {
            self.poll(&mut out)?;
            write!(out, "{}> ", self.prompt())?;
            out.flush()?;

            let Some(line) = lines.next() else {
                break;
            };
            let line = line?;
            let (command, rest) = split_command(&line);

            match command {
                "" => {}
                "quit" | "exit" => break,
                "help" => writeln!(out, "{}", HELP)?,
                "show" => self.show(&mut out)?,
                "text" => {
                    let text = match rest {
                        Some(rest) => rest.to_string(),
                        None => read_block(&mut lines, &mut out)?,
                    };
                    self.app.set_natural_text(text);
                }
                "append" => {
                    let mut text = self.app.state().natural_text.clone();
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(rest.unwrap_or_default());
                    self.app.set_natural_text(text);
                }
                "code" => {
                    let code = match rest {
                        Some(rest) => rest.to_string(),
                        None => read_block(&mut lines, &mut out)?,
                    };
                    self.app.set_diagram_source(code);
                }
                "kind" => match rest {
                    None => writeln!(out, "kind: {}", self.app.state().kind.label())?,
                    Some(name) => match name.parse::<DiagramKind>() {
                        Ok(kind) => {
                            if !self.app.change_kind(kind) {
                                writeln!(out, "already {}", kind.label())?;
                            }
                        }
                        Err(e) => writeln!(out, "{}", e)?,
                    },
                },
                "theme" => match rest {
                    None => self.app.toggle_theme(),
                    Some(name) => match name.parse::<Theme>() {
                        Ok(theme) => self.app.set_theme(theme),
                        Err(e) => writeln!(out, "{}", e)?,
                    },
                },
                "generate" => self.start_generation(&mut out)?,
                "wait" => self.wait(&mut out)?,
                "reset" => self.app.reset(),
                "export" => self.export(rest, &mut out)?,
                other => writeln!(out, "unknown command '{}'; try 'help'", other)?,
            }

            self.sync_render();
        }

        Ok(())
    }

    fn prompt(&self) -> String {
        let mut prompt = format!("{}/{}", self.app.state().kind.label(), self.app.state().theme);
        if self.app.is_generating() {
            prompt.push_str(" generating");
        } else if self.preview.is_rendering() {
            prompt.push_str(" rendering");
        }
        prompt
    }

    fn start_generation<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.app.is_generating() {
            return writeln!(out, "a generation is already running");
        }
        let request = match self.app.begin_generation() {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "generation not started");
                return self.print_error(out);
            }
        };

        let (tx, rx) = mpsc::channel();
        let generator = Arc::clone(&self.generator);
        std::thread::spawn(move || {
            let result = generator.generate(&request.input, request.kind);
            let _ = tx.send(result);
        });
        self.pending = Some(rx);
        writeln!(out, "generating {}...", request.kind.label())
    }

    /// Pick up finished background work without blocking.
    fn poll<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if let Some(rx) = &self.pending {
            match rx.try_recv() {
                Ok(result) => self.complete_generation(result, out)?,
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    error!("generation thread exited without a result");
                    self.complete_generation(Err(GenerateError::Failed), out)?;
                }
            }
        }
        if self.renders.drain_into(&mut self.preview) {
            self.report_preview(out)?;
        }
        Ok(())
    }

    fn wait<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if let Some(rx) = &self.pending {
            let result = rx.recv().unwrap_or(Err(GenerateError::Failed));
            self.complete_generation(result, out)?;
        }
        if self.preview.is_rendering() {
            self.renders.wait_for_latest(&mut self.preview);
            self.report_preview(out)?;
        }
        Ok(())
    }

    fn complete_generation<W: Write>(
        &mut self,
        result: Result<String, GenerateError>,
        out: &mut W,
    ) -> io::Result<()> {
        self.pending = None;
        self.app.finish_generation(result);
        self.sync_render();
        if self.app.state().phase == Phase::GenerationError {
            self.print_error(out)
        } else {
            writeln!(out, "--- code ---\n{}", self.app.state().diagram_source)
        }
    }

    /// Re-render when the code or theme changed since the last check.
    fn sync_render(&mut self) {
        let changes = self.app.take_changes();
        if changes.iter().any(|c| c.affects_render()) {
            self.request_render();
        }
    }

    fn request_render(&mut self) {
        let state = self.app.state();
        let job = self.preview.request(&state.diagram_source, state.theme);
        self.renders.submit(job);
    }

    fn export<W: Write>(&mut self, format: Option<&str>, out: &mut W) -> io::Result<()> {
        let format = match format.unwrap_or("svg").parse::<ExportFormat>() {
            Ok(format) => format,
            Err(e) => return writeln!(out, "{}", e),
        };
        if self.preview.is_rendering() {
            self.renders.wait_for_latest(&mut self.preview);
        }
        match self
            .exporter
            .export(self.preview.image(), self.app.state().theme, format)
        {
            Ok(Some(path)) => writeln!(out, "saved {}", path.display()),
            Ok(None) => Ok(()),
            Err(e) => writeln!(out, "export failed: {}", e),
        }
    }

    fn show<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let state = self.app.state();
        writeln!(out, "kind:  {}", state.kind.label())?;
        writeln!(out, "theme: {}", state.theme)?;
        writeln!(out, "--- description ---\n{}", state.natural_text)?;
        writeln!(out, "--- code ---\n{}", state.diagram_source)?;
        if let Some(error) = &state.error {
            writeln!(out, "error: {}", error)?;
        }
        self.report_preview(out)
    }

    fn report_preview<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.preview.is_rendering() {
            writeln!(out, "preview: rendering...")
        } else if let Some(error) = self.preview.error() {
            writeln!(out, "preview: render error: {}", error)
        } else if let Some(image) = self.preview.image() {
            writeln!(out, "preview: ready ({} bytes of SVG)", image.svg.len())
        } else {
            writeln!(out, "preview: empty")
        }
    }

    fn print_error<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match &self.app.state().error {
            Some(message) => writeln!(out, "error: {}", message),
            None => Ok(()),
        }
    }
}

fn split_command(line: &str) -> (&str, Option<&str>) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, Some(rest.trim()).filter(|r| !r.is_empty())),
        None => (line, None),
    }
}

/// Read lines until a lone `.`.
fn read_block<I, W>(lines: &mut I, out: &mut W) -> io::Result<String>
where
    I: Iterator<Item = io::Result<String>>,
    W: Write,
{
    writeln!(out, "(end with a line containing only '.')")?;
    out.flush()?;
    let mut block = Vec::new();
    for line in lines {
        let line = line?;
        if line.trim_end() == "." {
            break;
        }
        block.push(line);
    }
    Ok(block.join("\n"))
}
