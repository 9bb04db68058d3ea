//! Background draining of an engine's diagnostic stream.
//!
//! A child whose stderr pipe fills up blocks forever, so every launched
//! engine gets a task that reads stderr line by line until EOF or
//! cancellation and feeds each line to a [`LineHandler`].

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+ files? analyzed out of \d+").expect("valid progress line regex")
});

static INVALID_SOURCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Invalid source file: (\S+?)\. Ensure").expect("valid invalid-source regex")
});

/// Generic engine failure printed when a required package is absent.
const MISSING_DEPENDENCY: &str = "missing dependency";

/// Receives the lines of one stream.
///
/// `finished` is called exactly once, after the last line, whether the
/// stream hit EOF, failed, or the drain was cancelled.
pub trait LineHandler: Send + 'static {
    fn consume_line(&mut self, line: &str);

    fn finished(&mut self) {}
}

impl<A: LineHandler, B: LineHandler> LineHandler for (A, B) {
    fn consume_line(&mut self, line: &str) {
        self.0.consume_line(line);
        self.1.consume_line(line);
    }

    fn finished(&mut self) {
        self.0.finished();
        self.1.finished();
    }
}

/// Logs engine output: progress lines at info, everything else at error.
#[derive(Debug, Clone)]
pub struct DefaultLineHandler {
    source: String,
}

impl DefaultLineHandler {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    #[must_use]
    pub fn is_progress(line: &str) -> bool {
        PROGRESS_LINE.is_match(line)
    }
}

impl LineHandler for DefaultLineHandler {
    fn consume_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        if Self::is_progress(line) {
            tracing::info!(source = %self.source, "{line}");
        } else {
            tracing::error!(source = %self.source, "{line}");
        }
    }
}

/// Default logging plus one consolidated hint when the engine cannot load
/// its compiler module.
///
/// Engines print the same "cannot find module" failure once per file; the
/// hint is emitted once at end of stream no matter how many were seen.
#[derive(Debug, Clone)]
pub struct MissingModuleHandler {
    inner: DefaultLineHandler,
    module: String,
    variable: String,
    needles: [String; 2],
    occurrences: usize,
    hints_emitted: usize,
}

impl MissingModuleHandler {
    #[must_use]
    pub fn new(source: impl Into<String>, module: &str, variable: &str) -> Self {
        Self {
            inner: DefaultLineHandler::new(source),
            module: module.to_string(),
            variable: variable.to_string(),
            needles: [
                format!("Cannot find module '{module}'"),
                MISSING_DEPENDENCY.to_string(),
            ],
            occurrences: 0,
            hints_emitted: 0,
        }
    }

    /// Lines that reported the missing module.
    #[must_use]
    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    /// Consolidated hints logged so far (0 or 1).
    #[must_use]
    pub fn hints_emitted(&self) -> usize {
        self.hints_emitted
    }

    #[must_use]
    pub fn hint(&self) -> String {
        format!(
            "Failed to find '{module}' module. Please check, {variable} contains location of global '{module}' or install locally in your project",
            module = self.module,
            variable = self.variable,
        )
    }
}

impl LineHandler for MissingModuleHandler {
    fn consume_line(&mut self, line: &str) {
        if self.needles.iter().any(|needle| line.contains(needle.as_str())) {
            self.occurrences += 1;
        }
        self.inner.consume_line(line);
    }

    fn finished(&mut self) {
        self.inner.finished();
        if self.occurrences > 0 && self.hints_emitted == 0 {
            self.hints_emitted += 1;
            tracing::error!("{}", self.hint());
        }
    }
}

/// Remembers the first file the engine rejected as not belonging to the
/// compiler configuration. Logs nothing itself.
#[derive(Debug, Clone, Default)]
pub struct InvalidSourceHandler {
    rejected: Option<String>,
}

impl InvalidSourceHandler {
    #[must_use]
    pub fn rejected_file(&self) -> Option<&str> {
        self.rejected.as_deref()
    }
}

impl LineHandler for InvalidSourceHandler {
    fn consume_line(&mut self, line: &str) {
        if self.rejected.is_some() {
            return;
        }
        if let Some(captures) = INVALID_SOURCE.captures(line) {
            self.rejected = captures.get(1).map(|m| m.as_str().to_string());
        }
    }
}

/// Owner side of a running drain.
pub struct DrainHandle<H> {
    source: String,
    cancel: watch::Sender<bool>,
    task: JoinHandle<H>,
}

/// Start draining `reader` on a background task.
pub fn attach<R, H>(source: impl Into<String>, reader: R, handler: H) -> DrainHandle<H>
where
    R: AsyncRead + Unpin + Send + 'static,
    H: LineHandler,
{
    let source = source.into();
    let (cancel, mut cancel_rx) = watch::channel(false);
    let task_source = source.clone();
    let task = tokio::spawn(async move {
        let mut handler = handler;
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            tokio::select! {
                biased;
                Ok(()) = cancel_rx.changed() => break,
                read = reader.read_until(b'\n', &mut buf) => match read {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        handler.consume_line(line.trim_end_matches(['\r', '\n']));
                    }
                    Err(e) => {
                        tracing::debug!(source = %task_source, "Stream read failed: {e}");
                        break;
                    }
                },
            }
        }
        handler.finished();
        handler
    });

    DrainHandle {
        source,
        cancel,
        task,
    }
}

impl<H> DrainHandle<H> {
    /// Wait up to `grace` for the stream to end on its own.
    ///
    /// Returns the handler, or `None` if the drain was abandoned.
    pub async fn join(self, grace: Duration) -> Option<H> {
        self.await_task(grace).await
    }

    /// Cancel the drain, then wait up to `grace` for it to wind down.
    pub async fn shutdown(self, grace: Duration) -> Option<H> {
        // Receiver gone means the task already finished.
        let _ = self.cancel.send(true);
        self.await_task(grace).await
    }

    async fn await_task(mut self, grace: Duration) -> Option<H> {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(handler)) => Some(handler),
            Ok(Err(e)) => {
                tracing::warn!(source = %self.source, "Stream drain task failed: {e}");
                None
            }
            Err(_) => {
                tracing::debug!(source = %self.source, "Stream drain did not finish in {grace:?}, abandoning it");
                self.task.abort();
                None
            }
        }
    }
}
