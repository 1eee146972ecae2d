//! Scripted renderers for driving the job state machine.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use filenorm::{RenderError, RenderedDocument, Renderer};

/// Echoes the source text and records each filename it was called with.
#[derive(Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<String>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&self, bytes: &[u8], filename: &str) -> Result<RenderedDocument, RenderError> {
        self.calls.lock().unwrap().push(filename.to_string());
        Ok(RenderedDocument::text_only(
            String::from_utf8_lossy(bytes).into_owned(),
        ))
    }
}

/// Fails the first `failures` calls, then echoes like [`RecordingRenderer`].
pub struct FlakyRenderer {
    failures: usize,
    attempts: AtomicUsize,
}

impl FlakyRenderer {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Renderer for FlakyRenderer {
    fn render(&self, bytes: &[u8], _filename: &str) -> Result<RenderedDocument, RenderError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(RenderError::Conversion(format!(
                "transient failure {}",
                attempt + 1
            )));
        }
        Ok(RenderedDocument::text_only(
            String::from_utf8_lossy(bytes).into_owned(),
        ))
    }
}

/// Always fails with a conversion error.
#[derive(Default)]
pub struct FailingRenderer {
    attempts: AtomicUsize,
}

impl FailingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Renderer for FailingRenderer {
    fn render(&self, _bytes: &[u8], filename: &str) -> Result<RenderedDocument, RenderError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(RenderError::Conversion(format!("cannot convert {}", filename)))
    }
}

/// Holds its first render until [`GatedRenderer::release`]; later renders
/// echo immediately. The held render echoes the bytes it was given.
pub struct GatedRenderer {
    held: AtomicBool,
    entered_tx: Sender<()>,
    entered_rx: Receiver<()>,
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
    calls: AtomicUsize,
}

impl GatedRenderer {
    pub fn new() -> Self {
        let (entered_tx, entered_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        Self {
            held: AtomicBool::new(true),
            entered_tx,
            entered_rx,
            release_tx,
            release_rx,
            calls: AtomicUsize::new(0),
        }
    }

    /// Blocks until the held render has started.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered_rx.recv_timeout(timeout).is_ok()
    }

    pub fn release(&self) {
        let _ = self.release_tx.send(());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for GatedRenderer {
    fn render(&self, bytes: &[u8], _filename: &str) -> Result<RenderedDocument, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.held.swap(false, Ordering::SeqCst) {
            let _ = self.entered_tx.send(());
            let _ = self.release_rx.recv_timeout(Duration::from_secs(10));
        }
        Ok(RenderedDocument::text_only(
            String::from_utf8_lossy(bytes).into_owned(),
        ))
    }
}
