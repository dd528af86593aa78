//! Process-wide interception of stdout and stderr during a generation.
//!
//! Only one [`CaptureSession`] may exist at a time. While it is alive, file
//! descriptors 1 and 2 point at a pipe drained by a pump thread; everything read
//! is forwarded unchanged to the pre-capture stdout and classified line by line.
//! Child processes spawned during the session inherit the redirected
//! descriptors, so an external engine's diagnostics are captured as well.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::engine_debug;
use thiserror::Error;

use crate::{ClassifiedEvent, EventSink, GenerationId, LineClassifier, WorkerEvent};

/// Lines longer than this are classified in pieces.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// Longest time the pump keeps draining after the streams are restored.
pub const DRAIN_LIMIT: Duration = Duration::from_millis(500);

static ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("console capture is already active")]
    AlreadyActive,
    #[error("console capture is not supported on this platform")]
    Unsupported,
    #[error("failed to redirect console streams: {0}")]
    Io(#[from] io::Error),
}

/// Tees written bytes to `original` and emits one event per classified line.
pub struct ConsoleTap<W: Write> {
    generation: GenerationId,
    classifier: LineClassifier,
    sink: Arc<dyn EventSink>,
    original: W,
    pending: Vec<u8>,
}

impl<W: Write> ConsoleTap<W> {
    pub fn new(generation: GenerationId, sink: Arc<dyn EventSink>, original: W) -> Self {
        Self::with_classifier(generation, LineClassifier::default(), sink, original)
    }

    pub fn with_classifier(
        generation: GenerationId,
        classifier: LineClassifier,
        sink: Arc<dyn EventSink>,
        original: W,
    ) -> Self {
        Self {
            generation,
            classifier,
            sink,
            original,
            pending: Vec::new(),
        }
    }

    /// Classify complete lines in `bytes`, then forward `bytes` to the original
    /// destination. Lines are classified even if forwarding fails.
    pub fn feed(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                self.flush_line();
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_PENDING_LINE {
                    self.flush_line();
                }
            }
        }
        self.original.write_all(bytes)?;
        self.original.flush()
    }

    /// Classify any unterminated trailing text and return the original writer.
    pub fn finish(mut self) -> W {
        self.flush_line();
        self.original
    }

    fn flush_line(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        if let Some(event) = self.classifier.classify(&line) {
            self.dispatch(event);
        }
    }

    fn dispatch(&self, event: ClassifiedEvent) {
        self.sink.emit(WorkerEvent::Console {
            generation: self.generation,
            event,
        });
    }
}

impl<W: Write> Write for ConsoleTap<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.feed(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.original.flush()
    }
}

/// Scoped redirection of the process's stdout and stderr.
///
/// Dropping the session restores both streams and joins the pump thread, so
/// every event classified from captured output has been emitted once `drop`
/// (or [`CaptureSession::stop`]) returns. A process that outlives the session
/// while still holding the redirected descriptors is cut off after
/// [`DRAIN_LIMIT`]; its later output is discarded.
pub struct CaptureSession {
    generation: GenerationId,
    inner: Option<sys::Redirect>,
}

impl CaptureSession {
    pub fn start(generation: GenerationId, sink: Arc<dyn EventSink>) -> Result<Self, CaptureError> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::AlreadyActive);
        }
        match sys::Redirect::install(generation, sink) {
            Ok(inner) => {
                engine_debug!("console capture started");
                Ok(Self {
                    generation,
                    inner: Some(inner),
                })
            }
            Err(err) => {
                ACTIVE.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    pub fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Whether any session currently holds the process streams.
    pub fn is_active() -> bool {
        ACTIVE.load(Ordering::Acquire)
    }

    /// Restore the streams, reporting restoration errors.
    pub fn stop(mut self) -> io::Result<()> {
        self.release()
    }

    fn release(&mut self) -> io::Result<()> {
        let Some(inner) = self.inner.take() else {
            return Ok(());
        };
        let result = inner.restore();
        ACTIVE.store(false, Ordering::Release);
        engine_debug!("console capture stopped");
        result
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Writer to the real terminal, unaffected by an active capture.
pub fn terminal() -> Terminal {
    sys::init_terminal();
    Terminal
}

pub struct Terminal;

impl Write for Terminal {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        sys::terminal_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        sys::terminal_flush()
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};
    use std::sync::{Arc, OnceLock};
    use std::thread::{self, JoinHandle};
    use std::time::Instant;

    use engine_logging::{engine_warn, GenerationLogScope};

    use super::{CaptureError, ConsoleTap, DRAIN_LIMIT};

    /// Poll timeout of the pump while waiting for captured output.
    const POLL_TIMEOUT_MS: libc::c_int = 50;
    use crate::{EventSink, GenerationId};

    static TERMINAL: OnceLock<Option<File>> = OnceLock::new();

    pub(super) fn init_terminal() {
        TERMINAL.get_or_init(|| dup_cloexec(libc::STDOUT_FILENO).ok());
    }

    pub(super) fn terminal_write(buf: &[u8]) -> io::Result<usize> {
        match TERMINAL.get().and_then(Option::as_ref) {
            Some(mut file) => file.write(buf),
            None => io::stdout().write(buf),
        }
    }

    pub(super) fn terminal_flush() -> io::Result<()> {
        match TERMINAL.get().and_then(Option::as_ref) {
            Some(mut file) => file.flush(),
            None => io::stdout().flush(),
        }
    }

    pub(super) struct Redirect {
        saved_stdout: RawFd,
        saved_stderr: RawFd,
        closing: Arc<OnceLock<Instant>>,
        pump: JoinHandle<()>,
    }

    impl Redirect {
        pub(super) fn install(
            generation: GenerationId,
            sink: Arc<dyn EventSink>,
        ) -> Result<Self, CaptureError> {
            init_terminal();
            flush_std();

            let (read_end, write_end) = pipe_cloexec()?;
            let saved_stdout = match dup_raw_cloexec(libc::STDOUT_FILENO) {
                Ok(fd) => fd,
                Err(err) => {
                    close_all(&[read_end, write_end]);
                    return Err(err.into());
                }
            };
            let saved_stderr = match dup_raw_cloexec(libc::STDERR_FILENO) {
                Ok(fd) => fd,
                Err(err) => {
                    close_all(&[read_end, write_end, saved_stdout]);
                    return Err(err.into());
                }
            };
            let original = match dup_cloexec(saved_stdout) {
                Ok(file) => file,
                Err(err) => {
                    close_all(&[read_end, write_end, saved_stdout, saved_stderr]);
                    return Err(err.into());
                }
            };

            // SAFETY: all descriptors are owned by this function and valid.
            let redirected = unsafe {
                libc::dup2(write_end, libc::STDOUT_FILENO) >= 0
                    && libc::dup2(write_end, libc::STDERR_FILENO) >= 0
            };
            let redirect_err = io::Error::last_os_error();
            close_all(&[write_end]);
            if !redirected {
                let _ = restore_fds(saved_stdout, saved_stderr);
                close_all(&[read_end]);
                return Err(redirect_err.into());
            }

            // SAFETY: `read_end` is an open descriptor exclusively owned from here on.
            let reader = unsafe { File::from_raw_fd(read_end) };
            let closing = Arc::new(OnceLock::new());
            let pump_closing = closing.clone();
            let spawned = thread::Builder::new()
                .name(format!("console-capture-{generation}"))
                .spawn(move || {
                    let tap = ConsoleTap::new(generation, sink, original);
                    pump(generation, reader, tap, &pump_closing)
                });
            match spawned {
                Ok(pump) => Ok(Self {
                    saved_stdout,
                    saved_stderr,
                    closing,
                    pump,
                }),
                Err(err) => {
                    let _ = restore_fds(saved_stdout, saved_stderr);
                    Err(err.into())
                }
            }
        }

        pub(super) fn restore(self) -> io::Result<()> {
            flush_std();
            let result = restore_fds(self.saved_stdout, self.saved_stderr);
            // The pump sees EOF once no descriptor refers to the pipe's write end,
            // or gives up after `DRAIN_LIMIT`.
            let _ = self.closing.set(Instant::now());
            if self.pump.join().is_err() {
                engine_warn!("console capture pump panicked");
            }
            result
        }
    }

    fn pump(
        generation: GenerationId,
        mut reader: File,
        mut tap: ConsoleTap<File>,
        closing: &OnceLock<Instant>,
    ) {
        let _scope = GenerationLogScope::enter(generation);
        let mut buf = [0u8; 4096];
        let mut forward_failures = 0usize;
        let mut read_error = None;
        let mut cut_off = false;
        loop {
            let ready = match wait_readable(&reader) {
                Ok(ready) => ready,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    read_error = Some(err);
                    break;
                }
            };
            if let Some(since) = closing.get() {
                // After restore only leftover writers remain: stop once idle or late.
                if !ready || since.elapsed() >= DRAIN_LIMIT {
                    cut_off = true;
                    break;
                }
            }
            if !ready {
                continue;
            }
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tap.feed(&buf[..n]).is_err() {
                        forward_failures += 1;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    read_error = Some(err);
                    break;
                }
            }
        }
        drop(tap.finish());
        // Logging is deferred until here: during capture a terminal logger would
        // write into the pipe this thread drains.
        if cut_off {
            engine_warn!("another process still holds the captured streams; stopped draining");
        }
        if forward_failures > 0 {
            engine_warn!("failed to forward {forward_failures} captured chunks to the terminal");
        }
        if let Some(err) = read_error {
            engine_warn!("console capture read failed: {err}");
        }
    }

    /// Whether `reader` has data or EOF pending, waiting at most `POLL_TIMEOUT_MS`.
    fn wait_readable(reader: &File) -> io::Result<bool> {
        let mut fds = libc::pollfd {
            fd: reader.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `fds` is one valid pollfd for the duration of the call.
        let ready = unsafe { libc::poll(&mut fds, 1, POLL_TIMEOUT_MS) };
        if ready < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ready > 0)
        }
    }

    fn flush_std() {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }

    /// Point fds 1 and 2 back at the saved descriptors and close the copies.
    fn restore_fds(saved_stdout: RawFd, saved_stderr: RawFd) -> io::Result<()> {
        // SAFETY: the saved descriptors were duplicated by `install` and are still open.
        let ok = unsafe {
            let out = libc::dup2(saved_stdout, libc::STDOUT_FILENO) >= 0;
            let err = libc::dup2(saved_stderr, libc::STDERR_FILENO) >= 0;
            out && err
        };
        let result = if ok {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        };
        close_all(&[saved_stdout, saved_stderr]);
        result
    }

    fn pipe_cloexec() -> io::Result<(RawFd, RawFd)> {
        let mut fds: [RawFd; 2] = [-1; 2];
        // SAFETY: `fds` is a valid two-element buffer.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        for fd in fds {
            // SAFETY: both descriptors were just returned by pipe().
            if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } != 0 {
                let err = io::Error::last_os_error();
                close_all(&fds);
                return Err(err);
            }
        }
        Ok((fds[0], fds[1]))
    }

    fn dup_raw_cloexec(fd: RawFd) -> io::Result<RawFd> {
        // SAFETY: F_DUPFD_CLOEXEC only reads `fd`.
        let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
        if dup < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(dup)
        }
    }

    fn dup_cloexec(fd: RawFd) -> io::Result<File> {
        let dup = dup_raw_cloexec(fd)?;
        // SAFETY: `dup` is a fresh descriptor owned by the returned File.
        Ok(unsafe { File::from_raw_fd(dup) })
    }

    fn close_all(fds: &[RawFd]) {
        for &fd in fds {
            // SAFETY: callers pass descriptors they own and no longer use.
            unsafe {
                libc::close(fd);
            }
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::io::{self, Write};
    use std::sync::Arc;

    use super::CaptureError;
    use crate::{EventSink, GenerationId};

    pub(super) fn init_terminal() {}

    pub(super) fn terminal_write(buf: &[u8]) -> io::Result<usize> {
        io::stdout().write(buf)
    }

    pub(super) fn terminal_flush() -> io::Result<()> {
        io::stdout().flush()
    }

    pub(super) struct Redirect;

    impl Redirect {
        pub(super) fn install(
            _generation: GenerationId,
            _sink: Arc<dyn EventSink>,
        ) -> Result<Self, CaptureError> {
            Err(CaptureError::Unsupported)
        }

        pub(super) fn restore(self) -> io::Result<()> {
            Ok(())
        }
    }
}
