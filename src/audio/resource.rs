//! Ownership of live audio resources.
//!
//! A [`ResourceHandle`] bundles the decoding subprocess with the stream it
//! produces. Release is idempotent and happens at most once per handle, from
//! whichever path gets there first: normal end of track, stop/skip, an error,
//! a forced eviction through a [`ReleaseGuard`], or `Drop`.

use parking_lot::Mutex;
use std::{fmt, io, process::Stdio, sync::Arc};
use tokio::{io::AsyncRead, process::Command, sync::watch};
use tracing::{debug, warn};

use crate::error::{PlayerError, Result};

/// Stream de PCM producido por el proceso de decodificación
pub type AudioReader = Box<dyn AsyncRead + Send + Unpin>;

/// Frecuencia de muestreo de la salida PCM (estándar de Discord)
pub const SAMPLE_RATE: u32 = 48_000;
/// Canales de la salida PCM
pub const CHANNELS: u32 = 2;

/// Proceso externo que produce audio
pub trait AudioProcess: Send {
    /// Termina el proceso. Called at most once per handle.
    fn terminate(&mut self) -> io::Result<()>;
}

struct HandleInner {
    track_id: String,
    process: Mutex<Option<Box<dyn AudioProcess>>>,
    released: watch::Sender<bool>,
}

impl HandleInner {
    /// Returns `true` only for the call that actually released.
    fn release(&self) -> bool {
        let Some(mut process) = self.process.lock().take() else {
            return false;
        };

        match process.terminate() {
            Ok(()) => debug!("🧹 Recurso liberado para {}", self.track_id),
            Err(e) if is_already_gone(&e) => {
                debug!("🧹 Proceso de {} ya había terminado", self.track_id)
            }
            Err(e) => warn!("⚠️ Error terminando proceso de {}: {}", self.track_id, e),
        }

        self.released.send_replace(true);
        true
    }

    fn is_released(&self) -> bool {
        *self.released.borrow()
    }
}

/// "No such process" and "already exited" count as released.
fn is_already_gone(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput
    ) || err.raw_os_error() == Some(3)
}

/// Recurso de audio vivo asociado a un track
pub struct ResourceHandle {
    inner: Arc<HandleInner>,
    reader: Option<AudioReader>,
}

impl ResourceHandle {
    pub fn new(
        track_id: impl Into<String>,
        process: impl AudioProcess + 'static,
        reader: AudioReader,
    ) -> Self {
        let (released, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                track_id: track_id.into(),
                process: Mutex::new(Some(Box::new(process))),
                released,
            }),
            reader: Some(reader),
        }
    }

    pub fn track_id(&self) -> &str {
        &self.inner.track_id
    }

    /// Toma el stream de audio. Only the first call returns `Some`.
    pub fn take_reader(&mut self) -> Option<AudioReader> {
        self.reader.take()
    }

    /// Libera el recurso (idempotente)
    pub fn release(&mut self) {
        self.reader = None;
        self.inner.release();
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    pub fn guard(&self) -> ReleaseGuard {
        ReleaseGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("track_id", &self.inner.track_id)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Permite forzar la liberación desde otra tarea
#[derive(Clone)]
pub struct ReleaseGuard {
    inner: Arc<HandleInner>,
}

impl ReleaseGuard {
    /// Fuerza la liberación. Returns `true` if this call did the release.
    pub fn release(&self) -> bool {
        self.inner.release()
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    /// Espera hasta que el recurso sea liberado por cualquier camino
    pub async fn wait_released(&self) {
        let mut rx = self.inner.released.subscribe();
        // El sender vive en `inner`, así que no puede cerrarse mientras esperamos
        let _ = rx.wait_for(|released| *released).await;
    }
}

/// Proceso ffmpeg decodificando a PCM f32le 48 kHz estéreo
pub struct FfmpegProcess {
    child: tokio::process::Child,
}

impl FfmpegProcess {
    /// Argumentos de ffmpeg para decodificar `input` a PCM por stdout.
    ///
    /// The input format is left to ffmpeg's probing: `.m3u8` URLs go through
    /// its HLS demuxer, archived files through whatever container they use.
    pub fn args(input: &str) -> Vec<String> {
        let rate = SAMPLE_RATE.to_string();
        let channels = CHANNELS.to_string();
        [
            "-hide_banner",
            "-loglevel",
            "fatal",
            "-i",
            input,
            "-vn",
            "-f",
            "f32le",
            "-ar",
            rate.as_str(),
            "-ac",
            channels.as_str(),
            "pipe:1",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect()
    }

    /// Lanza ffmpeg sobre `input` y devuelve el handle con su stdout
    pub fn spawn(ffmpeg_path: &str, input: &str, track_id: &str) -> Result<ResourceHandle> {
        let mut cmd = Command::new(ffmpeg_path);
        cmd.args(Self::args(input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            PlayerError::SourceUnavailable(format!("no se pudo lanzar ffmpeg: {}", e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::SourceUnavailable("ffmpeg sin stdout".to_string()))?;

        debug!("🎛️ ffmpeg lanzado para {} (pid {:?})", track_id, child.id());
        Ok(ResourceHandle::new(track_id, Self { child }, Box::new(stdout)))
    }
}

impl AudioProcess for FfmpegProcess {
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()?;
        // Recoge el proceso si ya murió; si no, kill_on_drop y el runtime lo harán
        let _ = self.child.try_wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_handle, FakeProcess, ReleaseCounter};

    #[test]
    fn test_release_is_idempotent() {
        let counter = ReleaseCounter::default();
        let mut handle = fake_handle("a", 16, &counter);

        handle.release();
        handle.release();
        handle.guard().release();
        drop(handle);

        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let counter = ReleaseCounter::default();
        let handle = fake_handle("a", 16, &counter);
        let guard = handle.guard();

        drop(handle);

        assert_eq!(counter.count(), 1);
        assert!(guard.is_released());
    }

    #[test]
    fn test_guard_release_reports_winner() {
        let counter = ReleaseCounter::default();
        let handle = fake_handle("a", 16, &counter);
        let guard = handle.guard();

        assert!(guard.release());
        assert!(!guard.clone().release());
        assert!(handle.is_released());
        drop(handle);
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_missing_process_counts_as_released() {
        let counter = ReleaseCounter::default();
        let process = FakeProcess::failing(&counter, io::Error::from_raw_os_error(3));
        let mut handle = ResourceHandle::new("gone", process, Box::new(tokio::io::empty()));

        handle.release();

        assert!(handle.is_released());
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn test_wait_released_resolves() {
        let counter = ReleaseCounter::default();
        let mut handle = fake_handle("a", 16, &counter);
        let guard = handle.guard();

        let waiter = tokio::spawn(async move { guard.wait_released().await });
        tokio::task::yield_now().await;
        handle.release();

        waiter.await.unwrap();
        assert_eq!(counter.count(), 1);
    }

    #[test]
    fn test_hls_input_is_probed_not_forced() {
        let args = FfmpegProcess::args("http://proxy/thepulse.m3u8");

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "http://proxy/thepulse.m3u8");
        // El único -f es el de salida, después de la entrada
        let formats: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-f")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(formats.len(), 1);
        assert!(formats[0] > input);
        assert_eq!(args[formats[0] + 1], "f32le");
        assert!(!args.iter().any(|a| a == "mpegts"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_already_gone_errors() {
        assert!(is_already_gone(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(is_already_gone(&io::Error::from_raw_os_error(3)));
        assert!(!is_already_gone(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
