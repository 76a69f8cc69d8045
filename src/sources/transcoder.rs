use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, Cursor},
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    process::{Child, ChildStderr, Command},
    sync::OnceCell,
};
use tracing::{debug, info, warn};

use super::ByteStream;
use crate::error::{PlayerError, PlayerResult};

/// Sample rate the voice mixer expects.
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;
/// Stereo output.
pub const OUTPUT_CHANNELS: u32 = 2;

const DECODER_BINARY: &str = "ffmpeg";
const FIRST_CHUNK_CAPACITY: usize = 16 * 1024;

/// One way of finding the decoder binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderLocator {
    /// Operator-provided path (`FFMPEG_PATH`).
    Explicit(PathBuf),
    /// A well-known install location.
    InstallPath(PathBuf),
    /// Search every directory of `PATH` for the given binary name.
    PathLookup(String),
    /// Binary shipped next to the bot.
    Bundled(PathBuf),
}

impl DecoderLocator {
    /// Default search order.
    ///
    /// The bundled fallback is only considered off the primary deployment
    /// target (Linux containers always have a system ffmpeg).
    pub fn default_order(
        explicit: Option<PathBuf>,
        install_paths: &[PathBuf],
        bundled: Option<PathBuf>,
    ) -> Vec<DecoderLocator> {
        let mut locators = Vec::new();

        if let Some(path) = explicit {
            locators.push(DecoderLocator::Explicit(path));
        }

        locators.extend(install_paths.iter().cloned().map(DecoderLocator::InstallPath));
        locators.push(DecoderLocator::PathLookup(DECODER_BINARY.to_string()));

        if let Some(path) = bundled {
            if !cfg!(target_os = "linux") {
                locators.push(DecoderLocator::Bundled(path));
            }
        }

        locators
    }

    /// `Ok(None)` when this strategy has nothing; `Err` when the check itself failed.
    async fn locate(&self) -> io::Result<Option<PathBuf>> {
        match self {
            DecoderLocator::Explicit(path)
            | DecoderLocator::InstallPath(path)
            | DecoderLocator::Bundled(path) => check_decoder_file(path).await,
            DecoderLocator::PathLookup(name) => match std::env::var_os("PATH") {
                Some(paths) => search_dirs(name, std::env::split_paths(&paths)).await,
                None => Ok(None),
            },
        }
    }
}

/// Default install locations checked before `PATH`.
pub fn default_install_paths() -> Vec<PathBuf> {
    ["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg", "/opt/homebrew/bin/ffmpeg"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

async fn check_decoder_file(path: &Path) -> io::Result<Option<PathBuf>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(path.to_path_buf())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn search_dirs(name: &str, dirs: impl Iterator<Item = PathBuf>) -> io::Result<Option<PathBuf>> {
    let file_name = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };

    for dir in dirs {
        match check_decoder_file(&dir.join(&file_name)).await {
            Ok(Some(found)) => return Ok(Some(found)),
            Ok(None) => {}
            Err(e) => debug!("🔍 Skipping PATH entry {}: {}", dir.display(), e),
        }
    }

    Ok(None)
}

/// Runtime knobs for the decoder.
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    pub locators: Vec<DecoderLocator>,
    pub first_data_timeout: Duration,
    pub reconnect_max_retries: u32,
    pub reconnect_delay_max: Duration,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            locators: DecoderLocator::default_order(None, &default_install_paths(), None),
            first_data_timeout: Duration::from_secs(15),
            reconnect_max_retries: 5,
            reconnect_delay_max: Duration::from_secs(5),
        }
    }
}

/// Spawns and supervises ffmpeg for HLS stations.
pub struct TranscodeSupervisor {
    settings: TranscodeSettings,
    decoder: OnceCell<PathBuf>,
}

impl TranscodeSupervisor {
    pub fn new(settings: TranscodeSettings) -> Self {
        Self {
            settings,
            decoder: OnceCell::new(),
        }
    }

    /// Finds the decoder binary, caching the first success for the process lifetime.
    pub async fn resolve_decoder(&self) -> PlayerResult<PathBuf> {
        self.decoder
            .get_or_try_init(|| async {
                for locator in &self.settings.locators {
                    match locator.locate().await {
                        Ok(Some(path)) => {
                            info!("🔧 Decoder found via {:?}: {}", locator, path.display());
                            return Ok(path);
                        }
                        Ok(None) => debug!("🔍 Decoder not found via {:?}", locator),
                        Err(e) => warn!("⚠️ Decoder check failed for {:?}: {}", locator, e),
                    }
                }

                Err(PlayerError::DecoderNotFound {
                    tried: self.settings.locators.len(),
                })
            })
            .await
            .cloned()
    }

    /// Argument contract: reconnect on transient errors, audio only,
    /// f32le 48 kHz stereo PCM on stdout.
    pub fn build_args(&self, endpoint: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-loglevel".into(),
            "warning".into(),
            "-reconnect".into(),
            "1".into(),
            "-reconnect_streamed".into(),
            "1".into(),
            "-reconnect_on_network_error".into(),
            "1".into(),
            "-reconnect_max_retries".into(),
            self.settings.reconnect_max_retries.to_string(),
            "-reconnect_delay_max".into(),
            self.settings.reconnect_delay_max.as_secs().to_string(),
            "-analyzeduration".into(),
            "0".into(),
            "-i".into(),
            endpoint.to_string(),
            "-vn".into(),
            "-f".into(),
            "f32le".into(),
            "-ar".into(),
        ];

        args.push(OUTPUT_SAMPLE_RATE.to_string());
        args.push("-ac".into());
        args.push(OUTPUT_CHANNELS.to_string());
        args.push("pipe:1".into());

        args
    }

    /// Spawns the decoder and waits for its first chunk of PCM.
    ///
    /// Fails when the process cannot start, exits before writing anything, or
    /// stays silent past the first-data timeout (in which case it is killed).
    pub async fn start(&self, endpoint: &str) -> PlayerResult<(ByteStream, TranscodeProcess)> {
        let binary = self.resolve_decoder().await?;
        let args = self.build_args(endpoint);

        debug!("🎛️ Spawning {} {}", binary.display(), args.join(" "));

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(PlayerError::DecoderSpawn)?;

        let pid = child.id();
        let mut stdout = child.stdout.take().ok_or_else(|| {
            PlayerError::DecoderSpawn(io::Error::new(io::ErrorKind::Other, "decoder stdout not captured"))
        })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_diagnostics(pid, stderr));
        }

        let mut first = vec![0u8; FIRST_CHUNK_CAPACITY];
        let timeout = self.settings.first_data_timeout;

        let outcome = tokio::time::timeout(timeout, async {
            tokio::select! {
                biased;
                read = stdout.read(&mut first) => FirstOutput::Data(read),
                status = child.wait() => FirstOutput::Exited(status),
            }
        })
        .await;

        let read = match outcome {
            Err(_) => {
                warn!("⏰ Decoder {:?} silent for {:?}, killing it", pid, timeout);
                if let Err(e) = child.kill().await {
                    debug!("Decoder {:?} already gone: {}", pid, e);
                }
                return Err(PlayerError::DecoderTimeout(timeout));
            }
            Ok(FirstOutput::Exited(status)) => {
                let reason = describe_exit(status?);
                warn!("❌ Decoder {:?} exited before producing audio ({})", pid, reason);
                return Err(PlayerError::DecoderExited { reason });
            }
            Ok(FirstOutput::Data(read)) => read,
        };

        match read {
            Ok(0) => {
                let reason = describe_exit(child.wait().await?);
                warn!("❌ Decoder {:?} closed stdout before producing audio ({})", pid, reason);
                Err(PlayerError::DecoderExited { reason })
            }
            Ok(n) => {
                first.truncate(n);
                info!("✅ Decoder {:?} is streaming ({} bytes in first chunk)", pid, n);
                let stream: ByteStream = Box::new(Cursor::new(Bytes::from(first)).chain(stdout));
                Ok((stream, TranscodeProcess { child, pid }))
            }
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    debug!("Decoder {:?} already gone: {}", pid, kill_err);
                }
                Err(PlayerError::Io(e))
            }
        }
    }
}

enum FirstOutput {
    Data(io::Result<usize>),
    Exited(io::Result<ExitStatus>),
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {signal}");
        }
    }

    "unknown exit status".to_string()
}

async fn log_diagnostics(pid: Option<u32>, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                if line.to_lowercase().contains("error") {
                    warn!("🎛️ ffmpeg[{:?}]: {}", pid, line);
                } else {
                    debug!("🎛️ ffmpeg[{:?}]: {}", pid, line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("ffmpeg[{:?}] stderr unreadable: {}", pid, e);
                break;
            }
        }
    }

    debug!("ffmpeg[{:?}] stderr closed", pid);
}

/// Owned handle to a running decoder. Only capability: kill it.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    fn id(&self) -> Option<u32>;

    /// Forcibly stops the process. Best-effort: a process that is already
    /// gone is not an error.
    async fn terminate(&mut self);
}

/// A live ffmpeg child. Killed on drop as well.
pub struct TranscodeProcess {
    child: Child,
    pid: Option<u32>,
}

#[async_trait]
impl ProcessHandle for TranscodeProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn terminate(&mut self) {
        match self.child.kill().await {
            Ok(()) => debug!("🔪 Decoder {:?} terminated", self.pid),
            Err(e) => debug!("Decoder {:?} already exited: {}", self.pid, e),
        }
    }
}
