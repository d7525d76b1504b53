//! DOCX → PDF conversion through LibreOffice.
//!
//! ## One converter at a time
//!
//! LibreOffice keeps per-profile state and names its temporary files
//! predictably, so two concurrent conversions against one installation race
//! each other. [`ConverterGateway`] owns a single async mutex and every
//! conversion in the process passes through it.
//!
//! ## Warm before cold
//!
//! A running `unoserver` instance converts in well under a second; spawning a
//! fresh `soffice` costs several. Backends are tried in order and a failing
//! warm backend falls through to the next one.
//!
//! ## Output discovery
//!
//! `soffice --outdir` names its output after the source stem, and some builds
//! pick other names. After a successful run the gateway looks for the exact
//! destination, then `<outdir>/<stem>.pdf`, then the newest PDF in the output
//! directory, and renames what it finds to the requested destination.

use crate::config::{ComposerConfig, SOFFICE_CANDIDATES};
use crate::error::ComposeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// One way of invoking an external DOCX → PDF converter.
#[async_trait]
pub trait ConverterBackend: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Whether this backend can be attempted right now.
    async fn is_available(&self) -> bool;

    /// Convert `source` so that a PDF ends up at `dest` or in its directory.
    ///
    /// Must fail on a non-zero exit and must not outlive `timeout`.
    async fn run(&self, source: &Path, dest: &Path, timeout: Duration) -> Result<(), ComposeError>;
}

// ── Backends ─────────────────────────────────────────────────────────────────

/// `unoconvert` client talking to a warm `unoserver`.
#[derive(Debug, Clone)]
pub struct UnoconvertBackend {
    program: PathBuf,
    host: String,
    port: u16,
}

impl UnoconvertBackend {
    pub fn new(program: PathBuf, host: impl Into<String>, port: u16) -> Self {
        Self {
            program,
            host: host.into(),
            port,
        }
    }
}

#[async_trait]
impl ConverterBackend for UnoconvertBackend {
    fn name(&self) -> &str {
        "unoconvert"
    }

    async fn is_available(&self) -> bool {
        if resolve_program(&self.program).is_none() {
            return false;
        }
        let addr = format!("{}:{}", self.host, self.port);
        matches!(
            tokio::time::timeout(
                Duration::from_millis(500),
                tokio::net::TcpStream::connect(&addr)
            )
            .await,
            Ok(Ok(_))
        )
    }

    async fn run(&self, source: &Path, dest: &Path, timeout: Duration) -> Result<(), ComposeError> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(source)
            .arg(dest)
            .arg("--convert-to")
            .arg("pdf")
            .arg("--host")
            .arg(&self.host)
            .arg("--port")
            .arg(self.port.to_string());
        run_tool(self.name(), cmd, timeout).await?;

        // unoconvert writes exactly where it is told; an empty file means failure.
        match tokio::fs::metadata(dest).await {
            Ok(m) if m.len() > 0 => Ok(()),
            _ => Err(ComposeError::ExternalTool {
                tool: self.name().to_string(),
                detail: format!("no PDF written to {}", dest.display()),
            }),
        }
    }
}

/// One-shot headless `soffice` process.
#[derive(Debug, Clone)]
pub struct SofficeBackend {
    candidates: Vec<PathBuf>,
}

impl SofficeBackend {
    /// Use an explicit binary.
    pub fn with_program(program: PathBuf) -> Self {
        Self {
            candidates: vec![program],
        }
    }

    /// Probe the usual install locations and PATH.
    pub fn discover() -> Self {
        Self {
            candidates: SOFFICE_CANDIDATES.iter().map(PathBuf::from).collect(),
        }
    }

    /// First candidate that exists on disk or on PATH.
    pub fn program(&self) -> Option<PathBuf> {
        self.candidates.iter().find_map(|c| resolve_program(c))
    }
}

#[async_trait]
impl ConverterBackend for SofficeBackend {
    fn name(&self) -> &str {
        "soffice"
    }

    async fn is_available(&self) -> bool {
        self.program().is_some()
    }

    async fn run(&self, source: &Path, dest: &Path, timeout: Duration) -> Result<(), ComposeError> {
        let program = self.program().ok_or(ComposeError::ConverterUnavailable)?;
        let outdir = dest.parent().unwrap_or_else(|| Path::new("."));

        let mut cmd = Command::new(program);
        cmd.arg("--headless")
            .arg("--nologo")
            .arg("--nodefault")
            .arg("--nofirststartwizard")
            .arg("--convert-to")
            .arg("pdf:writer_pdf_Export")
            .arg("--outdir")
            .arg(outdir)
            .arg(source);
        run_tool(self.name(), cmd, timeout).await
    }
}

/// Spawn `cmd`, enforce `timeout`, map a failure exit to `ExternalTool`.
async fn run_tool(tool: &str, mut cmd: Command, timeout: Duration) -> Result<(), ComposeError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {}: {:?}", tool, cmd.as_std());

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|e| ComposeError::ExternalTool {
            tool: tool.to_string(),
            detail: format!("failed to start: {}", e),
        })?,
        Err(_) => {
            return Err(ComposeError::ConverterTimeout {
                tool: tool.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = match (stderr.trim(), stdout.trim()) {
            ("", "") => format!("exited with {}", output.status),
            ("", out) => out.to_string(),
            (err, _) => err.to_string(),
        };
        return Err(ComposeError::ExternalTool {
            tool: tool.to_string(),
            detail,
        });
    }
    Ok(())
}

/// Resolve a program path: absolute/relative paths must exist, bare names are
/// looked up on PATH.
fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

// ── Gateway ──────────────────────────────────────────────────────────────────

/// Process-wide entry point to the external converter.
pub struct ConverterGateway {
    backends: Vec<Arc<dyn ConverterBackend>>,
    gate: tokio::sync::Mutex<()>,
    timeout: Duration,
    invocations: AtomicU64,
}

impl ConverterGateway {
    /// Backends are tried in the given order.
    pub fn new(backends: Vec<Arc<dyn ConverterBackend>>, timeout: Duration) -> Self {
        Self {
            backends,
            gate: tokio::sync::Mutex::new(()),
            timeout,
            invocations: AtomicU64::new(0),
        }
    }

    /// unoconvert (if enabled) followed by soffice, as configured.
    pub fn from_config(config: &ComposerConfig) -> Self {
        let mut backends: Vec<Arc<dyn ConverterBackend>> = Vec::new();
        if config.use_unoserver {
            let program = config
                .unoconvert_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("unoconvert"));
            backends.push(Arc::new(UnoconvertBackend::new(
                program,
                config.unoserver_host.clone(),
                config.unoserver_port,
            )));
        }
        let soffice = match &config.soffice_path {
            Some(p) => SofficeBackend::with_program(p.clone()),
            None => SofficeBackend::discover(),
        };
        backends.push(Arc::new(soffice));
        Self::new(backends, Duration::from_secs(config.converter_timeout_secs))
    }

    /// Total backend runs started by this gateway, fallbacks included.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Names of the backends that are currently usable.
    pub async fn available_backends(&self) -> Vec<String> {
        let mut names = Vec::new();
        for b in &self.backends {
            if b.is_available().await {
                names.push(b.name().to_string());
            }
        }
        names
    }

    /// Convert `source` to a PDF at exactly `dest`.
    pub async fn convert(&self, source: &Path, dest: &Path) -> Result<(), ComposeError> {
        let _guard = self.gate.lock().await;

        let mut last_err = None;

        for backend in &self.backends {
            if !backend.is_available().await {
                debug!("Converter backend '{}' unavailable", backend.name());
                continue;
            }
            self.invocations.fetch_add(1, Ordering::SeqCst);
            let attempt = match backend.run(source, dest, self.timeout).await {
                Ok(()) => locate_output(source, dest).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(()) => {
                    info!(
                        "Converted {} via {}",
                        source.display(),
                        backend.name()
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Converter backend '{}' failed for {}: {}",
                        backend.name(),
                        source.display(),
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(ComposeError::ConverterUnavailable))
    }
}

/// Make sure the converter's output ends up at `dest`.
async fn locate_output(source: &Path, dest: &Path) -> Result<(), ComposeError> {
    if tokio::fs::try_exists(dest).await.unwrap_or(false) {
        return Ok(());
    }

    let outdir = dest.parent().unwrap_or_else(|| Path::new("."));
    let by_stem = source
        .file_stem()
        .map(|stem| outdir.join(stem).with_extension("pdf"));

    let found = match by_stem {
        Some(p) if tokio::fs::try_exists(&p).await.unwrap_or(false) => Some(p),
        _ => newest_pdf(outdir).await,
    };

    let Some(found) = found else {
        return Err(ComposeError::NoOutputProduced {
            dir: outdir.to_path_buf(),
        });
    };

    debug!("Moving {} → {}", found.display(), dest.display());
    tokio::fs::rename(&found, dest)
        .await
        .map_err(|e| ComposeError::write(dest, e))
}

/// Most recently modified `.pdf` in `dir`.
async fn newest_pdf(dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut best: Option<(SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            continue;
        }
        let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
            continue;
        };
        if best.as_ref().map_or(true, |(t, _)| modified > *t) {
            best = Some((modified, path));
        }
    }

    best.map(|(_, path)| path)
}
