//! CLI binary for offer-composer.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ComposerConfig` and prints results.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use offer_composer::{
    preview_stream, run_warmup, Composer, ComposerConfig, CompositionRequest, PageOrigin, PageReady,
    PreviewUpdate, ProgressCallback,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a 0–100 % bar plus one log line per page.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Working");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn page_line(&self, page: &PageReady) {
        let origin = match page.kind {
            PageOrigin::Template => page.source_file.clone().unwrap_or_default(),
            PageOrigin::Product => format!("item {}", page.product_id.as_deref().unwrap_or("?")),
        };
        self.bar.println(format!(
            "  {} Page {:>3}  {}",
            green("✓"),
            page.number,
            dim(&format!("{origin} #{}", page.page_index + 1)),
        ));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for CliProgress {
    fn on_progress(&self, message: &str, percent: u8) {
        // The empty message is a reset; keep the last state on screen.
        if message.is_empty() {
            return;
        }
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_page_ready(&self, page: &PageReady) {
        self.page_line(page);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render one document to page_0001.jpg, page_0002.jpg, …
  offer render produkty/crm.docx -o out/crm

  # Compose an offer from a request file using the "standard" template
  offer compose request.json --template standard

  # Preview an offer and keep the page images
  offer preview request.json --template standard -o preview/

  # Pre-convert every item and template fragment
  offer warmup

  # What is available
  offer templates
  offer products

DIRECTORY LAYOUT (under --root):
  templates/          templates.json + one folder per template
  produkty/           item documents, <id>.docx
  generated_offers/   composed offers
  out_jpg/            scratch space; out_jpg/templates/ holds warm-up pages

REQUEST FILE:
  {
    "formData":            { "NazwaFirmyKlienta": "ACME", ... },
    "selectedProducts":    ["crm", "erp"],
    "productCustomFields": { "crm": { "cena": "100" } },
    "templateData":        { ...descriptor, or use --template... }
  }

ENVIRONMENT VARIABLES:
  OFFER_ROOT          Working root (default: current directory)
  OFFER_SOFFICE       Path to soffice
  PDFIUM_LIB_PATH     Directory containing libpdfium
  RUST_LOG            Overrides the log filter
"#;

/// Compose business offers from DOCX fragments and render JPEG previews.
#[derive(Parser, Debug)]
#[command(
    name = "offer",
    version,
    about = "Compose business offers from DOCX fragments and render JPEG previews",
    long_about = "Compose business offers from a multi-file DOCX template and selected item \
documents, and render any DOCX to page images through LibreOffice and pdfium.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Working root holding templates/, produkty/ and generated_offers/.
    #[arg(long, global = true, env = "OFFER_ROOT", default_value = ".")]
    root: PathBuf,

    /// Rendering DPI (72–400).
    #[arg(long, global = true, env = "OFFER_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// JPEG quality (1–100).
    #[arg(long, global = true, env = "OFFER_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Timeout for one converter run, in seconds.
    #[arg(long, global = true, env = "OFFER_CONVERTER_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Path to the soffice binary.
    #[arg(long, global = true, env = "OFFER_SOFFICE")]
    soffice: Option<PathBuf>,

    /// Path to the unoconvert binary.
    #[arg(long, global = true, env = "OFFER_UNOCONVERT")]
    unoconvert: Option<PathBuf>,

    /// Never try a running unoserver; always spawn soffice.
    #[arg(long, global = true, env = "OFFER_NO_UNOSERVER")]
    no_unoserver: bool,

    /// unoserver host.
    #[arg(long, global = true, env = "OFFER_UNOSERVER_HOST", default_value = "127.0.0.1")]
    unoserver_host: String,

    /// unoserver port.
    #[arg(long, global = true, env = "OFFER_UNOSERVER_PORT", default_value_t = 2003)]
    unoserver_port: u16,

    /// Directory containing the pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, global = true, env = "OFFER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OFFER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OFFER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one DOCX to page_0001.jpg, page_0002.jpg, …
    Render {
        /// DOCX file to render.
        input: PathBuf,
        /// Output directory (default: <out_jpg>/<stem>).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compose an offer and write it to generated_offers/.
    Compose {
        /// Request JSON file.
        request: PathBuf,
        /// Template id from templates.json; replaces the request's templateData.
        #[arg(short, long)]
        template: Option<String>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Render the offer a request describes, page by page.
    Preview {
        /// Request JSON file.
        request: PathBuf,
        /// Template id from templates.json; replaces the request's templateData.
        #[arg(short, long)]
        template: Option<String>,
        /// Write every page as page_NNNN.jpg into this directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Convert every item and template fragment ahead of time.
    Warmup {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List templates from templates.json.
    Templates {
        #[arg(long)]
        json: bool,
    },
    /// List item documents.
    Products {
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    fn json(&self) -> bool {
        match self {
            Command::Render { .. } => false,
            Command::Compose { json, .. }
            | Command::Preview { json, .. }
            | Command::Warmup { json }
            | Command::Templates { json }
            | Command::Products { json } => *json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the user-facing feedback; library INFO logs would
    // tear it, so they are only shown without it.
    let show_progress = !g.quiet && !g.no_progress && !cli.command.json();
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(g)?;
    config.ensure_dirs().context("Failed to create working directories")?;
    let composer = Composer::from_config(config);

    match &cli.command {
        Command::Render { input, output } => {
            let out_dir = output.clone().unwrap_or_else(|| {
                let stem = input.file_stem().unwrap_or_default();
                composer.config().scratch_dir.join(stem)
            });
            let progress = show_progress.then(CliProgress::new);
            let cb: &dyn ProgressCallback = match &progress {
                Some(p) => p.as_ref(),
                None => &offer_composer::NoopProgress,
            };
            let written = composer
                .pipeline()
                .render_to_dir(input, &out_dir, cb)
                .await;
            if let Some(p) = &progress {
                p.finish();
            }
            let written = written.with_context(|| format!("Failed to render {}", input.display()))?;

            if !g.quiet {
                eprintln!(
                    "{} {} pages  →  {}",
                    green("✔"),
                    bold(&written.len().to_string()),
                    bold(&out_dir.display().to_string())
                );
            }
            for path in written {
                println!("{}", path.display());
            }
        }

        Command::Compose { request, template, json } => {
            let request = load_request(&composer, request, template.as_deref())?;
            let progress = show_progress.then(CliProgress::new);
            let cb: &dyn ProgressCallback = match &progress {
                Some(p) => p.as_ref(),
                None => &offer_composer::NoopProgress,
            };
            let offer = composer.generate_offer(&request, cb).await;
            if let Some(p) = &progress {
                p.finish();
            }
            let offer = offer.context("Composition failed")?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&offer).context("Failed to serialise result")?
                );
            } else {
                if !g.quiet {
                    for issue in &offer.skipped {
                        eprintln!("  {} {}", cyan("⚠"), issue);
                    }
                    eprintln!(
                        "{} {}  {}",
                        green("✔"),
                        bold(&offer.filename),
                        dim(&format!("{:.1}s", offer.elapsed_secs))
                    );
                }
                println!("{}", offer.path.display());
            }
        }

        Command::Preview { request, template, output, json } => {
            let request = load_request(&composer, request, template.as_deref())?;
            if let Some(dir) = output {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }

            let progress = show_progress.then(CliProgress::new);
            let mut stream = preview_stream(composer.clone(), request);
            let mut summary = None;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(PreviewUpdate::Progress(p)) => {
                        if let Some(bar) = &progress {
                            bar.on_progress(&p.message, p.percent);
                        }
                    }
                    Ok(PreviewUpdate::Page(page)) => {
                        if let Some(bar) = &progress {
                            bar.on_page_ready(&page);
                        }
                        if let Some(dir) = output {
                            write_page(dir, &page)?;
                        }
                    }
                    Ok(PreviewUpdate::Finished(s)) => summary = Some(s),
                    Err(e) => {
                        if let Some(bar) = &progress {
                            bar.finish();
                        }
                        return Err(e).context("Preview failed");
                    }
                }
            }
            if let Some(bar) = &progress {
                bar.finish();
            }
            let summary = summary.context("Preview ended without a summary")?;

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
                );
            } else if !g.quiet {
                for issue in &summary.skipped {
                    eprintln!("  {} {}", cyan("⚠"), issue);
                }
                eprintln!("{} {} pages", green("✔"), bold(&summary.total_pages.to_string()));
            }
        }

        Command::Warmup { json } => {
            let spinner = show_progress.then(|| {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  ⏱ {elapsed_precise}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar.set_prefix("Warming up");
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            });
            let report = run_warmup(&composer).await;
            if let Some(s) = spinner {
                s.finish_and_clear();
            }

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialise report")?
                );
            } else if !g.quiet {
                for issue in &report.failures {
                    eprintln!("  {} {}", red("✗"), issue);
                }
                for issue in &report.cache_bypassed {
                    eprintln!("  {} {}", cyan("⚠"), issue);
                }
                eprintln!(
                    "{} {} items cached, {} fragments rendered ({} pages)  {}",
                    if report.failures.is_empty() { green("✔") } else { cyan("⚠") },
                    report.items_cached,
                    report.fragments_rendered,
                    report.pages_written,
                    dim(&format!("{:.1}s", report.elapsed_secs)),
                );
            }
        }

        Command::Templates { json } => {
            let index = composer
                .catalog()
                .load()
                .context("Failed to read template catalog")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&index).context("Failed to serialise templates")?
                );
            } else {
                for t in &index.templates {
                    println!(
                        "{:<20} {:<30} {}",
                        t.id,
                        t.name.as_deref().unwrap_or("-"),
                        dim(&format!("{} files", t.files.len()))
                    );
                }
            }
        }

        Command::Products { json } => {
            let items = composer.items().list().context("Failed to list items")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&items).context("Failed to serialise items")?
                );
            } else {
                for item in &items {
                    println!("{:<20} {}", item.id, dim(&item.filename));
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ComposerConfig`.
fn build_config(g: &GlobalArgs) -> Result<ComposerConfig> {
    let mut builder = ComposerConfig::builder()
        .root(&g.root)
        .dpi(g.dpi)
        .jpeg_quality(g.quality)
        .converter_timeout_secs(g.timeout)
        .use_unoserver(!g.no_unoserver)
        .unoserver_host(g.unoserver_host.clone())
        .unoserver_port(g.unoserver_port);

    if let Some(ref p) = g.soffice {
        builder = builder.soffice_path(p.clone());
    }
    if let Some(ref p) = g.unoconvert {
        builder = builder.unoconvert_path(p.clone());
    }
    if let Some(ref p) = g.pdfium_lib {
        builder = builder.pdfium_lib_path(p.clone());
    }

    builder.build().context("Invalid configuration")
}

/// Read a request file, optionally filling `templateData` from the catalog.
fn load_request(composer: &Composer, path: &Path, template: Option<&str>) -> Result<CompositionRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request from {}", path.display()))?;
    let mut request: CompositionRequest =
        serde_json::from_str(&raw).with_context(|| format!("Invalid request in {}", path.display()))?;

    if let Some(id) = template {
        let descriptor = composer
            .catalog()
            .find(id)
            .with_context(|| format!("Template '{id}' not found"))?;
        request.template_data = Some(descriptor);
    }
    if request.template_data.is_none() {
        anyhow::bail!("The request has no templateData; pass --template <id>");
    }
    Ok(request)
}

/// Decode a page's data URI and write it as `page_NNNN.jpg`.
fn write_page(dir: &Path, page: &PageReady) -> Result<()> {
    let payload = page
        .image
        .split_once(',')
        .map(|(_, b64)| b64)
        .unwrap_or(&page.image);
    let bytes = STANDARD
        .decode(payload)
        .with_context(|| format!("Page {} carries an invalid image", page.number))?;
    let path = dir.join(format!("page_{:04}.jpg", page.number));
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
