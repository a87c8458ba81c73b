//! CLI binary for ocr2md.
//!
//! A thin shim over the library crate: maps flags to `ClientConfig`, drives
//! one `ConversionController` session, and prints results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use ocr2md::preview::encode::encode_png;
use ocr2md::{
    ClientConfig, ConversionController, ConversionObserver, ConversionStatus, Document,
    DownloadsFileService, ExportAction, ExportCoordinator, GfmRenderer, HttpConversionService,
    PdfiumRenderer, PreviewController, RequestError, SubmitOutcome, Viewport,
};
use std::io::{self, Write};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Spinner shown while the upload is in flight.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        Arc::new(Self { bar })
    }
}

impl ConversionObserver for CliObserver {
    fn on_upload_start(&self, _attempt: u64, document: &str, size: u64) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_prefix("Converting");
        self.bar
            .set_message(format!("{document} {}", dim(&format!("({})", human_size(size)))));
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_succeeded(&self, _attempt: u64, markdown_len: usize, artifact: Option<&Path>) {
        self.bar.finish_and_clear();
        let saved = artifact
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default();
        eprintln!(
            "{} Converted {}{}",
            green("✔"),
            dim(&format!("{markdown_len} chars")),
            saved
        );
    }

    fn on_failed(&self, _attempt: u64, _error: &RequestError) {
        self.bar.finish_and_clear();
    }

    fn on_cancelled(&self, _attempt: u64) {
        self.bar.finish_and_clear();
    }
}

fn human_size(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # List the models the server offers
  ocr2md models

  # Convert a scan; the result lands in ~/Downloads/scan_converted.md
  ocr2md convert scan.pdf --model gpt-4o

  # Pages 3 to 7, also export a Word document, print the Markdown
  ocr2md convert paper.pdf -m gpt-4o --pages 3-7 --export document --print

  # Render page 2 of a PDF to a PNG
  ocr2md preview paper.pdf --page 2 -o page2.png

ENVIRONMENT VARIABLES:
  OCR2MD_SERVER        Conversion service base URL (default http://127.0.0.1:8000)
  OCR2MD_MAX_SIZE_MB   Largest document accepted (default 100)
  OCR2MD_MODEL         Model identifier for `convert`
  OCR2MD_PAGES         Page selector for `convert` (e.g. 1-5 or 1,3,5)
  OCR2MD_OUTPUT_DIR    Where artifacts are saved (default: Downloads folder)
  PDFIUM_LIB_PATH      Directory (or file) of the pdfium library for `preview`
  RUST_LOG             Overrides the log filter

Press Ctrl-C during a conversion to stop it.
"#;

/// Convert documents to Markdown through an ocr2md conversion service.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "Convert documents to Markdown through an ocr2md conversion service",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Conversion service base URL.
    #[arg(short, long, global = true, env = "OCR2MD_SERVER", default_value = ocr2md::config::DEFAULT_BASE_URL)]
    server: String,

    /// Largest document accepted, in MiB.
    #[arg(long, global = true, env = "OCR2MD_MAX_SIZE_MB", default_value_t = 100,
          value_parser = clap::value_parser!(u64).range(1..))]
    max_size_mb: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCR2MD_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available models, grouped by vendor.
    Models {
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert a document to Markdown.
    Convert {
        /// Document to convert.
        file: PathBuf,

        /// Model identifier (see `ocr2md models`).
        #[arg(short, long, env = "OCR2MD_MODEL", default_value = "")]
        model: String,

        /// Page selector: empty for all, 3-15, or 1,3,5.
        #[arg(long, env = "OCR2MD_PAGES", default_value = "")]
        pages: String,

        /// Directory artifacts are saved to. Default: the Downloads folder.
        #[arg(short, long, env = "OCR2MD_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,

        /// Extra exports once the conversion succeeds (repeatable).
        #[arg(short, long, value_enum)]
        export: Vec<ExportArg>,

        /// Print the Markdown to stdout.
        #[arg(long)]
        print: bool,

        /// Disable the progress spinner.
        #[arg(long, env = "OCR2MD_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Render one page of a PDF to PNG.
    Preview {
        /// PDF to preview.
        file: PathBuf,

        /// Page number (1-indexed).
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Rendered width in pixels.
        #[arg(long, default_value_t = 1024)]
        width: u32,

        /// Output PNG. Default: `<base>_page<N>.png` in the working directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportArg {
    /// `<base>_converted.md` (already saved by every conversion).
    Markdown,
    /// `<base>_converted.doc` Word document.
    Document,
    /// System clipboard.
    Clipboard,
}

impl From<ExportArg> for ExportAction {
    fn from(v: ExportArg) -> Self {
        match v {
            ExportArg::Markdown => ExportAction::Markdown,
            ExportArg::Document => ExportAction::Document,
            ExportArg::Clipboard => ExportAction::Copy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters during a conversion,
    // so library INFO logs are suppressed while it is active.
    let spinner = match &cli.command {
        Command::Convert { no_progress, .. } => !cli.quiet && !no_progress,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
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

    match &cli.command {
        Command::Models { json } => list_models(&cli, *json).await,
        Command::Convert {
            file,
            model,
            pages,
            output_dir,
            export,
            print,
            ..
        } => {
            let options = ConvertOptions {
                file,
                model,
                pages,
                output_dir: output_dir.as_deref(),
                exports: export,
                print: *print,
                spinner,
            };
            convert(&cli, options).await
        }
        Command::Preview {
            file,
            page,
            width,
            output,
        } => {
            let max_bytes = cli.max_size_mb.saturating_mul(1024 * 1024);
            preview(file, max_bytes, *page, *width, output.as_deref()).await
        }
    }
}

/// Map global CLI args to `ClientConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<dyn ConversionObserver>>) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .base_url(cli.server.clone())
        .max_document_mb(cli.max_size_mb);
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }
    builder.build().context("Invalid configuration")
}

async fn list_models(cli: &Cli, json: bool) -> Result<()> {
    let config = build_config(cli, None)?;
    let service = HttpConversionService::new(&config)?;
    let files = Arc::new(DownloadsFileService::user_downloads());
    let controller = ConversionController::new(service, files, config);

    let catalog = controller
        .load_models()
        .await
        .context("Failed to load models")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&catalog).context("Failed to serialise catalog")?
        );
        return Ok(());
    }

    for vendor in &catalog.vendors {
        let name = if vendor.name.is_empty() {
            "(unnamed)"
        } else {
            &vendor.name
        };
        println!("{}", bold(name));
        for model in &vendor.models {
            println!("  {:<32} {}", model.model_id, dim(&model.name));
        }
    }
    Ok(())
}

struct ConvertOptions<'a> {
    file: &'a Path,
    model: &'a str,
    pages: &'a str,
    output_dir: Option<&'a Path>,
    exports: &'a [ExportArg],
    print: bool,
    spinner: bool,
}

async fn convert(cli: &Cli, opts: ConvertOptions<'_>) -> Result<()> {
    let observer = if opts.spinner {
        Some(CliObserver::new() as Arc<dyn ConversionObserver>)
    } else {
        None
    };
    let config = build_config(cli, observer)?;
    let export_window = config.export_success_window;
    let service = HttpConversionService::new(&config)?;
    let files = Arc::new(match opts.output_dir {
        Some(dir) => DownloadsFileService::new(dir),
        None => DownloadsFileService::user_downloads(),
    });
    let controller = ConversionController::new(service, Arc::clone(&files), config);

    let document = Document::from_path(opts.file, controller.config().max_document_bytes).await?;
    controller.select_document(Some(document));
    controller.select_model(opts.model);
    controller.set_pages(opts.pages);

    // Ctrl-C stops the in-flight upload.
    let stopper = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.cancel();
            }
        })
    };
    let outcome = controller.submit().await;
    stopper.abort();

    match outcome {
        SubmitOutcome::Finished(ConversionStatus::Succeeded) => {}
        SubmitOutcome::Finished(ConversionStatus::Cancelled) => {
            eprintln!("{} Conversion stopped", yellow("■"));
            std::process::exit(130);
        }
        _ => {
            let message = controller
                .message()
                .unwrap_or_else(|| "Conversion failed".to_string());
            eprintln!("{} {}", red("✘"), message);
            std::process::exit(1);
        }
    }

    let result = controller
        .result()
        .context("Conversion succeeded without a result")?;

    if !opts.exports.is_empty() {
        let mut exporter = ExportCoordinator::new(GfmRenderer, files, export_window);
        for &arg in opts.exports {
            if let Some(path) = exporter
                .perform(arg.into(), &result)
                .await
                .with_context(|| format!("{arg:?} export failed"))?
            {
                if !cli.quiet {
                    eprintln!("{} {}", green("✔"), path.display());
                }
            } else if !cli.quiet {
                eprintln!("{} Copied to clipboard", green("✔"));
            }
        }
    }

    if opts.print {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(result.content.as_bytes())
            .context("Failed to write to stdout")?;
        if !result.content.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    } else if !cli.quiet && !opts.spinner {
        match &result.artifact {
            Some(path) => eprintln!("Saved {}", path.display()),
            None => eprintln!("Converted {} chars (not saved)", result.content.len()),
        }
    }

    Ok(())
}

async fn preview(
    file: &Path,
    max_bytes: u64,
    page: usize,
    width: u32,
    output: Option<&Path>,
) -> Result<()> {
    let document = Document::from_path(file, max_bytes).await?;
    if !document.is_loaded() {
        bail!(
            "'{}' is {} bytes, over the --max-size-mb limit",
            document.name(),
            document.size()
        );
    }
    if !document.is_previewable() {
        bail!(
            "'{}' is not a PDF ({}); only PDFs can be previewed",
            document.name(),
            document.media_type()
        );
    }

    let viewport = Viewport::new(width as f32 + 2.0 * Viewport::DEFAULT_PADDING);
    let mut preview = PreviewController::new(PdfiumRenderer::new(), viewport);
    preview
        .load(&document)
        .await
        .context("Failed to open PDF for preview")?;

    let total = preview.state().map(|s| s.total_pages()).unwrap_or(0);
    if page < 1 || page > total {
        bail!("Page {page} is out of range (document has {total} pages)");
    }
    preview
        .go_to_page(page)
        .await
        .with_context(|| format!("Failed to render page {page}"))?;

    let rendered = preview
        .surface()
        .context("No page was rendered")?;
    let png = encode_png(&rendered.image).context("Failed to encode PNG")?;

    let out = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}_page{}.png", document.base_name(), page)));
    tokio::fs::write(&out, &png)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    eprintln!(
        "{} Page {}/{}  {}x{} px  →  {}",
        green("✔"),
        page,
        total,
        rendered.image.width(),
        rendered.image.height(),
        bold(&out.display().to_string())
    );
    Ok(())
}
