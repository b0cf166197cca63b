use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inkmark_core::{persist, print_pages, DocumentSession, PixelPoint, PixelSize, SignatureAsset};
use inkmark_core::{merge as merge_documents, ViewportState};
use inkmark_engine::{default_engine, DocumentEngine, OpenSource};
use rusttype::Font;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "inkmark")]
#[command(about = "Sign, annotate, merge and print-composite PDF documents")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Stamp a signature image onto a page and save a new PDF.
    Sign {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Signature image with alpha (PNG).
        #[arg(long)]
        image: PathBuf,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Click position on the rendered page; the signature is centered here.
        #[arg(long)]
        x: i32,
        #[arg(long)]
        y: i32,
        /// Zoom the click coordinates are expressed at.
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
        /// Render quality multiplier of the session.
        #[arg(long, default_value_t = 2.0)]
        base: f32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Place a text annotation onto a page and save a new PDF.
    Text {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        text: String,
        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Top-left corner of the label on the rendered page.
        #[arg(long)]
        x: i32,
        #[arg(long)]
        y: i32,
        /// Authored font size in points, independent of zoom.
        #[arg(long, default_value_t = 14.0)]
        font_size: f32,
        #[arg(long, default_value_t = 1.0)]
        zoom: f32,
        #[arg(long, default_value_t = 2.0)]
        base: f32,
        #[arg(long)]
        output: PathBuf,
    },
    /// Concatenate documents, skipping encrypted or unreadable inputs.
    Merge {
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
        /// Copy the merged result here; otherwise a kept temp path is printed.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Composite pages (optionally with a stamped label) to PNG files.
    Print {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        out_dir: PathBuf,
        /// Device page size in pixels.
        #[arg(long, default_value_t = 2480)]
        width: u32,
        #[arg(long, default_value_t = 3508)]
        height: u32,
        /// Label text to stamp before compositing (requires --font).
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 0)]
        x: i32,
        #[arg(long, default_value_t = 0)]
        y: i32,
        /// TTF font used to rasterize text labels.
        #[arg(long)]
        font: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct SaveOutput {
    output: String,
    applied: usize,
    skipped: usize,
}

#[derive(Debug, Serialize)]
struct MergeOutput {
    output: String,
    page_count: u32,
    merged: Vec<String>,
    skipped: Vec<String>,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Sign { file, image, page, x, y, zoom, base, output } => {
            run_sign(&file, &image, page, x, y, zoom, base, &output)
        }
        Commands::Text { file, text, page, x, y, font_size, zoom, base, output } => {
            run_text(&file, &text, page, x, y, font_size, zoom, base, &output)
        }
        Commands::Merge { files, output } => run_merge(&files, output.as_deref()),
        Commands::Print { file, out_dir, width, height, text, page, x, y, font } => {
            run_print(&file, &out_dir, width, height, text.as_deref(), page, x, y, font.as_deref())
        }
    }
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let mut pages = Vec::with_capacity(page_count as usize);
    for index in 0..page_count {
        let size = engine.page_size(handle, index)?;
        pages.push(PageSizeOutput { width: size.width_pt, height: size.height_pt });
    }
    engine.close(handle)?;

    let payload = InfoOutput { path: file.display().to_string(), page_count, pages };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn session_viewport(base: f32, zoom: f32) -> ViewportState {
    ViewportState { base_multiplier: base, zoom, ..ViewportState::default() }
}

#[allow(clippy::too_many_arguments)]
fn run_sign(
    file: &Path,
    image: &Path,
    page: u32,
    x: i32,
    y: i32,
    zoom: f32,
    base: f32,
    output: &Path,
) -> Result<()> {
    ensure_pdf_exists(file)?;
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let pixels = image::open(image)
        .with_context(|| format!("failed to read signature image {}", image.display()))?
        .to_rgba8();
    let asset = SignatureAsset::new(pixels);

    let mut engine = default_engine();
    let mut session = DocumentSession::with_viewport(&mut engine, file, session_viewport(base, zoom))
        .context("failed to open PDF")?;

    session.begin_signature_placement(asset);
    session
        .place(page - 1, PixelPoint::new(x, y), None)
        .context("placement failed: page out of range")?;

    let report = persist(&mut session, &mut engine, output).context("failed to save PDF")?;
    print_save_report(output, report.applied, report.skipped.len())
}

#[allow(clippy::too_many_arguments)]
fn run_text(
    file: &Path,
    text: &str,
    page: u32,
    x: i32,
    y: i32,
    font_size: f32,
    zoom: f32,
    base: f32,
    output: &Path,
) -> Result<()> {
    ensure_pdf_exists(file)?;
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    if text.is_empty() {
        anyhow::bail!("--text must not be empty");
    }

    let mut engine = default_engine();
    let mut session = DocumentSession::with_viewport(&mut engine, file, session_viewport(base, zoom))
        .context("failed to open PDF")?;

    session.begin_text_placement();
    session
        .place_with_font_size(page - 1, PixelPoint::new(x, y), Some(text.to_owned()), font_size)
        .context("placement failed: page out of range")?;

    let report = persist(&mut session, &mut engine, output).context("failed to save PDF")?;
    print_save_report(output, report.applied, report.skipped.len())
}

fn run_merge(files: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let mut engine = default_engine();
    let outcome = merge_documents(&mut engine, files).context("merge failed")?;

    let out_path = match output {
        Some(path) => {
            fs::copy(&outcome.output, path)
                .with_context(|| format!("failed to copy merged PDF to {}", path.display()))?;
            path.to_path_buf()
        }
        None => outcome.output.keep().context("failed to keep merged temp file")?,
    };

    let payload = MergeOutput {
        output: out_path.display().to_string(),
        page_count: outcome.page_count,
        merged: outcome.merged,
        skipped: outcome.skipped,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_print(
    file: &Path,
    out_dir: &Path,
    width: u32,
    height: u32,
    text: Option<&str>,
    page: u32,
    x: i32,
    y: i32,
    font: Option<&Path>,
) -> Result<()> {
    ensure_pdf_exists(file)?;
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let font = match font {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read font {}", path.display()))?;
            Some(Font::try_from_vec(bytes).context("failed to parse TTF font")?)
        }
        None => None,
    };

    let mut engine = default_engine();
    let mut session =
        DocumentSession::open(&mut engine, file).context("failed to open PDF")?;

    if let Some(text) = text {
        session.begin_text_placement();
        session
            .place(page - 1, PixelPoint::new(x, y), Some(text.to_owned()))
            .context("placement failed: page out of range")?;
    }

    let pages = print_pages(&session, PixelSize::new(width, height), font.as_ref())
        .context("failed to composite pages")?;

    fs::create_dir_all(out_dir)?;
    for (index, image) in pages.iter().enumerate() {
        let path = out_dir.join(format!("page-{:03}.png", index + 1));
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }

    Ok(())
}

fn print_save_report(output: &Path, applied: usize, skipped: usize) -> Result<()> {
    let payload = SaveOutput { output: output.display().to_string(), applied, skipped };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }
    Ok(())
}
