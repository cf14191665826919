use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;

use office_templater::config::{Format, RenderOptions};
use office_templater::permission::{Action, Principal};
use office_templater::value::{value_from_json, Record, Value};

#[derive(Parser)]
#[command(
    name = "office-templater",
    version,
    about = "Render PPTX/XLSX templates with {{ tag }} placeholders"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render one or more templates against a JSON context.
    Render {
        /// Template file(s) (.pptx or .xlsx). Given more than one, each is
        /// rendered on its own thread via a rayon pool and `--output` must
        /// name a directory.
        #[arg(required = true)]
        templates: Vec<PathBuf>,

        /// JSON file providing the render context.
        #[arg(long)]
        context: PathBuf,

        /// Output file (single template) or directory (multiple templates).
        /// Defaults to the template path with `.rendered` inserted before
        /// its extension.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Principal name. Only records whose `owner` attribute matches are
        /// included in the output; omit to disable permission checks.
        #[arg(long)]
        principal: Option<String>,

        /// Abort on the first missing-data occurrence instead of
        /// accumulating it and continuing the render.
        #[arg(long)]
        fail_on_missing: bool,

        /// Restrict PPTX rendering to a 1-indexed slide range, e.g. "2-5".
        #[arg(long)]
        slides: Option<String>,

        /// Restrict XLSX rendering to the named sheets.
        #[arg(long)]
        sheet: Vec<String>,
    },

    /// Statically scan a template and print the context keys it requires.
    Extract {
        /// Template file (.pptx).
        template: PathBuf,

        /// Restrict extraction to a 1-indexed slide range, e.g. "2-5".
        #[arg(long)]
        slides: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        Command::Render {
            templates,
            context,
            output,
            principal,
            fail_on_missing,
            slides,
            sheet,
        } => {
            let slide_range = slides
                .as_deref()
                .map(office_templater::config::SlideRange::parse)
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let opts = RenderOptions {
                sheet_names: if sheet.is_empty() { None } else { Some(sheet) },
                slide_range,
                fail_on_missing,
                check_permissions: principal.is_some(),
            };
            run_render(&templates, &context, output.as_deref(), principal.as_deref(), &opts)
        }
        Command::Extract { template, slides } => {
            let slide_range = slides
                .as_deref()
                .map(office_templater::config::SlideRange::parse)
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let opts = RenderOptions {
                slide_range,
                ..RenderOptions::default()
            };
            run_extract(&template, &opts)
        }
    }
}

fn run_render(
    templates: &[PathBuf],
    context_path: &Path,
    output: Option<&Path>,
    principal_name: Option<&str>,
    opts: &RenderOptions,
) -> Result<()> {
    let context_text = std::fs::read_to_string(context_path)
        .with_context(|| format!("reading context file {context_path:?}"))?;
    let context_json: serde_json::Value = serde_json::from_str(&context_text)
        .with_context(|| format!("parsing context JSON {context_path:?}"))?;
    let context = value_from_json(&context_json);

    if templates.len() > 1 {
        let output_dir = output.ok_or_else(|| {
            anyhow::anyhow!("--output must name a directory when rendering multiple templates")
        })?;
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("creating output directory {output_dir:?}"))?;

        let outcomes: Vec<Result<()>> = templates
            .par_iter()
            .map(|template| {
                let name = template
                    .file_name()
                    .ok_or_else(|| anyhow::anyhow!("{template:?} has no file name"))?;
                render_one(template, &context, principal_name, opts, &output_dir.join(name))
            })
            .collect();
        for outcome in outcomes {
            outcome?;
        }
        return Ok(());
    }

    let template = &templates[0];
    let out_path = match output {
        Some(p) => p.to_path_buf(),
        None => default_output_path(template),
    };
    render_one(template, &context, principal_name, opts, &out_path)
}

fn render_one(
    template_path: &Path,
    context: &Value,
    principal_name: Option<&str>,
    opts: &RenderOptions,
    out_path: &Path,
) -> Result<()> {
    let bytes = std::fs::read(template_path)
        .with_context(|| format!("reading template {template_path:?}"))?;
    let format = detect_format(template_path)?;
    let named_principal = principal_name.map(NamedPrincipal::new);
    let principal: Option<&dyn Principal> = named_principal
        .as_ref()
        .map(|p| p as &dyn Principal);
    let now = chrono::Utc::now().naive_utc();

    let (rendered, errors) =
        office_templater::render(&bytes, format, context, principal, now, opts)
            .with_context(|| format!("rendering {template_path:?}"))?;

    for error in errors.iter().flatten() {
        eprintln!("Warning: {error}");
    }

    let Some(rendered) = rendered else {
        anyhow::bail!("{template_path:?} produced no output: unresolved tags remain");
    };
    std::fs::write(out_path, rendered)
        .with_context(|| format!("writing output to {out_path:?}"))?;
    println!("Rendered: {template_path:?} -> {out_path:?}");
    Ok(())
}

fn run_extract(template_path: &Path, opts: &RenderOptions) -> Result<()> {
    let bytes = std::fs::read(template_path)
        .with_context(|| format!("reading template {template_path:?}"))?;
    let fields = office_templater::extract_context_keys(&bytes, opts)
        .with_context(|| format!("extracting context keys from {template_path:?}"))?;
    let json = serde_json::json!({
        "simple_fields": fields.simple_fields,
        "object_fields": fields.object_fields,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn detect_format(path: &Path) -> Result<Format> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow::anyhow!("{path:?} has no file extension"))?;
    Format::from_extension(ext).ok_or_else(|| anyhow::anyhow!("unsupported template extension: {ext}"))
}

fn default_output_path(template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = template.extension().and_then(|e| e.to_str()).unwrap_or("");
    template.with_file_name(format!("{stem}.rendered.{ext}"))
}

/// Grants view access only to records whose `owner` attribute matches the
/// named principal — a minimal reference implementation for local testing,
/// not a stand-in for a real ACL system.
struct NamedPrincipal(String);

impl NamedPrincipal {
    fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl Principal for NamedPrincipal {
    fn has_perm(&self, _action: Action, record: &dyn Record) -> bool {
        matches!(record.attr("owner"), Some(Value::Str(owner)) if owner == self.0)
    }
}
