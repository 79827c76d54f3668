use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};

use word_ast::config::{init_default_config, resolve_config, AppConfig, CONFIG_FILE_NAME};
use word_ast::progress::ConsoleProgress;
use word_ast::{merge, parse_docx, render_docx, to_view, Ast, View};

#[derive(Parser, Debug)]
#[command(name = "word-ast")]
#[command(about = "DOCX <-> JSON AST converter with format-preserving merge", long_about = None)]
struct Args {
    /// Write a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .docx
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// Directory for `<stem>.full_ast.json` and `<stem>.ai_view.json` (default: next to the input)
    #[arg(long, value_name = "DIR")]
    export_dir: Option<PathBuf>,

    /// Write only the full AST to this path
    #[arg(long, value_name = "JSON")]
    ast_json: Option<PathBuf>,

    /// Render this view (or AST) JSON into `-o`
    #[arg(long, value_name = "JSON")]
    view: Option<PathBuf>,

    /// Full AST the view was projected from; the view is merged into it before rendering
    #[arg(long, value_name = "JSON", requires = "view")]
    full_ast: Option<PathBuf>,

    /// Output .docx
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Parse the input and render it straight back into `-o`
    #[arg(long)]
    roundtrip_only: bool,

    /// Config file path (default: search for word-ast.toml upwards, or $WORD_AST_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// No progress lines on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn write_json(path: &Path, json: &str) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

fn read_json(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn input_stem(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string()
}

fn run_render(
    view_path: &Path,
    full_ast: Option<&Path>,
    output: &Path,
    cfg: &AppConfig,
    progress: &ConsoleProgress,
) -> anyhow::Result<()> {
    let view = View::from_json(&read_json(view_path)?)
        .with_context(|| format!("load view {}", view_path.display()))?;
    let ast = match full_ast {
        Some(path) => {
            let original = Ast::from_json(&read_json(path)?)
                .with_context(|| format!("load full AST {}", path.display()))?;
            progress.step(format!("merge {} into {}", view_path.display(), path.display()));
            merge(&original, &view)
        }
        None => {
            progress.step(format!("render new document from {}", view_path.display()));
            view.into_ast()
        }
    };
    render_docx(&ast, output, &cfg.render_options())
        .with_context(|| format!("render {}", output.display()))?;
    progress.step(format!("wrote {}", output.display()));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let workdir = args
        .input
        .as_deref()
        .or(args.view.as_deref())
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let (cfg, cfg_path) = resolve_config(args.config.as_deref(), &workdir)?;
    if let Some(p) = &cfg_path {
        tracing::debug!(config = %p.display(), "loaded config");
    }

    if let Some(view_path) = args.view.as_deref() {
        let output = args
            .output
            .clone()
            .context("missing -o/--output for --view")?;
        let progress = ConsoleProgress::new(!args.quiet, 2);
        return run_render(view_path, args.full_ast.as_deref(), &output, &cfg, &progress);
    }

    let input = match args.input {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  word-ast <input.docx>                         export full AST + agent view\n  word-ast --view edited.json --full-ast doc.full_ast.json -o out.docx\n  word-ast --view new.json -o out.docx\n\nConfig search: {CONFIG_FILE_NAME} (upwards), or set WORD_AST_CONFIG.\n"
            );
            return Ok(());
        }
    };

    if args.roundtrip_only {
        let output = args
            .output
            .clone()
            .context("missing -o/--output for --roundtrip-only")?;
        let progress = ConsoleProgress::new(!args.quiet, 2);
        let ast = parse_docx(&input, &cfg.parse_options())
            .with_context(|| format!("parse {}", input.display()))?;
        progress.step(format!("parsed {} blocks", ast.document.body.len()));
        render_docx(&ast, &output, &cfg.render_options())
            .with_context(|| format!("render {}", output.display()))?;
        progress.step(format!("wrote {}", output.display()));
        return Ok(());
    }

    let pretty = cfg.pretty_json();
    if let Some(ast_path) = args.ast_json.as_deref() {
        let progress = ConsoleProgress::new(!args.quiet, 2);
        let ast = parse_docx(&input, &cfg.parse_options())
            .with_context(|| format!("parse {}", input.display()))?;
        progress.step(format!("parsed {} blocks", ast.document.body.len()));
        write_json(ast_path, &ast.to_json(pretty)?)?;
        progress.step(format!("wrote {}", ast_path.display()));
        return Ok(());
    }

    let progress = ConsoleProgress::new(!args.quiet, 3);
    let export_dir = args
        .export_dir
        .clone()
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = input_stem(&input);
    let ast = parse_docx(&input, &cfg.parse_options())
        .with_context(|| format!("parse {}", input.display()))?;
    progress.step(format!("parsed {} blocks", ast.document.body.len()));

    let full_path = export_dir.join(format!("{stem}.full_ast.json"));
    write_json(&full_path, &ast.to_json(pretty)?)?;
    progress.step(format!("wrote {}", full_path.display()));

    let view_path = export_dir.join(format!("{stem}.ai_view.json"));
    write_json(&view_path, &to_view(&ast).to_json(pretty)?)?;
    progress.step(format!("wrote {}", view_path.display()));
    Ok(())
}
