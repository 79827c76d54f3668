use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::parser::ParseOptions;
use crate::renderer::RenderOptions;

pub const CONFIG_FILE_NAME: &str = "word-ast.toml";
pub const CONFIG_ENV: &str = "WORD_AST_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub parse: ParseSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ParseSection {
    /// Copy inheritable style markup into the captured properties (default: true).
    #[serde(default)]
    pub inherit_style_properties: Option<bool>,
    #[serde(default)]
    pub coalesce_runs: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RenderSection {
    #[serde(default)]
    pub compatibility_mode: Option<u32>,
    #[serde(default)]
    pub neutralize_heading_colors: Option<bool>,
    /// Field instruction for TOC blocks that carry none.
    #[serde(default)]
    pub default_toc_instruction: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OutputSection {
    #[serde(default)]
    pub pretty_json: Option<bool>,
}

impl AppConfig {
    pub fn parse_options(&self) -> ParseOptions {
        let d = ParseOptions::default();
        ParseOptions {
            inherit_style_properties: self
                .parse
                .inherit_style_properties
                .unwrap_or(d.inherit_style_properties),
            coalesce_runs: self.parse.coalesce_runs.unwrap_or(d.coalesce_runs),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        let d = RenderOptions::default();
        RenderOptions {
            compatibility_mode: self.render.compatibility_mode.unwrap_or(d.compatibility_mode),
            neutralize_heading_colors: self
                .render
                .neutralize_heading_colors
                .unwrap_or(d.neutralize_heading_colors),
            default_toc_instruction: self
                .render
                .default_toc_instruction
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(d.default_toc_instruction),
        }
    }

    pub fn pretty_json(&self) -> bool {
        self.output.pretty_json.unwrap_or(true)
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

/// Searches upwards from the working directory, then `workdir`, then the executable's directory.
pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// `--config`, then `$WORD_AST_CONFIG`, then the upward search. No file means defaults.
pub fn resolve_config(
    explicit: Option<&Path>,
    workdir: &Path,
) -> anyhow::Result<(AppConfig, Option<PathBuf>)> {
    let cfg_file = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| find_default_config(workdir, CONFIG_FILE_NAME));
    match cfg_file {
        Some(p) if p.exists() => Ok((load_config(&p)?, Some(p))),
        Some(p) if explicit.is_some() => {
            Err(anyhow::anyhow!("config file not found: {}", p.display()))
        }
        _ => Ok((AppConfig::default(), None)),
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"# word-ast configuration

[parse]
# Copy inheritable paragraph/run markup from the style chain into the captured properties.
inherit_style_properties = true
# Merge adjacent text runs whose formatting is identical.
coalesce_runs = true

[render]
# compatibilityMode written to settings.xml (15 = Word 2013 and later).
compatibility_mode = 15
# Strip accent colors from the built-in heading styles.
neutralize_heading_colors = true
# Used for TOC blocks without an instruction.
default_toc_instruction = 'TOC \o "1-3" \h \z \u'

[output]
pretty_json = true
"#;

/// Writes a commented default config into `dir`; an existing file is kept unless `force`.
pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
