use anyhow::{Context, Result, bail};
use axum::Router;
use axum::extract::Path as AxumPath;
use axum::extract::State as AxumState;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::{Arc, Mutex};
use strata_core::{Component, ComponentSpec, OptionsOverride};
use strata_web::{Theme, escape_html, minify_js, render_component, render_page, runtime_js};
use tracing_subscriber::EnvFilter;

/// Per-directory overrides, read from next to the component specs.
pub const CONFIG_FILE: &str = "strata.config.json";
const PAGE_CACHE_LIMIT: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "strata")]
#[command(about = "Compile declarative component specs into interactive HTML", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile one component spec into markup, payload and glue.
    Compile {
        spec: PathBuf,
        /// Minify generated JavaScript regardless of the spec's options.
        #[arg(long)]
        minify: bool,
        /// Emit a full HTML document instead of an embeddable fragment.
        #[arg(long)]
        page: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print the detected pattern and optimizations as JSON.
    Detect { spec: PathBuf },
    /// Minify a JavaScript file.
    Minify {
        file: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Write the browser runtime.
    Runtime {
        #[arg(long)]
        minify: bool,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Preview every spec in a directory over HTTP.
    Serve {
        dir: PathBuf,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Compile {
            spec,
            minify,
            page,
            out,
        } => {
            let html = compile_file(&spec, CompileOptions { minify, page })?;
            write_output(out.as_deref(), &html)
        }
        Command::Detect { spec } => {
            let (component, _) = load_component(&spec, false)?;
            let report = serde_json::json!({
                "id": component.id(),
                "detected": component.detected(),
            });
            write_output(None, &format!("{}\n", serde_json::to_string_pretty(&report)?))
        }
        Command::Minify { file, out } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let minified =
                minify_js(&source).with_context(|| format!("failed to minify {}", file.display()))?;
            write_output(out.as_deref(), &minified)
        }
        Command::Runtime { minify, out } => write_output(out.as_deref(), &runtime_js(minify)),
        Command::Serve { dir, port } => run_server(dir, port).await,
    }
}

fn write_output(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = text.len(), "wrote output");
        }
        None => print!("{text}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Loading and compiling
// ---------------------------------------------------------------------------

/// Contents of [`CONFIG_FILE`]: option overrides plus a theme layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(flatten)]
    pub options: OptionsOverride,
    #[serde(default)]
    pub theme: Option<Value>,
}

impl ProjectConfig {
    /// Reads the config next to `spec`; absent means no overrides.
    pub fn for_spec(spec: &Path) -> Result<Self> {
        let path = spec
            .parent()
            .map(|dir| dir.join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub minify: bool,
    pub page: bool,
}

/// Builds a component from spec JSON with the project layer applied.
pub fn component_from_str(
    json: &str,
    project: &ProjectConfig,
    force_minify: bool,
) -> Result<(Component, Theme)> {
    let mut spec = ComponentSpec::from_json(json).context("invalid component spec")?;
    project.options.apply(&mut spec.options);
    if force_minify {
        spec.options.minify_js = true;
    }
    let theme = Theme::default()
        .with_overrides(project.theme.as_ref())
        .with_overrides(spec.theme.as_ref());
    let component = Component::from_spec(spec).context("invalid component")?;
    tracing::debug!(
        component = component.id(),
        pattern = %component.detected().primary_pattern,
        "component loaded"
    );
    Ok((component, theme))
}

pub fn load_component(spec: &Path, force_minify: bool) -> Result<(Component, Theme)> {
    let json = fs::read_to_string(spec)
        .with_context(|| format!("failed to read {}", spec.display()))?;
    let project = ProjectConfig::for_spec(spec)?;
    component_from_str(&json, &project, force_minify)
        .with_context(|| format!("failed to load {}", spec.display()))
}

pub fn compile_str(json: &str, project: &ProjectConfig, options: CompileOptions) -> Result<String> {
    let (component, theme) = component_from_str(json, project, options.minify)?;
    let output = render_component(&component, &theme)
        .with_context(|| format!("failed to render component '{}'", component.id()))?;
    Ok(if options.page {
        render_page(component.id(), &theme, std::slice::from_ref(&output))?
    } else {
        output.to_html()
    })
}

pub fn compile_file(spec: &Path, options: CompileOptions) -> Result<String> {
    let json = fs::read_to_string(spec)
        .with_context(|| format!("failed to read {}", spec.display()))?;
    let project = ProjectConfig::for_spec(spec)?;
    compile_str(&json, &project, options).with_context(|| format!("failed to compile {}", spec.display()))
}

// ---------------------------------------------------------------------------
// Preview server
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LruCache {
    limit: usize,
    map: HashMap<u64, String>,
    order: VecDeque<u64>,
}

impl LruCache {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: u64) -> Option<String> {
        let value = self.map.get(&key).cloned();
        if value.is_some() {
            self.touch(key);
        }
        value
    }

    fn insert(&mut self, key: u64, value: String) {
        if self.map.insert(key, value).is_some() {
            self.touch(key);
            return;
        }
        self.order.push_back(key);
        while self.map.len() > self.limit {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.map.remove(&oldest);
        }
    }

    fn touch(&mut self, key: u64) {
        if let Some(pos) = self.order.iter().position(|k| *k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key);
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

fn content_hash(parts: &[&[u8]]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

/// Renders spec files under one root, caching pages by content.
#[derive(Debug)]
pub struct Preview {
    root: PathBuf,
    cache: Mutex<LruCache>,
}

impl Preview {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cache: Mutex::new(LruCache::new(PAGE_CACHE_LIMIT)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Spec files directly under the root, sorted by name.
    pub fn specs(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("failed to list {}", self.root.display()))?;
        let mut specs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_spec_file(p))
            .collect();
        specs.sort();
        Ok(specs)
    }

    /// Maps `orders` or `orders.html` to `orders.json` when it exists.
    pub fn spec_for(&self, rel: &Path) -> Option<PathBuf> {
        let rel = rel.to_str()?;
        let stem = rel.strip_suffix(".html").unwrap_or(rel);
        if stem.is_empty() {
            return None;
        }
        let candidate = self.root.join(format!("{stem}.json"));
        is_spec_file(&candidate).then_some(candidate)
    }

    pub fn page(&self, spec: &Path) -> Result<String> {
        let spec_bytes = fs::read(spec).with_context(|| format!("failed to read {}", spec.display()))?;
        let config_path = spec
            .parent()
            .unwrap_or(self.root.as_path())
            .join(CONFIG_FILE);
        let config_bytes = fs::read(&config_path).unwrap_or_default();
        let key = content_hash(&[&spec_bytes, &config_bytes]);

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(key) {
                tracing::debug!(spec = %spec.display(), "page cache hit");
                return Ok(hit);
            }
        }

        let json = String::from_utf8(spec_bytes)
            .with_context(|| format!("{} is not UTF-8", spec.display()))?;
        let project = if config_bytes.is_empty() {
            ProjectConfig::default()
        } else {
            let text = String::from_utf8_lossy(&config_bytes);
            ProjectConfig::from_json(&text)
                .with_context(|| format!("invalid {}", config_path.display()))?
        };
        let html = compile_str(&json, &project, CompileOptions { minify: false, page: true })
            .with_context(|| format!("failed to compile {}", spec.display()))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, html.clone());
        }
        Ok(html)
    }

    pub fn index(&self) -> Result<String> {
        let links: String = self
            .specs()?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
            .map(|stem| {
                let stem = escape_html(stem);
                format!("<li><a href=\"/{stem}\">{stem}</a></li>")
            })
            .collect();
        Ok(format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Strata preview</title></head>\n<body>\n<h1>{}</h1>\n<ul>{}</ul>\n</body>\n</html>\n",
            escape_html(&self.root.display().to_string()),
            links
        ))
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

fn is_spec_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().and_then(|e| e.to_str()) == Some("json")
        && path.file_name().and_then(|n| n.to_str()) != Some(CONFIG_FILE)
}

pub fn router(preview: Arc<Preview>) -> Router {
    Router::new()
        .route("/", get(route_index))
        .route("/{*path}", get(route_any))
        .with_state(preview)
}

async fn run_server(dir: PathBuf, port: u16) -> Result<()> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", dir.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    let preview = Arc::new(Preview::new(root.clone()));
    let app = router(preview);

    let host = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&host)
        .await
        .with_context(|| format!("failed to bind {host}"))?;
    tracing::info!(root = %root.display(), url = %format!("http://localhost:{port}"), "preview server listening");
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}

async fn route_index(AxumState(preview): AxumState<Arc<Preview>>) -> Response {
    match preview.index() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(&err),
    }
}

async fn route_any(
    AxumPath(path): AxumPath<String>,
    AxumState(preview): AxumState<Arc<Preview>>,
) -> Response {
    let Some(rel) = sanitize_rel_path(&path) else {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    };
    if let Some(spec) = preview.spec_for(&rel) {
        return match preview.page(&spec) {
            Ok(html) => Html(html).into_response(),
            Err(err) => server_error(&err),
        };
    }
    let file = preview.root().join(&rel);
    if file.is_file() {
        return serve_static(&file).await;
    }
    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn server_error(err: &anyhow::Error) -> Response {
    tracing::warn!(error = %format!("{err:#}"), "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response()
}

pub fn sanitize_rel_path(path: &str) -> Option<PathBuf> {
    let rel = PathBuf::from(path.trim_start_matches('/'));
    let escapes = rel.components().any(|c| {
        matches!(
            c,
            PathComponent::ParentDir | PathComponent::RootDir | PathComponent::Prefix(_)
        )
    });
    (!escapes).then_some(rel)
}

async fn serve_static(path: &Path) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to read {}: {e}", path.display()),
            )
                .into_response();
        }
    };
    let content_type = match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
    {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        _ => "application/octet-stream",
    };
    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}
