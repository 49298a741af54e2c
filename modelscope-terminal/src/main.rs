/// ModelScope Terminal - view, inspect and export OBJ/STL models
///
/// Controls in the interactive viewer:
///   - WASD / Arrow Keys: Orbit the camera
///   - +/-: Zoom
///   - [ / ]: Spin the model, < / >: Scale it
///   - G / X: Toggle grid and axes
///   - P: Next bundled preset model
///   - E: Export STL
///   - Q/ESC: Quit
use anyhow::{Context, Result};
use clap::Parser;
use modelscope_core::transform::normal_matrix;
use modelscope_core::{export_stl, Importer, ViewerConfig};
use modelscope_terminal::{load_material_libraries, preset, preset_names, summary, TerminalApp};
use std::fs;
use std::path::{Path, PathBuf};

/// Render a 3D model in the terminal.
#[derive(Parser)]
#[command(name = "modelscope-terminal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model file (.obj or .stl)
    model: Option<PathBuf>,

    /// Open a bundled model instead of a file
    #[arg(long, short, conflicts_with = "model")]
    preset: Option<String>,

    /// List the bundled models and exit
    #[arg(long)]
    list_presets: bool,

    /// Print model statistics and exit
    #[arg(long)]
    info: bool,

    /// Write the normalized, transformed model as binary STL and exit
    #[arg(long, short)]
    export: Option<PathBuf>,

    /// Viewer configuration (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// Increase log verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    let Some(path) = path else {
        return Ok(ViewerConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid configuration in {}", path.display()))
}

/// Where the model comes from: a file on disk or a bundled preset.
enum Source {
    File(PathBuf),
    Preset(String),
}

impl Source {
    fn name(&self) -> String {
        match self {
            Source::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Source::Preset(name) => name.clone(),
        }
    }

    fn read(&self) -> Result<Vec<u8>> {
        match self {
            Source::File(path) => fs::read(path).with_context(|| format!("could not read {}", path.display())),
            Source::Preset(name) => Ok(preset(name)?.to_vec()),
        }
    }
}

/// Import synchronously and either print statistics or export.
fn run_headless(cli: &Cli, source: &Source, config: &ViewerConfig) -> Result<()> {
    let file_name = source.name();
    let mut importer = Importer::new();
    importer.submit(file_name.clone(), source.read()?);
    let outcome = importer.wait().context("import produced no result")?;
    let imported = outcome
        .result
        .with_context(|| format!("could not import {}", file_name))?;

    if cli.info {
        println!("{}", summary(&imported));
        println!("  scale factor: {}", imported.source_scale);
        for submesh in &imported.submeshes {
            let material = if submesh.material_name.is_empty() { "(none)" } else { submesh.material_name.as_str() };
            println!(
                "  submesh {:>6} vertices {:>6} triangles  material {}",
                submesh.vertex_count(),
                submesh.triangle_count(),
                material
            );
        }
        let dir = match source {
            Source::File(path) => path.parent().unwrap_or_else(|| Path::new("")),
            Source::Preset(_) => Path::new(""),
        };
        let library = load_material_libraries(dir, &imported.material_libraries);
        for material in library.iter() {
            println!(
                "  material {} diffuse map {}",
                material.name,
                material.diffuse_map.as_deref().unwrap_or("-")
            );
        }
    }

    if let Some(path) = &cli.export {
        let model_matrix = config.scene.transform.model_matrix();
        let normals = normal_matrix(&model_matrix, config.inverse_epsilon);
        let bytes = export_stl(&imported.submeshes, &model_matrix, &normals);
        fs::write(path, &bytes).with_context(|| format!("could not write {}", path.display()))?;
        println!("Wrote {} ({} bytes)", path.display(), bytes.len());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = load_config(cli.config.as_deref())?;
    if cli.dump_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    if cli.list_presets {
        for name in preset_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let source = match (&cli.model, &cli.preset) {
        (Some(path), _) => Source::File(path.clone()),
        (None, Some(name)) => Source::Preset(name.clone()),
        (None, None) => anyhow::bail!("no model file given (see --help)"),
    };

    if cli.info || cli.export.is_some() {
        return run_headless(&cli, &source, &config);
    }

    let export_path = PathBuf::from(&config.export_file_name);
    let mut app = TerminalApp::new(config, export_path)?;
    match &source {
        Source::File(path) => app.open(path)?,
        Source::Preset(name) => app.open_preset(name)?,
    }
    app.run()?;

    println!("{}", app.status());
    Ok(())
}
