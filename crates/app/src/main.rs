use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use audio_visualizer_core::{
    preview, AppConfig, Component, Confirm, ImageLayer, PresetKey, PresetStore, PresetValues,
    PreviewEvent, SolidLayer, Transfer, VisualizerError, ALL_COMPONENTS,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> audio_visualizer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path)?;

    match cli.command {
        Commands::Presets { command } => {
            let mut confirm = Prompt { assume_yes: cli.yes };
            run_presets(command, &mut config, &config_path, &mut confirm)
        }
        Commands::Preview(args) => run_preview(args, &config),
    }
}

fn run_presets(
    command: PresetCommand,
    config: &mut AppConfig,
    config_path: &Path,
    confirm: &mut Prompt,
) -> audio_visualizer_core::Result<()> {
    let mut store = PresetStore::open(&config.presets.preset_dir)?;

    match command {
        PresetCommand::List { component, search } => {
            let filter = component.as_deref().unwrap_or(ALL_COMPONENTS);
            for key in store.list(filter, search.as_deref().unwrap_or_default()) {
                println!("{key} (v{})", key.version);
            }
        }
        PresetCommand::Save { preset, set } => {
            let values = parse_values(&set)?;
            let key = store.save(&preset.component, preset.version, &preset.name, &values, confirm)?;
            println!("saved {}", store.path_of(&key).display());
        }
        PresetCommand::Rename { preset, new_name } => {
            let renamed = store.rename(&preset.key(), &new_name, &[], confirm)?;
            println!("renamed to {}", renamed.key);
        }
        PresetCommand::Delete { preset } => {
            store.delete(&preset.key(), &[], confirm)?;
            println!("deleted {}", preset.key());
        }
        PresetCommand::Import { file } => {
            let outcome = store.import(&file, confirm);
            report(&outcome)?;
            config.presets.remember_transfer(&file);
            config.save(config_path)?;
        }
        PresetCommand::Export { preset, destination } => {
            let outcome = store.export(&preset.key(), &destination);
            report(&outcome)?;
            config.presets.remember_transfer(&destination);
            config.save(config_path)?;
        }
    }
    Ok(())
}

fn run_preview(args: PreviewArgs, config: &AppConfig) -> audio_visualizer_core::Result<()> {
    let mut preview_config = config.preview.clone();
    if let Some(width) = args.width {
        preview_config.output_width = width;
    }
    if let Some(height) = args.height {
        preview_config.output_height = height;
    }

    let mut components: Vec<Arc<dyn Component>> = args
        .layers
        .iter()
        .map(|path| Arc::new(ImageLayer::new(path)) as Arc<dyn Component>)
        .collect();
    if let Some(color) = args.color.as_deref() {
        components.push(Arc::new(SolidLayer::new(parse_color(color)?)));
    }
    tracing::info!(layers = components.len(), output = ?args.output, "rendering preview");

    let (queue, worker, events) = preview::channel(&preview_config)?;
    let handle = worker.spawn(Duration::from_millis(preview_config.poll_interval_ms))?;
    queue.submit(components)?;

    let event = events
        .recv_timeout(Duration::from_secs(30))
        .map_err(|_| VisualizerError::msg("timed out waiting for the preview frame"))?;
    drop(queue);
    handle
        .join()
        .map_err(|_| VisualizerError::msg("preview worker panicked"))?;

    match event {
        PreviewEvent::Frame(frame) => {
            frame.save(&args.output)?;
            println!("wrote {}", args.output.display());
            Ok(())
        }
        PreviewEvent::Failed(message) => Err(VisualizerError::msg(message)),
    }
}

fn report(outcome: &Transfer) -> audio_visualizer_core::Result<()> {
    match outcome {
        Transfer::Completed(key) => {
            println!("done: {key}");
            Ok(())
        }
        Transfer::Declined => {
            println!("kept existing preset");
            Ok(())
        }
        Transfer::Failed(message) => Err(VisualizerError::msg(message.clone())),
    }
}

/// Parses `key=value` pairs; values are read as JSON when possible.
fn parse_values(pairs: &[String]) -> audio_visualizer_core::Result<PresetValues> {
    let mut values = PresetValues::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| VisualizerError::msg(format!("expected key=value, got `{pair}`")))?;
        let value = serde_json::from_str(raw)
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        values.insert(key.to_string(), value);
    }
    Ok(values)
}

fn parse_color(text: &str) -> audio_visualizer_core::Result<[u8; 4]> {
    let channels: Vec<u8> = text
        .split(',')
        .map(|part| part.trim().parse::<u8>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|err| VisualizerError::msg(format!("invalid color `{text}`: {err}")))?;

    match channels.as_slice() {
        [r, g, b] => Ok([*r, *g, *b, 255]),
        [r, g, b, a] => Ok([*r, *g, *b, *a]),
        _ => Err(VisualizerError::msg(format!(
            "invalid color `{text}`: expected r,g,b or r,g,b,a"
        ))),
    }
}

/// Asks on the terminal unless `--yes` was given.
struct Prompt {
    assume_yes: bool,
}

impl Confirm for Prompt {
    fn confirm(&mut self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        print!("{prompt} [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio visualizer preview and preset tool", long_about = None)]
struct Cli {
    /// Settings file to use instead of the per-user default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Answer yes to every overwrite or delete prompt.
    #[arg(short, long, global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage saved component presets.
    Presets {
        #[command(subcommand)]
        command: PresetCommand,
    },
    /// Composite layers into a single preview frame.
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
struct PresetRef {
    component: String,
    version: u32,
    name: String,
}

impl PresetRef {
    fn key(&self) -> PresetKey {
        PresetKey::new(self.component.clone(), self.version, self.name.clone())
    }
}

#[derive(Subcommand, Debug)]
enum PresetCommand {
    /// List presets, optionally filtered by component and name.
    List {
        #[arg(short, long)]
        component: Option<String>,
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Write a preset from key=value parameters.
    Save {
        #[command(flatten)]
        preset: PresetRef,
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },
    Rename {
        #[command(flatten)]
        preset: PresetRef,
        new_name: String,
    },
    Delete {
        #[command(flatten)]
        preset: PresetRef,
    },
    /// Install a preset file into the preset directory.
    Import { file: PathBuf },
    /// Copy a preset out of the preset directory.
    Export {
        #[command(flatten)]
        preset: PresetRef,
        destination: PathBuf,
    },
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Image layers, topmost first.
    #[arg(short, long = "layer")]
    layers: Vec<PathBuf>,
    /// Solid colour drawn beneath every layer, as r,g,b[,a].
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Where to write the composited PNG.
    #[arg(short, long)]
    output: PathBuf,
}
