use std::path::PathBuf;

use catalog::{FileProjectStore, InMemoryProjectStore, ProjectStore};
use clap::{Parser, Subcommand};
use formats::ExportFormat;
use foundation::ids::LayerId;
use runtime::event_bus::Severity;
use serde_json::{Map, Value, json};
use studio::{Action, DispatchOutcome, Studio, StudioConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless map studio: layers, analysis and projects")]
struct Args {
    /// studio.toml to read settings from
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project file (overrides project_file and STUDIO_PROJECT)
    #[arg(long)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the project, camera and layer list
    Info,

    /// Add a GeoJSON file as a vector layer
    Import {
        file: PathBuf,

        /// Layer name (defaults to the file stem)
        #[arg(long)]
        name: Option<String>,
    },

    /// Run an analysis operation (buffer, union, intersect, clip, fieldCalc)
    Run {
        operation: String,

        /// Comma separated input layer ids
        #[arg(long, value_delimiter = ',', required = true)]
        layers: Vec<String>,

        #[arg(long)]
        distance: Option<f64>,

        #[arg(long)]
        units: Option<String>,

        /// Clip box: minLon,minLat,maxLon,maxLat
        #[arg(long, value_delimiter = ',', num_args = 4, allow_negative_numbers = true)]
        bbox: Option<Vec<f64>>,

        #[arg(long)]
        field: Option<String>,

        #[arg(long)]
        expression: Option<String>,
    },

    /// Write a layer as GeoJSON, CSV or KML
    Export {
        id: String,

        #[arg(long, default_value = "geojson")]
        format: String,

        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Remove a layer
    Remove { id: String },

    /// Switch the view mode (2D, 3D, canvas)
    Mode { mode: String },

    /// Dispatch a raw `<domain>:<verb>` action with a JSON payload
    Dispatch {
        action: String,

        #[arg(long, default_value = "null")]
        payload: String,
    },
}

impl Command {
    fn mutates(&self) -> bool {
        !matches!(self, Command::Info | Command::Export { .. })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = StudioConfig::resolve(args.config.as_deref())?;
    if let Some(project) = args.project {
        config.project_file = Some(project);
    }

    let store: Box<dyn ProjectStore> = match &config.project_file {
        Some(path) => Box::new(FileProjectStore::new(path)),
        None => {
            warn!("no project file configured, changes will not be kept");
            Box::new(InMemoryProjectStore::new())
        }
    };
    let mut studio = Studio::open(config, store)?;
    let _printer = studio.bus().subscribe(|n| {
        let tag = match n.severity {
            Severity::Info => "info",
            Severity::Success => "ok",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        println!("[{tag}] {}", n.message);
        for (key, value) in &n.statistics {
            println!("    {key}: {value}");
        }
    });

    let mutates = args.command.mutates();
    let outcome = match args.command {
        Command::Info => {
            print_info(&studio);
            DispatchOutcome::Applied
        }
        Command::Import { file, name } => {
            let text = std::fs::read_to_string(&file)?;
            let name = name.unwrap_or_else(|| {
                file.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Imported layer".to_string())
            });
            let id = studio.import_geojson(name, &text)?;
            println!("{id}");
            DispatchOutcome::Applied
        }
        Command::Run {
            operation,
            layers,
            distance,
            units,
            bbox,
            field,
            expression,
        } => {
            let mut payload = Map::new();
            payload.insert("layers".to_string(), json!(layers));
            if let Some(distance) = distance {
                payload.insert("distance".to_string(), json!(distance));
            }
            if let Some(units) = units {
                payload.insert("units".to_string(), json!(units));
            }
            if let Some(bbox) = bbox {
                payload.insert("bbox".to_string(), json!(bbox));
            }
            if let Some(field) = field {
                payload.insert("field".to_string(), json!(field));
            }
            if let Some(expression) = expression {
                payload.insert("expression".to_string(), json!(expression));
            }
            let action = Action::new(format!("processing:{operation}"), Value::Object(payload));
            studio.dispatch(action).await
        }
        Command::Export { id, format, out } => {
            let format = ExportFormat::parse(&format)
                .ok_or_else(|| format!("unknown export format `{format}`"))?;
            let text = studio.export_layer(&LayerId::from(id), format)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    info!(path = %path.display(), "layer exported");
                }
                None => println!("{text}"),
            }
            DispatchOutcome::Applied
        }
        Command::Remove { id } => {
            studio
                .dispatch(Action::new("layers:remove", json!({ "id": id })))
                .await
        }
        Command::Mode { mode } => {
            studio
                .dispatch(Action::new("view:switch-mode", json!({ "mode": mode })))
                .await
        }
        Command::Dispatch { action, payload } => {
            let payload: Value = serde_json::from_str(&payload)?;
            studio.dispatch(Action::new(action, payload)).await
        }
    };

    match outcome {
        DispatchOutcome::Applied => {
            if mutates {
                studio.save_project()?;
            }
            Ok(())
        }
        DispatchOutcome::Ignored => Err("action not recognized".into()),
        DispatchOutcome::Rejected(kind) => Err(format!("rejected: {kind}").into()),
    }
}

fn print_info(studio: &Studio) {
    let project = studio.project();
    let view = studio.view().view_state();
    println!("project  {} ({})", project.name, project.id);
    println!("settings {} / {}", project.settings.projection, project.settings.units);
    println!(
        "view     {} center=[{:.5}, {:.5}] zoom={:.2} rotation={:.1}",
        view.active_mode, view.center[0], view.center[1], view.zoom, view.rotation
    );
    let registry = studio.registry().read();
    // Top of the stack first.
    for layer in registry.list().into_iter().rev() {
        println!(
            "{:<12} {:<24} {:?} visible={} opacity={:.2} features={}",
            layer.id.as_str(),
            layer.name,
            layer.kind,
            layer.visible,
            layer.opacity,
            layer.feature_count()
        );
    }
}
