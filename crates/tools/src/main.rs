use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use formats::{FeatureCollection, Model, ModelMeshes, model_to_meshes};
use layers::assets::HttpAssetStore;
use layers::buildings::tooltip_text;
use layers::colormap::ColormapConfig;
use layers::compose::{ComposeRequest, LayerComposer};
use layers::config::{ViewerConfig, parse_timezone};
use layers::hbjson::GlbCache;
use layers::lighting::{DAY_ANIMATION_STEPS, LightingEffect, TimeOfDay, day_animation_frames};
use layers::stats::BuildingStats;
use layers::symbology::LayerVisibility;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "csd", version, about = "CSD viewer data tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an HBJSON model to GLB
    Convert {
        input: PathBuf,
        /// Output file (default: input with a .glb extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the composed layer stack as JSON
    Layers {
        #[arg(long, default_value = "public/sample-data.geojson")]
        buildings: PathBuf,
        #[arg(long, default_value = "public/trees.geojson")]
        trees: PathBuf,
        /// Building attribute to colour by
        #[arg(long, default_value = "")]
        color_by: String,
        /// Sun time, epoch milliseconds
        #[arg(long)]
        time: Option<i64>,
        /// Comma separated layer ids to hide
        #[arg(long, default_value = "")]
        hidden: String,
        /// Save server base URL; enables the HBJSON model layer
        #[arg(long)]
        server: Option<String>,
    },

    /// Building statistics as JSON
    Stats {
        #[arg(default_value = "public/sample-data.geojson")]
        buildings: PathBuf,
        /// Print the hover text of every building instead
        #[arg(long)]
        tooltips: bool,
    },

    /// Time of day, sun position and lighting
    Sun {
        /// Epoch milliseconds
        #[arg(long)]
        time: Option<i64>,
        /// IANA time zone
        #[arg(long)]
        timezone: Option<String>,
        /// Print the frames of a one-day animation
        #[arg(long)]
        animate: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Convert { input, output } => {
            let output = output.unwrap_or_else(|| default_output_path(&input));
            let meshes = convert_file(&input, &output)?;
            for (kind, mesh) in &meshes.groups {
                println!(
                    "{:<8} {:>8} triangles {:>8} vertices",
                    kind.name(),
                    mesh.triangle_count(),
                    mesh.vertex_count()
                );
            }
            println!(
                "faces: {} converted, {} skipped -> {}",
                meshes.faces_processed,
                meshes.faces_skipped,
                output.display()
            );
        }
        Command::Layers {
            buildings,
            trees,
            color_by,
            time,
            hidden,
            server,
        } => {
            let config = ViewerConfig::from_env();
            let buildings = read_collection(&buildings)?;
            let trees = read_collection(&trees)?;
            let mut composer = LayerComposer::from_config(&config, ColormapConfig::default());
            if let Some(base) = server {
                let save_endpoint = format!("{}/api/save-glb", base.trim_end_matches('/'));
                let store = HttpAssetStore::new(reqwest::Client::new(), base, save_endpoint);
                let cache = Arc::new(GlbCache::new(Arc::new(store)));
                composer = composer.with_hbjson(cache, config.hbjson.clone());
            }

            let stack = composer
                .compose(ComposeRequest {
                    buildings: &buildings,
                    trees: &trees,
                    color_by: &color_by,
                    timestamp_ms: time.unwrap_or(config.default_sun_time),
                })
                .await?
                .with_visibility(&LayerVisibility::from_hidden_list(&hidden));
            println!("{}", serde_json::to_string_pretty(&stack)?);
        }
        Command::Stats {
            buildings,
            tooltips,
        } => {
            let data = read_collection(&buildings)?;
            if tooltips {
                for feature in &data.features {
                    println!("{}\n", tooltip_text(feature));
                }
            } else {
                let stats = BuildingStats::from_collection(&data);
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
        }
        Command::Sun {
            time,
            timezone,
            animate,
        } => {
            let config = ViewerConfig::from_env();
            let tz = match timezone {
                Some(name) => parse_timezone(&name)?,
                None => config.timezone,
            };
            let time = time.unwrap_or(config.default_sun_time);
            let timestamps = if animate {
                day_animation_frames(time, tz, DAY_ANIMATION_STEPS)?
            } else {
                vec![time]
            };
            for ts in timestamps {
                let time_of_day = TimeOfDay::at(ts, tz)?;
                let lighting = LightingEffect::at(ts, time_of_day, config.sun_location());
                let local = layers::lighting::local_time(ts, tz)?;
                let sun = lighting.sun_light.position;
                println!(
                    "{}",
                    json!({
                        "timestamp": ts,
                        "local": local.to_rfc3339(),
                        "timeOfDay": time_of_day,
                        "azimuthDeg": sun.azimuth_rad.to_degrees(),
                        "altitudeDeg": sun.altitude_rad.to_degrees(),
                        "sunColor": lighting.sun_light.color,
                        "sunIntensity": lighting.sun_light.intensity,
                    })
                );
            }
        }
    }

    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    input.with_extension("glb")
}

fn read_collection(path: &Path) -> Result<FeatureCollection, Box<dyn Error>> {
    let bytes = fs::read(path).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(FeatureCollection::from_geojson_slice(&bytes)?)
}

fn convert_file(input: &Path, output: &Path) -> Result<ModelMeshes, Box<dyn Error>> {
    let bytes = fs::read(input).map_err(|e| format!("{}: {e}", input.display()))?;
    let model = Model::from_json_slice(&bytes)?;
    info!(faces = model.face_count(), units = ?model.units, "converting {}", input.display());
    let meshes = model_to_meshes(&model);
    let glb = meshes.to_glb()?;
    fs::write(output, &glb)?;
    info!(bytes = glb.len(), "wrote {}", output.display());
    Ok(meshes)
}
