//! Sublight command line runner
//!
//! Loads a scene, simulates a number of frames against the recording
//! renderer and reports what the lighting passes did.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sublight::LightingSettings;
use sublight::renderer::RecordingRenderer;
use sublight::scene::SceneDescription;

const DEMO_SCENE: &str = include_str!("../demos/submarine.json");
const FRAME_TIME: f32 = 1.0 / 60.0;

/// Simulate a lighting scene and report what the lighting passes did
#[derive(Debug, Parser)]
#[command(name = "sublight", version, about)]
struct Args {
    /// Scene description (JSON); the built-in demo when omitted
    scene: Option<PathBuf>,

    /// Number of frames to simulate
    #[arg(long, default_value_t = 120)]
    frames: usize,

    /// Lighting settings file overriding the scene's settings
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn run(args: Args) -> Result<(), sublight::LightingError> {
    let mut description = match &args.scene {
        Some(path) => SceneDescription::load(path)?,
        None => {
            log::info!("No scene given, using the built-in demo");
            SceneDescription::from_json(DEMO_SCENE)?
        }
    };
    if let Some(path) = &args.settings {
        description.settings = Some(LightingSettings::load_or_default(path));
    }

    let mut scene = description.build()?;
    let mut renderer = RecordingRenderer::new();
    let view = scene.view.view_info();
    let viewer = scene.view.viewer();

    let mut totals = (0usize, 0usize, 0usize);
    for frame in 0..args.frames {
        for (id, velocity) in &scene.velocities {
            scene.ctx.bodies.translate(*id, *velocity * FRAME_TIME)?;
        }

        renderer.take();
        scene.manager.update(&scene.ctx, &scene.rooms, FRAME_TIME);
        scene
            .manager
            .update_light_map(&scene.ctx, &scene.rooms, &mut renderer, &view, &mut []);
        scene
            .manager
            .update_obstruct_vision(&scene.ctx, &mut renderer, &view, viewer.as_ref());
        scene.manager.composite(&mut renderer);

        let stats = scene.manager.stats();
        totals.0 += stats.recalculated;
        totals.1 += stats.deferred;
        totals.2 += stats.failed;
        let draws = renderer.stats();
        log::debug!(
            "Frame {frame}: {} meshes, {} triangles, {} sprites, {} rects, {} shadow triangles",
            draws.meshes,
            draws.triangles,
            draws.sprites,
            draws.rects,
            draws.shadow_triangles
        );
    }

    println!("Simulated {} frames", args.frames);
    println!(
        "Volume rebuilds: {} (deferred {}, failed {})",
        totals.0, totals.1, totals.2
    );
    for (key, light) in scene.manager.lights() {
        let mesh = light.mesh();
        println!(
            "  {key:?} at {}: {} vertices, {} indices, brightness {:.2}",
            light.world_position(&scene.ctx),
            mesh.vertices().len(),
            mesh.indices().len(),
            light.current_brightness()
        );
    }

    scene.manager.clear_lights(&mut renderer);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_use_demo() {
        let args = Args::try_parse_from(["sublight"]).unwrap();
        assert!(args.scene.is_none());
        assert!(args.settings.is_none());
        assert_eq!(args.frames, 120);
    }

    #[test]
    fn test_scene_and_flags() {
        let args =
            Args::try_parse_from(["sublight", "ship.json", "--frames", "10", "--settings", "lights.json"]).unwrap();
        assert_eq!(args.scene, Some(PathBuf::from("ship.json")));
        assert_eq!(args.frames, 10);
        assert_eq!(args.settings, Some(PathBuf::from("lights.json")));
    }

    #[test]
    fn test_bad_frame_count_rejected() {
        assert!(Args::try_parse_from(["sublight", "--frames", "many"]).is_err());
        assert!(Args::try_parse_from(["sublight", "a.json", "b.json"]).is_err());
    }
}
