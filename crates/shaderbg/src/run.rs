use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bgconfig::BackgroundConfig;
use renderer::{RenderMode, Renderer, RendererConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let renderer_config = resolve(&cli, &config)?;
    tracing::info!(
        shader = ?renderer_config.shader_path,
        size = ?renderer_config.surface_size,
        cache = renderer_config.enable_cache,
        fill_viewport = renderer_config.fill_viewport,
        "starting shaderbg"
    );
    Renderer::new(renderer_config).run()
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// An explicit `--config` must load; the default location is optional.
fn load_config(cli: &Cli) -> Result<BackgroundConfig> {
    if let Some(path) = &cli.config {
        return BackgroundConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }

    let paths = AppPaths::discover()?;
    let default_path = paths.config_file();
    if default_path.is_file() {
        tracing::debug!(path = %default_path.display(), "using default background profile");
        return BackgroundConfig::load(&default_path)
            .with_context(|| format!("failed to load config {}", default_path.display()));
    }
    tracing::debug!(dir = %paths.config_dir().display(), "no background profile found");
    Ok(BackgroundConfig::default())
}

/// Merges CLI flags over the profile and reads the shader text.
fn resolve(cli: &Cli, config: &BackgroundConfig) -> Result<RendererConfig> {
    let shader_path: PathBuf = match (&cli.shader, &config.background.shader) {
        (Some(path), _) | (None, Some(path)) => path.clone(),
        (None, None) => bail!("no shader given; pass a path or set background.shader"),
    };
    let shader_source = fs::read_to_string(&shader_path)
        .with_context(|| format!("failed to read shader {}", shader_path.display()))?;

    let mode = match &cli.export {
        Some(path) => RenderMode::Export {
            path: path.clone(),
            time: cli.time.unwrap_or_default(),
        },
        None => RenderMode::Windowed,
    };
    let watch = (cli.watch || config.reload.watch).then_some(config.reload.interval);
    if watch.is_some_and(|interval| interval.is_zero()) {
        bail!("reload.interval must be greater than zero when watching");
    }
    if watch.is_some() && matches!(mode, RenderMode::Export { .. }) {
        tracing::warn!("--watch has no effect when exporting");
    }

    Ok(RendererConfig {
        shader_source,
        shader_path: Some(shader_path),
        surface_size: cli
            .size
            .unwrap_or((config.window.width, config.window.height)),
        title: config.window.title.clone(),
        enable_cache: config.background.cache && !cli.no_cache,
        fill_viewport: cli.fill_viewport || config.background.fill_viewport,
        target_fps: cli.fps.or(config.window.fps).filter(|fps| *fps > 0.0),
        watch,
        mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_shader(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(
            &path,
            "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n",
        )
        .unwrap();
        path
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("shaderbg").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn profile_values_apply_without_flags() {
        let dir = TempDir::new().unwrap();
        let shader = write_shader(&dir, "plasma.glsl");
        let config = BackgroundConfig::from_toml_str(&format!(
            r#"
version = 1
[background]
shader = '{}'
fill_viewport = true
[window]
width = 640
height = 480
fps = 30
[reload]
watch = true
interval = "250ms"
"#,
            shader.display()
        ))
        .unwrap();

        let resolved = resolve(&cli(&[]), &config).unwrap();
        assert_eq!(resolved.shader_path.as_deref(), Some(shader.as_path()));
        assert!(resolved.shader_source.contains("mainImage"));
        assert_eq!(resolved.surface_size, (640, 480));
        assert!(resolved.enable_cache);
        assert!(resolved.fill_viewport);
        assert_eq!(resolved.target_fps, Some(30.0));
        assert_eq!(resolved.watch, Some(Duration::from_millis(250)));
        assert_eq!(resolved.mode, RenderMode::Windowed);
    }

    #[test]
    fn flags_override_profile() {
        let dir = TempDir::new().unwrap();
        let from_profile = write_shader(&dir, "profile.glsl");
        let from_cli = write_shader(&dir, "cli.glsl");
        let mut config = BackgroundConfig::default();
        config.background.shader = Some(from_profile);
        config.window.fps = Some(30.0);

        let shader_arg = from_cli.display().to_string();
        let resolved = resolve(
            &cli(&[
                shader_arg.as_str(),
                "--no-cache",
                "--size",
                "320x200",
                "--fps",
                "0",
                "--export",
                "frame.png",
                "--time",
                "2.5",
            ]),
            &config,
        )
        .unwrap();

        assert_eq!(resolved.shader_path.as_deref(), Some(from_cli.as_path()));
        assert!(!resolved.enable_cache);
        assert_eq!(resolved.surface_size, (320, 200));
        assert_eq!(resolved.target_fps, None);
        assert_eq!(
            resolved.mode,
            RenderMode::Export {
                path: PathBuf::from("frame.png"),
                time: Duration::from_millis(2500),
            }
        );
    }

    #[test]
    fn watch_flag_rejects_zero_interval() {
        let dir = TempDir::new().unwrap();
        let shader = write_shader(&dir, "plasma.glsl");
        let mut config = BackgroundConfig::default();
        config.reload.interval = Duration::ZERO;

        let shader_arg = shader.display().to_string();
        let err = resolve(&cli(&[shader_arg.as_str(), "--watch"]), &config).unwrap_err();
        assert!(err.to_string().contains("reload.interval"), "{err}");

        let resolved = resolve(&cli(&[shader_arg.as_str()]), &config).unwrap();
        assert_eq!(resolved.watch, None);
    }

    #[test]
    fn missing_shader_is_an_error() {
        let config = BackgroundConfig::default();
        assert!(resolve(&cli(&[]), &config).is_err());

        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.glsl").display().to_string();
        let err = resolve(&cli(&[missing.as_str()]), &config).unwrap_err();
        assert!(err.to_string().contains("failed to read shader"));
    }
}
