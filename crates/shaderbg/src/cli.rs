use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "shaderbg",
    author,
    version,
    about = "Render a ShaderToy-style fragment shader as an animated background"
)]
pub struct Cli {
    /// Fragment shader defining `mainImage`; overrides `background.shader`.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// Background profile to load instead of the default location.
    #[arg(long, env = "SHADERBG_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Compile a private program instead of sharing through the cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Cover the whole display with a borderless fullscreen window.
    #[arg(long)]
    pub fill_viewport: bool,

    /// Window or export size in physical pixels (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Cap the frame rate (0 = uncapped).
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Reload the shader whenever the file changes on disk.
    #[arg(long)]
    pub watch: bool,

    /// Render one frame to the given PNG path and exit.
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Shader time in seconds for `--export`.
    #[arg(long, value_name = "SECONDS", value_parser = parse_time, requires = "export")]
    pub time: Option<Duration>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WxH format, e.g. 1920x1080".to_string())?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;
    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_time(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid time '{value}'; expected seconds"))?;
    Duration::try_from_secs_f64(seconds)
        .map_err(|_| format!("time must be a non-negative number of seconds (got {value})"))
}
