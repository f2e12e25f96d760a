use clap::{Parser, Subcommand, ValueEnum};
use image::codecs::png::{CompressionType, FilterType};
use std::path::PathBuf;

/// `envbake` - bakes environment maps into `.env` cube containers and
/// Radiance `.hdr` panoramas.
///
/// Inputs may be Radiance `.hdr`, OpenEXR, PNG/JPEG panoramas, or existing
/// `.env` containers. Flat inputs are resampled into a cube first.
#[derive(Parser, Debug, Clone)]
#[command(name = "envbake", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write an RGBD `.env` container per input.
    Env(EnvArgs),

    /// Write a Radiance `.hdr` panorama per input.
    Hdr(HdrArgs),

    /// Print the header and manifest of an `.env` container.
    Inspect {
        /// Container to inspect.
        file: PathBuf,
    },
}

/// Options shared by the export commands.
#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    /// Input files.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory the outputs are written to.
    #[arg(long, env = "ENVBAKE_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Yaw applied to the environment, degrees in [0, 360].
    #[arg(long, default_value_t = 0.0, value_parser = parse_rotation)]
    pub rotation: f32,

    /// Cube face size for flat inputs (power of two). Defaults to the
    /// largest power of two not above a quarter of the panorama width.
    #[arg(long, value_parser = parse_face_size)]
    pub face_size: Option<u32>,

    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Software name recorded in the output.
    #[arg(long, env = "ENVBAKE_GENERATOR", default_value = "envbake")]
    pub generator: String,

    /// Run passes on the GPU (needs the `gpu` feature).
    #[arg(long, default_value_t = false)]
    pub gpu: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct EnvArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Write big-endian header words, as browser tools do.
    #[arg(long, default_value_t = false)]
    pub big_endian: bool,

    #[arg(long, value_enum, default_value_t = PngCompression::Default)]
    pub png_compression: PngCompression,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HdrArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Multiplier applied before RGBE packing.
    #[arg(long, default_value_t = 1.0, value_parser = parse_exposure)]
    pub exposure: f32,
}

/// PNG effort for `.env` faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

impl PngCompression {
    pub fn settings(self) -> (CompressionType, FilterType) {
        match self {
            PngCompression::Fast => (CompressionType::Fast, FilterType::NoFilter),
            PngCompression::Default => (CompressionType::Default, FilterType::Adaptive),
            PngCompression::Best => (CompressionType::Best, FilterType::Adaptive),
        }
    }
}

fn parse_rotation(s: &str) -> Result<f32, String> {
    let deg: f32 = s.parse().map_err(|_| format!("`{}` is not a number", s))?;

    if (0.0..=360.0).contains(&deg) {
        Ok(deg)
    } else {
        Err(format!("rotation {} is outside 0..=360", deg))
    }
}

fn parse_face_size(s: &str) -> Result<u32, String> {
    let size: u32 = s.parse().map_err(|_| format!("`{}` is not an integer", s))?;

    if size.is_power_of_two() {
        Ok(size)
    } else {
        Err(format!("face size {} is not a power of two", size))
    }
}

fn parse_exposure(s: &str) -> Result<f32, String> {
    let exposure: f32 = s.parse().map_err(|_| format!("`{}` is not a number", s))?;

    if exposure.is_finite() && exposure > 0.0 {
        Ok(exposure)
    } else {
        Err(format!("exposure must be positive, got {}", exposure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_command_defaults() {
        let args = Args::try_parse_from(["envbake", "env", "sky.hdr", "studio.exr"]).unwrap();

        let Command::Env(env) = args.command else {
            panic!("expected env command");
        };
        assert_eq!(env.common.inputs.len(), 2);
        assert_eq!(env.common.rotation, 0.0);
        assert_eq!(env.common.face_size, None);
        assert!(!env.big_endian);
        assert_eq!(env.png_compression, PngCompression::Default);
    }

    #[test]
    fn hdr_command_parses_options() {
        let args = Args::try_parse_from([
            "envbake",
            "hdr",
            "--rotation",
            "90",
            "--exposure",
            "0.5",
            "--face-size",
            "256",
            "--output-dir",
            "out",
            "sky.env",
        ])
        .unwrap();

        let Command::Hdr(hdr) = args.command else {
            panic!("expected hdr command");
        };
        assert_eq!(hdr.common.rotation, 90.0);
        assert_eq!(hdr.exposure, 0.5);
        assert_eq!(hdr.common.face_size, Some(256));
        assert_eq!(hdr.common.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Args::try_parse_from(["envbake", "env", "--rotation", "400", "a.hdr"]).is_err());
        assert!(Args::try_parse_from(["envbake", "env", "--face-size", "300", "a.hdr"]).is_err());
        assert!(Args::try_parse_from(["envbake", "hdr", "--exposure", "0", "a.hdr"]).is_err());
        assert!(Args::try_parse_from(["envbake", "env"]).is_err());
    }

    #[test]
    fn compression_levels_map_to_png_settings() {
        assert!(matches!(PngCompression::Fast.settings(), (CompressionType::Fast, FilterType::NoFilter)));
        assert!(matches!(PngCompression::Best.settings().0, CompressionType::Best));
    }
}
