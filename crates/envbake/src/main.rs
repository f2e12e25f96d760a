mod config;
mod input;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use config::{Args, Command, CommonArgs};
use envpack::{
    container, ByteOrder, ContainerOptions, CpuExecutor, EnvExporter, HdrExporter, HdrWriter, PassExecutor,
    PngCodec,
};

/// One export job, built from the command line.
#[derive(Debug, Clone)]
enum Export {
    Env(EnvExporter<PngCodec>),
    Hdr(HdrExporter),
}

impl Export {
    fn extension(&self) -> &'static str {
        match self {
            Export::Env(_) => "env",
            Export::Hdr(_) => "hdr",
        }
    }

    fn to_bytes<E: PassExecutor>(&self, executor: &mut E, path: &Path, common: &CommonArgs) -> Result<Vec<u8>> {
        let texture = input::load_texture(executor, path, common.face_size)?;

        let bytes = match self {
            Export::Env(exporter) => exporter.to_bytes(executor, &texture, common.rotation)?,
            Export::Hdr(exporter) => exporter.to_bytes(executor, &texture, common.rotation)?,
        };

        Ok(bytes)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Env(env) => {
            let (compression, filter) = env.png_compression.settings();
            let options = ContainerOptions {
                generator: env.common.generator.clone(),
                byte_order: if env.big_endian { ByteOrder::Big } else { ByteOrder::Little },
            };

            let export = Export::Env(EnvExporter::new(PngCodec::new(compression, filter), options));
            run(&export, &env.common)
        }
        Command::Hdr(hdr) => {
            let writer = HdrWriter::new(hdr.common.generator.clone());
            let export = Export::Hdr(HdrExporter::new(hdr.exposure, writer));
            run(&export, &hdr.common)
        }
        Command::Inspect { file } => inspect(&file),
    }
}

fn run(export: &Export, common: &CommonArgs) -> Result<()> {
    fs::create_dir_all(&common.output_dir)
        .with_context(|| format!("failed to create {}", common.output_dir.display()))?;

    let jobs: Vec<(PathBuf, PathBuf)> = common
        .inputs
        .iter()
        .filter_map(|input| {
            let output = output_path(&common.output_dir, input, export.extension());

            if output.exists() && !common.overwrite {
                debug!("Skipping existing file: {}", output.display());
                return None;
            }

            Some((input.clone(), output))
        })
        .collect();

    info!("Baking {} of {} inputs", jobs.len(), common.inputs.len());

    let failures = if common.gpu {
        bake_on_gpu(export, common, &jobs)?
    } else {
        let failures = AtomicUsize::new(0);

        jobs.par_iter().for_each(|(input, output)| {
            let mut executor = CpuExecutor::new();

            if let Err(err) = bake(&mut executor, export, common, input, output) {
                warn!("Error processing {}: {:#}", input.display(), err);
                failures.fetch_add(1, Ordering::Relaxed);
            }
        });

        failures.into_inner()
    };

    if failures > 0 {
        bail!("{} of {} inputs failed", failures, jobs.len());
    }

    Ok(())
}

/// GPU passes share one device, so inputs run in order.
#[cfg(feature = "gpu")]
fn bake_on_gpu(export: &Export, common: &CommonArgs, jobs: &[(PathBuf, PathBuf)]) -> Result<usize> {
    let mut executor = envpack::GpuExecutor::new().context("failed to open a GPU executor")?;
    let mut failures = 0;

    for (input, output) in jobs {
        if let Err(err) = bake(&mut executor, export, common, input, output) {
            warn!("Error processing {}: {:#}", input.display(), err);
            failures += 1;
        }
    }

    Ok(failures)
}

#[cfg(not(feature = "gpu"))]
fn bake_on_gpu(_export: &Export, _common: &CommonArgs, _jobs: &[(PathBuf, PathBuf)]) -> Result<usize> {
    bail!("--gpu requires envbake to be built with the `gpu` feature")
}

fn bake<E: PassExecutor>(
    executor: &mut E,
    export: &Export,
    common: &CommonArgs,
    input: &Path,
    output: &Path,
) -> Result<()> {
    if same_file(input, output) {
        bail!("output {} would overwrite its input", output.display());
    }

    info!("Processing {} -> {}", input.display(), output.display());

    let bytes = export.to_bytes(executor, input, common)?;
    fs::write(output, &bytes).with_context(|| format!("failed to write {}", output.display()))?;

    debug!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn output_path(output_dir: &Path, input: &Path, extension: &str) -> PathBuf {
    let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
    name.push(".");
    name.push(extension);
    output_dir.join(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let info = container::read_manifest(&bytes).with_context(|| format!("failed to parse {}", path.display()))?;

    info!(
        "{}: version {}, {:?} endian, generator {:?}, {}px, {} entries, {} data bytes",
        path.display(),
        info.version,
        info.byte_order,
        info.manifest.generator,
        info.manifest.image_size,
        info.manifest.mipmaps.len(),
        info.data_len
    );

    for (i, entry) in info.manifest.mipmaps.iter().enumerate() {
        info!(
            "  level {:2} face {}: {:8} bytes @ {}",
            i / envpack::CUBE_FACE_COUNT,
            i % envpack::CUBE_FACE_COUNT,
            entry.length,
            entry.position
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_take_the_input_stem() {
        let out = output_path(Path::new("out"), Path::new("hdri/sky.v2.hdr"), "env");
        assert_eq!(out, PathBuf::from("out/sky.v2.env"));

        let out = output_path(Path::new("."), Path::new("studio.env"), "hdr");
        assert_eq!(out, PathBuf::from("./studio.hdr"));
    }

    #[test]
    fn missing_paths_are_never_the_same_file() {
        assert!(!same_file(Path::new("/nonexistent/a.hdr"), Path::new("/nonexistent/a.hdr")));
    }

    #[test]
    fn export_extensions() {
        assert_eq!(Export::Env(EnvExporter::default()).extension(), "env");
        assert_eq!(Export::Hdr(HdrExporter::default()).extension(), "hdr");
    }
}
