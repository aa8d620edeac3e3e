//! `glint`: render a scene file with the progressive GPU path tracer.
//!
//! Usage: glint <scene.json> [--output out.png] [--frames N] [--width W] [--height H]

mod scene_file;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glint_core::SceneError;
use glint_math::Vec4;
use glint_tracer::{FrameOutcome, GpuBackend, Raytracer, WgpuBackend};

use crate::scene_file::SceneFile;

struct Args {
    scene: PathBuf,
    output: PathBuf,
    frames: u32,
    width: u32,
    height: u32,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let mut scene = None;
        let mut output = PathBuf::from("render.png");
        let mut frames = 64;
        let mut width = 640;
        let mut height = 360;

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = |flag: &str| {
                iter.next()
                    .with_context(|| format!("{} expects a value", flag))
            };
            match arg.as_str() {
                "--output" | "-o" => output = PathBuf::from(value(arg)?),
                "--frames" | "-n" => frames = value(arg)?.parse().context("Invalid --frames")?,
                "--width" => width = value(arg)?.parse().context("Invalid --width")?,
                "--height" => height = value(arg)?.parse().context("Invalid --height")?,
                flag if flag.starts_with('-') => bail!("Unknown option {}", flag),
                path => scene = Some(PathBuf::from(path)),
            }
        }

        let Some(scene) = scene else {
            bail!(
                "Usage: {} <scene.json> [--output out.png] [--frames N] [--width W] [--height H]",
                args.first().map_or("glint", String::as_str)
            );
        };
        if width == 0 || height == 0 {
            bail!("Image size must be non-zero, got {}x{}", width, height);
        }

        Ok(Self {
            scene,
            output,
            frames: frames.max(1),
            width,
            height,
        })
    }
}

fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.sqrt()
    } else {
        0.0
    }
}

/// Gamma-2 encode a linear radiance value into 8-bit RGBA.
fn color_to_rgba(color: Vec4) -> [u8; 4] {
    let channel = |c: f32| (255.0 * linear_to_gamma(c).clamp(0.0, 1.0)) as u8;
    [channel(color.x), channel(color.y), channel(color.z), 255]
}

fn save_png(path: &Path, width: u32, height: u32, pixels: &[Vec4]) -> Result<()> {
    let bytes: Vec<u8> = pixels.iter().flat_map(|p| color_to_rgba(*p)).collect();
    let image = image::RgbaImage::from_raw(width, height, bytes)
        .context("Readback size does not match the image")?;
    image
        .save(path)
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let file = SceneFile::load(&args.scene)?;
    let base_dir = args.scene.parent().unwrap_or_else(|| Path::new("."));
    let scene = file.build(base_dir)?;

    let mut camera = scene
        .active_camera()
        .cloned()
        .ok_or(SceneError::MissingCamera)?;
    camera.set_aspect(args.width as f32 / args.height as f32);

    let mut backend = pollster::block_on(WgpuBackend::new())?;
    let mut tracer = Raytracer::new(file.settings.clone());
    tracer.refresh_geometry(&mut backend, &scene)?;

    let source = backend.create_image("source", args.width, args.height)?;
    let destination = backend.create_image("destination", args.width, args.height)?;

    log::info!(
        "Rendering {} frames at {}x{} ({} rays/pixel, {} bounces)",
        args.frames,
        args.width,
        args.height,
        tracer.settings().rays_per_pixel,
        tracer.settings().bounce_limit
    );

    let mut last = FrameOutcome::SingleSample;
    for _ in 0..args.frames {
        last = tracer.render_frame(&mut backend, &camera, &source, &destination)?;
    }
    log::info!("Final frame: {:?}", last);

    let pixels = backend.read_image(&destination)?;
    save_png(&args.output, args.width, args.height, &pixels)?;
    log::info!("Wrote {:?}", args.output);

    tracer.release(&mut backend);
    backend.release_image(source);
    backend.release_image(destination);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().collect();
    run(Args::parse(&args)?)
}
