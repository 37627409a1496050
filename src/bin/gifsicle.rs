//! A minimal command-line front end over the `gifsicle` library: reads one or more GIF files,
//! optionally merges, transforms, and optimizes/unoptimizes them, and writes the result out.
//!
//! This is deliberately not a faithful reproduction of the reference tool's full flag set - it
//! exists so the library has a runnable end-to-end entry point, not as the thing under test.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use gifsicle::codec::{read_stream, write_stream, ReadFlags};
use gifsicle::merge::{merge_image, merge_stream};
use gifsicle::model::Stream;
use gifsicle::optimize::{self, OptimizeFlags};
use gifsicle::transform::{self, Crop, Rotation};
use gifsicle::unoptimize::{self, UnoptimizeFlags};

#[derive(Parser, Debug)]
#[command(name = "gifsicle", about = "Read, merge, transform, optimize and write GIF images.")]
struct Args {
	/// GIF files to read. More than one are merged into a single stream, in order.
	inputs: Vec<PathBuf>,

	/// Where to write the result. Defaults to stdout.
	#[arg(short, long)]
	output: Option<PathBuf>,

	/// Shrink each frame to the region that changed since the last one.
	#[arg(long)]
	optimize: bool,

	/// How aggressively to substitute transparency for redundant pixels when optimizing (1-3).
	#[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=3))]
	optimize_level: u8,

	/// Expand every frame back out to a full, self-contained screen-sized image.
	#[arg(long, conflicts_with = "optimize")]
	unoptimize: bool,

	/// Flip every frame left-to-right.
	#[arg(long)]
	flip_horizontal: bool,

	/// Flip every frame top-to-bottom.
	#[arg(long)]
	flip_vertical: bool,

	/// Rotate every frame.
	#[arg(long, value_enum)]
	rotate: Option<RotateArg>,

	/// Crop every frame to `x,y,w,h` (screen coordinates).
	#[arg(long, value_parser = parse_crop)]
	crop: Option<(i32, i32, i32, i32)>,

	/// Resize the stream's screen to this width (0 keeps the aspect ratio against --resize-height).
	#[arg(long)]
	resize_width: Option<i32>,

	/// Resize the stream's screen to this height (0 keeps the aspect ratio against --resize-width).
	#[arg(long)]
	resize_height: Option<i32>,

	/// Drop comments when merging multiple inputs.
	#[arg(long)]
	no_comments: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RotateArg {
	#[value(name = "90")]
	Clockwise90,
	#[value(name = "180")]
	Half180,
	#[value(name = "270")]
	CounterClockwise90,
}

impl From<RotateArg> for Rotation {
	fn from(value: RotateArg) -> Self {
		match value {
			RotateArg::Clockwise90 => Rotation::Clockwise90,
			RotateArg::Half180 => Rotation::Half180,
			RotateArg::CounterClockwise90 => Rotation::CounterClockwise90,
		}
	}
}

fn parse_crop(raw: &str) -> Result<(i32, i32, i32, i32), String> {
	let parts: Vec<&str> = raw.split(',').collect();
	let [x, y, w, h] = parts.as_slice() else {
		return Err("expected x,y,w,h".to_string());
	};
	let parse = |s: &str| s.parse::<i32>().map_err(|e| e.to_string());
	Ok((parse(x)?, parse(y)?, parse(w)?, parse(h)?))
}

fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();

	if args.inputs.is_empty() {
		anyhow::bail!("no input files given");
	}

	let mut stream = read_input(&args.inputs[0])?;
	for path in &args.inputs[1..] {
		let next = read_input(path)?;
		for image in &next.images {
			if let Some(colormap) = next.active_colormap(image) {
				merge_image(&mut stream, &colormap.clone(), image);
			}
		}
		merge_stream(&mut stream, &next, args.no_comments);
	}

	apply_transforms(&mut stream, &args);

	if args.optimize {
		info!("optimizing {} frame(s)", stream.len());
		let flags = OptimizeFlags { level: args.optimize_level, ..OptimizeFlags::default() };
		optimize::optimize(&mut stream, flags).context("optimizing stream")?;
	}
	if args.unoptimize {
		info!("unoptimizing {} frame(s)", stream.len());
		unoptimize::unoptimize(&mut stream, UnoptimizeFlags::default()).context("unoptimizing stream")?;
	}

	write_output(&stream, args.output.as_deref())?;
	Ok(())
}

fn read_input(path: &PathBuf) -> Result<Stream> {
	info!("reading {}", path.display());
	let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
	let mut stream = read_stream(io::BufReader::new(file), ReadFlags::default()).with_context(|| format!("reading {}", path.display()))?;
	stream.landmark = Some(path.display().to_string());
	if stream.errors > 0 {
		log::warn!("{}: recovered from {} error(s) while reading", path.display(), stream.errors);
	}
	Ok(stream)
}

fn apply_transforms(stream: &mut Stream, args: &Args) {
	let screen_width = stream.screen_width;
	let screen_height = stream.screen_height;

	if let Some((x, y, w, h)) = args.crop {
		let crop = Crop { x, y, w, h, left_offset: x, top_offset: y, transparent_edges: true };
		for (i, image) in stream.images.iter_mut().enumerate() {
			transform::crop_image(image, &crop, i == 0);
		}
	}

	for (i, image) in stream.images.iter_mut().enumerate() {
		if args.flip_horizontal {
			transform::flip_image_horizontal(image, screen_width);
		}
		if args.flip_vertical {
			transform::flip_image_vertical(image, screen_height);
		}
		if let Some(rotation) = args.rotate {
			transform::rotate_image(image, screen_width, screen_height, rotation.into());
			if i == 0 && matches!(rotation, RotateArg::Clockwise90 | RotateArg::CounterClockwise90) {
				stream.screen_width = screen_height;
				stream.screen_height = screen_width;
			}
		}
	}

	if let (Some(w), Some(h)) = (args.resize_width, args.resize_height) {
		transform::resize_stream(stream, w, h);
	}
}

fn write_output(stream: &Stream, output: Option<&std::path::Path>) -> Result<()> {
	match output {
		Some(path) => {
			info!("writing {}", path.display());
			let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
			write_stream(&mut BufWriter::new(file), stream).with_context(|| format!("writing {}", path.display()))?;
		}
		None => {
			let stdout = io::stdout();
			let mut handle = stdout.lock();
			write_stream(&mut handle, stream).context("writing to stdout")?;
			handle.flush()?;
		}
	}
	Ok(())
}
