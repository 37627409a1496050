//! End-to-end tests exercising the public API the way the `gifsicle` binary does: build a
//! stream in memory, write it, read it back, and run it through the transform/merge/optimize
//! passes.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor};

use gifsicle::codec::{read_stream, write_stream, ReadFlags};
use gifsicle::merge::{merge_image, merge_stream};
use gifsicle::model::{Color, Colormap, Disposal, Image, LoopCount, Stream};
use gifsicle::optimize::{self, OptimizeFlags};
use gifsicle::transform::{self, Crop, Rotation};
use gifsicle::unoptimize::{self, UnoptimizeFlags};

fn checkerboard(width: u16, height: u16, a: u8, b: u8) -> Image {
	let mut image = Image::new(0, 0, width, height);
	let pixels = image.pixels_mut().unwrap();
	for y in 0..height as usize {
		for x in 0..width as usize {
			pixels[y * width as usize + x] = if (x + y) % 2 == 0 { a } else { b };
		}
	}
	image
}

fn small_stream() -> Stream {
	let mut stream = Stream::new();
	stream.screen_width = 4;
	stream.screen_height = 4;
	let mut colormap = Colormap::with_capacity(4);
	colormap.push(Color::new(255, 0, 0));
	colormap.push(Color::new(0, 255, 0));
	colormap.push(Color::new(0, 0, 255));
	colormap.push(Color::new(0, 0, 0));
	stream.global_colormap = Some(colormap);
	stream.add_image(checkerboard(4, 4, 0, 1));
	stream
}

#[test]
fn write_then_read_round_trips_pixels_and_colormap() {
	let original = small_stream();
	let mut bytes = Vec::new();
	write_stream(&mut bytes, &original).unwrap();

	let read_back = read_stream(Cursor::new(bytes), ReadFlags::default()).unwrap();
	assert_eq!(original.screen_width, read_back.screen_width);
	assert_eq!(original.global_colormap, read_back.global_colormap);
	assert_eq!(original.images[0].pixels(), read_back.images[0].pixels());
	assert_eq!(0, read_back.errors);
}

#[test]
fn round_trip_survives_a_second_local_colormap_frame() {
	let mut stream = small_stream();

	let mut second = checkerboard(4, 4, 2, 3);
	let mut local = Colormap::with_capacity(4);
	local.push(Color::new(9, 9, 9));
	local.push(Color::new(8, 8, 8));
	local.push(Color::new(7, 7, 7));
	second.local_colormap = Some(local);
	second.disposal = Disposal::Background;
	second.delay = 10;
	stream.add_image(second);
	stream.loop_count = Some(LoopCount::Forever);

	let mut bytes = Vec::new();
	write_stream(&mut bytes, &stream).unwrap();
	let read_back = read_stream(Cursor::new(bytes), ReadFlags::default()).unwrap();

	assert_eq!(2, read_back.len());
	assert_eq!(Some(LoopCount::Forever), read_back.loop_count);
	assert!(read_back.images[1].local_colormap.is_some());
	assert_eq!(Disposal::Background, read_back.images[1].disposal);
	assert_eq!(10, read_back.images[1].delay);
	assert_eq!(stream.images[1].pixels(), read_back.images[1].pixels());
}

#[test]
fn crop_flip_and_rotate_compose_before_writing() {
	let mut stream = small_stream();
	let image = &mut stream.images[0];

	let crop = Crop { x: 1, y: 1, w: 2, h: 2, left_offset: 1, top_offset: 1, transparent_edges: false };
	assert!(transform::crop_image(image, &crop, true));
	assert_eq!((2, 2), (image.width, image.height));

	transform::flip_image_horizontal(image, stream.screen_width);
	transform::rotate_image(image, stream.screen_width, stream.screen_height, Rotation::Clockwise90);
	assert_eq!((2, 2), (stream.images[0].width, stream.images[0].height));

	let mut bytes = Vec::new();
	write_stream(&mut bytes, &stream).unwrap();
	let read_back = read_stream(Cursor::new(bytes), ReadFlags::default()).unwrap();
	assert_eq!(stream.images[0].pixels(), read_back.images[0].pixels());
}

#[test]
fn merged_stream_optimizes_and_unoptimizes_without_losing_frames() {
	let mut dest = small_stream();
	let src = small_stream();

	merge_image(&mut dest, src.global_colormap.as_ref().unwrap(), &src.images[0]);
	merge_stream(&mut dest, &src, false);
	assert_eq!(2, dest.len());

	optimize::optimize(&mut dest, OptimizeFlags::default()).unwrap();
	assert_eq!(2, dest.len());

	unoptimize::unoptimize(&mut dest, UnoptimizeFlags::default()).unwrap();
	assert_eq!(2, dest.len());
	for image in &dest.images {
		assert!(image.fits_screen(dest.screen_width, dest.screen_height));
	}
}

#[test]
fn round_trips_through_a_real_file_on_disk() {
	let stream = small_stream();
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("roundtrip.gif");

	write_stream(&mut BufWriter::new(File::create(&path).unwrap()), &stream).unwrap();
	let read_back = read_stream(BufReader::new(File::open(&path).unwrap()), ReadFlags::default()).unwrap();

	assert_eq!(stream.screen_width, read_back.screen_width);
	assert_eq!(stream.images[0].pixels(), read_back.images[0].pixels());
}
