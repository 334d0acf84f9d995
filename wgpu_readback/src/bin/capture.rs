use anyhow::{bail, Result};
use async_std::task::block_on;
use clap::{value_t, App, Arg};
use std::io;
use tracing::info;
use wgpu_readback::{
	allocate, capture_texture,
	gpu::{Options, WgpuDevice},
	sink::{ColorMode, PngEncoder, TerminalSink},
	Dimensions, ReadbackDevice,
};

fn parse_color(s: &str) -> Result<[u8; 4]> {
	let parts = s
		.split(',')
		.map(|c| c.trim().parse::<u8>())
		.collect::<Result<Vec<_>, _>>()?;
	match parts.as_slice() {
		[r, g, b] => Ok([*r, *g, *b, 255]),
		[r, g, b, a] => Ok([*r, *g, *b, *a]),
		_ => bail!("color should be r,g,b or r,g,b,a, got '{}'", s),
	}
}

// the capture texture is sRGB, clear colors are linear
fn srgb_to_linear(c: u8) -> f64 {
	let c = f64::from(c) / 255.0;
	if c <= 0.04045 {
		c / 12.92
	} else {
		((c + 0.055) / 1.055).powf(2.4)
	}
}

fn main() -> Result<()> {
	let matches = App::new("Capture")
		.version("0.1")
		.about("Clears a texture on the GPU, reads it back and prints or saves it")
		.arg(
			Arg::with_name("width")
				.long("width")
				.default_value("64")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("height")
				.long("height")
				.default_value("32")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("color")
				.short("c")
				.long("color")
				.default_value("255,0,0,255")
				.help("clear color as r,g,b[,a]")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("output")
				.short("o")
				.long("output")
				.help("write a png here instead of printing to the terminal")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("no-color")
				.long("no-color")
				.help("print plain ascii"),
		)
		.arg(
			Arg::with_name("keep-alpha")
				.long("keep-alpha")
				.help("keep the alpha channel in the png"),
		)
		.arg(
			Arg::with_name("grayscale")
				.long("grayscale")
				.help("write a grayscale png"),
		)
		.arg(
			Arg::with_name("power")
				.short("p")
				.long("power")
				.possible_values(&["high", "low"])
				.default_value("high")
				.takes_value(true),
		)
		.arg(
			Arg::with_name("fallback")
				.long("fallback")
				.help("use the software adapter"),
		)
		.get_matches();

	wgpu_subscriber::initialize_default_subscriber(None);

	block_on(async {
		let width = value_t!(matches, "width", u32)?;
		let height = value_t!(matches, "height", u32)?;
		let [r, g, b, a] = parse_color(matches.value_of("color").unwrap_or_default())?;

		let options = Options {
			power_preference: match matches.value_of("power") {
				Some("low") => wgpu::PowerPreference::LowPower,
				_ => wgpu::PowerPreference::HighPerformance,
			},
			force_fallback_adapter: matches.is_present("fallback"),
		};
		let device = WgpuDevice::new(&options).await?;
		let adapter = device.adapter_info();
		info!(adapter = %adapter.name, backend = ?adapter.backend, "device ready");

		let dimensions = Dimensions::new(width, height)?;
		let resources = allocate(&device, dimensions).await?;

		let mut encoder = device.create_encoder(Some("clear"));
		device.clear(
			&mut encoder,
			&resources.texture,
			wgpu::Color {
				r: srgb_to_linear(r),
				g: srgb_to_linear(g),
				b: srgb_to_linear(b),
				a: f64::from(a) / 255.0,
			},
		);
		device.submit(encoder).await?;

		let image = capture_texture(&device, &resources).await?;

		match matches.value_of("output") {
			Some(path) => {
				let encoder = PngEncoder {
					strip_alpha: !matches.is_present("keep-alpha"),
					color_mode: if matches.is_present("grayscale") {
						ColorMode::Grayscale
					} else {
						ColorMode::Color
					},
				};
				encoder.save(&image, path)?;
				info!(%dimensions, path, "capture written");
			}
			None => {
				let sink = TerminalSink {
					color: !matches.is_present("no-color"),
				};
				sink.write(&image, io::stdout().lock())?;
			}
		}

		Ok::<(), anyhow::Error>(())
	})
}
