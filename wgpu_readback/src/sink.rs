use crate::{error::Result, readback::PackedImage};
use image::{DynamicImage, ImageFormat};
use std::{
	fmt,
	io::{Seek, Write},
	path::Path,
};

const RAMP: &[u8] = b" .:-=+*#%@";

/// Prints a packed image to a terminal, two pixel rows per text line.
#[derive(Debug, Clone, Copy)]
pub struct TerminalSink {
	pub color: bool,
}

impl TerminalSink {
	pub fn render<'a>(&self, image: &'a PackedImage) -> Rendered<'a> {
		Rendered {
			image,
			color: self.color,
		}
	}

	pub fn write<W: Write>(&self, image: &PackedImage, mut out: W) -> std::io::Result<()> {
		write!(out, "{}", self.render(image))?;
		out.flush()
	}
}

pub struct Rendered<'a> {
	image: &'a PackedImage,
	color: bool,
}

// straight alpha over black
fn blend(px: [u8; 4]) -> [u8; 3] {
	let a = u16::from(px[3]);
	let c = |v: u8| ((u16::from(v) * a + 127) / 255) as u8;
	[c(px[0]), c(px[1]), c(px[2])]
}

fn luma(rgb: [u8; 3]) -> u32 {
	(u32::from(rgb[0]) * 299 + u32::from(rgb[1]) * 587 + u32::from(rgb[2]) * 114) / 1000
}

impl fmt::Display for Rendered<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let image = self.image;
		for y in (0..image.height()).step_by(2) {
			for x in 0..image.width() {
				let top = image.pixel(x, y).map(blend).unwrap_or([0; 3]);
				let bottom = image.pixel(x, y + 1).map(blend);
				if self.color {
					write!(f, "\x1b[38;2;{};{};{}m", top[0], top[1], top[2])?;
					match bottom {
						Some(b) => write!(f, "\x1b[48;2;{};{};{}m", b[0], b[1], b[2])?,
						None => write!(f, "\x1b[49m")?,
					}
					write!(f, "\u{2580}")?;
				} else {
					let l = match bottom {
						Some(b) => (luma(top) + luma(b)) / 2,
						None => luma(top),
					};
					let i = l as usize * (RAMP.len() - 1) / 255;
					write!(f, "{}", RAMP[i] as char)?;
				}
			}
			if self.color {
				write!(f, "\x1b[0m")?;
			}
			writeln!(f)?;
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
	Color,
	Grayscale,
}

/// Encodes packed RGBA to PNG.
#[derive(Debug, Clone, Copy)]
pub struct PngEncoder {
	pub strip_alpha: bool,
	pub color_mode: ColorMode,
}

impl Default for PngEncoder {
	fn default() -> Self {
		Self {
			strip_alpha: true,
			color_mode: ColorMode::Color,
		}
	}
}

impl PngEncoder {
	fn convert(&self, image: &PackedImage) -> Result<DynamicImage> {
		let rgba = DynamicImage::ImageRgba8(image.to_rgba_image()?);
		Ok(match (self.color_mode, self.strip_alpha) {
			(ColorMode::Color, false) => rgba,
			(ColorMode::Color, true) => DynamicImage::ImageRgb8(rgba.to_rgb8()),
			(ColorMode::Grayscale, false) => DynamicImage::ImageLumaA8(rgba.to_luma_alpha8()),
			(ColorMode::Grayscale, true) => DynamicImage::ImageLuma8(rgba.to_luma8()),
		})
	}

	pub fn save<P: AsRef<Path>>(&self, image: &PackedImage, path: P) -> Result<()> {
		self.convert(image)?.save_with_format(path, ImageFormat::Png)?;
		Ok(())
	}

	pub fn write_to<W: Write + Seek>(&self, image: &PackedImage, out: &mut W) -> Result<()> {
		self.convert(image)?.write_to(out, ImageFormat::Png)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::capture::Dimensions;
	use std::io::Cursor;

	fn red_green() -> PackedImage {
		PackedImage::new(Dimensions::new(2, 1).unwrap(), vec![255, 0, 0, 255, 0, 255, 0, 255]).unwrap()
	}

	#[test]
	fn color_output_has_a_line_per_two_rows() {
		let image = PackedImage::new(Dimensions::new(3, 5).unwrap(), vec![255; 3 * 5 * 4]).unwrap();
		let text = TerminalSink { color: true }.render(&image).to_string();
		assert_eq!(text.lines().count(), 3);
		assert_eq!(text.matches('\u{2580}').count(), 9);
		assert!(text.contains("\x1b[38;2;255;255;255m"));
	}

	#[test]
	fn color_output_uses_pixel_colors() {
		let text = TerminalSink { color: true }.render(&red_green()).to_string();
		assert!(text.starts_with("\x1b[38;2;255;0;0m\x1b[49m\u{2580}\x1b[38;2;0;255;0m"));
		assert!(text.ends_with("\x1b[0m\n"));
	}

	#[test]
	fn plain_output_is_ascii() {
		let data = [[0u8, 0, 0, 255], [255, 255, 255, 255]].concat();
		let image = PackedImage::new(Dimensions::new(2, 1).unwrap(), data).unwrap();
		let text = TerminalSink { color: false }.render(&image).to_string();
		assert_eq!(text, " @\n");
	}

	#[test]
	fn transparent_pixels_render_black() {
		assert_eq!(blend([255, 255, 255, 0]), [0, 0, 0]);
		assert_eq!(blend([200, 100, 50, 255]), [200, 100, 50]);
	}

	#[test]
	fn png_strips_alpha() {
		let mut out = Cursor::new(Vec::new());
		PngEncoder::default().write_to(&red_green(), &mut out).unwrap();

		let decoded = image::load_from_memory(out.get_ref()).unwrap();
		assert_eq!(decoded.color(), image::ColorType::Rgb8);
		assert_eq!(decoded.to_rgb8().into_raw(), vec![255, 0, 0, 0, 255, 0]);
	}

	#[test]
	fn png_keeps_alpha_when_asked() {
		let mut out = Cursor::new(Vec::new());
		let encoder = PngEncoder {
			strip_alpha: false,
			color_mode: ColorMode::Color,
		};
		encoder.write_to(&red_green(), &mut out).unwrap();

		let decoded = image::load_from_memory(out.get_ref()).unwrap();
		assert_eq!(decoded.color(), image::ColorType::Rgba8);
		assert_eq!(decoded.to_rgba8().into_raw(), red_green().into_bytes());
	}

	#[test]
	fn png_grayscale() {
		let mut out = Cursor::new(Vec::new());
		let encoder = PngEncoder {
			strip_alpha: true,
			color_mode: ColorMode::Grayscale,
		};
		encoder.write_to(&red_green(), &mut out).unwrap();

		let decoded = image::load_from_memory(out.get_ref()).unwrap();
		assert_eq!(decoded.color(), image::ColorType::L8);
		assert_eq!(decoded.width(), 2);
	}
}
