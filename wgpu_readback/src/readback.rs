use crate::{
	capture::{CaptureResources, Dimensions},
	device::ReadbackDevice,
	error::{CaptureError, Result},
	utils::{texel_offset, RowStride, BYTES_PER_PIXEL},
};
use image::error::{ImageError, ParameterError, ParameterErrorKind};
use std::convert::TryFrom;
use tracing::{trace, warn};

/// Host access to a mapped buffer. Unmaps on drop, on every exit path.
pub struct Mapping<'a, D: ReadbackDevice> {
	device: &'a D,
	buffer: &'a D::Buffer,
}

impl<'a, D: ReadbackDevice> Mapping<'a, D> {
	/// Map `buffer` for reading, waiting for pending device work on it.
	/// No guard exists, and nothing needs releasing, if this fails.
	pub async fn read(device: &'a D, buffer: &'a D::Buffer) -> Result<Mapping<'a, D>> {
		trace!("mapping buffer for read");
		device.map_read(buffer).await?;
		Ok(Self { device, buffer })
	}

	/// Take ownership of a buffer created with `mapped_at_creation`.
	pub(crate) fn adopt(device: &'a D, buffer: &'a D::Buffer) -> Mapping<'a, D> {
		Self { device, buffer }
	}

	pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
		self.device.read_mapped(self.buffer, f)
	}

	pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
		self.device.write_mapped(self.buffer, f)
	}
}

impl<D: ReadbackDevice> Drop for Mapping<'_, D> {
	fn drop(&mut self) {
		trace!("unmapping buffer");
		self.device.unmap(self.buffer);
	}
}

/// Tightly packed RGBA rows, no gaps between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedImage {
	width: u32,
	height: u32,
	data: Vec<u8>,
}

impl PackedImage {
	pub fn new(dimensions: Dimensions, data: Vec<u8>) -> Result<Self> {
		let expected = dimensions.stride().unpadded_size(dimensions.height);
		let actual = data.len() as u64;
		if actual != expected {
			return Err(CaptureError::BadPixelData { expected, actual });
		}
		Ok(Self {
			width: dimensions.width,
			height: dimensions.height,
			data,
		})
	}

	pub fn width(&self) -> u32 {
		self.width
	}

	pub fn height(&self) -> u32 {
		self.height
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.data
	}

	pub fn rows(&self) -> std::slice::ChunksExact<'_, u8> {
		self.data.chunks_exact((self.width * BYTES_PER_PIXEL) as usize)
	}

	pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
		if x >= self.width || y >= self.height {
			return None;
		}
		let i = texel_offset(self.width, x, y);
		let mut px = [0u8; 4];
		px.copy_from_slice(&self.data[i..i + 4]);
		Some(px)
	}

	pub fn to_rgba_image(&self) -> Result<image::RgbaImage> {
		image::RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
			ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::DimensionMismatch)).into()
		})
	}
}

/// Strip the row padding from `padded`, which must hold exactly `height`
/// rows of `stride.padded_bytes_per_row` bytes.
pub fn unpad(padded: &[u8], stride: &RowStride, height: u32) -> Result<Vec<u8>> {
	let expected = stride.padded_size(height);
	let actual = padded.len() as u64;
	if actual != expected {
		return Err(CaptureError::StagingSizeMismatch { expected, actual });
	}

	let unpadded_bytes_per_row = stride.unpadded_bytes_per_row as usize;
	let mut data = vec![0u8; usize::try_from(stride.unpadded_size(height)).map_err(|_| CaptureError::TooLarge {
		width: stride.width,
		height,
	})?];
	for (dst, src) in data
		.chunks_exact_mut(unpadded_bytes_per_row)
		.zip(padded.chunks_exact(stride.padded_bytes_per_row as usize))
	{
		dst.copy_from_slice(&src[..unpadded_bytes_per_row]);
	}
	Ok(data)
}

/// Map the capture's staging buffer, strip the row padding and unmap again.
///
/// `dimensions` must be the ones `resources` were allocated with. The copy
/// into the staging buffer must already be submitted; the mapping only
/// resolves once it has finished.
pub async fn repack<D: ReadbackDevice>(
	device: &D,
	resources: &CaptureResources<D>,
	dimensions: Dimensions,
) -> Result<PackedImage> {
	resources.check(dimensions)?;
	repack_staging(device, &resources.staging, dimensions).await
}

pub(crate) async fn repack_staging<D: ReadbackDevice>(
	device: &D,
	staging: &D::Buffer,
	dimensions: Dimensions,
) -> Result<PackedImage> {
	let stride = dimensions.stride();

	let mapping = Mapping::read(device, staging).await.map_err(|e| {
		warn!(%dimensions, error = %e, "staging buffer mapping failed");
		e
	})?;
	let data = mapping.with_bytes(|padded| unpad(padded, &stride, dimensions.height))??;
	drop(mapping);

	PackedImage::new(dimensions, data)
}
