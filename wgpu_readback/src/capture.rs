use crate::{
	device::ReadbackDevice,
	error::{CaptureError, Result},
	readback::{repack, PackedImage},
	utils::{RowStride, BYTES_PER_PIXEL, COPY_BYTES_PER_ROW_ALIGNMENT},
};
use std::{convert::TryFrom, fmt};
use tracing::debug;

/// Format of every capture texture: 4 channels, 8 bits each, sRGB encoded.
pub const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
	pub width: u32,
	pub height: u32,
}

impl Dimensions {
	pub fn new(width: u32, height: u32) -> Result<Self> {
		if width == 0 || height == 0 {
			return Err(CaptureError::ZeroDimension { width, height });
		}
		let max_width = (u32::MAX - (COPY_BYTES_PER_ROW_ALIGNMENT - 1)) / BYTES_PER_PIXEL;
		if width > max_width {
			return Err(CaptureError::TooLarge { width, height });
		}
		let padded = RowStride::new(width).padded_size(height);
		if usize::try_from(padded).is_err() {
			return Err(CaptureError::TooLarge { width, height });
		}
		Ok(Self { width, height })
	}

	pub fn stride(&self) -> RowStride {
		RowStride::new(self.width)
	}

	pub fn extent(&self) -> wgpu::Extent3d {
		wgpu::Extent3d {
			width: self.width,
			height: self.height,
			depth_or_array_layers: 1,
		}
	}
}

impl fmt::Display for Dimensions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}x{}", self.width, self.height)
	}
}

/// A capture texture and the staging buffer sized to receive it.
pub struct CaptureResources<D: ReadbackDevice> {
	pub texture: D::Texture,
	pub staging: D::Buffer,
	dimensions: Dimensions,
}

impl<D: ReadbackDevice> CaptureResources<D> {
	pub fn dimensions(&self) -> Dimensions {
		self.dimensions
	}

	pub(crate) fn check(&self, dimensions: Dimensions) -> Result<()> {
		if dimensions != self.dimensions {
			return Err(CaptureError::DimensionMismatch {
				expected: self.dimensions,
				actual: dimensions,
			});
		}
		Ok(())
	}
}

/// Allocate a fresh texture and staging buffer for one capture.
pub async fn allocate<D: ReadbackDevice>(
	device: &D,
	dimensions: Dimensions,
) -> Result<CaptureResources<D>> {
	let stride = dimensions.stride();
	let size = stride.padded_size(dimensions.height);

	debug!(
		%dimensions,
		padded_bytes_per_row = stride.padded_bytes_per_row,
		size,
		"allocating capture resources"
	);

	let staging = device
		.create_buffer(&wgpu::BufferDescriptor {
			label: Some("capture staging"),
			size,
			usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
			mapped_at_creation: false,
		})
		.await?;

	let texture = device
		.create_texture(&wgpu::TextureDescriptor {
			label: Some("capture"),
			size: dimensions.extent(),
			mip_level_count: 1,
			sample_count: 1,
			dimension: wgpu::TextureDimension::D2,
			format: CAPTURE_FORMAT,
			usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
			view_formats: &[],
		})
		.await?;

	Ok(CaptureResources {
		texture,
		staging,
		dimensions,
	})
}

/// Record the texture to staging buffer copy. The stride is always derived
/// from `dimensions`, which must be the ones the resources were allocated
/// with.
pub fn record_copy<D: ReadbackDevice>(
	device: &D,
	encoder: &mut D::Encoder,
	resources: &CaptureResources<D>,
	dimensions: Dimensions,
) -> Result<()> {
	resources.check(dimensions)?;
	let stride = dimensions.stride();

	debug!(
		%dimensions,
		padded_bytes_per_row = stride.padded_bytes_per_row,
		"recording texture copy"
	);

	device.copy_texture_to_buffer(
		encoder,
		&resources.texture,
		&resources.staging,
		wgpu::ImageDataLayout {
			offset: 0,
			bytes_per_row: Some(stride.padded_bytes_per_row),
			rows_per_image: None,
		},
		dimensions.extent(),
	)
}

/// Copy the texture out, wait for the device and return the packed pixels.
///
/// Anything that should land in the texture (a render pass, a clear) must
/// already be submitted.
pub async fn capture_texture<D: ReadbackDevice>(
	device: &D,
	resources: &CaptureResources<D>,
) -> Result<PackedImage> {
	let dimensions = resources.dimensions();
	let mut encoder = device.create_encoder(Some("capture copy"));
	record_copy(device, &mut encoder, resources, dimensions)?;
	device.submit(encoder).await?;
	repack(device, resources, dimensions).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::host::HostDevice;
	use async_std::task::block_on;

	#[test]
	fn zero_dimensions_are_rejected() {
		assert!(matches!(
			Dimensions::new(0, 4),
			Err(CaptureError::ZeroDimension { width: 0, height: 4 })
		));
		assert!(matches!(Dimensions::new(4, 0), Err(CaptureError::ZeroDimension { .. })));
	}

	#[test]
	fn oversized_width_is_rejected() {
		assert!(matches!(Dimensions::new(u32::MAX, 1), Err(CaptureError::TooLarge { .. })));
	}

	#[test]
	fn allocate_sizes_staging_by_padded_stride() {
		let device = HostDevice::new();
		let dimensions = Dimensions::new(65, 3).unwrap();
		let resources = block_on(allocate(&device, dimensions)).unwrap();

		assert_eq!(device.buffer_size(&resources.staging), 512 * 3);
		assert_eq!(device.buffer_usage(&resources.staging), wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ);
		assert_eq!(device.texture_size(&resources.texture), dimensions.extent());
		assert_eq!(device.texture_format(&resources.texture), CAPTURE_FORMAT);
		assert_eq!(resources.dimensions(), dimensions);
	}

	#[test]
	fn allocate_never_reuses_resources() {
		let device = HostDevice::new();
		let dimensions = Dimensions::new(8, 8).unwrap();
		let a = block_on(allocate(&device, dimensions)).unwrap();
		let b = block_on(allocate(&device, dimensions)).unwrap();
		assert!(!a.staging.same_as(&b.staging));
	}

	#[test]
	fn allocate_propagates_device_loss() {
		let device = HostDevice::new();
		device.lose();
		let dimensions = Dimensions::new(8, 8).unwrap();
		assert!(matches!(
			block_on(allocate(&device, dimensions)),
			Err(CaptureError::DeviceLost)
		));
	}

	#[test]
	fn record_copy_rejects_mismatched_dimensions() {
		let device = HostDevice::new();
		let resources = block_on(allocate(&device, Dimensions::new(64, 2).unwrap())).unwrap();
		let mut encoder = device.create_encoder(None);

		let err = record_copy(&device, &mut encoder, &resources, Dimensions::new(65, 2).unwrap()).unwrap_err();
		assert!(matches!(err, CaptureError::DimensionMismatch { .. }));
		assert_eq!(encoder.len(), 0);
	}

	#[test]
	fn record_copy_uses_padded_stride() {
		let device = HostDevice::new();
		let dimensions = Dimensions::new(65, 2).unwrap();
		let resources = block_on(allocate(&device, dimensions)).unwrap();
		let mut encoder = device.create_encoder(None);

		record_copy(&device, &mut encoder, &resources, dimensions).unwrap();
		assert_eq!(encoder.len(), 1);
		assert_eq!(encoder.bytes_per_row(0), Some(512));
	}
}
