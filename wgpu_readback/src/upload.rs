use crate::{device::ReadbackDevice, error::Result, readback::Mapping, utils::padded_upload_size};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
	pub label: Option<&'a str>,
	pub usage: wgpu::BufferUsages,
	pub contents: &'a [u8],
}

/// Create a buffer holding `contents`, padded to a 4-byte boundary.
///
/// The buffer is mapped at creation, filled and unmapped again before it is
/// handed back. See `utils::padded_upload_size` for the size rule.
pub async fn create_padded_buffer<D: ReadbackDevice>(device: &D, request: &UploadRequest<'_>) -> Result<D::Buffer> {
	let unpadded_size = request.contents.len() as u64;
	let padded_size = padded_upload_size(unpadded_size);

	debug!(label = ?request.label, unpadded_size, padded_size, "creating padded buffer");

	let buffer = device
		.create_buffer(&wgpu::BufferDescriptor {
			label: request.label,
			size: padded_size,
			usage: request.usage,
			mapped_at_creation: true,
		})
		.await?;

	{
		let mapping = Mapping::adopt(device, &buffer);
		mapping.with_bytes_mut(|dst| dst[..request.contents.len()].copy_from_slice(request.contents))?;
	}

	Ok(buffer)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::host::HostDevice;
	use async_std::task::block_on;

	#[test]
	fn aligned_contents_still_get_a_padding_word() {
		let device = HostDevice::new();
		let contents = [1u8, 2, 3, 4, 5, 6, 7, 8];
		let buffer = block_on(create_padded_buffer(
			&device,
			&UploadRequest {
				label: Some("aligned"),
				usage: wgpu::BufferUsages::COPY_SRC,
				contents: &contents,
			},
		))
		.unwrap();

		assert_eq!(device.buffer_size(&buffer), 12);
		assert_eq!(&device.buffer_contents(&buffer)[..8], &contents);
	}

	#[test]
	fn unaligned_contents_round_up() {
		let device = HostDevice::new();
		let buffer = block_on(create_padded_buffer(
			&device,
			&UploadRequest {
				label: None,
				usage: wgpu::BufferUsages::COPY_SRC,
				contents: b"hello",
			},
		))
		.unwrap();

		assert_eq!(device.buffer_size(&buffer), 8);
		assert_eq!(device.buffer_contents(&buffer), b"hello\0\0\0".to_vec());
	}

	#[test]
	fn buffer_is_unmapped_when_returned() {
		let device = HostDevice::new();
		let buffer = block_on(create_padded_buffer(
			&device,
			&UploadRequest {
				label: None,
				usage: wgpu::BufferUsages::COPY_SRC,
				contents: &[9; 3],
			},
		))
		.unwrap();

		assert!(!device.is_mapped(&buffer));
		assert_eq!(device.map_count(), device.unmap_count());
	}

	#[test]
	fn empty_contents_allocate_one_word() {
		let device = HostDevice::new();
		let buffer = block_on(create_padded_buffer(
			&device,
			&UploadRequest {
				label: None,
				usage: wgpu::BufferUsages::VERTEX,
				contents: &[],
			},
		))
		.unwrap();

		assert_eq!(device.buffer_size(&buffer), 4);
		assert_eq!(device.buffer_usage(&buffer), wgpu::BufferUsages::VERTEX);
	}
}
