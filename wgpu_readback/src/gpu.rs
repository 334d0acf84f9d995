use crate::{
	device::ReadbackDevice,
	error::{CaptureError, Result},
};
use async_std::channel;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct Options {
	pub power_preference: wgpu::PowerPreference,
	pub force_fallback_adapter: bool,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			power_preference: wgpu::PowerPreference::HighPerformance,
			force_fallback_adapter: false,
		}
	}
}

#[derive(Debug)]
pub struct WgpuDevice {
	adapter: wgpu::Adapter,
	device: wgpu::Device,
	queue: wgpu::Queue,
}

impl WgpuDevice {
	pub async fn new(options: &Options) -> Result<Self> {
		let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
			backends: wgpu::Backends::all(),
			..Default::default()
		});

		let adapter = instance
			.request_adapter(&wgpu::RequestAdapterOptions {
				power_preference: options.power_preference,
				force_fallback_adapter: options.force_fallback_adapter,
				compatible_surface: None,
			})
			.await
			.ok_or(CaptureError::NoAdapter)?;

		let (device, queue) = adapter
			.request_device(
				&wgpu::DeviceDescriptor {
					label: Some("readback"),
					required_features: wgpu::Features::empty(),
					required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
				},
				None,
			)
			.await?;

		Ok(Self {
			adapter,
			device,
			queue,
		})
	}

	pub fn adapter_info(&self) -> wgpu::AdapterInfo {
		self.adapter.get_info()
	}

	/// Record a render pass that clears `texture` to `color`.
	pub fn clear(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture, color: wgpu::Color) {
		let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
		let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
			label: Some("clear"),
			color_attachments: &[Some(wgpu::RenderPassColorAttachment {
				view: &view,
				resolve_target: None,
				ops: wgpu::Operations {
					load: wgpu::LoadOp::Clear(color),
					store: wgpu::StoreOp::Store,
				},
			})],
			depth_stencil_attachment: None,
			timestamp_writes: None,
			occlusion_query_set: None,
		});
	}

	/// Run `f` inside out-of-memory and validation error scopes and turn
	/// whatever they caught into an error.
	async fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> std::result::Result<T, wgpu::Error> {
		self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
		self.device.push_error_scope(wgpu::ErrorFilter::Validation);
		let value = f(&self.device);
		let validation = self.device.pop_error_scope().await;
		let oom = self.device.pop_error_scope().await;
		match validation.or(oom) {
			Some(e) => Err(e),
			None => Ok(value),
		}
	}
}

// get_mapped_range panics on a buffer that is not mapped
fn check_mapped(buffer: &wgpu::Buffer) -> Result<()> {
	match buffer.map_state() {
		wgpu::MapState::Mapped => Ok(()),
		_ => Err(CaptureError::NotMapped),
	}
}

impl ReadbackDevice for WgpuDevice {
	type Buffer = wgpu::Buffer;
	type Texture = wgpu::Texture;
	type Encoder = wgpu::CommandEncoder;

	async fn create_buffer(&self, desc: &wgpu::BufferDescriptor<'_>) -> Result<wgpu::Buffer> {
		self.scoped(|device| device.create_buffer(desc))
			.await
			.map_err(|e| CaptureError::ResourceCreation(e.to_string()))
	}

	async fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Result<wgpu::Texture> {
		self.scoped(|device| device.create_texture(desc))
			.await
			.map_err(|e| CaptureError::ResourceCreation(e.to_string()))
	}

	fn create_encoder(&self, label: Option<&str>) -> wgpu::CommandEncoder {
		self.device
			.create_command_encoder(&wgpu::CommandEncoderDescriptor { label })
	}

	fn copy_texture_to_buffer(
		&self,
		encoder: &mut wgpu::CommandEncoder,
		texture: &wgpu::Texture,
		buffer: &wgpu::Buffer,
		layout: wgpu::ImageDataLayout,
		extent: wgpu::Extent3d,
	) -> Result<()> {
		// validated when the encoder is finished, see `submit`
		encoder.copy_texture_to_buffer(
			wgpu::ImageCopyTexture {
				texture,
				mip_level: 0,
				origin: wgpu::Origin3d::ZERO,
				aspect: wgpu::TextureAspect::All,
			},
			wgpu::ImageCopyBuffer { buffer, layout },
			extent,
		);
		Ok(())
	}

	async fn submit(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
		let queue = &self.queue;
		self.scoped(|_| {
			queue.submit(Some(encoder.finish()));
		})
		.await
		.map_err(|e| CaptureError::InvalidCopy(e.to_string()))
	}

	async fn map_read(&self, buffer: &wgpu::Buffer) -> Result<()> {
		let slice = buffer.slice(..);
		let (sender, receiver) = channel::bounded(1);
		slice.map_async(wgpu::MapMode::Read, move |result| {
			let _ = sender.try_send(result);
		});

		self.device.poll(wgpu::Maintain::Wait);

		match receiver.recv().await {
			Ok(Ok(())) => {
				debug!(size = buffer.size(), "buffer mapped");
				Ok(())
			}
			Ok(Err(e)) => Err(CaptureError::Map(e.to_string())),
			Err(_) => {
				warn!("map callback dropped without a result");
				Err(CaptureError::DeviceLost)
			}
		}
	}

	fn read_mapped<R>(&self, buffer: &wgpu::Buffer, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
		check_mapped(buffer)?;
		let view = buffer.slice(..).get_mapped_range();
		Ok(f(&view[..]))
	}

	fn write_mapped<R>(&self, buffer: &wgpu::Buffer, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
		check_mapped(buffer)?;
		let mut view = buffer.slice(..).get_mapped_range_mut();
		Ok(f(&mut view[..]))
	}

	fn unmap(&self, buffer: &wgpu::Buffer) {
		buffer.unmap();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_std::task::block_on;

	// skipped where no adapter is available
	fn device() -> Option<WgpuDevice> {
		block_on(WgpuDevice::new(&Options::default())).ok()
	}

	#[test]
	fn mapped_access_without_a_mapping_is_an_error() {
		let device = match device() {
			Some(d) => d,
			None => return,
		};
		let buffer = block_on(device.create_buffer(&wgpu::BufferDescriptor {
			label: None,
			size: 256,
			usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
			mapped_at_creation: false,
		}))
		.unwrap();

		assert!(matches!(device.read_mapped(&buffer, |b| b.len()), Err(CaptureError::NotMapped)));
		assert!(matches!(device.write_mapped(&buffer, |b| b.len()), Err(CaptureError::NotMapped)));

		block_on(device.map_read(&buffer)).unwrap();
		assert_eq!(device.read_mapped(&buffer, |b| b.len()).unwrap(), 256);
		device.unmap(&buffer);
		assert!(matches!(device.read_mapped(&buffer, |b| b.len()), Err(CaptureError::NotMapped)));
	}
}
