//! A device that lives entirely in host memory.
//!
//! Copies run on the CPU when an encoder is submitted, so a map request
//! always finds the submitted work retired. The device counts map and unmap
//! calls and can be put into a lost state to exercise failure paths.

use crate::{
	device::ReadbackDevice,
	error::{CaptureError, Result},
	utils::{texel_offset, BYTES_PER_PIXEL, COPY_BYTES_PER_ROW_ALIGNMENT},
};
use std::sync::{
	atomic::{AtomicBool, AtomicUsize, Ordering},
	Arc, Mutex, MutexGuard, PoisonError,
};
use tracing::debug;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
	m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct BufferState {
	data: Vec<u8>,
	usage: wgpu::BufferUsages,
	mapped: bool,
	destroyed: bool,
}

#[derive(Debug, Clone)]
pub struct HostBuffer {
	state: Arc<Mutex<BufferState>>,
}

impl HostBuffer {
	pub fn same_as(&self, other: &HostBuffer) -> bool {
		Arc::ptr_eq(&self.state, &other.state)
	}
}

#[derive(Debug)]
struct TextureState {
	size: wgpu::Extent3d,
	format: wgpu::TextureFormat,
	usage: wgpu::TextureUsages,
	data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HostTexture {
	state: Arc<Mutex<TextureState>>,
}

#[derive(Debug)]
enum Command {
	CopyTextureToBuffer {
		texture: HostTexture,
		buffer: HostBuffer,
		layout: wgpu::ImageDataLayout,
		extent: wgpu::Extent3d,
	},
}

#[derive(Debug, Default)]
pub struct HostEncoder {
	commands: Vec<Command>,
}

impl HostEncoder {
	pub fn len(&self) -> usize {
		self.commands.len()
	}

	pub fn is_empty(&self) -> bool {
		self.commands.is_empty()
	}

	/// Destination stride of the `index`th recorded copy.
	pub fn bytes_per_row(&self, index: usize) -> Option<u32> {
		match self.commands.get(index)? {
			Command::CopyTextureToBuffer { layout, .. } => layout.bytes_per_row,
		}
	}
}

#[derive(Debug, Default)]
pub struct HostDevice {
	lost: AtomicBool,
	maps: AtomicUsize,
	unmaps: AtomicUsize,
}

impl HostDevice {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every later call that touches the device fails with `DeviceLost`.
	pub fn lose(&self) {
		self.lost.store(true, Ordering::SeqCst);
	}

	pub fn map_count(&self) -> usize {
		self.maps.load(Ordering::SeqCst)
	}

	pub fn unmap_count(&self) -> usize {
		self.unmaps.load(Ordering::SeqCst)
	}

	pub fn is_mapped(&self, buffer: &HostBuffer) -> bool {
		lock(&buffer.state).mapped
	}

	pub fn buffer_size(&self, buffer: &HostBuffer) -> u64 {
		lock(&buffer.state).data.len() as u64
	}

	pub fn buffer_usage(&self, buffer: &HostBuffer) -> wgpu::BufferUsages {
		lock(&buffer.state).usage
	}

	/// Raw buffer bytes, regardless of map state.
	pub fn buffer_contents(&self, buffer: &HostBuffer) -> Vec<u8> {
		lock(&buffer.state).data.clone()
	}

	/// A readback buffer already holding `contents`, as if a copy had
	/// landed in it.
	pub fn staging_buffer(&self, contents: &[u8]) -> HostBuffer {
		HostBuffer {
			state: Arc::new(Mutex::new(BufferState {
				data: contents.to_vec(),
				usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
				mapped: false,
				destroyed: false,
			})),
		}
	}

	pub fn destroy_buffer(&self, buffer: &HostBuffer) {
		let mut state = lock(&buffer.state);
		state.destroyed = true;
		if state.mapped {
			state.mapped = false;
			self.unmaps.fetch_add(1, Ordering::SeqCst);
		}
	}

	pub fn texture_size(&self, texture: &HostTexture) -> wgpu::Extent3d {
		lock(&texture.state).size
	}

	pub fn texture_format(&self, texture: &HostTexture) -> wgpu::TextureFormat {
		lock(&texture.state).format
	}

	/// Fill the texture with tightly packed texels, standing in for a
	/// render pass.
	pub fn write_texture(&self, texture: &HostTexture, texels: &[u8]) -> Result<()> {
		let mut state = lock(&texture.state);
		if texels.len() != state.data.len() {
			return Err(CaptureError::BadPixelData {
				expected: state.data.len() as u64,
				actual: texels.len() as u64,
			});
		}
		state.data.copy_from_slice(texels);
		Ok(())
	}

	fn check_lost(&self) -> Result<()> {
		if self.lost.load(Ordering::SeqCst) {
			return Err(CaptureError::DeviceLost);
		}
		Ok(())
	}

	fn run(&self, command: Command) -> Result<()> {
		match command {
			Command::CopyTextureToBuffer {
				texture,
				buffer,
				layout,
				extent,
			} => {
				let texture = lock(&texture.state);
				let mut buffer = lock(&buffer.state);
				if buffer.mapped || buffer.destroyed {
					return Err(CaptureError::InvalidCopy(
						"destination buffer is mapped or destroyed".to_string(),
					));
				}
				let row = extent.width as usize * BYTES_PER_PIXEL as usize;
				let dst_stride = layout.bytes_per_row.unwrap_or(0) as usize;
				for y in 0..extent.height {
					let src = texel_offset(texture.size.width, 0, y);
					let dst = layout.offset as usize + y as usize * dst_stride;
					buffer.data[dst..dst + row].copy_from_slice(&texture.data[src..src + row]);
				}
				Ok(())
			}
		}
	}
}

impl ReadbackDevice for HostDevice {
	type Buffer = HostBuffer;
	type Texture = HostTexture;
	type Encoder = HostEncoder;

	async fn create_buffer(&self, desc: &wgpu::BufferDescriptor<'_>) -> Result<HostBuffer> {
		self.check_lost()?;
		if desc.mapped_at_creation && desc.size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
			return Err(CaptureError::ResourceCreation(format!(
				"buffer mapped at creation must be a multiple of {} bytes, got {}",
				wgpu::COPY_BUFFER_ALIGNMENT,
				desc.size
			)));
		}
		let map_read = wgpu::BufferUsages::MAP_READ;
		if desc.usage.contains(map_read) && !(wgpu::BufferUsages::COPY_DST | map_read).contains(desc.usage) {
			return Err(CaptureError::ResourceCreation(format!(
				"MAP_READ may only be combined with COPY_DST, got {:?}",
				desc.usage
			)));
		}

		debug!(label = ?desc.label, size = desc.size, "host buffer");
		if desc.mapped_at_creation {
			self.maps.fetch_add(1, Ordering::SeqCst);
		}
		Ok(HostBuffer {
			state: Arc::new(Mutex::new(BufferState {
				data: vec![0; desc.size as usize],
				usage: desc.usage,
				mapped: desc.mapped_at_creation,
				destroyed: false,
			})),
		})
	}

	async fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Result<HostTexture> {
		self.check_lost()?;
		match desc.format {
			wgpu::TextureFormat::Rgba8Unorm
			| wgpu::TextureFormat::Rgba8UnormSrgb
			| wgpu::TextureFormat::Bgra8Unorm
			| wgpu::TextureFormat::Bgra8UnormSrgb => (),
			other => {
				return Err(CaptureError::ResourceCreation(format!(
					"unsupported texture format {:?}",
					other
				)))
			}
		}
		let size = desc.size;
		if size.width == 0 || size.height == 0 || size.depth_or_array_layers != 1 {
			return Err(CaptureError::ResourceCreation(format!("invalid texture size {:?}", size)));
		}

		debug!(label = ?desc.label, width = size.width, height = size.height, "host texture");
		let len = texel_offset(size.width, 0, size.height);
		Ok(HostTexture {
			state: Arc::new(Mutex::new(TextureState {
				size,
				format: desc.format,
				usage: desc.usage,
				data: vec![0; len],
			})),
		})
	}

	fn create_encoder(&self, _label: Option<&str>) -> HostEncoder {
		HostEncoder::default()
	}

	fn copy_texture_to_buffer(
		&self,
		encoder: &mut HostEncoder,
		texture: &HostTexture,
		buffer: &HostBuffer,
		layout: wgpu::ImageDataLayout,
		extent: wgpu::Extent3d,
	) -> Result<()> {
		{
			let texture = lock(&texture.state);
			let buffer = lock(&buffer.state);

			if !texture.usage.contains(wgpu::TextureUsages::COPY_SRC) {
				return Err(CaptureError::InvalidCopy("texture lacks COPY_SRC".to_string()));
			}
			if !buffer.usage.contains(wgpu::BufferUsages::COPY_DST) {
				return Err(CaptureError::InvalidCopy("buffer lacks COPY_DST".to_string()));
			}
			if extent.width > texture.size.width
				|| extent.height > texture.size.height
				|| extent.depth_or_array_layers != 1
			{
				return Err(CaptureError::InvalidCopy(format!(
					"extent {:?} exceeds texture {:?}",
					extent, texture.size
				)));
			}

			let row = u64::from(extent.width) * u64::from(BYTES_PER_PIXEL);
			let bytes_per_row = match layout.bytes_per_row {
				Some(b) => b,
				None if extent.height <= 1 => 0,
				None => return Err(CaptureError::InvalidCopy("bytes_per_row is required".to_string())),
			};
			if extent.height > 1
				&& (bytes_per_row % COPY_BYTES_PER_ROW_ALIGNMENT != 0 || u64::from(bytes_per_row) < row)
			{
				return Err(CaptureError::InvalidCopy(format!(
					"bytes_per_row {} is unaligned or shorter than a {} byte row",
					bytes_per_row, row
				)));
			}
			let needed = match extent.height {
				0 => 0,
				h => layout.offset + u64::from(bytes_per_row) * u64::from(h - 1) + row,
			};
			if needed > buffer.data.len() as u64 {
				return Err(CaptureError::InvalidCopy(format!(
					"copy needs {} bytes, buffer holds {}",
					needed,
					buffer.data.len()
				)));
			}
		}

		encoder.commands.push(Command::CopyTextureToBuffer {
			texture: texture.clone(),
			buffer: buffer.clone(),
			layout,
			extent,
		});
		Ok(())
	}

	async fn submit(&self, encoder: HostEncoder) -> Result<()> {
		self.check_lost()?;
		for command in encoder.commands {
			self.run(command)?;
		}
		Ok(())
	}

	async fn map_read(&self, buffer: &HostBuffer) -> Result<()> {
		self.check_lost()?;
		let mut state = lock(&buffer.state);
		if state.destroyed {
			return Err(CaptureError::Map("buffer destroyed".to_string()));
		}
		if !state.usage.contains(wgpu::BufferUsages::MAP_READ) {
			return Err(CaptureError::Map("buffer lacks MAP_READ".to_string()));
		}
		if state.mapped {
			return Err(CaptureError::Map("buffer is already mapped".to_string()));
		}
		state.mapped = true;
		self.maps.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn read_mapped<R>(&self, buffer: &HostBuffer, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
		let state = lock(&buffer.state);
		if !state.mapped {
			return Err(CaptureError::NotMapped);
		}
		Ok(f(&state.data))
	}

	fn write_mapped<R>(&self, buffer: &HostBuffer, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
		let mut state = lock(&buffer.state);
		if !state.mapped {
			return Err(CaptureError::NotMapped);
		}
		Ok(f(&mut state.data))
	}

	fn unmap(&self, buffer: &HostBuffer) {
		let mut state = lock(&buffer.state);
		if state.mapped {
			state.mapped = false;
			self.unmaps.fetch_add(1, Ordering::SeqCst);
		}
	}
}
