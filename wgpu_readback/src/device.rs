use crate::error::Result;

/// The narrow slice of a GPU device the readback pipeline needs.
///
/// Descriptors and layouts are the plain `wgpu` data types, so the real
/// device (`gpu::WgpuDevice`) and the in-memory one (`host::HostDevice`)
/// are driven with exactly the same values.
///
/// Buffer mapping follows the WebGPU rules: `map_read` resolves once, only
/// after every submitted command touching the buffer has retired, and a
/// successful map must be paired with exactly one `unmap`.
#[allow(async_fn_in_trait)]
pub trait ReadbackDevice {
	type Buffer;
	type Texture;
	type Encoder;

	async fn create_buffer(&self, desc: &wgpu::BufferDescriptor<'_>) -> Result<Self::Buffer>;

	async fn create_texture(&self, desc: &wgpu::TextureDescriptor<'_>) -> Result<Self::Texture>;

	fn create_encoder(&self, label: Option<&str>) -> Self::Encoder;

	/// Record a copy of `extent` texels from the texture origin into
	/// `buffer`, laid out according to `layout`. Nothing executes until the
	/// encoder is submitted.
	fn copy_texture_to_buffer(
		&self,
		encoder: &mut Self::Encoder,
		texture: &Self::Texture,
		buffer: &Self::Buffer,
		layout: wgpu::ImageDataLayout,
		extent: wgpu::Extent3d,
	) -> Result<()>;

	async fn submit(&self, encoder: Self::Encoder) -> Result<()>;

	/// Request host read access to the whole buffer.
	async fn map_read(&self, buffer: &Self::Buffer) -> Result<()>;

	fn read_mapped<R>(&self, buffer: &Self::Buffer, f: impl FnOnce(&[u8]) -> R) -> Result<R>;

	fn write_mapped<R>(&self, buffer: &Self::Buffer, f: impl FnOnce(&mut [u8]) -> R) -> Result<R>;

	fn unmap(&self, buffer: &Self::Buffer);
}
