/// Every captured texture is 4-channel, one byte per channel.
pub const BYTES_PER_PIXEL: u32 = 4;

/// Row alignment the device copy contract imposes on `bytes_per_row`.
/// Must equal `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`.
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Buffer uploads are padded to this many bytes.
pub const UPLOAD_ALIGNMENT: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowStride {
	pub width: u32,
	pub unpadded_bytes_per_row: u32,
	pub padded_bytes_per_row: u32,
}

impl RowStride {
	/// `width` must be positive and small enough that the padded row fits
	/// in a `u32`; `Dimensions::new` checks both.
	pub fn new(width: u32) -> Self {
		let unpadded_bytes_per_row = width * BYTES_PER_PIXEL;
		let align = COPY_BYTES_PER_ROW_ALIGNMENT;
		let padded_bytes_per_row_padding = (align - unpadded_bytes_per_row % align) % align;
		let padded_bytes_per_row = unpadded_bytes_per_row + padded_bytes_per_row_padding;
		Self {
			width,
			unpadded_bytes_per_row,
			padded_bytes_per_row,
		}
	}

	pub fn padding(&self) -> u32 {
		self.padded_bytes_per_row - self.unpadded_bytes_per_row
	}

	/// Size of a staging buffer holding `height` padded rows.
	pub fn padded_size(&self, height: u32) -> u64 {
		u64::from(self.padded_bytes_per_row) * u64::from(height)
	}

	/// Size of the tightly packed image with `height` rows.
	pub fn unpadded_size(&self, height: u32) -> u64 {
		u64::from(self.unpadded_bytes_per_row) * u64::from(height)
	}
}

/// Byte offset of texel `(x, y)` in a tightly packed image `width` texels
/// wide. Computed in `usize`; packed images may exceed 4 GiB.
pub fn texel_offset(width: u32, x: u32, y: u32) -> usize {
	(y as usize * width as usize + x as usize) * BYTES_PER_PIXEL as usize
}

/// Size of an upload buffer for `len` bytes of contents.
///
/// Always adds between 1 and 4 bytes: an input that is already a multiple
/// of 4 still gets a whole extra word.
pub fn padded_upload_size(len: u64) -> u64 {
	let padding = UPLOAD_ALIGNMENT - len % UPLOAD_ALIGNMENT;
	len + padding
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn alignment_matches_wgpu() {
		assert_eq!(COPY_BYTES_PER_ROW_ALIGNMENT, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
	}

	#[test]
	fn stride_known_widths() {
		let s = RowStride::new(1);
		assert_eq!((s.unpadded_bytes_per_row, s.padded_bytes_per_row), (4, 256));

		let s = RowStride::new(64);
		assert_eq!((s.unpadded_bytes_per_row, s.padded_bytes_per_row), (256, 256));
		assert_eq!(s.padding(), 0);

		let s = RowStride::new(65);
		assert_eq!((s.unpadded_bytes_per_row, s.padded_bytes_per_row), (260, 512));
	}

	#[test]
	fn stride_invariants_hold() {
		for width in (1..=2048).chain([4095, 4096, 7680, 16384].iter().copied()) {
			let s = RowStride::new(width);
			assert_eq!(s.padded_bytes_per_row % COPY_BYTES_PER_ROW_ALIGNMENT, 0, "width {}", width);
			assert!(s.padded_bytes_per_row >= s.unpadded_bytes_per_row);
			assert!(s.padding() < COPY_BYTES_PER_ROW_ALIGNMENT);
			assert_eq!(s, RowStride::new(width));
		}
	}

	#[test]
	fn sizes_scale_with_height() {
		let s = RowStride::new(65);
		assert_eq!(s.padded_size(3), 512 * 3);
		assert_eq!(s.unpadded_size(3), 260 * 3);
	}

	#[test]
	fn texel_offsets_are_row_major() {
		assert_eq!(texel_offset(2, 1, 0), 4);
		assert_eq!(texel_offset(3, 0, 1), 12);
		assert_eq!(texel_offset(3, 2, 1), 20);
	}

	#[cfg(target_pointer_width = "64")]
	#[test]
	fn texel_offsets_past_4gib_do_not_wrap() {
		assert_eq!(texel_offset(65536, 0, 65536), 1 << 34);
		assert_eq!(texel_offset(65536, 65535, 65535), (1usize << 34) - 4);
	}

	#[test]
	fn upload_padding_adds_a_word_to_aligned_input() {
		assert_eq!(padded_upload_size(8), 12);
		assert_eq!(padded_upload_size(0), 4);
		assert_eq!(padded_upload_size(4), 8);
	}

	#[test]
	fn upload_padding_rounds_up_unaligned_input() {
		assert_eq!(padded_upload_size(1), 4);
		assert_eq!(padded_upload_size(5), 8);
		assert_eq!(padded_upload_size(7), 8);
	}
}
