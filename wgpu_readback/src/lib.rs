//! Texture readback: copy a GPU texture into a row-padded staging buffer,
//! map it, and repack the rows into a tightly packed RGBA image.

mod capture;
mod device;
mod error;
pub mod gpu;
pub mod host;
mod readback;
pub mod sink;
mod upload;
pub mod utils;

pub use capture::{allocate, capture_texture, record_copy, CaptureResources, Dimensions, CAPTURE_FORMAT};
pub use device::ReadbackDevice;
pub use error::{CaptureError, Result};
pub use readback::{repack, unpad, Mapping, PackedImage};
pub use upload::{create_padded_buffer, UploadRequest};
pub use utils::RowStride;
