use crate::capture::Dimensions;
use thiserror::Error;

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum CaptureError {
	#[error("dimensions must be positive, got {width}x{height}")]
	ZeroDimension { width: u32, height: u32 },

	#[error("{width}x{height} is too large for a staging buffer")]
	TooLarge { width: u32, height: u32 },

	#[error("resources were allocated for {expected} but {actual} was supplied")]
	DimensionMismatch {
		expected: Dimensions,
		actual: Dimensions,
	},

	#[error("staging buffer holds {actual} bytes, expected {expected}")]
	StagingSizeMismatch { expected: u64, actual: u64 },

	#[error("packed image needs {expected} bytes, got {actual}")]
	BadPixelData { expected: u64, actual: u64 },

	#[error("resource creation failed: {0}")]
	ResourceCreation(String),

	#[error("invalid copy: {0}")]
	InvalidCopy(String),

	#[error("buffer mapping failed: {0}")]
	Map(String),

	#[error("buffer is not mapped")]
	NotMapped,

	#[error("device lost")]
	DeviceLost,

	#[error("can not find a usable adapter")]
	NoAdapter,

	#[error("device request failed: {0}")]
	RequestDevice(#[from] wgpu::RequestDeviceError),

	#[error("image encoding failed: {0}")]
	Encode(#[from] image::ImageError),
}
