#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// boundary handling for out-of-range coordinates.
pub mod border;

/// comparison oracle between two convolution outputs.
pub mod compare;

/// compile-time constants shared by the kernels.
pub mod config;

/// data-parallel compute device and its buffers.
pub mod device;

/// launch configuration and asynchronous dispatch of the tiled kernel.
pub mod dispatch;

/// Error types for the convolution module.
pub mod error;

/// filter generation module.
pub mod filter;

/// reference per-pixel convolution.
pub mod naive;

/// module containing parallization utilities.
pub mod parallel;

/// shared-memory style tiled convolution.
pub mod tiled;

pub use crate::error::{ConvolutionError, LaunchError};
