#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use tessel_image as image;

#[doc(inline)]
pub use tessel_conv as conv;
