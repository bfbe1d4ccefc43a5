//! Source manager boundary.

pub mod mock;
#[cfg(windows)]
pub mod native;
pub mod traits;

pub use mock::{DsmCall, MockDsm, MockImage};
#[cfg(windows)]
pub use native::NativeDsm;
pub use traits::{DsmTransport, NativeImage};
