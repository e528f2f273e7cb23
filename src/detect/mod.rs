mod backend;
mod backends;
mod oracle;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use oracle::{BlockingOracle, DetectionOracle, OracleLimits};
pub use registry::BackendRegistry;
pub use result::{Detection, PixelBox};
