mod adapter;
mod backend;
mod backends;
mod registry;
mod result;

pub use adapter::{normalize_detections, DetectionAdapter};
pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{registry_from_settings, BackendRegistry};
pub use result::{Detection, RawDetection};
