use anyhow::Result;

use crate::detect::result::RawDetection;

/// Detector backend trait.
///
/// # Audit Boundary
///
/// This trait defines an AUDIT BOUNDARY, not a security boundary.
/// Implementations MUST be manually audited to ensure they:
/// - Do not store raw pixels beyond the `detect` call
/// - Do not write to disk
/// - Do not make network requests
///
/// Backends run on the detection adapter's worker thread, one call at a time.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a packed RGB8 frame.
    ///
    /// Returns every candidate the model produced. Confidence filtering is the
    /// adapter's job, so backends should not pre-filter unless the model requires it.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
