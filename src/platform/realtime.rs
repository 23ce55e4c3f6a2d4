//! Real-time scheduling for the render thread.
//!
//! On Windows the thread joins the MMCSS "Audio" task for as long as the
//! guard lives. Other platforms report the boost as unavailable.

#[cfg(windows)]
use windows::Win32::System::Threading::{
    AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW,
};

/// MMCSS task the render thread registers with.
#[cfg(windows)]
const MMCSS_TASK: &str = "Audio";

/// Keeps the current thread's scheduling boost active until dropped.
///
/// Must be dropped on the thread that created it.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) struct PriorityGuard {
    #[cfg(windows)]
    handle: windows::Win32::Foundation::HANDLE,
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Drop for PriorityGuard {
    fn drop(&mut self) {
        #[cfg(windows)]
        {
            // SAFETY: handle came from AvSetMmThreadCharacteristicsW on this thread
            // and is reverted exactly once.
            #[allow(unsafe_code)]
            let result = unsafe { AvRevertMmThreadCharacteristics(self.handle) };
            if let Err(e) = result {
                tracing::debug!(error = %e, "failed to revert MMCSS characteristics");
            }
        }
    }
}

/// Raises the calling thread into the platform's audio scheduling class.
///
/// Returns a human-readable reason when the boost is not available.
#[cfg(windows)]
pub(crate) fn boost_current_thread() -> Result<PriorityGuard, String> {
    let task = windows::core::HSTRING::from(MMCSS_TASK);
    let mut task_index = 0u32;

    // SAFETY: task is a valid null-terminated wide string for the duration
    // of the call and task_index outlives it.
    #[allow(unsafe_code)]
    let handle = unsafe { AvSetMmThreadCharacteristicsW(&task, &mut task_index) }
        .map_err(|e| format!("MMCSS registration for {MMCSS_TASK:?} failed: {e}"))?;

    tracing::debug!(task = MMCSS_TASK, task_index, "render thread registered with MMCSS");
    Ok(PriorityGuard {
        handle,
        _not_send: std::marker::PhantomData,
    })
}

/// Raises the calling thread into the platform's audio scheduling class.
///
/// Returns a human-readable reason when the boost is not available.
#[cfg(not(windows))]
pub(crate) fn boost_current_thread() -> Result<PriorityGuard, String> {
    Err(format!(
        "real-time audio scheduling is not supported on {}",
        std::env::consts::OS
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn test_boost_unavailable_reports_platform() {
        let Err(reason) = boost_current_thread() else {
            panic!("boost should be unavailable off Windows");
        };
        assert!(reason.contains(std::env::consts::OS));
    }

    #[cfg(windows)]
    #[test]
    fn test_boost_and_revert() {
        // MMCSS may be disabled on CI hosts; only the drop path is checked when it works.
        if let Ok(guard) = boost_current_thread() {
            drop(guard);
        }
    }
}
