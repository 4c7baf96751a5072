//! Frame-fence coordination.
//!
//! Nothing a submitted command buffer may still read is rewritten or destroyed
//! outside these helpers. Every wait goes through [`wait_frames_idle`].

use crate::backend::FrameFences;
use crate::error::Result;
use std::time::{Duration, Instant};

/// Block until every in-flight frame has retired.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn wait_frames_idle<F>(fences: &mut F, timeout: Duration) -> Result<()>
where
    F: FrameFences + ?Sized,
{
    let start = Instant::now();
    fences.wait_for_frames(timeout)?;
    tracing::trace!(elapsed = ?start.elapsed(), "in-flight frames retired");
    Ok(())
}

/// Replace the resource in `slot` once no frame can still read it.
///
/// Waits for in-flight frames, builds the replacement from the old resource,
/// swaps it in and only then retires the old one. If `build` fails the slot
/// keeps the old resource and nothing is retired.
pub fn replace_resource<F, T>(
    owner: &mut F,
    timeout: Duration,
    slot: &mut T,
    build: impl FnOnce(&mut F, &T) -> Result<T>,
    retire: impl FnOnce(&mut F, T),
) -> Result<()>
where
    F: FrameFences + ?Sized,
{
    wait_frames_idle(owner, timeout)?;
    let fresh = build(owner, slot)?;
    let old = std::mem::replace(slot, fresh);
    retire(owner, old);
    Ok(())
}
