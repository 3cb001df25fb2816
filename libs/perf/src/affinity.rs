//! CPU affinity pinning for the engine threads
//!
//! Each hot-path thread is pinned to its own core when the host
//! permits; refusal is logged and tolerated (VMs and constrained CI
//! hosts routinely deny affinity changes).

use tracing::{debug, warn};

/// Pin the calling thread to `core_id`. Returns whether the pin took
/// effect.
pub fn pin_current_thread(core_id: usize) -> bool {
    let Some(cores) = core_affinity::get_core_ids() else {
        warn!(core_id, "could not enumerate CPU cores; thread left unpinned");
        return false;
    };

    let Some(core) = cores.into_iter().find(|c| c.id == core_id) else {
        warn!(core_id, "requested core not available; thread left unpinned");
        return false;
    };

    let pinned = core_affinity::set_for_current(core);
    if pinned {
        debug!(core_id, "thread pinned");
    } else {
        warn!(core_id, "host refused affinity change; thread left unpinned");
    }
    pinned
}
