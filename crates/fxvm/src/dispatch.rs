//! Compute-grid emulation.

use tracing::debug;

use crate::bundle::Bundle;
use crate::error::VmError;
use crate::interp;
use crate::memory::MemoryView;
use crate::registers::RegisterFile;
use crate::resources::{SV_DISPATCH_THREAD_ID, SV_GROUP_ID, SV_GROUP_INDEX, SV_GROUP_THREAD_ID};

/// A 3-D grid extent or coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// `x * y * z`.
    pub fn count(self) -> u64 {
        u64::from(self.x) * u64::from(self.y) * u64::from(self.z)
    }

    pub fn to_array(self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[u32; 3]> for Dim3 {
    fn from([x, y, z]: [u32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self { x, y, z }
    }
}

/// The four system-value inputs rebound before every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemValues {
    pub group_id: Dim3,
    pub group_index: u32,
    pub group_thread_id: Dim3,
    pub dispatch_thread_id: Dim3,
}

impl SystemValues {
    /// System values for thread `thread` of group `group`.
    pub fn compute(group: Dim3, thread: Dim3, numthreads: Dim3) -> Self {
        let group_index = thread
            .z
            .wrapping_mul(numthreads.x)
            .wrapping_mul(numthreads.y)
            .wrapping_add(thread.y.wrapping_mul(numthreads.x))
            .wrapping_add(thread.x);
        let dispatch = |g: u32, n: u32, t: u32| g.wrapping_mul(n).wrapping_add(t);
        Self {
            group_id: group,
            group_index,
            group_thread_id: thread,
            dispatch_thread_id: Dim3 {
                x: dispatch(group.x, numthreads.x, thread.x),
                y: dispatch(group.y, numthreads.y, thread.y),
                z: dispatch(group.z, numthreads.z, thread.z),
            },
        }
    }
}

struct SystemValueViews {
    group_id: MemoryView,
    group_index: MemoryView,
    group_thread_id: MemoryView,
    dispatch_thread_id: MemoryView,
}

impl SystemValueViews {
    fn new() -> Self {
        Self {
            group_id: MemoryView::zeroed(3),
            group_index: MemoryView::zeroed(1),
            group_thread_id: MemoryView::zeroed(3),
            dispatch_thread_id: MemoryView::zeroed(3),
        }
    }

    fn store(&self, sv: &SystemValues) {
        fn put(view: &MemoryView, words: &[u32]) {
            for (i, w) in words.iter().enumerate() {
                // Views are sized for their values.
                let _ = view.write_u32(i, *w);
            }
        }
        put(&self.group_id, &sv.group_id.to_array());
        put(&self.group_index, &[sv.group_index]);
        put(&self.group_thread_id, &sv.group_thread_id.to_array());
        put(&self.dispatch_thread_id, &sv.dispatch_thread_id.to_array());
    }
}

impl Bundle {
    /// Invokes the program once per thread of the `numgroups x numthreads` grid.
    ///
    /// Groups iterate `z, y, x` outer to inner, then threads likewise. The system-value
    /// slots are bound to fresh memory for the dispatch and rewritten before each
    /// invocation; they stay bound afterwards. The first fault aborts the grid and is
    /// reported with its coordinates. Returns the number of invocations.
    pub fn dispatch(
        &mut self,
        regs: &mut RegisterFile,
        numgroups: impl Into<Dim3>,
        numthreads: impl Into<Dim3>,
    ) -> Result<u64, VmError> {
        let numgroups = numgroups.into();
        let numthreads = numthreads.into();
        self.stats.inc_dispatches();

        let views = SystemValueViews::new();
        self.set_input(SV_GROUP_ID as usize, views.group_id.clone())?;
        self.set_input(SV_GROUP_INDEX as usize, views.group_index.clone())?;
        self.set_input(SV_GROUP_THREAD_ID as usize, views.group_thread_id.clone())?;
        self.set_input(
            SV_DISPATCH_THREAD_ID as usize,
            views.dispatch_thread_id.clone(),
        )?;

        let stats = self.stats.clone();
        let name = self.name.clone();
        let mut machine = self.machine();
        let mut invocations = 0u64;

        for gz in 0..numgroups.z {
            for gy in 0..numgroups.y {
                for gx in 0..numgroups.x {
                    let group = Dim3::new(gx, gy, gz);
                    for tz in 0..numthreads.z {
                        for ty in 0..numthreads.y {
                            for tx in 0..numthreads.x {
                                let thread = Dim3::new(tx, ty, tz);
                                views.store(&SystemValues::compute(group, thread, numthreads));
                                stats.inc_plays();
                                invocations += 1;
                                if let Err(err) = interp::run(&mut machine, regs) {
                                    stats.inc_faults();
                                    debug!(
                                        bundle = %name,
                                        group = ?group.to_array(),
                                        thread = ?thread.to_array(),
                                        %err,
                                        "dispatch fault"
                                    );
                                    return Err(VmError::Dispatch {
                                        group: group.to_array(),
                                        thread: thread.to_array(),
                                        source: Box::new(err),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        debug!(
            bundle = %name,
            groups = ?numgroups.to_array(),
            threads = ?numthreads.to_array(),
            invocations,
            "dispatch complete"
        );
        Ok(invocations)
    }
}
