use core::fmt;
use std::sync::Arc;

use fxvm_bundle::{decode_bundle, BundleError, ConstantDesc, ExternDesc};
use tracing::{debug, warn};

use crate::config::VmConfig;
use crate::error::VmError;
use crate::interp::{self, Machine};
use crate::memory::MemoryView;
use crate::native::{trace_extern, ExternTable, ExternValue, NativeSignature};
use crate::program::{decode_program, verify_program, Instruction};
use crate::registers::RegisterFile;
use crate::resources::{ResourceView, Uav, CBUFFER0_REGISTER, INPUT_SLOT_COUNT};
use crate::stats::{VmStats, VmStatsSnapshot};

/// A loaded program with its reflection, extern bindings and input slots.
///
/// A bundle either loads completely or not at all. Input slots alias memory owned
/// by the embedder; the bundle only holds shared handles.
pub struct Bundle {
    pub(crate) name: String,
    pub(crate) code: Vec<Instruction>,
    pub(crate) constants: MemoryView,
    pub(crate) layout: Vec<ConstantDesc>,
    pub(crate) externs: Vec<ExternDesc>,
    pub(crate) inputs: [Option<MemoryView>; INPUT_SLOT_COUNT],
    pub(crate) table: ExternTable,
    pub(crate) stats: Arc<VmStats>,
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("name", &self.name)
            .field("instructions", &self.code.len())
            .field("constants", &self.constants.len())
            .field("layout", &self.layout.len())
            .field("externs", &self.externs.len())
            .field(
                "bound_inputs",
                &self.inputs.iter().filter(|s| s.is_some()).count(),
            )
            .finish()
    }
}

impl Bundle {
    /// Decodes `bytes` with the default configuration.
    pub fn load(debug_name: impl Into<String>, bytes: &[u8]) -> Result<Self, VmError> {
        Self::load_with_config(debug_name, bytes, &VmConfig::default())
    }

    pub fn load_with_config(
        debug_name: impl Into<String>,
        bytes: &[u8],
        config: &VmConfig,
    ) -> Result<Self, VmError> {
        Self::load_with_stats(debug_name, bytes, config, Arc::new(VmStats::new()))
    }

    /// Like [`Bundle::load_with_config`], recording into shared `stats`.
    pub fn load_with_stats(
        debug_name: impl Into<String>,
        bytes: &[u8],
        config: &VmConfig,
        stats: Arc<VmStats>,
    ) -> Result<Self, VmError> {
        let name = debug_name.into();
        if bytes.len() > config.max_bundle_bytes {
            return Err(BundleError::CountTooLarge {
                what: "bundle byte",
                count: bytes.len() as u64,
                max: config.max_bundle_bytes as u64,
            }
            .into());
        }

        let decoded = decode_bundle(bytes)?;
        let code = decode_program(&decoded.code);
        verify_program(&code, decoded.externs.len())?;

        let constants = MemoryView::from_words(&decoded.constants);
        let mut inputs: [Option<MemoryView>; INPUT_SLOT_COUNT] = std::array::from_fn(|_| None);
        inputs[CBUFFER0_REGISTER as usize] = Some(constants.clone());

        let mut bundle = Bundle {
            table: ExternTable::new(decoded.externs.len()),
            name,
            code,
            constants,
            layout: decoded.layout,
            externs: decoded.externs,
            inputs,
            stats,
        };
        if config.bind_trace_extern {
            bundle.bind_trace_externs();
        }
        bundle.stats.inc_bundles_loaded();

        debug!(
            bundle = %bundle.name,
            instructions = bundle.code.len(),
            constants = bundle.layout.len(),
            externs = bundle.externs.len(),
            "loaded bundle"
        );
        Ok(bundle)
    }

    fn bind_trace_externs(&mut self) {
        for desc in self.externs.iter().filter(|d| d.name == "trace") {
            let signature = NativeSignature::from_extern(desc);
            let callback = trace_extern(&self.name, &signature);
            if let Err(err) = self.table.bind(desc, signature, callback) {
                debug!(bundle = %self.name, %err, "trace extern left unbound");
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs one invocation from instruction 0 and returns `iregs[0]` at `Ret`.
    pub fn play(&mut self, regs: &mut RegisterFile) -> Result<i32, VmError> {
        self.stats.inc_plays();
        let res = interp::run(&mut self.machine(), regs);
        if let Err(err) = &res {
            self.stats.inc_faults();
            debug!(bundle = %self.name, %err, "bundle fault");
        }
        res
    }

    pub(crate) fn machine(&mut self) -> Machine<'_> {
        Machine {
            code: &self.code,
            inputs: &self.inputs,
            constants: &self.constants,
            externs: &self.externs,
            table: &mut self.table,
            stats: &self.stats,
        }
    }

    fn check_slot(slot: usize) -> Result<(), VmError> {
        if slot < INPUT_SLOT_COUNT {
            Ok(())
        } else {
            Err(VmError::InvalidSlot { slot })
        }
    }

    /// Binds `view` to input `slot`, replacing any previous binding.
    pub fn set_input(&mut self, slot: usize, view: MemoryView) -> Result<(), VmError> {
        Self::check_slot(slot)?;
        self.inputs[slot] = Some(view);
        Ok(())
    }

    /// Unbinds input `slot`, returning the previous view.
    pub fn clear_input(&mut self, slot: usize) -> Result<Option<MemoryView>, VmError> {
        Self::check_slot(slot)?;
        Ok(self.inputs[slot].take())
    }

    pub fn input(&self, slot: usize) -> Option<&MemoryView> {
        self.inputs.get(slot).and_then(Option::as_ref)
    }

    /// Binds the UAV's raw buffer (counter included) at `uav.index`.
    pub fn bind_uav(&mut self, uav: &Uav) -> Result<(), VmError> {
        self.set_input(uav.index as usize, uav.raw.clone())
    }

    /// Binds read-only memory at `view.index`.
    pub fn bind_resource(&mut self, view: &ResourceView, memory: MemoryView) -> Result<(), VmError> {
        self.set_input(view.index as usize, memory)
    }

    fn find_constant(&self, name: &str) -> Option<&ConstantDesc> {
        self.layout.iter().find(|c| c.name == name)
    }

    /// Writes `value` into the named constant.
    ///
    /// Writes `min(value.len(), size)` bytes. Returns `false` without writing when the
    /// name is not in the layout. Slot 0 is rebound to the bundle's own constants
    /// first, replacing anything bound there with [`Bundle::set_input`].
    pub fn set_constant(&mut self, name: &str, value: &[u8]) -> bool {
        self.inputs[CBUFFER0_REGISTER as usize] = Some(self.constants.clone());

        let Some(entry) = self.find_constant(name) else {
            debug!(bundle = %self.name, constant = name, "set_constant: unknown constant");
            return false;
        };
        let size = entry.size as usize;
        if value.len() != size {
            warn!(
                bundle = %self.name,
                constant = name,
                expected = size,
                got = value.len(),
                "set_constant: size mismatch"
            );
        }
        let n = size.min(value.len());
        // The decoder checked `offset + size` against the constants buffer.
        if let Err(err) = self.constants.write_bytes(entry.offset as usize, &value[..n]) {
            warn!(bundle = %self.name, constant = name, %err, "set_constant: write failed");
            return false;
        }
        true
    }

    /// Reads the named constant's current bytes.
    pub fn constant(&self, name: &str) -> Option<Vec<u8>> {
        let entry = self.find_constant(name)?;
        let mut out = vec![0u8; entry.size as usize];
        self.constants
            .read_bytes(entry.offset as usize, &mut out)
            .ok()?;
        Some(out)
    }

    pub fn layout(&self) -> &[ConstantDesc] {
        &self.layout
    }

    pub fn externs(&self) -> &[ExternDesc] {
        &self.externs
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn constants(&self) -> &MemoryView {
        &self.constants
    }

    /// Binds a host callback to extern `id`.
    ///
    /// The signature is checked against the reflected extern now; a mismatch leaves
    /// any previous binding in place.
    pub fn set_extern<F>(
        &mut self,
        id: u32,
        signature: NativeSignature,
        callback: F,
    ) -> Result<(), VmError>
    where
        F: FnMut(&[ExternValue]) -> ExternValue + Send + 'static,
    {
        let desc = self
            .externs
            .get(id as usize)
            .ok_or_else(|| VmError::UnknownExtern(format!("#{id}")))?;
        self.table.bind(desc, signature, Box::new(callback))
    }

    /// Like [`Bundle::set_extern`], resolving the id by name.
    pub fn set_extern_by_name<F>(
        &mut self,
        name: &str,
        signature: NativeSignature,
        callback: F,
    ) -> Result<(), VmError>
    where
        F: FnMut(&[ExternValue]) -> ExternValue + Send + 'static,
    {
        let id = self
            .extern_id(name)
            .ok_or_else(|| VmError::UnknownExtern(name.to_owned()))?;
        self.set_extern(id, signature, callback)
    }

    pub fn extern_id(&self, name: &str) -> Option<u32> {
        self.externs.iter().find(|e| e.name == name).map(|e| e.id)
    }

    /// Restores the unbound behaviour for extern `id`.
    pub fn clear_extern(&mut self, id: u32) {
        self.table.clear(id);
    }

    pub fn is_extern_bound(&self, id: u32) -> bool {
        self.table.is_bound(id)
    }

    /// Calls made to extern `id` while it had no binding.
    pub fn unbound_extern_calls(&self, id: u32) -> u64 {
        self.table.unbound_calls(id)
    }

    pub fn stats(&self) -> VmStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> &Arc<VmStats> {
        &self.stats
    }
}
