//! `fxvm` runs compiled effect bundles: small register-machine programs invoked once
//! per thread of an emulated compute grid.
//!
//! - [`Bundle`] loads a bundle, owns its reflection and extern bindings, and runs it
//!   through [`Bundle::play`] or [`Bundle::dispatch`].
//! - [`RegisterFile`] is the caller-owned scratch register array.
//! - [`MemoryView`] is the shared word memory behind every bound input: constants,
//!   UAVs ([`Uav`]), textures and system values.
//! - [`native`] bridges `I32ExternCall` to host callbacks.

#![forbid(unsafe_code)]

mod bundle;
mod config;
mod dispatch;
mod error;
mod interp;
mod memory;
mod opcode;
mod program;
mod registers;
mod resources;
mod stats;

pub mod asm;
pub mod disasm;
pub mod native;
pub mod texture;

pub use fxvm_bundle as format;

pub use bundle::Bundle;
pub use config::{ConfigError, VmConfig, MIN_REGISTER_COUNT};
pub use dispatch::{Dim3, SystemValues};
pub use error::{Result, Space, VmError};
pub use memory::{MemoryError, MemoryView};
pub use native::{ExternFn, ExternValue, NativeSignature, NativeType};
pub use opcode::Opcode;
pub use program::Instruction;
pub use registers::RegisterFile;
pub use resources::{
    create_buffer_view, create_texture_view, create_uav, destroy_uav, ResourceView, Uav,
    CBUFFER0_REGISTER, INPUT0_REGISTER, INPUT_REGISTER_COUNT, INPUT_SLOT_COUNT, SRV0_REGISTER,
    SRV_REGISTER_COUNT, SV_DISPATCH_THREAD_ID, SV_GROUP_ID, SV_GROUP_INDEX, SV_GROUP_THREAD_ID,
    UAV0_REGISTER, UAV_REGISTER_COUNT,
};
pub use stats::{VmStats, VmStatsSnapshot};
pub use texture::create_texture_memory;
