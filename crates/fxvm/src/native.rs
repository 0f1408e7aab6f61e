//! The extern call bridge.
//!
//! Bytecode calls host functions with `I32ExternCall a, b`: `a` is the extern id and
//! `b` the register where the packed return value starts. Arguments are packed right
//! after the return value. Hosts bind a callback together with an explicit
//! [`NativeSignature`]; the signature is checked against the bundle's reflected
//! [`ExternDesc`] when the callback is bound, not when it is called.

use core::fmt;

use fxvm_bundle::{ExternDesc, TypeLayout};
use tracing::{debug, info, warn};

use crate::error::{Space, VmError};
use crate::memory::MemoryView;
use crate::registers::RegisterFile;

/// A native parameter or return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Void,
    Bool,
    Int,
    Uint,
    Float,
    IntN(u32),
    UintN(u32),
    FloatN(u32),
    /// A 4-byte offset into the constants buffer, where `{u32 len, bytes}` is stored.
    String,
    /// Opaque bytes (structs, arrays).
    Raw(u32),
}

impl NativeType {
    /// Packed size in bytes.
    pub fn size(self) -> u32 {
        match self {
            NativeType::Void => 0,
            NativeType::Bool
            | NativeType::Int
            | NativeType::Uint
            | NativeType::Float
            | NativeType::String => 4,
            NativeType::IntN(n) | NativeType::UintN(n) | NativeType::FloatN(n) => n * 4,
            NativeType::Raw(bytes) => bytes,
        }
    }

    /// Best-effort mapping from a reflected type.
    ///
    /// Scalar and vector names (`int`, `uint3`, `float4`, ...) map to their native
    /// counterparts when the size agrees; everything else is [`NativeType::Raw`].
    pub fn from_layout(layout: &TypeLayout) -> NativeType {
        if layout.is_array() || !layout.is_leaf() {
            return NativeType::Raw(layout.size);
        }
        let mapped = match layout.name.as_str() {
            "void" => NativeType::Void,
            "bool" => NativeType::Bool,
            "int" => NativeType::Int,
            "uint" => NativeType::Uint,
            "float" => NativeType::Float,
            "string" => NativeType::String,
            name => vector_type(name).unwrap_or(NativeType::Raw(layout.size)),
        };
        if mapped.size() == layout.size {
            mapped
        } else {
            NativeType::Raw(layout.size)
        }
    }
}

fn vector_type(name: &str) -> Option<NativeType> {
    let (ctor, digits): (fn(u32) -> NativeType, &str) = if let Some(n) = name.strip_prefix("uint") {
        (NativeType::UintN, n)
    } else if let Some(n) = name.strip_prefix("int") {
        (NativeType::IntN, n)
    } else if let Some(n) = name.strip_prefix("float") {
        (NativeType::FloatN, n)
    } else {
        return None;
    };
    match digits.parse::<u32>() {
        Ok(n @ 1..=4) => Some(ctor(n)),
        _ => None,
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Void => f.write_str("void"),
            NativeType::Bool => f.write_str("bool"),
            NativeType::Int => f.write_str("int"),
            NativeType::Uint => f.write_str("uint"),
            NativeType::Float => f.write_str("float"),
            NativeType::IntN(n) => write!(f, "int{n}"),
            NativeType::UintN(n) => write!(f, "uint{n}"),
            NativeType::FloatN(n) => write!(f, "float{n}"),
            NativeType::String => f.write_str("string"),
            NativeType::Raw(n) => write!(f, "raw[{n}]"),
        }
    }
}

/// Parameter and return types of a native callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSignature {
    pub params: Vec<NativeType>,
    pub ret: NativeType,
}

impl NativeSignature {
    pub fn new(params: impl Into<Vec<NativeType>>, ret: NativeType) -> Self {
        Self {
            params: params.into(),
            ret,
        }
    }

    /// The signature reflected by the bundle for `desc`.
    pub fn from_extern(desc: &ExternDesc) -> Self {
        Self {
            params: desc.params.iter().map(NativeType::from_layout).collect(),
            ret: NativeType::from_layout(&desc.ret),
        }
    }

    /// Checks this signature against the reflected one.
    pub fn validate(&self, desc: &ExternDesc) -> Result<(), VmError> {
        let mismatch = |reason: String| VmError::SignatureMismatch {
            name: desc.name.clone(),
            reason,
        };

        if self.ret == NativeType::String {
            return Err(mismatch("string return values are not supported".into()));
        }
        if self.ret.size() != desc.ret.size {
            return Err(mismatch(format!(
                "return type {} is {} bytes, reflected {} is {} bytes",
                self.ret,
                self.ret.size(),
                desc.ret.display_name(),
                desc.ret.size
            )));
        }
        if self.params.len() != desc.params.len() {
            return Err(mismatch(format!(
                "{} parameters bound, {} reflected",
                self.params.len(),
                desc.params.len()
            )));
        }
        for (i, (native, reflected)) in self.params.iter().zip(&desc.params).enumerate() {
            if native.size() != reflected.size {
                return Err(mismatch(format!(
                    "parameter {i}: {native} is {} bytes, reflected {} is {} bytes",
                    native.size(),
                    reflected.display_name(),
                    reflected.size
                )));
            }
            if (*native == NativeType::String) != reflected.is_string() {
                return Err(mismatch(format!(
                    "parameter {i}: {native} bound against reflected {}",
                    reflected.display_name()
                )));
            }
        }
        Ok(())
    }
}

/// An owned value crossing the extern bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum ExternValue {
    Void,
    Bool(bool),
    Int(i32),
    Uint(u32),
    Float(f32),
    IntN(Vec<i32>),
    UintN(Vec<u32>),
    FloatN(Vec<f32>),
    Str(String),
    Raw(Vec<u8>),
}

impl ExternValue {
    /// The all-zero value of `ty`.
    pub fn zeroed(ty: NativeType) -> Self {
        match ty {
            NativeType::Void => ExternValue::Void,
            NativeType::Bool => ExternValue::Bool(false),
            NativeType::Int => ExternValue::Int(0),
            NativeType::Uint => ExternValue::Uint(0),
            NativeType::Float => ExternValue::Float(0.0),
            NativeType::IntN(n) => ExternValue::IntN(vec![0; n as usize]),
            NativeType::UintN(n) => ExternValue::UintN(vec![0; n as usize]),
            NativeType::FloatN(n) => ExternValue::FloatN(vec![0.0; n as usize]),
            NativeType::String => ExternValue::Str(String::new()),
            NativeType::Raw(n) => ExternValue::Raw(vec![0; n as usize]),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            ExternValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            ExternValue::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            ExternValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ExternValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExternValue::Str(s) => Some(s),
            _ => None,
        }
    }

    fn matches(&self, ty: NativeType) -> bool {
        match (self, ty) {
            (ExternValue::Void, NativeType::Void)
            | (ExternValue::Bool(_), NativeType::Bool)
            | (ExternValue::Int(_), NativeType::Int)
            | (ExternValue::Uint(_), NativeType::Uint)
            | (ExternValue::Float(_), NativeType::Float) => true,
            (ExternValue::IntN(v), NativeType::IntN(n)) => v.len() == n as usize,
            (ExternValue::UintN(v), NativeType::UintN(n)) => v.len() == n as usize,
            (ExternValue::FloatN(v), NativeType::FloatN(n)) => v.len() == n as usize,
            (ExternValue::Raw(v), NativeType::Raw(n)) => v.len() == n as usize,
            _ => false,
        }
    }

    /// Packs the value into `out` (exactly the value's size). Strings are not packable.
    fn encode(&self, out: &mut [u8]) {
        fn put(out: &mut [u8], i: usize, word: u32) {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_ne_bytes());
        }
        match self {
            ExternValue::Void | ExternValue::Str(_) => {}
            ExternValue::Bool(v) => put(out, 0, u32::from(*v)),
            ExternValue::Int(v) => put(out, 0, *v as u32),
            ExternValue::Uint(v) => put(out, 0, *v),
            ExternValue::Float(v) => put(out, 0, v.to_bits()),
            ExternValue::IntN(v) => v.iter().enumerate().for_each(|(i, x)| put(out, i, *x as u32)),
            ExternValue::UintN(v) => v.iter().enumerate().for_each(|(i, x)| put(out, i, *x)),
            ExternValue::FloatN(v) => {
                v.iter().enumerate().for_each(|(i, x)| put(out, i, x.to_bits()))
            }
            ExternValue::Raw(v) => out.copy_from_slice(v),
        }
    }
}

impl fmt::Display for ExternValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternValue::Void => f.write_str("void"),
            ExternValue::Bool(v) => write!(f, "{v}"),
            ExternValue::Int(v) => write!(f, "{v}"),
            ExternValue::Uint(v) => write!(f, "{v}"),
            ExternValue::Float(v) => write!(f, "{v}"),
            ExternValue::IntN(v) => write!(f, "{v:?}"),
            ExternValue::UintN(v) => write!(f, "{v:?}"),
            ExternValue::FloatN(v) => write!(f, "{v:?}"),
            ExternValue::Str(s) => f.write_str(s),
            ExternValue::Raw(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl From<()> for ExternValue {
    fn from(_: ()) -> Self {
        ExternValue::Void
    }
}

impl From<bool> for ExternValue {
    fn from(v: bool) -> Self {
        ExternValue::Bool(v)
    }
}

impl From<i32> for ExternValue {
    fn from(v: i32) -> Self {
        ExternValue::Int(v)
    }
}

impl From<u32> for ExternValue {
    fn from(v: u32) -> Self {
        ExternValue::Uint(v)
    }
}

impl From<f32> for ExternValue {
    fn from(v: f32) -> Self {
        ExternValue::Float(v)
    }
}

impl From<&str> for ExternValue {
    fn from(v: &str) -> Self {
        ExternValue::Str(v.to_owned())
    }
}

/// A bound host callback.
pub type ExternFn = Box<dyn FnMut(&[ExternValue]) -> ExternValue + Send>;

struct Binding {
    signature: NativeSignature,
    callback: ExternFn,
}

/// Per-bundle table of bound callbacks, indexed by extern id.
pub(crate) struct ExternTable {
    bindings: Vec<Option<Binding>>,
    unbound_calls: Vec<u64>,
}

impl fmt::Debug for ExternTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternTable")
            .field(
                "bound",
                &self.bindings.iter().map(Option::is_some).collect::<Vec<_>>(),
            )
            .field("unbound_calls", &self.unbound_calls)
            .finish()
    }
}

impl ExternTable {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            bindings: (0..count).map(|_| None).collect(),
            unbound_calls: vec![0; count],
        }
    }

    pub(crate) fn bind(
        &mut self,
        desc: &ExternDesc,
        signature: NativeSignature,
        callback: ExternFn,
    ) -> Result<(), VmError> {
        signature.validate(desc)?;
        let slot = self
            .bindings
            .get_mut(desc.id as usize)
            .ok_or_else(|| VmError::UnknownExtern(format!("#{}", desc.id)))?;
        *slot = Some(Binding {
            signature,
            callback,
        });
        Ok(())
    }

    pub(crate) fn clear(&mut self, id: u32) {
        if let Some(slot) = self.bindings.get_mut(id as usize) {
            *slot = None;
        }
    }

    pub(crate) fn is_bound(&self, id: u32) -> bool {
        matches!(self.bindings.get(id as usize), Some(Some(_)))
    }

    pub(crate) fn unbound_calls(&self, id: u32) -> u64 {
        self.unbound_calls.get(id as usize).copied().unwrap_or(0)
    }

    /// Executes `I32ExternCall`. Returns `true` if a callback ran.
    pub(crate) fn call(
        &mut self,
        desc: &ExternDesc,
        ret_register: u32,
        regs: &mut RegisterFile,
        constants: &MemoryView,
    ) -> Result<bool, VmError> {
        let id = desc.id as usize;
        let base = ret_register as usize * 4;

        let Some(Some(binding)) = self.bindings.get_mut(id) else {
            let ret = register_bytes(regs, base, desc.ret.size as usize)?;
            ret.fill(0);
            let calls = match self.unbound_calls.get_mut(id) {
                Some(calls) => {
                    *calls += 1;
                    *calls
                }
                None => return Err(VmError::UnknownExtern(format!("#{id}"))),
            };
            if calls == 1 {
                warn!(extern_id = id, name = %desc.name, "call to unbound extern; returning zeroes");
            } else {
                debug!(extern_id = id, name = %desc.name, calls, "call to unbound extern");
            }
            return Ok(false);
        };

        let ret_size = binding.signature.ret.size() as usize;
        let mut offset = base + ret_size;
        let mut args = Vec::with_capacity(binding.signature.params.len());
        for &ty in &binding.signature.params {
            let size = ty.size() as usize;
            let bytes = register_bytes(regs, offset, size)?;
            args.push(decode_arg(ty, bytes, constants)?);
            offset += size;
        }

        let value = (binding.callback)(&args);
        if !value.matches(binding.signature.ret) {
            return Err(VmError::SignatureMismatch {
                name: desc.name.clone(),
                reason: format!(
                    "callback returned {value:?}, expected {}",
                    binding.signature.ret
                ),
            });
        }
        value.encode(register_bytes(regs, base, ret_size)?);
        Ok(true)
    }
}

fn register_bytes(regs: &mut RegisterFile, offset: usize, size: usize) -> Result<&mut [u8], VmError> {
    let len = regs.len();
    offset
        .checked_add(size)
        .and_then(|end| regs.as_bytes_mut().get_mut(offset..end))
        .ok_or_else(|| VmError::IndexOutOfRange {
            space: Space::Register,
            index: (offset.saturating_add(size.max(1) - 1) / 4) as i64,
            len,
        })
}

fn decode_arg(ty: NativeType, bytes: &[u8], constants: &MemoryView) -> Result<ExternValue, VmError> {
    let word = |i: usize| {
        let w = &bytes[i * 4..i * 4 + 4];
        u32::from_ne_bytes([w[0], w[1], w[2], w[3]])
    };
    let n = bytes.len() / 4;
    Ok(match ty {
        NativeType::Void => ExternValue::Void,
        NativeType::Bool => ExternValue::Bool(word(0) != 0),
        NativeType::Int => ExternValue::Int(word(0) as i32),
        NativeType::Uint => ExternValue::Uint(word(0)),
        NativeType::Float => ExternValue::Float(f32::from_bits(word(0))),
        NativeType::IntN(_) => ExternValue::IntN((0..n).map(|i| word(i) as i32).collect()),
        NativeType::UintN(_) => ExternValue::UintN((0..n).map(word).collect()),
        NativeType::FloatN(_) => {
            ExternValue::FloatN((0..n).map(|i| f32::from_bits(word(i))).collect())
        }
        NativeType::String => ExternValue::Str(read_constant_string(constants, word(0))?),
        NativeType::Raw(_) => ExternValue::Raw(bytes.to_vec()),
    })
}

/// Reads the `{u32 len, bytes}` string stored at byte `offset` of the constants.
pub(crate) fn read_constant_string(constants: &MemoryView, offset: u32) -> Result<String, VmError> {
    let offset = offset as usize;
    let mut len = [0u8; 4];
    constants
        .read_bytes(offset, &mut len)
        .map_err(|e| e.into_vm(Space::Constants))?;
    let len = u32::from_le_bytes(len) as usize;
    let mut bytes = vec![0u8; len.min(constants.byte_len())];
    if bytes.len() != len {
        return Err(VmError::out_of_range(
            Space::Constants,
            ((offset + 4 + len) / 4) as i64,
            constants.len(),
        ));
    }
    constants
        .read_bytes(offset + 4, &mut bytes)
        .map_err(|e| e.into_vm(Space::Constants))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// The built-in `trace` extern: logs its arguments and returns zeroes.
pub(crate) fn trace_extern(bundle_name: &str, signature: &NativeSignature) -> ExternFn {
    let bundle = bundle_name.to_owned();
    let ret = signature.ret;
    Box::new(move |args: &[ExternValue]| {
        let line = args
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "fxvm::trace", bundle = %bundle, "{line}");
        ExternValue::zeroed(ret)
    })
}
