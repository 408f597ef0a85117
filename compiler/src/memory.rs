// memory.rs — Buffer contract between resolved struct info and an allocator
//
// The core only computes what a value needs; serving buffers is left to an
// `Allocator` implementation outside this crate.

use std::fmt;

use crate::struct_info::StructInfo;

/// Minimum alignment of any buffer, in bytes.
pub const MIN_ALIGNMENT: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    Gpu(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(i) => write!(f, "gpu:{i}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub bytes: u64,
    pub alignment: u64,
}

impl BufferRequest {
    /// Size and alignment of a tensor whose shape and dtype are fully known
    /// literals; `None` for anything else, including negative dims and
    /// sizes that overflow `u64`.
    pub fn for_struct_info(sinfo: &StructInfo) -> Option<BufferRequest> {
        let tensor = sinfo.as_tensor()?;
        let dtype = tensor.dtype()?;
        let mut elements: u64 = 1;
        for dim in tensor.static_shape()? {
            elements = elements.checked_mul(u64::try_from(dim).ok()?)?;
        }
        Some(BufferRequest {
            bytes: elements.checked_mul(dtype.bytes())?,
            alignment: dtype.bytes().max(MIN_ALIGNMENT),
        })
    }
}

/// Handle to memory served by an allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    pub id: u64,
    pub bytes: u64,
    pub alignment: u64,
    pub device: Device,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    OutOfMemory { requested: u64, device: Device },
    UnknownBuffer(u64),
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory { requested, device } => {
                write!(f, "cannot allocate {requested} bytes on {device}")
            }
            AllocError::UnknownBuffer(id) => write!(f, "buffer {id} was not allocated here"),
        }
    }
}

impl std::error::Error for AllocError {}

/// Serves buffers once shapes are resolved.
pub trait Allocator {
    fn allocate(&mut self, bytes: u64, alignment: u64, device: Device) -> Result<Buffer, AllocError>;
    fn free(&mut self, buffer: Buffer) -> Result<(), AllocError>;

    /// Allocate for a value with fully static struct info; `None` when the
    /// size is not known.
    fn allocate_for(
        &mut self,
        sinfo: &StructInfo,
        device: Device,
    ) -> Option<Result<Buffer, AllocError>> {
        let req = BufferRequest::for_struct_info(sinfo)?;
        Some(self.allocate(req.bytes, req.alignment, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dim::PrimExpr;
    use crate::struct_info::{DataType, TensorStructInfo};
    use std::collections::HashMap;

    #[test]
    fn static_tensor_request() {
        let req = BufferRequest::for_struct_info(&StructInfo::tensor_static(&[2, 3], DataType::Float32));
        assert_eq!(
            req,
            Some(BufferRequest {
                bytes: 24,
                alignment: 64
            })
        );
        let scalar = BufferRequest::for_struct_info(&StructInfo::tensor_static(&[], DataType::Int8));
        assert_eq!(scalar.map(|r| r.bytes), Some(1));
    }

    #[test]
    fn unresolved_values_have_no_request() {
        let symbolic = StructInfo::tensor(vec![PrimExpr::var("n")], DataType::Float32);
        assert_eq!(BufferRequest::for_struct_info(&symbolic), None);
        let no_dtype = StructInfo::Tensor(TensorStructInfo::new(vec![PrimExpr::Int(4)], None));
        assert_eq!(BufferRequest::for_struct_info(&no_dtype), None);
        assert_eq!(BufferRequest::for_struct_info(&StructInfo::Unknown), None);
        let negative = StructInfo::tensor_static(&[-1], DataType::Float32);
        assert_eq!(BufferRequest::for_struct_info(&negative), None);
    }

    /// Bump allocator with a byte limit.
    #[derive(Default)]
    struct Bump {
        next: u64,
        used: u64,
        limit: u64,
        live: HashMap<u64, u64>,
    }

    impl Allocator for Bump {
        fn allocate(&mut self, bytes: u64, alignment: u64, device: Device) -> Result<Buffer, AllocError> {
            if self.used + bytes > self.limit {
                return Err(AllocError::OutOfMemory {
                    requested: bytes,
                    device,
                });
            }
            self.next += 1;
            self.used += bytes;
            self.live.insert(self.next, bytes);
            Ok(Buffer {
                id: self.next,
                bytes,
                alignment,
                device,
            })
        }

        fn free(&mut self, buffer: Buffer) -> Result<(), AllocError> {
            let bytes = self
                .live
                .remove(&buffer.id)
                .ok_or(AllocError::UnknownBuffer(buffer.id))?;
            self.used -= bytes;
            Ok(())
        }
    }

    #[test]
    fn allocator_contract() {
        let mut a = Bump {
            limit: 100,
            ..Default::default()
        };
        let t = StructInfo::tensor_static(&[4, 4], DataType::Float32);
        let buf = a.allocate_for(&t, Device::Cpu).unwrap().unwrap();
        assert_eq!((buf.bytes, buf.alignment), (64, 64));
        assert!(matches!(
            a.allocate_for(&t, Device::Gpu(0)),
            Some(Err(AllocError::OutOfMemory { requested: 64, .. }))
        ));
        a.free(buf.clone()).unwrap();
        assert_eq!(a.free(buf), Err(AllocError::UnknownBuffer(1)));
    }
}
