//! Executable code buffer (spec §4.9, §5 "Shared resources").
//!
//! Allocated write+read, populated by the binary emitter, then flipped to
//! read+execute once fixups are applied. A protection-change failure is a
//! warning per spec §4.11: the buffer stays usable as data, just not
//! runnable, rather than aborting the compilation.

use crate::error::{CodegenError, CodegenResult};
use region::Protection;

pub struct CodeBuffer {
    alloc: region::Allocation,
    len: usize,
}

impl CodeBuffer {
    /// Allocate `capacity` bytes of write+read memory.
    pub fn new(capacity: usize) -> CodegenResult<Self> {
        let alloc = region::alloc(capacity.max(1), Protection::READ_WRITE).map_err(|e| CodegenError::BufferAlloc(e.to_string()))?;
        Ok(CodeBuffer { alloc, len: 0 })
    }

    /// Append `bytes` to the buffer. Panics if it would overrun the
    /// allocation; callers size the buffer from the same encoding pass
    /// that produces these bytes, so this never fires in practice.
    pub fn write(&mut self, bytes: &[u8]) {
        assert!(self.len + bytes.len() <= self.alloc.len(), "code buffer overrun");
        let dst = unsafe { std::slice::from_raw_parts_mut(self.alloc.as_mut_ptr::<u8>(), self.alloc.len()) };
        dst[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Patch `len` bytes starting at `offset` (a fixup site already
    /// written with a placeholder displacement).
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        assert!(offset + bytes.len() <= self.len, "patch out of written range");
        let dst = unsafe { std::slice::from_raw_parts_mut(self.alloc.as_mut_ptr::<u8>(), self.alloc.len()) };
        dst[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.alloc.as_ptr::<u8>()
    }

    /// Flip the page(s) backing this buffer from write+read to
    /// read+execute. On failure, logs a warning and leaves the buffer
    /// writable rather than returning a fatal error.
    pub fn make_executable(&mut self) {
        let result = unsafe { region::protect(self.alloc.as_ptr::<u8>(), self.alloc.len(), Protection::READ_EXECUTE) };
        if let Err(e) = result {
            log::warn!("page-protection change to read+execute failed, buffer remains writable: {e}");
        }
    }

    /// Cast the populated prefix of the buffer to a callable function
    /// pointer of the handler ABI (spec §6: `int32 (*)(ExchangeBuffer**, int, HandlerState*)`).
    ///
    /// # Safety
    /// The caller must have called [`Self::make_executable`] successfully
    /// and must not call this before the buffer holds a complete,
    /// correctly laid out function body.
    pub unsafe fn as_handler_fn(&self) -> crate::driver::HandlerFn {
        std::mem::transmute::<*const u8, crate::driver::HandlerFn>(self.as_ptr())
    }
}
