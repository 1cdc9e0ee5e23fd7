//! Code emission: executable buffer, binary encoder, text assembly
//! (spec §4.9).

pub mod asm;
pub mod binary;
pub mod buffer;

pub use asm::emit_asm;
pub use binary::{emit_binary, FixupSite, InstEncoder};
pub use buffer::CodeBuffer;
