//! JVM class-file model: constant pool, class structure, and the instruction
//! walk used to attribute pool references to the methods containing them.
//!
//! Only the structures the scanner and remapper need are parsed eagerly;
//! attribute payloads are kept as raw bytes and re-emitted verbatim, which is
//! what makes a pool-level rename safe: every instruction operand addresses
//! the pool by index, never by offset.

mod code;
mod pool;
mod unit;

pub use code::{decode_code_refs, parse_code_attribute, CodeAttribute, CodeRef};
pub use pool::{Constant, ConstantPool};
pub use unit::{AttributeInfo, MemberInfo, ObjectCodeUnit};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassFileError {
    #[error("Class file truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("Bad class file magic: {0:#010x}")]
    BadMagic(u32),

    #[error("Unknown constant pool tag {tag} at pool index {index}")]
    UnknownPoolTag { tag: u8, index: u16 },

    #[error("Constant pool index {0} out of range or wrong kind")]
    BadPoolIndex(u16),

    #[error("Malformed Code attribute: {0}")]
    MalformedCode(String),
}
