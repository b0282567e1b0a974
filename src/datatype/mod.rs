//! Native datatype representation: flattened type maps and the handles that
//! own them.

pub mod handle;
pub mod typemap;

pub use handle::{NativeHandle, is_live};
pub use typemap::{ArrayOrder, Block, TypeMap};
