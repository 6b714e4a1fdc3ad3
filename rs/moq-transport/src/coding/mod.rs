//! Wire encoding and buffered stream I/O.

mod decode;
mod encode;
mod reader;
mod stream;
mod varint;
mod writer;

pub use decode::*;
pub use encode::*;
pub use reader::*;
pub use stream::*;
pub use varint::*;
pub use writer::*;
