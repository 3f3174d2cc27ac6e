//! The element layer: codec, element cache, registry, ownership tracking,
//! and event dispatch. Driven by [`Session`](crate::Session).

pub mod codec;
pub(crate) mod dispatch;
pub mod element;
pub(crate) mod ownership;
pub(crate) mod registry;
