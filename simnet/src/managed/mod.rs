//! Containers with stable keys.
mod slotmap;

pub use self::slotmap::{Key, SlotMap};
