//! Memory region registry.
//!
//! A [`MemoryController`] holds up to [`MemoryController::MAX_REGIONS`]
//! [`Region`]s and answers bus transactions on `MREQ`/`RD`/`WR`. Overlap
//! between regions is permitted by design: reads resolve to the first
//! enabled region covering the address (registration order), writes land in
//! every writable region covering the address.

mod controller;
mod error;
mod region;

pub use controller::MemoryController;
pub use error::MemoryError;
pub use region::Region;
