//! Domain services for the invite pool.
//!
//! Services contain the business rules and talk to storage only through the
//! [`InviteStore`] trait, so the same code runs against PostgreSQL and the
//! in-memory store.

pub mod allocation;
pub mod contribution;
pub mod inventory;
pub mod memory_store;
pub mod store;

pub use allocation::{AllocationService, FeedbackOutcome};
pub use contribution::ContributionService;
pub use inventory::InventoryService;
pub use memory_store::MemoryInviteStore;
pub use store::{AdminRepository, AllocationStore, CodeRepository, InviteStore, UsageLedger};
