//! Generational handle tables and frame timing helpers.

pub mod handle_table;
pub mod logging;

pub use handle_table::{HandleTable, ResourceId};
pub use logging::{warn_if_frame_budget_exceeded, ScopedTimer};
