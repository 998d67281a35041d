//! Domain layer for the cashier admin panel.
//!
//! Holds the record types shared with storage, draft validation, and the
//! declarative page configuration the HTTP runtime consults for every
//! resource screen.

pub mod resource;
pub mod types;
pub mod widgets;

pub use resource::{HeaderAction, PageKind, Resource, ResourcePage, Tab};
pub use types::{TransactionFilter, TransactionStatus, ValidationErrors};
