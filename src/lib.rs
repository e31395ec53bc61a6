//! Shared expenses with participant reconciliation.
//!
//! The client side ([`save`], [`reconcile`]) turns an edited expense into the
//! add/update/remove calls the remote API understands and compensates when a
//! sequence fails halfway. [`server`] is that remote API.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod reconcile;
pub mod remote;
pub mod save;
pub mod schemas;
pub mod server;
pub mod session;
pub mod totals;

pub use error::{NextAction, RemoteError, SaveError, ValidationError};
pub use reconcile::{EqualSplit, Reconciler};
pub use save::{save_expense, DesiredState, ExpenseDraft, ExpenseSaver, SaveMode};
