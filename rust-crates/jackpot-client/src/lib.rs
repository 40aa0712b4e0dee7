pub mod activity;
pub mod config;
pub mod derive;
pub mod discovery;
pub mod error;
pub mod ledger;
pub mod purchase;
pub mod reactive;
pub mod rpc;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::{
    Error,
    Result,
};
