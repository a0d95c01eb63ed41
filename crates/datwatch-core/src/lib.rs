pub mod config;
pub mod convert;
pub mod epic;
pub mod error;
pub mod export;
pub mod ledger;
pub mod scan;
pub mod tracker;

#[cfg(feature = "runtime")]
pub mod daemon;
