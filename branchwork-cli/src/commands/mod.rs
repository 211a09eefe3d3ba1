//! CLI command implementations
//!
//! Results are printed to stdout as JSON; logs go to stderr.

pub mod read;
pub mod write;

pub use read::{CatArgs, ChangedArgs, DirArgs, LogArgs, LsArgs, ShowArgs};
pub use write::{CheckoutArgs, CommitArgs, PrArgs};

use serde::Serialize;

/// Print `value` as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
