//! # Bulkload - Offline Table-File Builder
//!
//! Reads hourly page-view dumps and writes them as sorted, immutable segment
//! files ready for a bulk import into a wide-column store.
//!
//! | Module       | Purpose                                               |
//! |--------------|-------------------------------------------------------|
//! | [`input`]    | file-name timestamps, gzip record stream               |
//! | [`pipeline`] | `run()`: files → mapper → `TableWriter`, `RunSummary`  |

pub mod input;
pub mod pipeline;

pub use input::{parse_timestamp, InputError, Record, RecordReader};
pub use pipeline::{run, RunSummary};

#[cfg(test)]
mod tests;
