//! rpgtop - live view of PostgreSQL backend sessions.
//!
//! The library is split the same way the binary runs:
//! - `config`: resolved, immutable startup configuration
//! - `source`: data source contracts (`Connector`, `DataSource`)
//! - `session`: connection state machine with password retry
//! - `mode`: active display mode and its acquisition call
//! - `delta`: interval-over-interval rates (disk I/O, TPS, size growth)
//! - `poll`: one acquisition/merge/render cycle
//! - `lifecycle`: terminal ownership, signals, reconnect loop
//! - `collector`: PostgreSQL source, `/proc` parsers and process merger
//! - `tui`: ratatui renderer, key bindings, password prompt
//! - `export`: JSON-lines snapshot export

pub mod collector;
pub mod config;
pub mod delta;
pub mod error;
pub mod export;
pub mod layout;
pub mod lifecycle;
pub mod model;
pub mod mode;
pub mod poll;
pub mod session;
pub mod source;
pub mod tui;

#[cfg(test)]
pub(crate) mod testing;
