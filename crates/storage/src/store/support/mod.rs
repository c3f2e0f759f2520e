#![forbid(unsafe_code)]

mod dependencies_tx;
mod documents_tx;
mod holdings_tx;
mod identifiers_tx;
mod schema;
mod versions_tx;

pub(super) use dependencies_tx::*;
pub(super) use documents_tx::*;
pub(super) use holdings_tx::*;
pub(super) use identifiers_tx::*;
pub(super) use schema::{Tables, install_schema};
pub(super) use versions_tx::*;
