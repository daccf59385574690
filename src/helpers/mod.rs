//! Low-level readers shared by the spreadsheet sources.
pub(crate) mod xml;
pub(crate) mod zip;
