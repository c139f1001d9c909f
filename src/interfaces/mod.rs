//! Outer adapters that turn files into commands and results into files.

pub mod csv;
