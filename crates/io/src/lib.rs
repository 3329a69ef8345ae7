//! # yieldkf-io
//!
//! Parquet storage for yield panels and factor tables, and JSON storage for
//! learned parameter sets. Bridges files into the `yieldkf-curve` data model.
//!
//! | File | Layout |
//! |------|--------|
//! | yields | `date` (Date32), then one nullable Float64 column per maturity label |
//! | factors | `date` (Date32), then one Float64 column per factor name |
//! | parameters | [`ParameterSet`] JSON, covariances as lower triangles |

mod date32;
mod error;
mod params;
mod parquet_read;
mod parquet_write;
mod reader;
mod writer;

pub use error::IoError;
pub use params::{ParameterSet, read_params, write_params};
pub use reader::{read_factors, read_yields};
pub use writer::{Compression, WriterConfig, write_factors, write_yields};
