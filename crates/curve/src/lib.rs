//! # yieldkf-curve
//!
//! Boundary data model between yield data and the state-space engine.
//!
//! ```mermaid
//! graph LR
//!     A["YieldPanel::new(dates, labels, rows)?"] -->|".observations()?"| B["Observations"]
//!     A -->|".model(3)?"| C["StateSpaceModel"]
//!     B --> D["filter / smooth"]
//!     D -->|"FactorTable::from_means(dates, means)?"| E["FactorTable"]
//!     E -->|".since(start)"| E
//! ```
//!
//! Maturity labels follow the `"<n> MO"` / `"<n> YR"` convention of US
//! Treasury par yield tables.

mod error;
mod factors;
mod maturity;
mod panel;

pub use error::CurveError;
pub use factors::{FactorTable, factor_names};
pub use maturity::{parse_maturities, parse_maturity};
pub use panel::YieldPanel;
