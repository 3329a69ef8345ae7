//! # yieldkf-ssm
//!
//! Linear-Gaussian state-space engine for latent yield-curve factors:
//! model specification, Kalman filtering with per-dimension missing data,
//! Rauch-Tung-Striebel smoothing and EM parameter estimation.
//!
//! ## Workflow
//!
//! ```mermaid
//! graph LR
//!     A["StateSpaceModel::from_maturities(&τ, 3)?"] -->|"filter(&model, &obs)?"| B["FilterResult"]
//!     B -->|"smooth(&model, &filtered)?"| C["SmoothResult"]
//!     A -->|"EmEstimator::new(config)?.fit(&model, &obs)?"| D["EmFit"]
//!     D -->|".into_model()"| A
//!     A --> E[".simulate(T, &mut rng)"]
//! ```
//!
//! ## Example
//!
//! ```
//! use yieldkf_ssm::{Observations, StateSpaceModel, filter_and_smooth};
//!
//! let model = StateSpaceModel::from_maturities(&[0.5, 2.0, 10.0], 3)?;
//! let obs = Observations::from_rows(&[
//!     vec![Some(1.2), Some(1.8), Some(2.9)],
//!     vec![Some(1.3), None, Some(3.0)],
//! ])?;
//! let (filtered, smoothed) = filter_and_smooth(&model, &obs)?;
//! assert_eq!(filtered.filtered_means().dim(), (2, 3));
//! assert_eq!(smoothed.smoothed_means().dim(), (2, 3));
//! # Ok::<(), yieldkf_ssm::SsmError>(())
//! ```
//!
//! ## Mathematical Glossary
//!
//! | Symbol | Accessor | Meaning |
//! |--------|----------|---------|
//! | A | [`StateSpaceModel::transition_matrix()`] | Factor dynamics |
//! | b | [`StateSpaceModel::transition_offsets()`] | Factor drift |
//! | Q | [`StateSpaceModel::transition_covariance()`] | Factor shock covariance |
//! | C | [`StateSpaceModel::observation_matrix()`] | Loadings, `C[i][j] = τᵢʲ` |
//! | d | [`StateSpaceModel::observation_offsets()`] | Per-maturity bias |
//! | R | [`StateSpaceModel::observation_covariance()`] | Measurement noise covariance |
//! | μ₀, Σ₀ | [`StateSpaceModel::initial_state()`] | Pre-sample state belief |
//! | ℓ | [`FilterResult::log_likelihood()`] | Observed-data log-likelihood |

mod config;
mod em;
mod error;
mod filter;
mod linalg;
mod model;
mod observation;
mod simulate;
mod smoother;
mod state;

pub use config::{EmConfig, EmParam, EmVars};
pub use em::{EmDiagnostic, EmEstimator, EmFit, EmPhase, EmState, fit};
pub use error::{CovarianceStage, SsmError};
pub use filter::{FilterResult, filter, predict, update};
pub use linalg::is_positive_semidefinite;
pub use model::{FACTOR_NAMES, ModelMatrices, StateSpaceModel};
pub use observation::Observations;
pub use simulate::SimulatedPath;
pub use smoother::{PreSample, SmoothResult, filter_and_smooth, smooth};
pub use state::GaussianState;
