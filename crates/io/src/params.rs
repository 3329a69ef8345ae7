//! JSON persistence of learned model parameters.

use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::info;
use yieldkf_curve::parse_maturities;
use yieldkf_ssm::{EmFit, StateSpaceModel};

use crate::error::IoError;

/// A serialisable snapshot of a [`StateSpaceModel`] over labelled
/// maturities.
///
/// Covariances are stored as their lower triangle: row `i` holds `i + 1`
/// entries. The observation matrix is not stored; it is rebuilt from the
/// maturity labels and the factor count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSet {
    /// Maturity labels, e.g. `"3 MO"`, in column order.
    pub labels: Vec<String>,
    /// Number of latent factors.
    pub n_factors: usize,
    /// Transition matrix `A`, row by row.
    pub transition_matrix: Vec<Vec<f64>>,
    /// Transition offsets `b`.
    pub transition_offsets: Vec<f64>,
    /// Lower triangle of `Q`.
    pub transition_covariance: Vec<Vec<f64>>,
    /// Observation offsets `d`, one per label.
    pub observation_offsets: Vec<f64>,
    /// Lower triangle of `R`.
    pub observation_covariance: Vec<Vec<f64>>,
    /// Pre-sample state mean `μ₀`.
    pub initial_state_mean: Vec<f64>,
    /// Lower triangle of `Σ₀`.
    pub initial_state_covariance: Vec<Vec<f64>>,
    /// Final log-likelihood of the training run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_likelihood: Option<f64>,
    /// EM iterations run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
}

impl ParameterSet {
    /// Snapshots `model`, whose observation rows correspond to `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Validation`] if the label count differs from the
    /// model's observation dimension.
    pub fn from_model<S: AsRef<str>>(
        labels: &[S],
        model: &StateSpaceModel,
    ) -> Result<Self, IoError> {
        if labels.len() != model.obs_dim() {
            return Err(IoError::validation(format!(
                "{} labels for a model observing {} maturities",
                labels.len(),
                model.obs_dim()
            )));
        }
        Ok(Self {
            labels: labels.iter().map(|l| l.as_ref().to_string()).collect(),
            n_factors: model.state_dim(),
            transition_matrix: rows(model.transition_matrix()),
            transition_offsets: model.transition_offsets().to_vec(),
            transition_covariance: lower_triangle(model.transition_covariance()),
            observation_offsets: model.observation_offsets().to_vec(),
            observation_covariance: lower_triangle(model.observation_covariance()),
            initial_state_mean: model.initial_state_mean().to_vec(),
            initial_state_covariance: lower_triangle(model.initial_state_covariance()),
            log_likelihood: None,
            iterations: None,
        })
    }

    /// Snapshots the model of a finished EM run along with its final
    /// log-likelihood and iteration count.
    pub fn from_fit<S: AsRef<str>>(labels: &[S], fit: &EmFit) -> Result<Self, IoError> {
        let mut set = Self::from_model(labels, fit.model())?;
        set.log_likelihood = Some(fit.log_likelihood());
        set.iterations = Some(fit.iterations());
        Ok(set)
    }

    /// Rebuilds the model, validating every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Validation`] for ragged matrices or malformed
    /// triangles, [`IoError::Curve`] for bad labels, and [`IoError::Ssm`]
    /// when a parameter fails model validation.
    pub fn to_model(&self) -> Result<StateSpaceModel, IoError> {
        let maturities = parse_maturities(&self.labels)?;
        let n = self.n_factors;
        Ok(StateSpaceModel::from_maturities(&maturities, n)?
            .with_transition_matrix(from_rows(&self.transition_matrix, n, "transition_matrix")?)?
            .with_transition_offsets(Array1::from(self.transition_offsets.clone()))?
            .with_transition_covariance(from_lower_triangle(
                &self.transition_covariance,
                "transition_covariance",
            )?)?
            .with_observation_offsets(Array1::from(self.observation_offsets.clone()))?
            .with_observation_covariance(from_lower_triangle(
                &self.observation_covariance,
                "observation_covariance",
            )?)?
            .with_initial_state_mean(Array1::from(self.initial_state_mean.clone()))?
            .with_initial_state_covariance(from_lower_triangle(
                &self.initial_state_covariance,
                "initial_state_covariance",
            )?)?)
    }
}

/// Writes a parameter set as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`IoError::Filesystem`] if the file cannot be written or
/// [`IoError::Json`] if serialisation fails.
pub fn write_params(path: &Path, params: &ParameterSet) -> Result<(), IoError> {
    let file = std::fs::File::create(path).map_err(|e| IoError::filesystem(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, params)?;
    writer.flush().map_err(|e| IoError::filesystem(path, e))?;
    info!(path = %path.display(), n_factors = params.n_factors, "wrote parameter set");
    Ok(())
}

/// Reads a parameter set written by [`write_params`].
///
/// # Errors
///
/// Returns [`IoError::FileNotFound`] if the file does not exist or
/// [`IoError::Json`] if it does not parse.
pub fn read_params(path: &Path) -> Result<ParameterSet, IoError> {
    if !path.exists() {
        return Err(IoError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = std::fs::File::open(path).map_err(|e| IoError::filesystem(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn rows(a: &Array2<f64>) -> Vec<Vec<f64>> {
    a.rows().into_iter().map(|r| r.to_vec()).collect()
}

fn from_rows(rows: &[Vec<f64>], n_cols: usize, name: &str) -> Result<Array2<f64>, IoError> {
    if let Some(i) = rows.iter().position(|r| r.len() != n_cols) {
        return Err(IoError::validation(format!(
            "{name}: row {i} has {} entries, expected {n_cols}",
            rows[i].len()
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), n_cols), flat)
        .map_err(|e| IoError::validation(format!("{name}: {e}")))
}

/// Lower triangle of a square matrix, row by row.
pub(crate) fn lower_triangle(a: &Array2<f64>) -> Vec<Vec<f64>> {
    (0..a.nrows())
        .map(|i| (0..=i).map(|j| a[[i, j]]).collect())
        .collect()
}

/// Symmetric matrix from its lower triangle.
pub(crate) fn from_lower_triangle(tri: &[Vec<f64>], name: &str) -> Result<Array2<f64>, IoError> {
    let n = tri.len();
    let mut out = Array2::zeros((n, n));
    for (i, row) in tri.iter().enumerate() {
        if row.len() != i + 1 {
            return Err(IoError::validation(format!(
                "{name}: triangle row {i} has {} entries, expected {}",
                row.len(),
                i + 1
            )));
        }
        for (j, &v) in row.iter().enumerate() {
            out[[i, j]] = v;
            out[[j, i]] = v;
        }
    }
    Ok(out)
}
