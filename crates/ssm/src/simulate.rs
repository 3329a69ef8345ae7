//! Synthetic trajectories drawn from a model.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::SsmError;
use crate::linalg;
use crate::model::StateSpaceModel;
use crate::observation::Observations;

/// Latent states and observations drawn by [`StateSpaceModel::simulate`].
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedPath {
    /// Latent states `x[0..T]`, `T × n`.
    pub states: Array2<f64>,
    /// Observations `y[0..T]`, `T × m`, all present.
    pub observations: Array2<f64>,
}

impl SimulatedPath {
    /// Wraps the observations as fully observed [`Observations`].
    pub fn to_observations(&self) -> Result<Observations, SsmError> {
        Observations::fully_observed(self.observations.clone())
    }
}

fn gaussian<R: Rng + ?Sized>(root: &Array2<f64>, rng: &mut R) -> Array1<f64> {
    let z: Array1<f64> = (0..root.ncols())
        .map(|_| -> f64 { StandardNormal.sample(&mut *rng) })
        .collect();
    root.dot(&z)
}

impl StateSpaceModel {
    /// Draws `n_steps` latent states and observations.
    ///
    /// The pre-sample state is drawn from `N(μ₀, Σ₀)` and step 0 is one
    /// transition after it, matching the filter's convention. Noise goes
    /// through a PSD square root, so zero covariances give noise-free
    /// paths.
    ///
    /// # Example
    ///
    /// ```
    /// use rand::SeedableRng;
    /// use yieldkf_ssm::StateSpaceModel;
    ///
    /// let model = StateSpaceModel::from_maturities(&[1.0, 5.0, 10.0], 3).unwrap();
    /// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    /// let path = model.simulate(20, &mut rng);
    /// assert_eq!(path.states.dim(), (20, 3));
    /// assert_eq!(path.observations.dim(), (20, 3));
    /// ```
    pub fn simulate<R: Rng + ?Sized>(&self, n_steps: usize, rng: &mut R) -> SimulatedPath {
        let n = self.state_dim();
        let m = self.obs_dim();
        let q_root = linalg::psd_sqrt(self.transition_covariance());
        let r_root = linalg::psd_sqrt(self.observation_covariance());
        let sigma_root = linalg::psd_sqrt(self.initial_state_covariance());

        let mut states = Array2::zeros((n_steps, n));
        let mut observations = Array2::zeros((n_steps, m));

        let mut x = self.initial_state_mean() + &gaussian(&sigma_root, rng);
        for t in 0..n_steps {
            x = self.transition_matrix().dot(&x)
                + self.transition_offsets()
                + gaussian(&q_root, rng);
            let y = self.observation_matrix().dot(&x)
                + self.observation_offsets()
                + gaussian(&r_root, rng);
            states.row_mut(t).assign(&x);
            observations.row_mut(t).assign(&y);
        }
        SimulatedPath {
            states,
            observations,
        }
    }
}
