//! Filtering scenarios on small yield-curve models.

use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2, array, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use yieldkf_ssm::{Observations, StateSpaceModel, filter, update};

const MATURITIES: [f64; 3] = [1.0, 5.0, 10.0];

fn dynamics() -> (Array2<f64>, Array1<f64>) {
    (
        array![[0.95, 0.02, 0.0], [0.0, 0.9, 0.01], [0.0, 0.0, 0.8]],
        array![0.05, -0.01, 0.0],
    )
}

/// Deterministic trajectory `x[t] = A·x[t-1] + b` from `x0`, and `y = C·x`.
fn trajectory(model: &StateSpaceModel, x0: &Array1<f64>, n_steps: usize) -> (Array2<f64>, Array2<f64>) {
    let mut states = Array2::zeros((n_steps, model.state_dim()));
    let mut obs = Array2::zeros((n_steps, model.obs_dim()));
    let mut x = x0.clone();
    for t in 0..n_steps {
        x = model.transition_matrix().dot(&x) + model.transition_offsets();
        let y = model.observation_matrix().dot(&x) + model.observation_offsets();
        states.row_mut(t).assign(&x);
        obs.row_mut(t).assign(&y);
    }
    (states, obs)
}

#[test]
fn zero_noise_realisation_tracks_trajectory() {
    let (a, b) = dynamics();
    let x0 = array![2.0, 0.3, -0.02];
    let model = StateSpaceModel::from_maturities(&MATURITIES, 3)
        .unwrap()
        .with_transition_matrix(a)
        .unwrap()
        .with_transition_offsets(b)
        .unwrap()
        .with_transition_covariance(Array2::<f64>::eye(3) * 1e-4)
        .unwrap()
        .with_observation_covariance(Array2::<f64>::eye(3) * 1e-4)
        .unwrap()
        .with_initial_state_mean(x0.clone())
        .unwrap();
    let (states, values) = trajectory(&model, &x0, 4);
    let obs = Observations::fully_observed(values).unwrap();

    let result = filter(&model, &obs).unwrap();
    assert_eq!(result.len(), 4);
    assert_abs_diff_eq!(result.filtered_means(), states, epsilon = 1e-8);
}

#[test]
fn missing_long_end_uses_present_maturities_only() {
    let (a, b) = dynamics();
    let q = Array2::<f64>::eye(3) * 0.01;
    let r = array![[0.02, 0.005, 0.0], [0.005, 0.03, 0.0], [0.0, 0.0, 0.04]];
    let model = StateSpaceModel::from_maturities(&MATURITIES, 3)
        .unwrap()
        .with_transition_matrix(a.clone())
        .unwrap()
        .with_transition_offsets(b.clone())
        .unwrap()
        .with_transition_covariance(q.clone())
        .unwrap()
        .with_observation_covariance(r.clone())
        .unwrap();

    let path = model.simulate(4, &mut StdRng::seed_from_u64(11));
    let mut obs = Observations::fully_observed(path.observations.clone()).unwrap();
    obs.mark_missing(2, 2);
    let result = filter(&model, &obs).unwrap();

    // Same dynamics observed through the 1y and 5y maturities only.
    let short = StateSpaceModel::from_maturities(&MATURITIES[..2], 3)
        .unwrap()
        .with_transition_matrix(a)
        .unwrap()
        .with_transition_offsets(b)
        .unwrap()
        .with_transition_covariance(q)
        .unwrap()
        .with_observation_covariance(r.slice(s![..2, ..2]).to_owned())
        .unwrap();
    let row = path.observations.slice(s![2, ..2]);
    let (expected, _) = update(&short, &result.predicted()[2], row, &[0, 1]).unwrap();

    let got = &result.filtered()[2];
    assert_abs_diff_eq!(got.mean(), expected.mean(), epsilon = 1e-12);
    assert_abs_diff_eq!(got.covariance(), expected.covariance(), epsilon = 1e-12);
}

#[test]
fn all_missing_step_keeps_prediction() {
    let model = StateSpaceModel::from_maturities(&MATURITIES, 3).unwrap();
    let obs = Observations::from_rows(&[
        vec![Some(1.0), Some(1.5), Some(2.0)],
        vec![None, None, None],
        vec![Some(1.1), None, Some(2.2)],
    ])
    .unwrap();
    let result = filter(&model, &obs).unwrap();
    assert_eq!(result.filtered()[1], result.predicted()[1]);
    assert_eq!(result.step_log_likelihoods()[1], 0.0);
    assert_ne!(result.filtered()[2], result.predicted()[2]);
}

#[test]
fn filtering_is_idempotent() {
    let model = StateSpaceModel::from_maturities(&MATURITIES, 3)
        .unwrap()
        .with_observation_covariance(Array2::<f64>::eye(3) * 0.1)
        .unwrap();
    let path = model.simulate(25, &mut StdRng::seed_from_u64(3));
    let mut obs = path.to_observations().unwrap();
    obs.mark_missing(4, 0);
    obs.mark_missing(9, 2);
    let first = filter(&model, &obs).unwrap();
    let second = filter(&model, &obs).unwrap();
    assert_eq!(first, second);
}

#[test]
fn filtered_means_converge_as_noise_vanishes() {
    let (a, b) = dynamics();
    let x0 = array![2.0, 0.3, -0.02];
    let truth = StateSpaceModel::from_maturities(&MATURITIES, 3)
        .unwrap()
        .with_transition_matrix(a.clone())
        .unwrap()
        .with_transition_offsets(b.clone())
        .unwrap();
    let (states, values) = trajectory(&truth, &x0, 10);
    let obs = Observations::fully_observed(values).unwrap();

    let mut errors = Vec::new();
    for eps in [1e-2, 1e-4, 1e-6] {
        // Prior mean deliberately wrong (zero).
        let model = truth
            .clone()
            .with_transition_covariance(Array2::<f64>::eye(3) * eps)
            .unwrap()
            .with_observation_covariance(Array2::<f64>::eye(3) * eps)
            .unwrap();
        let means = filter(&model, &obs).unwrap().filtered_means();
        let err = (&means - &states)
            .row(9)
            .iter()
            .fold(0.0_f64, |acc, e| acc.max(e.abs()));
        errors.push(err);
    }
    assert!(errors[1] < errors[0], "errors: {errors:?}");
    assert!(errors[2] < errors[1], "errors: {errors:?}");
    assert!(errors[2] < 1e-4, "errors: {errors:?}");
}

#[test]
fn log_likelihood_prefers_true_noise_level() {
    let model = StateSpaceModel::from_maturities(&MATURITIES, 3)
        .unwrap()
        .with_transition_matrix(dynamics().0)
        .unwrap()
        .with_transition_covariance(Array2::<f64>::eye(3) * 0.01)
        .unwrap()
        .with_observation_covariance(Array2::<f64>::eye(3) * 0.05)
        .unwrap();
    let obs = model
        .simulate(300, &mut StdRng::seed_from_u64(21))
        .to_observations()
        .unwrap();
    let wrong = model
        .clone()
        .with_observation_covariance(Array2::<f64>::eye(3) * 5.0)
        .unwrap();
    let ll_true = filter(&model, &obs).unwrap().log_likelihood();
    let ll_wrong = filter(&wrong, &obs).unwrap().log_likelihood();
    assert!(ll_true > ll_wrong, "true {ll_true}, wrong {ll_wrong}");
}
