//! Train command: fit model parameters to a yield panel by EM.

use anyhow::{Context, Result, bail};
use tracing::{info, info_span, warn};

use yieldkf_io::{ParameterSet, read_yields, write_params};
use yieldkf_ssm::EmEstimator;

use crate::cli::TrainArgs;
use crate::config::YieldKfConfig;
use crate::convert;

/// Run the training pipeline.
pub fn run(args: TrainArgs) -> Result<()> {
    let _cmd = info_span!("train").entered();
    // 1. Load config and merge CLI overrides
    let config = YieldKfConfig::load(&args.config)?;
    let data = args.data.unwrap_or(config.io.data);
    let params = args.params.unwrap_or(config.io.params);
    let em_cfg = convert::build_em_config(&config.em, args.n_iter)?;

    // 2. Read the yield panel
    info!(path = %data.display(), "reading yield panel");
    let panel =
        read_yields(&data).with_context(|| format!("failed to read Parquet: {}", data.display()))?;
    if panel.is_empty() {
        bail!("yield panel {} contains no rows", data.display());
    }
    info!(rows = panel.len(), maturities = ?panel.labels(), "yield panel loaded");

    // 3. Default initial guess over the panel's maturities
    let mut initial = panel
        .model(config.model.factors)
        .context("failed to build initial model")?;
    if let Some(eps) = config.model.observation_regularization {
        initial = initial.with_observation_regularization(eps)?;
    }
    let observations = panel.observations()?;

    // 4. Fit
    let fit = EmEstimator::new(em_cfg)?
        .fit(&initial, &observations)
        .context("EM estimation failed")?;
    if !fit.diagnostics().is_empty() {
        warn!(count = fit.diagnostics().len(), "EM raised diagnostics; see the warnings above");
    }
    info!(
        iterations = fit.iterations(),
        converged = fit.converged(),
        log_likelihood = fit.log_likelihood(),
        "training complete"
    );

    // 5. Persist
    let set = ParameterSet::from_fit(panel.labels(), &fit)?;
    write_params(&params, &set)
        .with_context(|| format!("failed to write parameters: {}", params.display()))?;
    info!(path = %params.display(), "parameters written");

    Ok(())
}
