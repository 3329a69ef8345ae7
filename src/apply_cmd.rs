//! Apply command: filter and smooth a yield panel with stored parameters.

use anyhow::{Context, Result, bail};
use tracing::{debug, info, info_span};

use yieldkf_curve::FactorTable;
use yieldkf_io::{read_params, read_yields, write_factors};
use yieldkf_ssm::filter_and_smooth;

use crate::cli::ApplyArgs;
use crate::config::YieldKfConfig;
use crate::convert;

/// Run the filtering and smoothing pipeline.
pub fn run(args: ApplyArgs) -> Result<()> {
    let _cmd = info_span!("apply").entered();
    // 1. Load config and merge CLI overrides
    let config = YieldKfConfig::load(&args.config)?;
    let writer_cfg = convert::build_writer_config(&config.io)?;
    let data = args.data.unwrap_or(config.io.data);
    let params = args.params.unwrap_or(config.io.params);
    let start_date = args.start_date.or(config.apply.start_date);

    // 2. Read inputs
    info!(path = %data.display(), "reading yield panel");
    let panel =
        read_yields(&data).with_context(|| format!("failed to read Parquet: {}", data.display()))?;
    if panel.is_empty() {
        bail!("yield panel {} contains no rows", data.display());
    }
    let set = read_params(&params)
        .with_context(|| format!("failed to read parameters: {}", params.display()))?;
    if set.labels != panel.labels() {
        bail!(
            "parameters were trained on maturities {:?} but the panel has {:?}",
            set.labels,
            panel.labels()
        );
    }
    let mut model = set.to_model().context("stored parameters are invalid")?;
    if let Some(eps) = config.model.observation_regularization {
        model = model.with_observation_regularization(eps)?;
    }

    // 3. Filter and smooth
    let observations = panel.observations()?;
    let (filtered, smoothed) =
        filter_and_smooth(&model, &observations).context("filtering failed")?;
    info!(
        rows = filtered.len(),
        log_likelihood = filtered.log_likelihood(),
        "filter and smoother complete"
    );

    // 4. Build tables, truncated to the start date
    let mut filtered_table = FactorTable::from_means(panel.dates(), &filtered.filtered_means())?;
    let mut smoothed_table = FactorTable::from_means(panel.dates(), &smoothed.smoothed_means())?;
    if let Some(start) = start_date {
        filtered_table = filtered_table.since(start);
        smoothed_table = smoothed_table.since(start);
        debug!(%start, rows = filtered_table.len(), "factor tables truncated");
    }

    // 5. Write
    let filtered_path = config.io.filtered;
    let smoothed_path = config.io.smoothed;
    write_factors(&filtered_path, &filtered_table, &writer_cfg)
        .with_context(|| format!("failed to write Parquet: {}", filtered_path.display()))?;
    write_factors(&smoothed_path, &smoothed_table, &writer_cfg)
        .with_context(|| format!("failed to write Parquet: {}", smoothed_path.display()))?;
    info!(
        filtered = %filtered_path.display(),
        smoothed = %smoothed_path.display(),
        "factor tables written"
    );

    Ok(())
}
