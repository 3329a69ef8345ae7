//! Append command: merge newer yield rows into a stored panel.

use anyhow::{Context, Result};
use tracing::{info, info_span};

use yieldkf_curve::YieldPanel;
use yieldkf_io::{read_yields, write_yields};

use crate::cli::AppendArgs;
use crate::config::YieldKfConfig;
use crate::convert;

/// Run the append pipeline. A missing store is created from the input.
pub fn run(args: AppendArgs) -> Result<()> {
    let _cmd = info_span!("append").entered();
    let config = YieldKfConfig::load(&args.config)?;
    let writer_cfg = convert::build_writer_config(&config.io)?;

    let newer = read_yields(&args.input)
        .with_context(|| format!("failed to read Parquet: {}", args.input.display()))?;

    let mut stored = if args.store.exists() {
        read_yields(&args.store)
            .with_context(|| format!("failed to read Parquet: {}", args.store.display()))?
    } else {
        info!(path = %args.store.display(), "store does not exist, creating it");
        YieldPanel::new(Vec::new(), newer.labels().to_vec(), Vec::new())?
    };

    let appended = stored
        .append(newer)
        .with_context(|| format!("cannot append {} to {}", args.input.display(), args.store.display()))?;
    if appended == 0 {
        info!(last_date = ?stored.last_date(), "store already up to date");
        return Ok(());
    }

    write_yields(&args.store, &stored, &writer_cfg)
        .with_context(|| format!("failed to write Parquet: {}", args.store.display()))?;
    info!(appended, total = stored.len(), "store updated");

    Ok(())
}
