//! Pure conversion functions: TOML config structs -> crate API config types.

use anyhow::{Context, Result};

use yieldkf_io::{Compression, WriterConfig};
use yieldkf_ssm::{EmConfig, EmParam, EmVars};

use crate::config::{EmToml, IoToml};

/// Parses a list of parameter names into an [`EmVars`] set.
pub fn parse_em_vars(names: &[String]) -> Result<EmVars> {
    names
        .iter()
        .map(|n| n.parse::<EmParam>())
        .collect::<Result<EmVars, _>>()
        .context("invalid [em].em_vars")
}

/// Builds an [`EmConfig`] from the TOML EM configuration.
///
/// `n_iter` overrides the configured iteration count when given.
pub fn build_em_config(em: &EmToml, n_iter: Option<usize>) -> Result<EmConfig> {
    let cfg = EmConfig::new()
        .with_n_iter(n_iter.unwrap_or(em.n_iter))
        .with_tolerance(em.tolerance)
        .with_strict(em.strict)
        .with_em_vars(parse_em_vars(&em.em_vars)?)
        .with_psd_tolerance(em.psd_tolerance);
    cfg.validate().context("invalid [em] configuration")?;
    Ok(cfg)
}

/// Builds a [`WriterConfig`] from the TOML I/O configuration.
pub fn build_writer_config(io: &IoToml) -> Result<WriterConfig> {
    let compression: Compression = io.compression.parse().context("invalid [io].compression")?;
    let cfg = WriterConfig::default()
        .with_compression(compression)
        .with_row_group_size(io.row_group_size);
    cfg.validate().context("invalid [io] configuration")?;
    Ok(cfg)
}
