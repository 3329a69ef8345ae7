//! End-to-end runs of the `yieldkf` binary over a simulated yield history.

use std::path::Path;
use std::process::Command;

use chrono::NaiveDate;
use ndarray::array;
use rand::SeedableRng;
use rand::rngs::StdRng;
use yieldkf_curve::YieldPanel;
use yieldkf_io::{WriterConfig, read_factors, read_params, read_yields, write_yields};
use yieldkf_ssm::StateSpaceModel;

const LABELS: [&str; 4] = ["6 MO", "2 YR", "5 YR", "10 YR"];

fn simulated_panel(n: usize, start: NaiveDate) -> YieldPanel {
    let model = StateSpaceModel::from_maturities(&[0.5, 2.0, 5.0, 10.0], 2)
        .unwrap()
        .with_transition_matrix(array![[0.97, 0.0], [0.0, 0.9]])
        .unwrap()
        .with_transition_covariance(array![[0.02, 0.0], [0.0, 0.001]])
        .unwrap()
        .with_observation_covariance(ndarray::Array2::<f64>::eye(4) * 0.01)
        .unwrap();
    let path = model.simulate(n, &mut StdRng::seed_from_u64(11));
    let dates = (0..n)
        .map(|i| start + chrono::TimeDelta::days(i as i64))
        .collect();
    let rows = path
        .observations
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, &v)| if i % 7 == 3 && j == 3 { None } else { Some(v) })
                .collect()
        })
        .collect();
    YieldPanel::new(
        dates,
        LABELS.iter().map(|s| s.to_string()).collect(),
        rows,
    )
    .unwrap()
}

fn yieldkf(args: &[&str], cwd: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_yieldkf"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .expect("binary runs")
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn train_then_apply() {
    let dir = tempfile::tempdir().unwrap();
    let panel = simulated_panel(40, day(2016, 2, 1));
    write_yields(&dir.path().join("yields.parquet"), &panel, &WriterConfig::default()).unwrap();

    let out = yieldkf(&["train", "--n-iter", "3"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let params = read_params(&dir.path().join("params.json")).unwrap();
    assert_eq!(params.labels, LABELS);
    assert_eq!(params.n_factors, 3);
    assert_eq!(params.iterations, Some(3));

    let out = yieldkf(&["apply", "--start-date", "2016-03-01"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let filtered = read_factors(&dir.path().join("filtered.parquet")).unwrap();
    let smoothed = read_factors(&dir.path().join("smoothed.parquet")).unwrap();
    // Feb 2016 has 29 days; 40 rows from Feb 1 leave 11 from Mar 1.
    assert_eq!(filtered.len(), 11);
    assert_eq!(filtered.dates()[0], day(2016, 3, 1));
    assert_eq!(filtered.names(), &["level", "slope", "convexity"]);
    assert_eq!(smoothed.dates(), filtered.dates());
    assert_ne!(smoothed.values().row(0), filtered.values().row(0));
    assert_eq!(smoothed.values().row(10), filtered.values().row(10));
}

#[test]
fn config_file_drives_paths() {
    let dir = tempfile::tempdir().unwrap();
    let panel = simulated_panel(25, day(2020, 1, 1));
    write_yields(&dir.path().join("treasury.parquet"), &panel, &WriterConfig::default()).unwrap();
    std::fs::write(
        dir.path().join("run.toml"),
        r#"
[io]
data = "treasury.parquet"
params = "learned.json"
filtered = "f.parquet"
smoothed = "s.parquet"
compression = "zstd"

[model]
factors = 2

[em]
n_iter = 2
em_vars = ["transition_matrix", "observation_offsets"]
"#,
    )
    .unwrap();

    let out = yieldkf(&["train", "--config", "run.toml"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let params = read_params(&dir.path().join("learned.json")).unwrap();
    assert_eq!(params.n_factors, 2);
    // R was not learned.
    assert_eq!(params.observation_covariance[1], vec![0.0, 1.0]);

    let out = yieldkf(&["apply", "-c", "run.toml"], dir.path());
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read_factors(&dir.path().join("f.parquet")).unwrap().len(), 25);
    assert!(dir.path().join("s.parquet").exists());
}

#[test]
fn append_merges_only_newer_rows() {
    let dir = tempfile::tempdir().unwrap();
    let full = simulated_panel(30, day(2024, 1, 1));
    let head = YieldPanel::new(
        full.dates()[..20].to_vec(),
        full.labels().to_vec(),
        full.rows()[..20].to_vec(),
    )
    .unwrap();
    let overlap = YieldPanel::new(
        full.dates()[15..].to_vec(),
        full.labels().to_vec(),
        full.rows()[15..].to_vec(),
    )
    .unwrap();
    write_yields(&dir.path().join("store.parquet"), &head, &WriterConfig::default()).unwrap();
    write_yields(&dir.path().join("new.parquet"), &overlap, &WriterConfig::default()).unwrap();

    let out = yieldkf(
        &["append", "--store", "store.parquet", "--input", "new.parquet"],
        dir.path(),
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(read_yields(&dir.path().join("store.parquet")).unwrap(), full);
}

#[test]
fn errors_exit_with_status_one() {
    let dir = tempfile::tempdir().unwrap();
    let out = yieldkf(&["train"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("Error: failed to read Parquet: yields.parquet"), "{stderr}");
    assert!(stderr.contains("file not found"));
}

#[test]
fn mismatched_maturities_rejected_by_apply() {
    let dir = tempfile::tempdir().unwrap();
    let panel = simulated_panel(10, day(2020, 1, 1));
    write_yields(&dir.path().join("yields.parquet"), &panel, &WriterConfig::default()).unwrap();
    assert!(yieldkf(&["train", "--n-iter", "1"], dir.path()).status.success());

    let other = YieldPanel::new(
        panel.dates().to_vec(),
        vec!["1 YR".to_string()],
        panel.rows().iter().map(|r| vec![r[0]]).collect(),
    )
    .unwrap();
    write_yields(&dir.path().join("other.parquet"), &other, &WriterConfig::default()).unwrap();
    let out = yieldkf(&["apply", "--data", "other.parquet"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("trained on maturities"));
}
