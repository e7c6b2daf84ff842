//! Row count estimation from a partially finished scan.
//!
//! Rows seen so far are scaled by the share of input bytes consumed. Bounds
//! treat each row as an independent draw with probability `p = fraction`,
//! giving `var = rows * (1 - p) / p^2` around the scaled mean.

use contracts::ApproxCount;

use crate::reader::ScanProgress;

/// Estimate for a scan that has not finished
pub fn estimate(progress: &ScanProgress, confidence: f64) -> ApproxCount {
    let rows = progress.rows();
    let p = progress.fraction();

    if rows == 0 || p <= 0.0 {
        return ApproxCount {
            estimate: rows,
            low: rows,
            high: rows,
            confidence: 0.0,
            complete: false,
        };
    }

    let mean = rows as f64 / p;
    let std_dev = (rows as f64 * (1.0 - p)).sqrt() / p;
    let z = normal_quantile((1.0 + confidence) / 2.0);

    let low = (mean - z * std_dev).max(rows as f64);
    let high = (mean + z * std_dev).max(low);

    ApproxCount {
        estimate: mean.round() as u64,
        low: low.floor() as u64,
        high: high.ceil() as u64,
        confidence,
        complete: false,
    }
}

/// Standard normal quantile for p in (0.5, 1); Abramowitz & Stegun 26.2.23.
fn normal_quantile(p: f64) -> f64 {
    let p = p.clamp(0.5, 1.0 - 1e-12);
    let t = (-2.0 * (1.0 - p).ln()).sqrt();
    let (c0, c1, c2) = (2.515517, 0.802853, 0.010328);
    let (d1, d2, d3) = (1.432788, 0.189269, 0.001308);
    t - (c0 + c1 * t + c2 * t * t) / (1.0 + d1 * t + d2 * t * t + d3 * t * t * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_known_values() {
        assert!((normal_quantile(0.975) - 1.96).abs() < 1e-2);
        assert!((normal_quantile(0.95) - 1.645).abs() < 1e-2);
        assert!(normal_quantile(0.5).abs() < 1e-2);
    }

    #[test]
    fn test_no_progress() {
        let progress = ScanProgress::new(1000);
        let count = estimate(&progress, 0.95);
        assert_eq!(count.estimate, 0);
        assert!(!count.complete);
    }

    #[test]
    fn test_half_scanned_doubles_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        let line = "{\"reviewerID\":\"A\"}\n";
        std::fs::write(&path, line.repeat(100)).unwrap();

        let input = crate::reader::InputFile::open(&path).unwrap();
        let progress = ScanProgress::new(input.len * 2);
        let mut scan = crate::reader::PartitionScan::open(
            &input,
            input.plan(u64::MAX)[0],
            &contracts::RecordSchema::reviews(),
            crate::reader::ScanOptions {
                batch_size: 1000,
                mode: contracts::ParseMode::Permissive,
                limit: None,
            },
            progress.clone(),
        )
        .unwrap();
        while scan.next_batch().unwrap().is_some() {}
        assert_eq!(progress.rows(), 100);

        let count = estimate(&progress, 0.95);
        assert_eq!(count.estimate, 200);
        assert!(count.low >= 100 && count.low <= 200);
        assert!(count.high >= 200);
    }
}
