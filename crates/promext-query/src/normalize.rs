//! Matrix → flat sample list.

use tracing::debug;

use promext_core::Sample;

use crate::wire::MatrixSeries;

/// Flatten a matrix result into samples.
///
/// Output is series order, then chronological order within each series.
/// Samples of different series are *not* merged by time; callers that
/// need a global time order must sort the result themselves. Series
/// without samples contribute nothing.
pub fn normalize(matrix: &[MatrixSeries]) -> Vec<Sample> {
    let total = matrix.iter().map(|s| s.values.len()).sum();
    let mut samples = Vec::with_capacity(total);

    for series in matrix {
        if series.values.is_empty() {
            debug!(labels = ?series.metric, "series returned no samples");
            continue;
        }
        samples.extend(series.values.iter().map(|pair| Sample {
            timestamp: pair.timestamp,
            labels: series.metric.clone(),
            value: pair.value,
        }));
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::SamplePair;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn series(job: &str, points: &[(i64, f64)]) -> MatrixSeries {
        MatrixSeries {
            metric: BTreeMap::from([
                ("__name__".to_string(), "up".to_string()),
                ("job".to_string(), job.to_string()),
            ]),
            values: points
                .iter()
                .map(|&(secs, value)| SamplePair {
                    timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn empty_matrix() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn n_series_by_m_samples() {
        let matrix: Vec<MatrixSeries> = (0..3)
            .map(|i| {
                series(
                    &format!("job-{i}"),
                    &[(100, i as f64), (101, i as f64 + 0.5), (102, i as f64 + 0.75)],
                )
            })
            .collect();

        let samples = normalize(&matrix);
        assert_eq!(samples.len(), 9);

        for (i, chunk) in samples.chunks(3).enumerate() {
            for (j, sample) in chunk.iter().enumerate() {
                assert_eq!(sample.labels["job"], format!("job-{i}"));
                assert_eq!(sample.labels["__name__"], "up");
                assert_eq!(sample.timestamp.timestamp(), 100 + j as i64);
                assert_eq!(sample.value, matrix[i].values[j].value);
            }
        }
    }

    #[test]
    fn series_order_is_kept_not_time_sorted() {
        // Second series is older than the first; output must not be merged.
        let matrix = vec![series("late", &[(200, 1.0)]), series("early", &[(100, 2.0)])];
        let samples = normalize(&matrix);
        assert_eq!(samples[0].labels["job"], "late");
        assert_eq!(samples[1].labels["job"], "early");
    }

    #[test]
    fn empty_series_are_skipped() {
        let matrix = vec![series("a", &[]), series("b", &[(100, 1.0)]), series("c", &[])];
        let samples = normalize(&matrix);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels["job"], "b");
    }
}
