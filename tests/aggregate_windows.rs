use tswin::{
    rolling_window_sequences, time_segments_aggregate, AggregationMethod, DropPolicy, Matrix,
    Observation, SignalTable, WindowConfig, WindowError,
};

const INTERVAL: i64 = 21_600;
const START_TS: i64 = 1_222_819_200; // 2008-10-01T00:00:00Z

fn window_cfg(window_size: usize, target_size: usize, offset: usize) -> WindowConfig {
    WindowConfig {
        window_size,
        target_size,
        step_size: 1,
        target_column: 0,
        offset,
    }
}

fn irregular_table() -> SignalTable {
    // Jittered timestamps, out of order, with one empty bucket (index 4).
    let mut points = Vec::new();
    for bucket in 0..10i64 {
        if bucket == 4 {
            continue;
        }
        let base = START_TS + bucket * INTERVAL;
        points.push((base + 17, bucket as f64));
        points.push((base + INTERVAL - 1, bucket as f64 + 1.0));
    }
    points.reverse();
    SignalTable::univariate(points)
}

#[test]
fn index_matches_rows_and_steps_by_interval() {
    let out =
        time_segments_aggregate(&irregular_table(), INTERVAL, &[AggregationMethod::Mean]).unwrap();

    assert_eq!(out.index.len(), out.values.rows());
    assert_eq!(out.index[0], START_TS + 17);
    for pair in out.index.windows(2) {
        assert_eq!(pair[1] - pair[0], INTERVAL);
    }
}

#[test]
fn empty_bucket_still_emits_a_row() {
    let table = SignalTable::univariate((0..10i64).filter(|b| *b != 4).map(|b| {
        (START_TS + b * INTERVAL, b as f64)
    }));
    let out = time_segments_aggregate(&table, INTERVAL, &[AggregationMethod::Mean]).unwrap();

    assert_eq!(out.values.rows(), 10);
    assert!(out.values.row(4)[0].is_nan());
    assert_eq!(out.values.row(5)[0], 5.0);
}

#[test]
fn one_observation_per_bucket_round_trips() {
    let original: Vec<f64> = vec![0.5, -1.25, 3.0, 7.75, 2.0];
    let table = SignalTable::univariate(
        original
            .iter()
            .enumerate()
            .map(|(i, v)| (START_TS + i as i64 * INTERVAL, *v)),
    );

    let mean = time_segments_aggregate(&table, INTERVAL, &[AggregationMethod::Mean]).unwrap();
    assert_eq!(mean.values.column(0), original);

    let methods = [AggregationMethod::Mean, AggregationMethod::Max];
    let both = time_segments_aggregate(&table, INTERVAL, &methods).unwrap();
    assert_eq!(both.values.cols(), 2);
    assert_eq!(both.values.column(0), original);
    assert_eq!(both.values.column(1), original);
}

#[test]
fn two_columns_two_methods_are_method_major() {
    let rows = (0..3i64)
        .map(|i| Observation {
            timestamp: START_TS + i * INTERVAL,
            values: vec![i as f64, 100.0 + i as f64],
        })
        .collect();
    let table = SignalTable::new(vec!["a".to_string(), "b".to_string()], rows).unwrap();
    let methods = [AggregationMethod::Mean, AggregationMethod::Count];
    let out = time_segments_aggregate(&table, INTERVAL, &methods).unwrap();

    assert_eq!(out.values.row(2).to_vec(), vec![2.0, 102.0, 1.0, 1.0]);
}

#[test]
fn sample_count_with_unit_step() {
    for (n, window, target, offset) in [
        (20usize, 5usize, 1usize, 0usize),
        (20, 5, 3, 2),
        (9, 4, 2, 3),
        (5, 4, 2, 0),
    ] {
        let values: Vec<f64> = (0..n).map(|v| v as f64).collect();
        let index: Vec<i64> = (0..n as i64).map(|i| START_TS + i * INTERVAL).collect();
        let out = rolling_window_sequences(
            &Matrix::column_vector(&values),
            &index,
            &window_cfg(window, target, offset),
            &DropPolicy::Keep,
        )
        .unwrap();

        let expected = (n + 1).saturating_sub(window + target + offset);
        assert_eq!(out.len(), expected, "n={n} window={window}");
        assert_eq!(out.targets.len(), expected);
        assert_eq!(out.input_index.len(), expected);
        assert_eq!(out.target_index.len(), expected);

        for (x, y) in out.input_index.iter().zip(&out.target_index) {
            assert_eq!(*y, *x + ((window + offset) as i64) * INTERVAL);
        }
    }
}

#[test]
fn single_invalid_row_removes_every_overlapping_window() {
    let n = 30;
    let k = 13;
    let mut values: Vec<f64> = (0..n).map(|v| v as f64).collect();
    values[k] = f64::NAN;
    let index: Vec<i64> = (0..n as i64).collect();
    let cfg = window_cfg(5, 2, 0);

    let out = rolling_window_sequences(
        &Matrix::column_vector(&values),
        &index,
        &cfg,
        &DropPolicy::Missing,
    )
    .unwrap();

    let starts: Vec<usize> = out.input_index.iter().map(|s| *s as usize).collect();
    for start in &starts {
        assert!(!(*start..*start + cfg.window_size + cfg.target_size).contains(&k));
    }
    for pair in starts.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    // Windows starting in [7, 13] touch row 13; all others are kept.
    let expected: Vec<usize> = (0..=n - 7).filter(|s| !(7..=13).contains(s)).collect();
    assert_eq!(starts, expected);
}

#[test]
fn clustered_invalid_rows_skip_in_one_jump() {
    let values: Vec<f64> = (0..20).map(|v| v as f64).collect();
    let index: Vec<i64> = (0..20).collect();
    let mut mask = vec![false; 20];
    for idx in [3, 5, 6] {
        mask[idx] = true;
    }

    let out = rolling_window_sequences(
        &Matrix::column_vector(&values),
        &index,
        &window_cfg(4, 1, 0),
        &DropPolicy::Mask(mask),
    )
    .unwrap();

    // Span [0, 5) ends at row 3, so the scan resumes at 4; span [4, 9) ends at
    // row 6, so the next attempt is at 7.
    assert_eq!(out.input_index.first(), Some(&7));
}

#[test]
fn mask_length_mismatch_fails_before_any_output() {
    let values = [1.0, 2.0, 3.0, 4.0];
    let err = rolling_window_sequences(
        &Matrix::column_vector(&values),
        &[0, 1, 2, 3],
        &window_cfg(1, 1, 0),
        &DropPolicy::Mask(vec![false; 3]),
    )
    .unwrap_err();

    assert!(matches!(err, WindowError::ShapeMismatch { .. }));
}

#[test]
fn index_length_mismatch_is_rejected() {
    let err = rolling_window_sequences(
        &Matrix::column_vector(&[1.0, 2.0, 3.0]),
        &[0, 1],
        &window_cfg(1, 1, 0),
        &DropPolicy::Keep,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        WindowError::ShapeMismatch {
            what: "index",
            expected: 3,
            found: 2
        }
    ));
}

#[test]
fn aggregated_output_feeds_the_window_builder() {
    let table = SignalTable::univariate([(0, 1.0), (5, 2.0), (12, 3.0), (25, 4.0), (31, 5.0)]);
    let agg = time_segments_aggregate(&table, 10, &[AggregationMethod::Mean]).unwrap();
    assert_eq!(agg.index, vec![0, 10, 20, 30]);

    let out =
        rolling_window_sequences(&agg.values, &agg.index, &window_cfg(2, 1, 0), &DropPolicy::Keep)
            .unwrap();

    assert_eq!(out.inputs[0].column(0), vec![1.5, 3.0]);
    assert_eq!(out.targets, vec![vec![4.0], vec![5.0]]);
    assert_eq!(out.input_index, vec![0, 10]);
    assert_eq!(out.target_index, vec![20, 30]);
}
