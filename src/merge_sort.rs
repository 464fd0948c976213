//! KeyedMergeSort: a stable, top-down merge sort over `Record`s, with an
//! optional fork-join parallel decomposition above `PAR_THRESHOLD`.
//!
//! Merge work is memory-bandwidth bound and rarely benefits from
//! intra-merge parallelism at realistic segment sizes; the win is from
//! sorting the two halves concurrently, so only the recursive split point
//! is parallelized; the merge step itself always runs sequentially.
//! `rayon::join` gives exactly this fork-join shape: each half may run on
//! any worker thread, with a join barrier before the merge.

use crate::record::Record;
use crate::trace::Trace;

/// Segment length at or above which each half-sort is dispatched as an
/// independently schedulable task.
pub const PAR_THRESHOLD: usize = 1 << 15;

/// Sort `records` stably in place by `(key, tie, seq)`, using `aux` as
/// scratch space. `aux` must be at least as long as `records`; its
/// contents on return are unspecified. If `parallel` is true, segments at
/// or above `PAR_THRESHOLD` fork their two halves onto the rayon thread
/// pool. If `trace` is `Some`, every monotone source-side run within each
/// merge step contributes `1/length` to the accumulated Φ.
pub fn sort(records: &mut [Record], aux: &mut [Record], parallel: bool, trace: Option<&Trace>) {
    debug_assert!(aux.len() >= records.len());
    merge_sort(records, &mut aux[..records.len()], parallel, trace);
}

fn merge_sort(v: &mut [Record], aux: &mut [Record], parallel: bool, trace: Option<&Trace>) {
    let n = v.len();
    if n <= 1 {
        return;
    }
    let mid = n / 2;
    let (left, right) = v.split_at_mut(mid);
    let (aux_left, aux_right) = aux.split_at_mut(mid);

    if parallel && n >= PAR_THRESHOLD {
        rayon::join(
            || merge_sort(left, aux_left, parallel, trace),
            || merge_sort(right, aux_right, parallel, trace),
        );
    } else {
        merge_sort(left, aux_left, parallel, trace);
        merge_sort(right, aux_right, parallel, trace);
    }

    merge(v, aux, mid, trace);
}

/// Merge the two sorted halves of `v` (split at `mid`) using `aux` as a
/// copy buffer. Ties on `(key, tie, seq)` are broken by taking from the
/// left half, which is what makes the sort stable.
fn merge(v: &mut [Record], aux: &mut [Record], mid: usize, trace: Option<&Trace>) {
    let n = v.len();
    aux[..n].copy_from_slice(v);
    let (left, right) = aux[..n].split_at(mid);

    let mut i = 0;
    let mut j = 0;
    let mut k = 0;
    let mut segment_from_left: Option<bool> = None;
    let mut segment_len: u64 = 0;

    macro_rules! track {
        ($from_left:expr) => {
            if trace.is_some() {
                match segment_from_left {
                    Some(side) if side == $from_left => segment_len += 1,
                    _ => {
                        if let (Some(tr), true) = (trace, segment_len > 0) {
                            tr.record_segment(segment_len as usize);
                        }
                        segment_from_left = Some($from_left);
                        segment_len = 1;
                    }
                }
            }
        };
    }

    while i < left.len() && j < right.len() {
        if left[i].le(&right[j]) {
            v[k] = left[i];
            i += 1;
            track!(true);
        } else {
            v[k] = right[j];
            j += 1;
            track!(false);
        }
        k += 1;
    }
    if i < left.len() {
        v[k..].copy_from_slice(&left[i..]);
        if let Some(tr) = trace {
            if segment_from_left == Some(true) {
                tr.record_segment(segment_len as usize + (left.len() - i));
            } else {
                if segment_len > 0 {
                    tr.record_segment(segment_len as usize);
                }
                tr.record_segment(left.len() - i);
            }
        }
    } else if j < right.len() {
        v[k..].copy_from_slice(&right[j..]);
        if let Some(tr) = trace {
            if segment_from_left == Some(false) {
                tr.record_segment(segment_len as usize + (right.len() - j));
            } else {
                if segment_len > 0 {
                    tr.record_segment(segment_len as usize);
                }
                tr.record_segment(right.len() - j);
            }
        }
    } else if let (Some(tr), true) = (trace, segment_len > 0) {
        tr.record_segment(segment_len as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::records_from_slice;

    fn sorted_values(values: &[f64], parallel: bool) -> Vec<f64> {
        let mut records = records_from_slice(values);
        let mut aux = records.clone();
        sort(&mut records, &mut aux, parallel, None);
        records.iter().map(|r| r.value).collect()
    }

    #[test]
    fn sorts_ieee_edge_vector() {
        let qnan = f64::from_bits(0x7ff8_0000_0000_0001);
        let input = [5.0, -0.0, 0.0, qnan, -5.0, f64::INFINITY, f64::NEG_INFINITY];
        let out = sorted_values(&input, false);
        assert_eq!(out[0], f64::NEG_INFINITY);
        assert_eq!(out[1], -5.0);
        assert_eq!(out[2].to_bits(), (-0.0f64).to_bits());
        assert_eq!(out[3].to_bits(), (0.0f64).to_bits());
        assert_eq!(out[4], 5.0);
        assert_eq!(out[5], f64::INFINITY);
        assert_eq!(out[6].to_bits(), qnan.to_bits());
    }

    #[test]
    fn negative_nan_sorts_first() {
        let neg_qnan = f64::from_bits(0xfff8_0000_0000_0001);
        let pos_qnan = f64::from_bits(0x7ff8_0000_0000_0001);
        let out = sorted_values(&[neg_qnan, pos_qnan, 0.0], false);
        assert_eq!(out[0].to_bits(), neg_qnan.to_bits());
        assert_eq!(out[1].to_bits(), 0.0f64.to_bits());
        assert_eq!(out[2].to_bits(), pos_qnan.to_bits());
    }

    #[test]
    fn stable_on_duplicate_heavy_input() {
        let mut values = vec![7.0; 10];
        values.extend(vec![3.0; 10]);
        let mut records = records_from_slice(&values);
        let mut aux = records.clone();
        sort(&mut records, &mut aux, false, None);

        let ties: Vec<u64> = records.iter().map(|r| r.tie).collect();
        assert_eq!(&ties[0..10], &[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);
        assert_eq!(&ties[10..20], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let values: Vec<f64> = (0..200_000)
            .map(|i| ((i * 2654435761u64) % 1_000_003) as f64)
            .collect();
        let seq = sorted_values(&values, false);
        let par = sorted_values(&values, true);
        assert_eq!(
            seq.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
            par.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn idempotent_on_already_sorted_input() {
        let values: Vec<f64> = (0..5000).map(|i| i as f64).collect();
        let once = sorted_values(&values, false);
        let twice = sorted_values(&once, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_and_singleton_are_no_ops() {
        assert_eq!(sorted_values(&[], false), Vec::<f64>::new());
        assert_eq!(sorted_values(&[1.0], false), vec![1.0]);
    }

    #[test]
    fn trace_records_merge_segments() {
        use crate::trace::Trace;
        // [1,2] merged with [3,4]: one segment from the left (len 2), then
        // the leftover right tail (len 2) -> two segments.
        let values = [1.0, 2.0, 3.0, 4.0];
        let mut records = records_from_slice(&values);
        let mut aux = records.clone();
        let trace = Trace::new();
        sort(&mut records, &mut aux, false, Some(&trace));
        let report = trace.report();
        assert!(report.segment_count >= 1);
        assert!(report.phi_sum > 0.0);
    }
}
