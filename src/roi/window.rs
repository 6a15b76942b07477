use crate::geometry::Point;

pub const DEFAULT_MAX_POINTS: usize = 1000;

/// Appends `new` to `existing` (oldest first) and keeps only the newest
/// `cap` points. Deduplication happens later and does not affect the cap.
pub fn merge_window(existing: &[Point], new: &[Point], cap: usize) -> Vec<Point> {
    let total = existing.len() + new.len();
    let skip = total.saturating_sub(cap);
    existing
        .iter()
        .chain(new.iter())
        .skip(skip)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(range: std::ops::Range<u32>) -> Vec<Point> {
        range.map(|i| Point::new(i as f64, 0.0)).collect()
    }

    #[test]
    fn under_cap_keeps_everything_in_order() {
        let merged = merge_window(&points(0..3), &points(3..5), 10);
        assert_eq!(merged, points(0..5));
    }

    #[test]
    fn over_cap_drops_oldest_first() {
        let merged = merge_window(&points(0..8), &points(8..12), 10);
        assert_eq!(merged, points(2..12));
    }

    #[test]
    fn new_batch_larger_than_cap_keeps_its_tail() {
        let merged = merge_window(&points(0..5), &points(5..30), 10);
        assert_eq!(merged, points(20..30));
    }

    #[test]
    fn length_never_exceeds_cap_over_many_cycles() {
        let mut window = Vec::new();
        for cycle in 0..50u32 {
            let batch = points(cycle * 7..cycle * 7 + 7);
            window = merge_window(&window, &batch, 25);
            assert!(window.len() <= 25);
        }
        assert_eq!(window.len(), 25);
    }

    #[test]
    fn duplicates_count_against_cap() {
        let same = vec![Point::new(1.0, 1.0); 6];
        let merged = merge_window(&same, &same, 8);
        assert_eq!(merged.len(), 8);
    }
}
