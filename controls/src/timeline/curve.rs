//! Keyframe curve evaluation.
//!
//! Points are sorted by time. Every anchor starts a new segment; handles
//! between two anchors are Bezier control points of that segment. Handles
//! before the first anchor or after the last one are ignored.
//!
//! Segments with handles are sampled uniformly in the Bezier parameter and
//! time is mapped back through the sampled polyline. This is an approximation:
//! time is not a closed-form function of the parameter, so accuracy depends on
//! the sample count.

use av_controls_types::TimelinePoint;

/// Uniform samples per Bezier segment.
pub const SAMPLES_PER_SEGMENT: usize = 32;

/// A curve point in (time, value) space.
pub type Sample = (f64, f64);

/// Evaluate a lane at time `t`.
///
/// Returns `None` when the lane has no anchor. A single anchor is constant,
/// and outside the first and last anchor the boundary value holds.
pub fn evaluate(points: &[TimelinePoint], t: f64) -> Option<f64> {
    let segments = segments(points);
    let first = segments.first()?.first()?;
    let last = segments.last()?.last()?;

    if t <= first.0 {
        return Some(first.1);
    }
    if t >= last.0 {
        return Some(last.1);
    }

    let segment = segments
        .iter()
        .find(|s| s.last().is_some_and(|end| t <= end.0))?;
    Some(evaluate_segment(segment, t))
}

/// Like [`evaluate`], then clamped to `[min, max]`. The clamp is skipped when
/// `min > max`.
pub fn evaluate_clamped(points: &[TimelinePoint], t: f64, min: f64, max: f64) -> Option<f64> {
    let v = evaluate(points, t)?;
    Some(if min <= max { v.clamp(min, max) } else { v })
}

/// Polyline of the whole lane, e.g. for drawing it in an editor.
pub fn sample_lane(points: &[TimelinePoint], samples_per_segment: usize) -> Vec<Sample> {
    let mut out: Vec<Sample> = Vec::new();
    for segment in segments(points) {
        let samples = if segment.len() <= 2 {
            segment
        } else {
            sample_bezier(&segment, samples_per_segment.max(1))
        };
        for sample in samples {
            if out.last() != Some(&sample) {
                out.push(sample);
            }
        }
    }
    out
}

/// Split sorted points into segments `[anchor, handles.., anchor]`.
///
/// A lane with exactly one anchor yields one single-point segment.
fn segments(points: &[TimelinePoint]) -> Vec<Vec<Sample>> {
    let mut sorted = points.to_vec();
    av_controls_types::timeline::sort_points(&mut sorted);

    let mut segments = Vec::new();
    let mut current: Option<Vec<Sample>> = None;
    for p in &sorted {
        let sample = (p.t, p.v);
        if p.is_anchor() {
            if let Some(mut open) = current.take() {
                open.push(sample);
                segments.push(open);
            }
            current = Some(vec![sample]);
        } else if let Some(open) = current.as_mut() {
            open.push(sample);
        }
    }

    if segments.is_empty() {
        // single anchor: trailing handles are dropped
        if let Some(open) = current {
            segments.push(vec![open[0]]);
        }
    }
    segments
}

fn evaluate_segment(segment: &[Sample], t: f64) -> f64 {
    match segment {
        [only] => only.1,
        [start, end] => lerp_at(*start, *end, t),
        _ => {
            let samples = sample_bezier(segment, SAMPLES_PER_SEGMENT);
            lookup(&samples, t)
        }
    }
}

fn lerp_at(a: Sample, b: Sample, t: f64) -> f64 {
    let span = b.0 - a.0;
    if span <= 0.0 {
        return b.1;
    }
    a.1 + (b.1 - a.1) * ((t - a.0) / span)
}

fn lookup(samples: &[Sample], t: f64) -> f64 {
    for pair in samples.windows(2) {
        if t <= pair[1].0 {
            return lerp_at(pair[0], pair[1], t);
        }
    }
    samples.last().map(|s| s.1).unwrap_or_default()
}

fn sample_bezier(control: &[Sample], samples: usize) -> Vec<Sample> {
    (0..=samples)
        .map(|i| de_casteljau(control, i as f64 / samples as f64))
        .collect()
}

/// Point at parameter `u` of the Bezier curve over `control`.
fn de_casteljau(control: &[Sample], u: f64) -> Sample {
    let mut work = control.to_vec();
    for level in (1..work.len()).rev() {
        for i in 0..level {
            work[i] = (
                work[i].0 + (work[i + 1].0 - work[i].0) * u,
                work[i].1 + (work[i + 1].1 - work[i].1) * u,
            );
        }
    }
    work[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(t: f64, v: f64) -> TimelinePoint {
        TimelinePoint::anchor(t, v)
    }

    fn handle(t: f64, v: f64) -> TimelinePoint {
        TimelinePoint::handle(t, v)
    }

    #[test]
    fn test_two_anchors_are_linear() {
        let points = [anchor(0.0, 0.0), anchor(10.0, 10.0)];
        assert_eq!(evaluate(&points, 5.0), Some(5.0));
        assert_eq!(evaluate(&points, 2.5), Some(2.5));
    }

    #[test]
    fn test_boundaries_hold() {
        let points = [anchor(2.0, 1.0), anchor(4.0, 3.0)];
        assert_eq!(evaluate(&points, -1.0), Some(1.0));
        assert_eq!(evaluate(&points, 2.0), Some(1.0));
        assert_eq!(evaluate(&points, 100.0), Some(3.0));
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(evaluate(&[], 1.0), None);
        assert_eq!(evaluate(&[anchor(3.0, 0.7)], -5.0), Some(0.7));
        assert_eq!(evaluate(&[anchor(3.0, 0.7)], 50.0), Some(0.7));
        // handles alone never form a curve
        assert_eq!(evaluate(&[handle(1.0, 1.0)], 1.0), None);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let points = [anchor(10.0, 10.0), anchor(0.0, 0.0), anchor(20.0, 0.0)];
        assert_eq!(evaluate(&points, 5.0), Some(5.0));
        assert_eq!(evaluate(&points, 15.0), Some(5.0));
    }

    #[test]
    fn test_handles_before_first_anchor_are_ignored() {
        let points = [handle(0.0, 100.0), anchor(1.0, 0.0), anchor(3.0, 2.0)];
        assert_eq!(evaluate(&points, 0.0), Some(0.0));
        assert_eq!(evaluate(&points, 2.0), Some(1.0));
    }

    #[test]
    fn test_symmetric_handle_curve() {
        // the curve through a centred handle passes the midpoint at u = 0.5
        let points = [anchor(0.0, 0.0), handle(5.0, 10.0), anchor(10.0, 0.0)];
        let mid = evaluate(&points, 5.0).unwrap();
        assert!((mid - 5.0).abs() < 1e-9, "mid = {}", mid);
        // symmetric around the handle
        let left = evaluate(&points, 2.0).unwrap();
        let right = evaluate(&points, 8.0).unwrap();
        assert!((left - right).abs() < 1e-6);
        assert!(left > 0.0 && left < mid);
    }

    #[test]
    fn test_clamp_is_skipped_for_inverted_range() {
        let points = [anchor(0.0, -5.0), anchor(1.0, 5.0)];
        assert_eq!(evaluate_clamped(&points, 0.0, 0.0, 1.0), Some(0.0));
        assert_eq!(evaluate_clamped(&points, 1.0, 0.0, 1.0), Some(1.0));
        assert_eq!(evaluate_clamped(&points, 0.0, 1.0, 0.0), Some(-5.0));
    }

    #[test]
    fn test_sample_lane_covers_all_segments() {
        let points = [
            anchor(0.0, 0.0),
            anchor(1.0, 1.0),
            handle(1.5, 2.0),
            anchor(2.0, 1.0),
        ];
        let samples = sample_lane(&points, 4);
        assert_eq!(samples.first(), Some(&(0.0, 0.0)));
        assert_eq!(samples.last(), Some(&(2.0, 1.0)));
        // linear segment contributes its endpoints, bezier segment 5 samples sharing (1, 1)
        assert_eq!(samples.len(), 6);
    }
}
