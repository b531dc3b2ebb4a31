//! Keyframe interpolation for animated effect parameters.
//!
//! Given a sorted list of keyframes and a time value, compute the
//! interpolated parameter value using the easing mode of the segment's
//! leading keyframe. Times outside the keyframe range clamp to the
//! endpoint values.

use cutline_models::{Easing, Keyframe};

/// Evaluate a keyframe list at `time` (seconds relative to the clip start).
///
/// Returns `None` if the list is empty. The list must be sorted by time.
pub fn evaluate(keyframes: &[Keyframe], time: f64) -> Option<f64> {
    let first = keyframes.first()?;
    if keyframes.len() == 1 || time <= first.time {
        return Some(first.value);
    }

    let last = &keyframes[keyframes.len() - 1];
    if time >= last.time {
        return Some(last.value);
    }

    for pair in keyframes.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if time >= a.time && time < b.time {
            return Some(interpolate(a, b, time));
        }
    }

    Some(last.value)
}

/// Interpolate between two keyframes at `time`.
fn interpolate(a: &Keyframe, b: &Keyframe, time: f64) -> f64 {
    let dt = b.time - a.time;
    if dt <= 0.0 {
        return a.value;
    }
    let frac = (time - a.time) / dt;
    match a.easing {
        Easing::Hold => a.value,
        Easing::Linear => lerp(a.value, b.value, frac),
        Easing::EaseIn => lerp(a.value, b.value, frac * frac),
        Easing::EaseOut => lerp(a.value, b.value, 1.0 - (1.0 - frac) * (1.0 - frac)),
        Easing::EaseInOut => lerp(a.value, b.value, smoothstep(frac)),
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn smoothstep(t: f64) -> f64 {
    t * t * (3.0 - 2.0 * t)
}

/// Fade ramps derived from an opacity curve.
///
/// `fade_in` is the head ramp length; `fade_out` is `(start, duration)` of
/// the tail ramp, both in clip-local seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FadeRamps {
    pub fade_in: Option<f64>,
    pub fade_out: Option<(f64, f64)>,
}

/// Derive fade ramps from an opacity keyframe curve over a clip of
/// `duration` seconds.
///
/// A head ramp exists when the curve starts at zero and later reaches full
/// opacity; a tail ramp exists when the curve ends at zero after being
/// fully opaque.
pub fn fade_ramps(keyframes: &[Keyframe], duration: f64) -> FadeRamps {
    let mut ramps = FadeRamps::default();
    if keyframes.len() < 2 || duration <= 0.0 {
        return ramps;
    }

    let head = evaluate(keyframes, 0.0).unwrap_or(1.0);
    if head <= f64::EPSILON {
        if let Some(full) = keyframes.iter().find(|k| k.value >= 1.0 - f64::EPSILON) {
            if full.time > 0.0 {
                ramps.fade_in = Some(full.time.min(duration));
            }
        }
    }

    let tail = evaluate(keyframes, duration).unwrap_or(1.0);
    if tail <= f64::EPSILON {
        if let Some(full) = keyframes
            .iter()
            .rev()
            .find(|k| k.value >= 1.0 - f64::EPSILON)
        {
            let start = full.time.max(0.0);
            if start < duration {
                ramps.fade_out = Some((start, duration - start));
            }
        }
    }

    ramps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kf(time: f64, value: f64, easing: Easing) -> Keyframe {
        Keyframe {
            time,
            value,
            easing,
        }
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(evaluate(&[], 1.0), None);
        assert_eq!(evaluate(&[kf(0.0, 0.5, Easing::Linear)], 99.0), Some(0.5));
    }

    #[test]
    fn test_endpoint_clamping() {
        let kfs = [kf(1.0, 0.0, Easing::Linear), kf(2.0, 1.0, Easing::Linear)];
        assert_eq!(evaluate(&kfs, 0.0), Some(0.0));
        assert_eq!(evaluate(&kfs, 5.0), Some(1.0));
    }

    #[test]
    fn test_linear_midpoint() {
        let kfs = [kf(0.0, 0.0, Easing::Linear), kf(2.0, 1.0, Easing::Linear)];
        assert!((evaluate(&kfs, 1.0).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_hold_keeps_leading_value() {
        let kfs = [kf(0.0, 0.25, Easing::Hold), kf(2.0, 1.0, Easing::Linear)];
        assert_eq!(evaluate(&kfs, 1.9), Some(0.25));
        assert_eq!(evaluate(&kfs, 2.0), Some(1.0));
    }

    #[test]
    fn test_ease_in_out_is_slower_at_edges() {
        let kfs = [
            kf(0.0, 0.0, Easing::EaseInOut),
            kf(1.0, 1.0, Easing::Linear),
        ];
        let early = evaluate(&kfs, 0.1).unwrap();
        let late = evaluate(&kfs, 0.9).unwrap();
        assert!(early < 0.1);
        assert!(late > 0.9);
        assert!((evaluate(&kfs, 0.5).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_fade_ramps() {
        // 0 -> 1 over the first second, 1 -> 0 over the last second.
        let kfs = [
            kf(0.0, 0.0, Easing::Linear),
            kf(1.0, 1.0, Easing::Linear),
            kf(4.0, 1.0, Easing::Linear),
            kf(5.0, 0.0, Easing::Linear),
        ];
        let ramps = fade_ramps(&kfs, 5.0);
        assert_eq!(ramps.fade_in, Some(1.0));
        assert_eq!(ramps.fade_out, Some((4.0, 1.0)));

        // Constant curve yields no ramps.
        let flat = [kf(0.0, 1.0, Easing::Linear), kf(5.0, 1.0, Easing::Linear)];
        assert_eq!(fade_ramps(&flat, 5.0), FadeRamps::default());
    }
}
