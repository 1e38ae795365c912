//! # Waveform Segmentation
//!
//! Splits a decoded waveform into the consecutive, non-overlapping windows
//! that are fed to the model one at a time. Windows hold
//! `window_seconds * sample_rate` samples; the final window may be shorter.
//! An empty waveform yields no windows, which the pipeline treats as "no
//! transcription text", not as an error.
//!
//! The window count — `ceil(total_samples / window_size)` — is known before
//! any inference runs, so progress totals can be reported up front.

/// Split `samples` into windows of `window_seconds` at `sample_rate`.
///
/// Zero-length windows are never produced; `samples.chunks` yields only
/// non-empty slices and an empty input yields an empty vector.
pub fn segment_waveform(samples: &[f32], sample_rate: usize, window_seconds: usize) -> Vec<Vec<f32>> {
    let window_size = window_seconds * sample_rate;
    if samples.is_empty() || window_size == 0 {
        return Vec::new();
    }
    samples.chunks(window_size).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: usize = 16_000;

    fn waveform(seconds: f64) -> Vec<f32> {
        vec![0.1; (seconds * RATE as f64) as usize]
    }

    #[test]
    fn test_window_count_is_ceiling() {
        // 45 s at 20 s windows -> 3 windows: 20 s, 20 s, 5 s.
        let windows = segment_waveform(&waveform(45.0), RATE, 20);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].len(), 20 * RATE);
        assert_eq!(windows[1].len(), 20 * RATE);
        assert_eq!(windows[2].len(), 5 * RATE);
    }

    #[test]
    fn test_exact_multiple_has_no_remainder_window() {
        let windows = segment_waveform(&waveform(40.0), RATE, 20);
        assert_eq!(windows.len(), 2);
        assert!(windows.iter().all(|w| w.len() == 20 * RATE));
    }

    #[test]
    fn test_short_clip_is_one_window() {
        let windows = segment_waveform(&waveform(3.0), RATE, 25);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 3 * RATE);
    }

    #[test]
    fn test_empty_waveform_yields_no_windows() {
        assert!(segment_waveform(&[], RATE, 25).is_empty());
    }

    #[test]
    fn test_single_sample() {
        let windows = segment_waveform(&[0.5], RATE, 25);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0], vec![0.5]);
    }

    #[test]
    fn test_count_matches_ceiling_formula() {
        for seconds in [1usize, 7, 20, 24, 25, 26, 49, 50, 51, 100] {
            let samples = vec![0.0f32; seconds * RATE + 1];
            let windows = segment_waveform(&samples, RATE, 25);
            let window_size = 25 * RATE;
            let expected = samples.len().div_ceil(window_size);
            assert_eq!(windows.len(), expected, "{} seconds", seconds);
            // No window exceeds the configured size, none are empty.
            assert!(windows.iter().all(|w| !w.is_empty() && w.len() <= window_size));
            // Windows reassemble to the original sample count.
            let total: usize = windows.iter().map(Vec::len).sum();
            assert_eq!(total, samples.len());
        }
    }
}
