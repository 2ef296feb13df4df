//! Terminal visualization for blended curves and allocations.
//!
//! - ASCII sparklines for a quick look at an equity curve
//! - Horizontal bars showing how capital is split across strategies

use crate::analytics::drawdown_series;
use crate::types::{EquityCurve, PortfolioAllocation};
use std::fmt::Write;

/// Characters used for sparkline rendering, ordered from low to high.
const SPARKLINE_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render `values` as one bar character per point, scaled between their
/// minimum and maximum. Longer inputs are averaged down to `width` points.
///
/// ```
/// use mosaic::viz::sparkline;
///
/// let spark = sparkline(&[100.0, 102.0, 101.0, 105.0, 108.0], 5);
/// assert_eq!(spark.chars().count(), 5);
/// ```
pub fn sparkline(values: &[f64], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }

    let points = bucket_means(values, width);
    let (lo, hi) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let top = (SPARKLINE_CHARS.len() - 1) as f64;

    points
        .iter()
        .map(|&v| {
            let level = if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };
            SPARKLINE_CHARS[(level.clamp(0.0, 1.0) * top).round() as usize]
        })
        .collect()
}

/// Split `values` into `buckets` contiguous runs and average each one.
fn bucket_means(values: &[f64], buckets: usize) -> Vec<f64> {
    if values.len() <= buckets {
        return values.to_vec();
    }

    (0..buckets)
        .map(|b| {
            let start = b * values.len() / buckets;
            let end = ((b + 1) * values.len() / buckets).max(start + 1);
            let run = &values[start..end];
            run.iter().sum::<f64>() / run.len() as f64
        })
        .collect()
}

/// Sparkline of a curve's values.
pub fn curve_sparkline(curve: &EquityCurve, width: usize) -> String {
    sparkline(&curve.values(), width)
}

/// Sparkline of a curve's drawdown from its running peak.
pub fn drawdown_sparkline(curve: &EquityCurve, width: usize) -> String {
    sparkline(&drawdown_series(&curve.values()), width)
}

/// One bar per strategy, proportional to its weight.
pub fn allocation_bars(allocation: &PortfolioAllocation, width: usize) -> String {
    let labels: Vec<String> = allocation.strategies.iter().map(|s| s.to_string()).collect();
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let mut out = String::new();
    for (label, (_, weight)) in labels.iter().zip(allocation.components()) {
        let filled = ((weight.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
        let _ = writeln!(
            out,
            "{:<lw$}  {}{} {:>5.1}%",
            label,
            "█".repeat(filled),
            "·".repeat(width - filled),
            weight * 100.0,
            lw = label_width
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WeightVector;

    #[test]
    fn test_sparkline_empty() {
        assert!(sparkline(&[], 10).is_empty());
    }

    #[test]
    fn test_sparkline_increasing() {
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let chars: Vec<char> = sparkline(&values, 8).chars().collect();
        assert_eq!(chars.len(), 8);
        assert_eq!(chars[0], SPARKLINE_CHARS[0]);
        assert_eq!(chars[7], SPARKLINE_CHARS[7]);
    }

    #[test]
    fn test_sparkline_constant() {
        for ch in sparkline(&[50.0; 10], 10).chars() {
            assert_eq!(ch, SPARKLINE_CHARS[4]);
        }
    }

    #[test]
    fn test_sparkline_downsampling() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert_eq!(sparkline(&values, 10).chars().count(), 10);

        let downsampled = bucket_means(&values, 10);
        assert_eq!(downsampled.len(), 10);
        assert!(downsampled[0] < 10.0);
        assert!(downsampled[9] > 90.0);
    }

    #[test]
    fn test_allocation_bars() {
        let allocation = PortfolioAllocation::new(
            vec!["AAA:Aggressive".parse().unwrap(), "BB:Safe".parse().unwrap()],
            WeightVector::new(vec![0.75, 0.25]),
        );
        let bars = allocation_bars(&allocation, 8);
        let lines: Vec<&str> = bars.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("AAA (Aggressive)"));
        assert!(lines[0].contains("██████··"));
        assert!(lines[0].ends_with("75.0%"));
        assert!(lines[1].contains("██······"));
    }
}
