//! Waveform traces for display.
//!
//! Downsamples a PCM buffer into a fixed-width polyline: one averaged
//! amplitude per column, mapped onto an inverted-y pixel grid. The trace is
//! a pure function of its inputs; rendering it to a canvas, a terminal or a
//! test assertion is the caller's business.

/// Average contiguous sample blocks into `width` columns.
///
/// Block size is `ceil(len / width)`, at least 1. Columns past the end of
/// the buffer average zero samples and yield 0.0, so the result always has
/// exactly `width` entries (or none, for empty input).
#[must_use]
pub fn downsample(samples: &[f32], width: u32) -> Vec<f32> {
    if samples.is_empty() || width == 0 {
        return Vec::new();
    }

    let step = samples.len().div_ceil(width as usize).max(1);
    (0..width as usize)
        .map(|x| {
            let start = x * step;
            let end = (start + step).min(samples.len());
            if start >= end {
                return 0.0;
            }
            let sum: f32 = samples[start..end].iter().sum();
            sum / (end - start) as f32
        })
        .collect()
}

/// A single connected polyline tracing a waveform.
///
/// Amplitude [-1, 1] maps to row [height, 0]: positive peaks draw near the
/// top of the grid, negative near the bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTrace {
    width: u32,
    height: u32,
    points: Vec<(u32, f32)>,
}

impl WaveformTrace {
    /// Downsample `samples` into a `width`-column trace on a grid `height`
    /// rows tall. Zero samples yield an empty trace (a no-op to draw).
    #[must_use]
    pub fn render(samples: &[f32], width: u32, height: u32) -> Self {
        let points = downsample(samples, width)
            .into_iter()
            .enumerate()
            .map(|(x, amplitude)| {
                let normalized = (amplitude + 1.0) / 2.0;
                (x as u32, (1.0 - normalized) * height as f32)
            })
            .collect();
        Self {
            width,
            height,
            points,
        }
    }

    /// Grid width in columns.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in rows.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The polyline points, one per column, left to right.
    #[must_use]
    pub fn points(&self) -> &[(u32, f32)] {
        &self.points
    }

    /// True if there is nothing to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Render the trace into a text grid for terminal display.
    ///
    /// One character cell per column, `#` on the trace, with a `-` midline.
    #[must_use]
    pub fn to_ascii(&self) -> String {
        if self.is_empty() || self.height == 0 {
            return String::new();
        }

        let rows = self.height as usize;
        let cols = self.width as usize;
        let midline = rows / 2;
        let mut grid = vec![vec![' '; cols]; rows];
        for cell in &mut grid[midline] {
            *cell = '-';
        }

        for &(x, y) in &self.points {
            let row = (y.round() as usize).min(rows - 1);
            grid[row][x as usize] = '#';
        }

        grid.into_iter()
            .map(|row| row.into_iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
