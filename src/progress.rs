//! Line-count estimation and percentage reporting.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use log::debug;

use crate::io_utils::is_dash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEstimate {
    /// The whole input fit inside the sample window.
    Exact(u64),
    Approximate(u64),
}

impl LineEstimate {
    pub fn lines(self) -> u64 {
        match self {
            LineEstimate::Exact(lines) | LineEstimate::Approximate(lines) => lines,
        }
    }
}

/// Estimates the number of data lines from the average length of a leading
/// sample. The header line is excluded from both the sample and the result.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEstimator {
    window: usize,
}

impl ProgressEstimator {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    /// `None` for stdin, which cannot be sized up front.
    pub fn estimate_path(&self, path: &Path) -> io::Result<Option<LineEstimate>> {
        if is_dash(path) {
            return Ok(None);
        }
        let file = File::open(path)?;
        let total_bytes = file.metadata()?.len();
        self.estimate_reader(BufReader::new(file), total_bytes)
            .map(Some)
    }

    pub fn estimate_reader<R: BufRead>(
        &self,
        mut reader: R,
        total_bytes: u64,
    ) -> io::Result<LineEstimate> {
        let mut line = Vec::new();
        let header_bytes = reader.read_until(b'\n', &mut line)? as u64;

        let mut sampled_lines = 0u64;
        let mut sampled_bytes = 0u64;
        while sampled_lines < self.window as u64 {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                debug!("Input holds {sampled_lines} data line(s)");
                return Ok(LineEstimate::Exact(sampled_lines));
            }
            sampled_bytes += read as u64;
            if !is_blank_line(&line) {
                sampled_lines += 1;
            }
        }
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(LineEstimate::Exact(sampled_lines));
        }

        let data_bytes = total_bytes.saturating_sub(header_bytes);
        let average = (sampled_bytes as f64 / sampled_lines as f64).max(1.0);
        let estimate = (data_bytes as f64 / average).ceil() as u64;
        debug!(
            "Estimated {estimate} data line(s) from {sampled_lines} sampled line(s) averaging {average:.1} byte(s)"
        );
        Ok(LineEstimate::Approximate(estimate.max(sampled_lines)))
    }
}

fn is_blank_line(line: &[u8]) -> bool {
    line.iter().all(|b| *b == b'\n' || *b == b'\r')
}

/// Reports each further 10% step of a revisable line estimate.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    estimate: Option<u64>,
    next_threshold: u64,
    watermark: u64,
}

impl ProgressTracker {
    pub fn new(estimate: Option<u64>) -> Self {
        Self {
            estimate: estimate.filter(|lines| *lines > 0),
            next_threshold: 10,
            watermark: 0,
        }
    }

    pub fn estimate(&self) -> Option<u64> {
        self.estimate
    }

    /// Highest percentage reported so far.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Returns the percentage when `inserted` crosses the next 10% step.
    pub fn record(&mut self, inserted: u64) -> Option<u64> {
        let estimate = self.estimate.as_mut()?;
        if inserted == 0 && *estimate == 0 {
            return None;
        }
        if inserted > *estimate {
            *estimate = inserted;
        }
        let percent = (inserted.saturating_mul(100) / *estimate).min(100);
        if percent < self.next_threshold {
            return None;
        }
        self.next_threshold = (percent / 10 + 1) * 10;
        self.watermark = percent;
        Some(percent)
    }

    /// Replaces the estimate with the actual total once input is exhausted
    /// and reports whatever step that total completes.
    pub fn finish(&mut self, total: u64) -> Option<u64> {
        self.estimate = Some(total);
        self.record(total)
    }
}
