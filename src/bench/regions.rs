//! Include-region filtering for the comparable universe.

use std::collections::HashMap;

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;
use itertools::Itertools;

use crate::common::io::open_read_maybe_gz;

/// Alias for the interval tree that we use.
type IntervalTree = ArrayBackedIntervalTree<i64, usize>;

/// Set of genomic include intervals, indexed per chromosome.
#[derive(Debug, Default)]
pub struct RegionSet {
    /// Merged intervals, stored by chromosome.
    intervals: HashMap<String, Vec<(i64, i64)>>,
    /// Interval trees, stored by chromosome.
    trees: HashMap<String, IntervalTree>,
}

impl RegionSet {
    /// Load a region set from a (possibly gzipped) BED file, merging
    /// overlapping intervals.
    pub fn from_bed(path: &str) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path)?;
        let mut intervals: HashMap<String, Vec<(i64, i64)>> = HashMap::new();
        for (i, line) in std::io::BufRead::lines(reader).enumerate() {
            let line = line.map_err(|e| anyhow::anyhow!("problem reading {}: {}", path, e))?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (chrom, start, end) = (fields.next(), fields.next(), fields.next());
            match (chrom, start, end) {
                (Some(chrom), Some(start), Some(end)) => {
                    let start = start.parse::<i64>().map_err(|e| {
                        anyhow::anyhow!("invalid start in {} line {}: {}", path, i + 1, e)
                    })?;
                    let end = end.parse::<i64>().map_err(|e| {
                        anyhow::anyhow!("invalid end in {} line {}: {}", path, i + 1, e)
                    })?;
                    intervals.entry(chrom.to_string()).or_default().push((start, end));
                }
                _ => anyhow::bail!("short BED line in {} line {}", path, i + 1),
            }
        }
        Ok(Self::from_intervals(intervals))
    }

    /// Build a region set from raw intervals, merging overlaps.
    pub fn from_intervals(intervals: HashMap<String, Vec<(i64, i64)>>) -> Self {
        let mut merged: HashMap<String, Vec<(i64, i64)>> = HashMap::new();
        for (chrom, mut ivs) in intervals {
            ivs.sort();
            let out = ivs
                .into_iter()
                .coalesce(|a, b| {
                    if b.0 <= a.1 {
                        Ok((a.0, std::cmp::max(a.1, b.1)))
                    } else {
                        Err((a, b))
                    }
                })
                .collect();
            merged.insert(chrom, out);
        }

        let mut trees = HashMap::new();
        for (chrom, ivs) in &merged {
            let mut tree = IntervalTree::new();
            for (i, (start, end)) in ivs.iter().enumerate() {
                tree.insert(*start..*end, i);
            }
            tree.index();
            trees.insert(chrom.clone(), tree);
        }

        RegionSet {
            intervals: merged,
            trees,
        }
    }

    /// Return a copy with every interval widened by `pad` on both sides.
    pub fn extend(&self, pad: i64) -> Self {
        let widened = self
            .intervals
            .iter()
            .map(|(chrom, ivs)| {
                (
                    chrom.clone(),
                    ivs.iter()
                        .map(|(start, end)| (std::cmp::max(0, start - pad), end + pad))
                        .collect(),
                )
            })
            .collect();
        Self::from_intervals(widened)
    }

    /// Whether `[start, end)` on `chrom` is contained in one of the
    /// include intervals.
    pub fn contains(&self, chrom: &str, start: i64, end: i64) -> bool {
        let Some(tree) = self.trees.get(chrom) else {
            return false;
        };
        let query_end = std::cmp::max(start + 1, end);
        tree.find(start..query_end).iter().any(|entry| {
            let interval = entry.interval();
            interval.start <= start && end <= interval.end
        })
    }
}
