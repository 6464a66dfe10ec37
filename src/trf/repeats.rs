//! Tandem repeat region catalogs and their interval index.

use std::collections::HashMap;
use std::io::BufRead;

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;

use crate::common::io::open_read_maybe_gz;

/// Alias for the interval tree that we use.
type IntervalTree = ArrayBackedIntervalTree<i64, usize>;

/// One known repeat motif inside a tandem repeat region.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MotifRecord {
    /// 0-based start of the motif annotation.
    pub start: i64,
    /// End of the motif annotation.
    pub end: i64,
    /// Period size of the repeat.
    pub period: i64,
    /// Number of copies aligned with the consensus pattern.
    pub copies: f64,
    /// Size of the consensus pattern.
    #[serde(default)]
    pub consize: i64,
    /// Percent of matches between adjacent copies.
    #[serde(default)]
    pub pctmat: i64,
    /// Percent of indels between adjacent copies.
    #[serde(default)]
    pub pctindel: i64,
    /// Alignment score.
    pub score: i64,
    /// Entropy measure.
    #[serde(default)]
    pub entropy: f64,
    /// The repeat motif sequence.
    pub repeat: String,
}

impl MotifRecord {
    /// Reference span covered by the motif annotation.
    pub fn span(&self) -> i64 {
        self.end - self.start
    }
}

/// A contiguous reference region annotated with repeat motifs.
#[derive(Debug, Clone)]
pub struct TrRegion {
    /// Chromosome name.
    pub chrom: String,
    /// 0-based start of the region.
    pub start: i64,
    /// End of the region.
    pub end: i64,
    /// The known motifs.
    pub annos: Vec<MotifRecord>,
}

/// Read a repeats file with structure chrom, start, end, annotations-JSON.
pub fn read_tr_regions(path: &str) -> Result<Vec<TrRegion>, anyhow::Error> {
    let reader = open_read_maybe_gz(path)?;
    let mut regions = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| anyhow::anyhow!("problem reading {}: {}", path, e))?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.splitn(4, '\t').collect();
        if fields.len() != 4 {
            anyhow::bail!("short repeats line in {} line {}", path, i + 1);
        }
        let start = fields[1]
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("invalid start in {} line {}: {}", path, i + 1, e))?;
        let end = fields[2]
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("invalid end in {} line {}: {}", path, i + 1, e))?;
        let annos: Vec<MotifRecord> = serde_json::from_str(fields[3]).map_err(|e| {
            anyhow::anyhow!("invalid motif annotations in {} line {}: {}", path, i + 1, e)
        })?;
        regions.push(TrRegion {
            chrom: fields[0].to_string(),
            start,
            end,
            annos,
        });
    }
    Ok(regions)
}

/// Per-chromosome interval index over the repeat regions.
#[derive(Debug, Default)]
pub struct RegionIndex {
    trees: HashMap<String, IntervalTree>,
}

impl RegionIndex {
    /// Build the index from the region catalog.
    pub fn new(regions: &[TrRegion]) -> Self {
        let mut trees: HashMap<String, IntervalTree> = HashMap::new();
        for (i, region) in regions.iter().enumerate() {
            trees
                .entry(region.chrom.clone())
                .or_insert_with(IntervalTree::new)
                .insert(region.start..region.end, i);
        }
        trees.values_mut().for_each(|tree| tree.index());
        RegionIndex { trees }
    }

    /// Whether `[start, end)` on `chrom` is strictly contained in a region.
    pub fn contains(&self, chrom: &str, start: i64, end: i64) -> bool {
        let Some(tree) = self.trees.get(chrom) else {
            return false;
        };
        let query_end = std::cmp::max(start + 1, end);
        tree.find(start..query_end).iter().any(|entry| {
            let interval = entry.interval();
            start >= interval.start && end < interval.end
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{read_tr_regions, MotifRecord, RegionIndex, TrRegion};

    fn at_motif() -> MotifRecord {
        MotifRecord {
            start: 100,
            end: 200,
            period: 2,
            copies: 50.0,
            consize: 2,
            pctmat: 100,
            pctindel: 0,
            score: 400,
            entropy: 1.0,
            repeat: String::from("AT"),
        }
    }

    #[test]
    fn read_tr_regions_parses_bed_with_json() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("repeats.bed");
        std::fs::write(
            &path,
            "chr1\t100\t200\t[{\"start\": 100, \"end\": 200, \"period\": 2, \
             \"copies\": 50.0, \"score\": 400, \"entropy\": 1.0, \"repeat\": \"AT\"}]\n",
        )?;

        let regions = read_tr_regions(path.to_str().unwrap())?;

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].chrom, "chr1");
        assert_eq!(regions[0].start, 100);
        assert_eq!(regions[0].end, 200);
        assert_eq!(regions[0].annos.len(), 1);
        assert_eq!(regions[0].annos[0].repeat, "AT");
        assert_eq!(regions[0].annos[0].span(), 100);

        Ok(())
    }

    #[rstest::rstest]
    #[case("chr1", 120, 160, true)]
    #[case("chr1", 100, 199, true)]
    #[case("chr1", 100, 200, false)] // end must be strictly inside
    #[case("chr1", 90, 160, false)]
    #[case("chr2", 120, 160, false)]
    fn region_index_containment(
        #[case] chrom: &str,
        #[case] start: i64,
        #[case] end: i64,
        #[case] expected: bool,
    ) {
        let regions = vec![TrRegion {
            chrom: String::from("chr1"),
            start: 100,
            end: 200,
            annos: vec![at_motif()],
        }];
        let index = RegionIndex::new(&regions);

        assert_eq!(index.contains(chrom, start, end), expected);
    }
}
