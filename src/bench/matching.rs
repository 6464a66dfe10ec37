//! Pairwise variant comparison: parameters, scoring, and result ranking.

use std::cmp::Ordering;
use std::fs::File;

use bio::io::fasta;

use crate::common::reciprocal_overlap;

use super::variant::Variant;

/// Which call sets to drop reference/missing genotypes from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    clap::ValueEnum,
    serde::Serialize,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NoRefSide {
    /// Both call sets.
    #[value(name = "a")]
    A,
    /// Baseline calls only.
    #[value(name = "b")]
    B,
    /// Comparison calls only.
    #[value(name = "c")]
    C,
}

/// Comparison thresholds and filters, fixed for the whole run.
///
/// A copy is handed to every pipeline stage; nothing mutates it after
/// argument parsing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MatchParams {
    /// Maximum allowed distance between starts and between ends.
    pub refdist: i64,
    /// Minimum sequence similarity; 0 disables sequence comparison.
    pub pctseq: f64,
    /// Minimum size similarity.
    pub pctsize: f64,
    /// Minimum reciprocal overlap.
    pub pctovl: f64,
    /// Whether variant types need to match.
    pub typeignore: bool,
    /// Treat DUP calls as INS for the type check.
    pub dup_to_ins: bool,
    /// Use the Levenshtein ratio instead of the edit-distance ratio.
    pub use_lev: bool,
    /// Minimum haplotype length for reference-based sequence comparison.
    pub minhaplen: i64,
    /// Maximum reference distance between calls compared at all.
    pub chunksize: i64,
    /// Minimum variant size for the baseline set.
    pub sizemin: i64,
    /// Minimum variant size for the comparison set.
    pub sizefilt: i64,
    /// Maximum variant size for either set.
    pub sizemax: i64,
    /// Only consider calls with FILTER empty or PASS.
    pub passonly: bool,
    /// Drop reference/missing genotypes from the given sets.
    pub no_ref: Option<NoRefSide>,
    /// Use the genotype-aware picker.
    pub gtcomp: bool,
    /// Use the multi-match picker.
    pub multimatch: bool,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            refdist: 500,
            pctseq: 0.7,
            pctsize: 0.7,
            pctovl: 0.0,
            typeignore: false,
            dup_to_ins: false,
            use_lev: false,
            minhaplen: 50,
            chunksize: 1000,
            sizemin: 50,
            sizefilt: 30,
            sizemax: 50_000,
            passonly: false,
            no_ref: None,
            gtcomp: false,
            multimatch: false,
        }
    }
}

impl MatchParams {
    /// Whether `variant` belongs to the comparable universe of its call set.
    pub fn keep_variant(&self, variant: &Variant, is_base: bool) -> bool {
        let size_floor = if is_base { self.sizemin } else { self.sizefilt };
        if variant.size < size_floor || variant.size > self.sizemax {
            return false;
        }
        if self.passonly && !variant.is_pass {
            return false;
        }
        let no_ref_applies = match self.no_ref {
            Some(NoRefSide::A) => true,
            Some(NoRefSide::B) => is_base,
            Some(NoRefSide::C) => !is_base,
            None => false,
        };
        if no_ref_applies && variant.gt.allele_count() == 0 {
            return false;
        }
        true
    }
}

/// The scoring record for one (baseline, comparison) pair.
///
/// `base` and `comp` are indices into the owning chunk's variant vectors;
/// pickers emit copies with sides set to `None` rather than mutating the
/// variants themselves.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MatchResult {
    /// Chunk-local index of the baseline variant.
    pub base: Option<usize>,
    /// Chunk-local index of the comparison variant.
    pub comp: Option<usize>,
    /// Allele count of the baseline genotype.
    pub base_gt_count: u32,
    /// Allele count of the comparison genotype.
    pub comp_gt_count: u32,
    /// Rendered baseline genotype.
    pub base_gt: String,
    /// Rendered comparison genotype.
    pub comp_gt: String,
    /// Sequence similarity, when sequence comparison is active.
    pub seqsim: Option<f64>,
    /// Size similarity.
    pub sizesim: Option<f64>,
    /// Reciprocal overlap of the two intervals.
    pub ovlpct: Option<f64>,
    /// `size(comp) - size(base)`.
    pub sizediff: Option<i64>,
    /// `start(base) - start(comp)`.
    pub st_dist: Option<i64>,
    /// `end(base) - end(comp)`.
    pub ed_dist: Option<i64>,
    /// Absolute difference of genotype allele counts.
    pub gt_match: Option<u32>,
    /// Sum of the percent similarities, scaled to 0..=300.
    pub score: Option<f64>,
    /// Whether all active thresholds passed.
    pub state: bool,
    /// Whether this record is a consolation emitted by a picker.
    pub multi: bool,
    /// `{chunk}.{base|_}.{comp|_}` identifier.
    pub matid: String,
}

impl MatchResult {
    /// Rank two results; `Ordering::Greater` means `self` is the better
    /// match. Passing results beat failing ones, then higher score, then
    /// smaller start distance, then smaller size difference.
    pub fn cmp_quality(&self, other: &Self) -> Ordering {
        fn abs_or_max(value: Option<i64>) -> i64 {
            value.map(i64::abs).unwrap_or(i64::MAX)
        }

        self.state
            .cmp(&other.state)
            .then_with(|| {
                self.score
                    .partial_cmp(&other.score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| abs_or_max(other.st_dist).cmp(&abs_or_max(self.st_dist)))
            .then_with(|| abs_or_max(other.sizediff).cmp(&abs_or_max(self.sizediff)))
    }
}

/// Sort results so the best match comes first; ties keep their input order.
pub fn sort_matches(matches: &mut [MatchResult]) {
    matches.sort_by(|a, b| b.cmp_quality(a));
}

/// Size similarity of two variants: `min/max`, by convention `1.0` when both
/// are empty.
pub fn size_similarity(size_a: i64, size_b: i64) -> f64 {
    if size_a == 0 && size_b == 0 {
        1.0
    } else {
        std::cmp::min(size_a, size_b) as f64 / std::cmp::max(size_a, size_b) as f64
    }
}

/// Similarity ratio of two sequences derived from the Levenshtein distance.
pub fn seq_similarity_ratio(a: &str, b: &str, use_lev: bool) -> f64 {
    let dist = bio::alignment::distance::levenshtein(a.as_bytes(), b.as_bytes()) as f64;
    let ratio = if use_lev {
        let lensum = (a.len() + b.len()) as f64;
        if lensum == 0.0 {
            1.0
        } else {
            (lensum - dist) / lensum
        }
    } else {
        let maxlen = std::cmp::max(a.len(), b.len()) as f64;
        if maxlen == 0.0 {
            1.0
        } else {
            (maxlen - dist) / maxlen
        }
    };
    ratio.clamp(0.0, 1.0)
}

/// Builds `MatchResult`s for variant pairs.
///
/// Owns the optional reference reader used for haplotype-based sequence
/// comparison.
pub struct Matcher {
    /// The comparison parameters.
    pub params: MatchParams,
    reference: Option<fasta::IndexedReader<File>>,
}

impl Matcher {
    /// Create a new `Matcher`, opening the reference FASTA when given.
    pub fn new(params: MatchParams, reference: Option<&str>) -> Result<Self, anyhow::Error> {
        let reference = reference
            .map(|path| {
                fasta::IndexedReader::from_file(&path)
                    .map_err(|e| anyhow::anyhow!("could not open reference {}: {}", path, e))
            })
            .transpose()?;
        Ok(Matcher { params, reference })
    }

    /// Score the pair `(b, c)` and return the filled-in `MatchResult`.
    ///
    /// All measures are recorded even when a threshold fails so that failed
    /// results can still be ranked below passing ones.
    pub fn build_match(
        &mut self,
        b: &Variant,
        bid: usize,
        c: &Variant,
        cid: usize,
        matid: String,
    ) -> MatchResult {
        let mut ret = MatchResult {
            base: Some(bid),
            comp: Some(cid),
            base_gt_count: b.gt.allele_count(),
            comp_gt_count: c.gt.allele_count(),
            base_gt: b.gt.render(),
            comp_gt: c.gt.render(),
            gt_match: if b.gt.is_present() && c.gt.is_present() {
                Some(b.gt.allele_count().abs_diff(c.gt.allele_count()))
            } else {
                None
            },
            state: true,
            matid,
            ..Default::default()
        };

        let sizesim = size_similarity(b.size, c.size);
        ret.sizesim = Some(sizesim);
        ret.sizediff = Some(c.size - b.size);
        if sizesim < self.params.pctsize {
            tracing::debug!(
                "{} and {} size similarity {} below {}",
                b.start,
                c.start,
                sizesim,
                self.params.pctsize
            );
            ret.state = false;
        }

        if !self.params.typeignore
            && b.sv_type.normalized(self.params.dup_to_ins)
                != c.sv_type.normalized(self.params.dup_to_ins)
        {
            tracing::debug!("{} and {} variant types do not match", b.start, c.start);
            ret.state = false;
        }

        ret.st_dist = Some(b.start - c.start);
        ret.ed_dist = Some(b.end - c.end);
        if (b.start - c.start).abs() > self.params.refdist
            || (b.end - c.end).abs() > self.params.refdist
        {
            tracing::debug!("{} and {} further than {}", b.start, c.start, self.params.refdist);
            ret.state = false;
        }

        let ovlpct = reciprocal_overlap(b.start..b.end, c.start..c.end);
        ret.ovlpct = Some(ovlpct);
        if ovlpct < self.params.pctovl {
            tracing::debug!(
                "{} and {} overlap {} below {}",
                b.start,
                c.start,
                ovlpct,
                self.params.pctovl
            );
            ret.state = false;
        }

        if self.params.pctseq > 0.0 {
            ret.seqsim = self.seq_similarity(b, c);
            match ret.seqsim {
                Some(seqsim) if seqsim >= self.params.pctseq => (),
                _ => {
                    ret.state = false;
                }
            }
        }

        if ret.state {
            let score = 100.0
                * (ret.seqsim.unwrap_or(0.0) + ret.sizesim.unwrap_or(0.0)
                    + ret.ovlpct.unwrap_or(0.0));
            ret.score = Some(score);
        }

        ret
    }

    /// Sequence similarity of the pair, via direct allele comparison or,
    /// when a reference is at hand and the calls start at different
    /// positions, via haplotype comparison over the common window.
    fn seq_similarity(&mut self, b: &Variant, c: &Variant) -> Option<f64> {
        let seq_b = b.comparison_seq()?;
        let seq_c = c.comparison_seq()?;

        if self.reference.is_some() && b.start != c.start {
            if let Some((hap_b, hap_c)) = self.build_haplotypes(b, c) {
                return Some(seq_similarity_ratio(&hap_b, &hap_c, self.params.use_lev));
            }
        }

        Some(seq_similarity_ratio(seq_b, seq_c, self.params.use_lev))
    }

    /// Construct the two haplotype sequences over the padded common window.
    fn build_haplotypes(&mut self, b: &Variant, c: &Variant) -> Option<(String, String)> {
        let window_start =
            std::cmp::max(0, std::cmp::min(b.start, c.start) - self.params.minhaplen);
        let window_end = std::cmp::max(b.end, c.end) + self.params.minhaplen;

        let reference = self.reference.as_mut()?;
        let mut window = Vec::new();
        let fetched = reference
            .fetch(&b.chrom, window_start as u64, window_end as u64)
            .and_then(|_| reference.read(&mut window));
        if let Err(e) = fetched {
            tracing::debug!(
                "could not fetch reference sequence {}:{}-{}: {}",
                b.chrom,
                window_start,
                window_end,
                e
            );
            return None;
        }
        let window = String::from_utf8_lossy(&window).to_string();

        let build = |v: &Variant| -> Option<String> {
            let rel_start = (v.start - window_start) as usize;
            let rel_end = (v.end - window_start) as usize;
            if rel_end > window.len() || rel_start > rel_end {
                return None;
            }
            let mut hap = String::with_capacity(window.len() + v.alt_allele.len());
            hap.push_str(&window[..rel_start]);
            hap.push_str(&v.alt_allele);
            hap.push_str(&window[rel_end..]);
            Some(hap)
        };

        Some((build(b)?, build(c)?))
    }
}
