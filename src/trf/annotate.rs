//! Scoring of repeat motifs against variants in one repeat region.

use std::collections::HashMap;

use noodles_vcf as vcf;

use crate::bench::variant::{SvType, Variant};
use crate::common::{reciprocal_overlap, round_to};

use super::repeats::{MotifRecord, TrRegion};
use super::tool::TrfRunner;

/// A motif scored against one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMotif {
    /// The underlying motif annotation.
    pub motif: MotifRecord,
    /// Reciprocal overlap of the variant and the motif.
    pub ovl_pct: f64,
    /// Copy-number change attributed to the variant.
    pub diff: f64,
}

/// Order scored motifs best-first: most overlap, then highest score, then
/// widest span.
pub fn rank_motifs(scores: &mut [ScoredMotif]) {
    scores.sort_by(|a, b| {
        b.ovl_pct
            .partial_cmp(&a.ovl_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.motif.score.cmp(&a.motif.score))
            .then_with(|| b.motif.span().cmp(&a.motif.span()))
    });
}

/// Annotates the variants of a single repeat region.
pub struct RegionAnnotator {
    region: TrRegion,
    ref_seq: String,
    known_motifs: HashMap<String, f64>,
    runner: TrfRunner,
    min_length: i64,
    max_length: i64,
}

impl RegionAnnotator {
    /// Set up the annotator for `region` whose reference sequence is
    /// `ref_seq`.
    pub fn new(
        region: TrRegion,
        ref_seq: String,
        runner: TrfRunner,
        min_length: i64,
        max_length: i64,
    ) -> Self {
        let known_motifs = region
            .annos
            .iter()
            .map(|anno| (anno.repeat.clone(), anno.copies))
            .collect();
        RegionAnnotator {
            region,
            ref_seq,
            known_motifs,
            runner,
            min_length,
            max_length,
        }
    }

    /// Figure out the best motif hit for `variant`, if any.
    pub fn annotate(&self, variant: &Variant) -> Option<ScoredMotif> {
        if variant.size < self.min_length {
            return None;
        }
        match variant.sv_type {
            SvType::Del => self.del_annotation(variant),
            SvType::Ins => self.ins_annotation(variant),
            _ => None,
        }
    }

    /// Score a deletion against the region's known motifs.
    fn del_annotation(&self, variant: &Variant) -> Option<ScoredMotif> {
        let mut scores: Vec<ScoredMotif> = self
            .region
            .annos
            .iter()
            .filter_map(|anno| {
                let ovl_pct = reciprocal_overlap(
                    variant.start..variant.end,
                    anno.start..anno.end,
                );
                if ovl_pct == 0.0 {
                    return None;
                }
                let diff = -(ovl_pct * variant.size as f64) / anno.period as f64;
                Some(ScoredMotif {
                    motif: anno.clone(),
                    ovl_pct,
                    diff,
                })
            })
            .collect();
        rank_motifs(&mut scores);
        scores.into_iter().next()
    }

    /// Run the repeat finder over the ALT haplotype of an insertion and
    /// score its hits.
    fn ins_annotation(&self, variant: &Variant) -> Option<ScoredMotif> {
        let hap = self.make_hap(variant)?;
        if (hap.len() as i64) < self.min_length || (hap.len() as i64) > self.max_length {
            tracing::debug!(
                "haplotype length {} outside of {}..{}",
                hap.len(),
                self.min_length,
                self.max_length
            );
            return None;
        }

        let annos = match self.runner.run(&hap) {
            Ok(annos) => annos,
            Err(e) => {
                tracing::error!("repeat finder failed: {}", e);
                Vec::new()
            }
        };

        let mut scores: Vec<ScoredMotif> = annos
            .into_iter()
            .map(|mut anno| {
                anno.start += self.region.start;
                anno.end += self.region.start;
                anno
            })
            .filter_map(|anno| self.score_motif(variant, anno))
            .collect();
        rank_motifs(&mut scores);
        scores.into_iter().next()
    }

    /// Score one fresh motif hit against the variant interval; the hit has
    /// to overlap. The copy difference is taken against the matching known
    /// motif of this region when there is one.
    fn score_motif(&self, variant: &Variant, anno: MotifRecord) -> Option<ScoredMotif> {
        let ovl_pct = reciprocal_overlap(variant.start..variant.end, anno.start..anno.end);
        if ovl_pct <= 0.0 {
            return None;
        }
        let diff = match self.known_motifs.get(&anno.repeat) {
            Some(known_copies) => anno.copies - known_copies,
            None => 0.0,
        };
        Some(ScoredMotif {
            motif: anno,
            ovl_pct,
            diff,
        })
    }

    /// Build the ALT haplotype of `variant` over the region sequence.
    fn make_hap(&self, variant: &Variant) -> Option<String> {
        let rel_start = variant.start - self.region.start;
        let rel_end = variant.end - self.region.start;
        if rel_start < 0 || rel_end < rel_start || rel_end as usize > self.ref_seq.len() {
            tracing::debug!(
                "variant {}:{}-{} outside of region sequence",
                variant.chrom,
                variant.start,
                variant.end
            );
            return None;
        }
        let mut hap = String::with_capacity(self.ref_seq.len() + variant.alt_allele.len());
        hap.push_str(&self.ref_seq[..rel_start as usize]);
        hap.push_str(&variant.alt_allele);
        hap.push_str(&self.ref_seq[rel_end as usize..]);
        Some(hap)
    }
}

/// Attach the repeat annotation INFO fields to `record`.
///
/// The `TRF` flag is always set; the motif fields only when a best hit was
/// found.
pub fn apply_annotation(
    record: &mut vcf::Record,
    best: Option<&ScoredMotif>,
) -> Result<(), anyhow::Error> {
    use vcf::record::info::field::{Key, Value};

    let key = |name: &str| -> Result<Key, anyhow::Error> {
        name.parse::<Key>()
            .map_err(|_| anyhow::anyhow!("invalid INFO key {}", name))
    };

    let info = record.info_mut();
    info.insert(key("TRF")?, Some(Value::Flag));
    if let Some(best) = best {
        info.insert(
            key("TRFovl")?,
            Some(Value::Float(round_to(best.ovl_pct, 3) as f32)),
        );
        info.insert(
            key("TRFdiff")?,
            Some(Value::Float(round_to(best.diff, 1) as f32)),
        );
        info.insert(
            key("TRFperiod")?,
            Some(Value::Integer(best.motif.period as i32)),
        );
        info.insert(
            key("TRFcopies")?,
            Some(Value::Float(best.motif.copies as f32)),
        );
        info.insert(
            key("TRFscore")?,
            Some(Value::Integer(best.motif.score as i32)),
        );
        info.insert(
            key("TRFentropy")?,
            Some(Value::Float(best.motif.entropy as f32)),
        );
        info.insert(
            key("TRFrepeat")?,
            Some(Value::String(best.motif.repeat.clone())),
        );
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::bench::variant::{Genotype, SvType, Variant};
    use crate::trf::repeats::{MotifRecord, TrRegion};
    use crate::trf::tool::TrfRunner;

    use super::{rank_motifs, RegionAnnotator, ScoredMotif};

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

    fn variant(start: i64, end: i64, size: i64, sv_type: SvType, alt: &str) -> Variant {
        Variant {
            record: Default::default(),
            chrom: String::from("chr1"),
            start,
            end,
            ref_allele: String::new(),
            alt_allele: String::from(alt),
            sv_type,
            size,
            gt: Genotype::default(),
            is_pass: true,
        }
    }

    fn annotator(min_length: i64) -> RegionAnnotator {
        let region = TrRegion {
            chrom: String::from("chr1"),
            start: 100,
            end: 200,
            annos: vec![at_motif()],
        };
        let ref_seq = "AT".repeat(50);
        RegionAnnotator::new(
            region,
            ref_seq,
            TrfRunner::new("trf409.linux64", "3 7 7 80 5 40 500 -h -ngs"),
            min_length,
            10_000,
        )
    }

    #[test]
    fn deletion_against_known_motif() {
        let anno = annotator(40);
        let del = variant(120, 160, 40, SvType::Del, "");

        let best = anno.annotate(&del).expect("expected a motif hit");

        assert!(float_cmp::approx_eq!(f64, best.ovl_pct, 0.4, ulps = 2));
        assert!(float_cmp::approx_eq!(f64, best.diff, -8.0, ulps = 2));
        assert_eq!(best.motif.repeat, "AT");
        assert_eq!(best.motif.period, 2);
    }

    #[test]
    fn deletion_outside_motifs_scores_nothing() {
        let region = TrRegion {
            chrom: String::from("chr1"),
            start: 0,
            end: 1000,
            annos: vec![at_motif()],
        };
        let anno = RegionAnnotator::new(
            region,
            "A".repeat(1000),
            TrfRunner::new("trf409.linux64", "-ngs"),
            40,
            10_000,
        );
        let del = variant(500, 600, 100, SvType::Del, "");

        assert_eq!(anno.annotate(&del), None);
    }

    #[test]
    fn small_variants_are_not_annotated() {
        let anno = annotator(50);
        let del = variant(120, 160, 40, SvType::Del, "");

        assert_eq!(anno.annotate(&del), None);
    }

    #[test]
    fn ranking_prefers_overlap_then_score_then_span() {
        let scored = |ovl: f64, score: i64, end: i64| ScoredMotif {
            motif: MotifRecord {
                end,
                score,
                ..at_motif()
            },
            ovl_pct: ovl,
            diff: 0.0,
        };

        let mut scores = vec![
            scored(0.2, 900, 300),
            scored(0.8, 100, 300),
            scored(0.8, 400, 150),
            scored(0.8, 400, 300),
        ];
        rank_motifs(&mut scores);

        assert_eq!((scores[0].motif.score, scores[0].motif.span()), (400, 200));
        assert_eq!((scores[1].motif.score, scores[1].motif.span()), (400, 50));
        assert_eq!(scores[2].motif.score, 100);
        assert_eq!(scores[3].ovl_pct, 0.2);
    }

    #[test]
    fn known_motif_copy_difference() {
        let anno = annotator(0);
        let ins = variant(150, 151, 60, SvType::Ins, "AT");

        let fresh = MotifRecord {
            copies: 52.0,
            ..at_motif()
        };
        let scored = anno.score_motif(&ins, fresh).expect("must overlap");
        assert!(float_cmp::approx_eq!(f64, scored.diff, 2.0, ulps = 2));

        let unknown = MotifRecord {
            repeat: String::from("GGC"),
            ..at_motif()
        };
        let scored = anno.score_motif(&ins, unknown).expect("must overlap");
        assert!(float_cmp::approx_eq!(f64, scored.diff, 0.0, ulps = 2));
    }

    #[test]
    fn make_hap_splices_alt_into_region() {
        let anno = annotator(0);
        let ins = variant(150, 151, 5, SvType::Ins, "GAAAA");

        let hap = anno.make_hap(&ins).expect("haplotype must build");

        assert_eq!(hap.len(), 100 - 1 + 5);
        assert_eq!(&hap[50..55], "GAAAA");
    }
}
