//! Counting and writing of categorized benchmarking results.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use noodles_vcf as vcf;

use crate::common::{self, noodles::compress_index_vcf};

use super::matching::MatchResult;
use super::variant::Variant;

/// Counters for TP/FP/FN and the derived performance numbers.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct StatsBox {
    /// True positives counted on the baseline side.
    #[serde(rename = "TP-base")]
    pub tp_base: u64,
    /// True positives counted on the comparison side.
    #[serde(rename = "TP-comp")]
    pub tp_comp: u64,
    /// False positives.
    #[serde(rename = "FP")]
    pub fp: u64,
    /// False negatives.
    #[serde(rename = "FN")]
    pub fn_: u64,
    /// `TP-comp / (TP-comp + FP)`.
    pub precision: f64,
    /// `TP-base / (TP-base + FN)`.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
    /// Number of baseline calls considered.
    #[serde(rename = "base cnt")]
    pub base_cnt: u64,
    /// Number of comparison calls considered.
    #[serde(rename = "comp cnt")]
    pub comp_cnt: u64,
    /// TP-comp calls with concordant genotype.
    #[serde(rename = "TP-comp_TP-gt")]
    pub tp_comp_tp_gt: u64,
    /// TP-comp calls with discordant genotype.
    #[serde(rename = "TP-comp_FP-gt")]
    pub tp_comp_fp_gt: u64,
    /// TP-base calls with concordant genotype.
    #[serde(rename = "TP-base_TP-gt")]
    pub tp_base_tp_gt: u64,
    /// TP-base calls with discordant genotype.
    #[serde(rename = "TP-base_FP-gt")]
    pub tp_base_fp_gt: u64,
    /// Fraction of TP-comp calls with concordant genotype.
    pub gt_concordance: f64,
    /// Confusion matrix of baseline genotype x comparison genotype.
    pub gt_matrix: IndexMap<String, IndexMap<String, u64>>,
}

impl StatsBox {
    /// Calculate the precision/recall.
    pub fn calc_performance(&mut self) {
        if self.tp_base == 0 && self.fn_ == 0 {
            tracing::warn!("No TP or FN calls in base!");
        } else if self.tp_comp == 0 && self.fp == 0 {
            tracing::warn!("No TP or FP calls in comp!");
        }

        if self.tp_comp + self.fp > 0 {
            self.precision = self.tp_comp as f64 / (self.tp_comp + self.fp) as f64;
        }
        if self.tp_base + self.fn_ > 0 {
            self.recall = self.tp_base as f64 / (self.tp_base + self.fn_) as f64;
        }
        if self.precision + self.recall > 0.0 {
            self.f1 = 2.0 * self.precision * self.recall / (self.precision + self.recall);
        }
        if self.tp_comp_tp_gt + self.tp_comp_fp_gt > 0 {
            self.gt_concordance =
                self.tp_comp_tp_gt as f64 / (self.tp_comp_tp_gt + self.tp_comp_fp_gt) as f64;
        }
    }
}

/// The INFO lines added to both output headers.
const INFO_LINES: &[(&str, usize, &str, &str)] = &[
    (
        "TruScore",
        1,
        "Integer",
        "Similarity score of the match (0-300)",
    ),
    (
        "PctSeqSimilarity",
        1,
        "Float",
        "Pct sequence similarity between this variant and its closest match",
    ),
    (
        "PctSizeSimilarity",
        1,
        "Float",
        "Pct size similarity between this variant and its closest match",
    ),
    (
        "PctRecOverlap",
        1,
        "Float",
        "Percent reciprocal overlap of the two calls' coordinates",
    ),
    (
        "StartDistance",
        1,
        "Integer",
        "Distance of the base call's start from comparison call's start",
    ),
    (
        "EndDistance",
        1,
        "Integer",
        "Distance of the base call's end from comparison call's end",
    ),
    (
        "SizeDiff",
        1,
        "Float",
        "Difference in size of base and comp calls",
    ),
    (
        "GTMatch",
        1,
        "Integer",
        "Base/Comparison genotypes AC difference",
    ),
    (
        "MatchId",
        1,
        "String",
        "Id to help tie base/comp calls together {chunkid}.{baseid}.{compid}",
    ),
    (
        "Multi",
        0,
        "Flag",
        "Call is false due to non-multimatching",
    ),
];

/// Return a copy of `header` with the benchmarking INFO lines added.
pub fn edit_header(header: &vcf::Header) -> Result<vcf::Header, anyhow::Error> {
    use vcf::header::{
        record::value::{map::info::Type, map::Info, Map},
        Number,
    };

    let mut header = header.clone();
    for (name, count, ty, description) in INFO_LINES {
        let key = name
            .parse::<vcf::record::info::field::Key>()
            .map_err(|_| anyhow::anyhow!("invalid INFO key {}", name))?;
        let ty = match *ty {
            "Integer" => Type::Integer,
            "Float" => Type::Float,
            "Flag" => Type::Flag,
            _ => Type::String,
        };
        header
            .infos_mut()
            .insert(key, Map::<Info>::new(Number::Count(*count), ty, *description));
    }
    Ok(header)
}

/// Copy `variant`'s record and attach the match measures as INFO fields.
fn annotate_record(variant: &Variant, m: &MatchResult) -> Result<vcf::Record, anyhow::Error> {
    use vcf::record::info::field::{Key, Value};

    let key = |name: &str| -> Result<Key, anyhow::Error> {
        name.parse::<Key>()
            .map_err(|_| anyhow::anyhow!("invalid INFO key {}", name))
    };

    let mut record = variant.record.clone();
    let info = record.info_mut();
    if let Some(seqsim) = m.seqsim {
        info.insert(
            key("PctSeqSimilarity")?,
            Some(Value::Float(common::round_to(seqsim, 4) as f32)),
        );
    }
    if let Some(sizesim) = m.sizesim {
        info.insert(
            key("PctSizeSimilarity")?,
            Some(Value::Float(common::round_to(sizesim, 4) as f32)),
        );
    }
    if let Some(ovlpct) = m.ovlpct {
        info.insert(
            key("PctRecOverlap")?,
            Some(Value::Float(common::round_to(ovlpct, 4) as f32)),
        );
    }
    if let Some(sizediff) = m.sizediff {
        info.insert(key("SizeDiff")?, Some(Value::Float(sizediff as f32)));
    }
    if let Some(st_dist) = m.st_dist {
        info.insert(key("StartDistance")?, Some(Value::Integer(st_dist as i32)));
    }
    if let Some(ed_dist) = m.ed_dist {
        info.insert(key("EndDistance")?, Some(Value::Integer(ed_dist as i32)));
    }
    if let Some(gt_match) = m.gt_match {
        info.insert(key("GTMatch")?, Some(Value::Integer(gt_match as i32)));
    }
    if let Some(score) = m.score {
        info.insert(key("TruScore")?, Some(Value::Integer(score as i32)));
    }
    info.insert(key("MatchId")?, Some(Value::String(m.matid.clone())));
    if m.multi {
        info.insert(key("Multi")?, Some(Value::Flag));
    }

    Ok(record)
}

/// The output files of one benchmarking run.
pub struct BenchOutput {
    outdir: PathBuf,
    base_header: vcf::Header,
    comp_header: vcf::Header,
    tpb_out: vcf::Writer<BufWriter<File>>,
    tpc_out: vcf::Writer<BufWriter<File>>,
    fn_out: vcf::Writer<BufWriter<File>>,
    fp_out: vcf::Writer<BufWriter<File>>,
    /// The counters filled while writing.
    pub stats: StatsBox,
}

impl BenchOutput {
    /// Create the four categorized VCF writers inside `outdir` and write
    /// the augmented headers.
    pub fn new(
        outdir: &Path,
        base_header: &vcf::Header,
        comp_header: &vcf::Header,
    ) -> Result<Self, anyhow::Error> {
        let base_header = edit_header(base_header)?;
        let comp_header = edit_header(comp_header)?;

        let open = |name: &str| -> Result<vcf::Writer<BufWriter<File>>, anyhow::Error> {
            let path = outdir.join(name);
            let file = File::create(&path)
                .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", path, e))?;
            Ok(vcf::Writer::new(BufWriter::new(file)))
        };

        let mut tpb_out = open("tp-base.vcf")?;
        let mut tpc_out = open("tp-comp.vcf")?;
        let mut fn_out = open("fn.vcf")?;
        let mut fp_out = open("fp.vcf")?;

        tpb_out.write_header(&base_header)?;
        fn_out.write_header(&base_header)?;
        tpc_out.write_header(&comp_header)?;
        fp_out.write_header(&comp_header)?;

        Ok(BenchOutput {
            outdir: outdir.to_path_buf(),
            base_header,
            comp_header,
            tpb_out,
            tpc_out,
            fn_out,
            fp_out,
            stats: StatsBox::default(),
        })
    }

    /// Annotate the match's variants, write them to the appropriate files,
    /// and do the stats counting.
    ///
    /// The writer is responsible for handling FPs between
    /// `sizefilt..sizemin`: those are neither counted nor written.
    pub fn write_match(
        &mut self,
        m: &MatchResult,
        base_variants: &[Variant],
        comp_variants: &[Variant],
        sizemin: i64,
    ) -> Result<(), anyhow::Error> {
        if let Some(bid) = m.base {
            let variant = &base_variants[bid];
            self.stats.base_cnt += 1;
            let record = annotate_record(variant, m)?;
            if m.state {
                *self
                    .stats
                    .gt_matrix
                    .entry(m.base_gt.clone())
                    .or_default()
                    .entry(m.comp_gt.clone())
                    .or_default() += 1;

                self.stats.tp_base += 1;
                self.tpb_out.write_record(&self.base_header, &record)?;
                if m.gt_match == Some(0) {
                    self.stats.tp_base_tp_gt += 1;
                } else {
                    self.stats.tp_base_fp_gt += 1;
                }
            } else {
                self.stats.fn_ += 1;
                self.fn_out.write_record(&self.base_header, &record)?;
            }
        }

        if let Some(cid) = m.comp {
            let variant = &comp_variants[cid];
            let record = annotate_record(variant, m)?;
            if m.state {
                self.stats.comp_cnt += 1;
                self.stats.tp_comp += 1;
                self.tpc_out.write_record(&self.comp_header, &record)?;
                if m.gt_match == Some(0) {
                    self.stats.tp_comp_tp_gt += 1;
                } else {
                    self.stats.tp_comp_fp_gt += 1;
                }
            } else if variant.size >= sizemin {
                self.stats.comp_cnt += 1;
                self.stats.fp += 1;
                self.fp_out.write_record(&self.comp_header, &record)?;
            }
        }

        Ok(())
    }

    /// Derive the performance numbers, write `summary.json`, and
    /// compress/index the four output files.
    pub fn finish(mut self) -> Result<StatsBox, anyhow::Error> {
        self.stats.calc_performance();

        let summary_path = self.outdir.join("summary.json");
        let summary = File::create(&summary_path)
            .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", summary_path, e))?;
        serde_json::to_writer_pretty(summary, &self.stats)
            .map_err(|e| anyhow::anyhow!("could not write {:?}: {}", summary_path, e))?;

        for writer in [self.tpb_out, self.tpc_out, self.fn_out, self.fp_out] {
            writer
                .into_inner()
                .flush()
                .map_err(|e| anyhow::anyhow!("problem flushing output VCF file: {}", e))?;
        }
        for name in ["tp-base.vcf", "tp-comp.vcf", "fn.vcf", "fp.vcf"] {
            let plain = self.outdir.join(name);
            let compressed = self.outdir.join(format!("{}.gz", name));
            compress_index_vcf(&plain, &compressed)?;
        }

        Ok(self.stats)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::bench::matching::MatchResult;
    use crate::bench::variant::{parse_test_variants, TEST_HEADER};

    use super::StatsBox;

    #[test]
    fn calc_performance_simple() {
        let mut stats = StatsBox {
            tp_base: 9,
            tp_comp: 8,
            fn_: 1,
            fp: 2,
            tp_comp_tp_gt: 6,
            tp_comp_fp_gt: 2,
            ..Default::default()
        };
        stats.calc_performance();

        assert!(float_cmp::approx_eq!(f64, stats.precision, 0.8, ulps = 2));
        assert!(float_cmp::approx_eq!(f64, stats.recall, 0.9, ulps = 2));
        let expected_f1 = 2.0 * 0.8 * 0.9 / (0.8 + 0.9);
        assert!(float_cmp::approx_eq!(f64, stats.f1, expected_f1, ulps = 2));
        assert!(float_cmp::approx_eq!(f64, stats.gt_concordance, 0.75, ulps = 2));
    }

    #[test]
    fn calc_performance_zero_denominators() {
        let mut stats = StatsBox::default();
        stats.calc_performance();

        assert_eq!(stats.precision, 0.0);
        assert_eq!(stats.recall, 0.0);
        assert_eq!(stats.f1, 0.0);
        assert_eq!(stats.gt_concordance, 0.0);
    }

    #[test]
    fn write_match_counts_and_files() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let outdir = tmpdir.join("bench");
        std::fs::create_dir(&outdir)?;

        let mut reader = noodles_vcf::Reader::new(TEST_HEADER.as_bytes());
        let header = reader.read_header()?;

        let variants = parse_test_variants(&format!(
            "{}chr1\t100\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t0/1\n",
            TEST_HEADER
        ));

        let mut output = super::BenchOutput::new(&outdir, &header, &header)?;
        let m = MatchResult {
            base: Some(0),
            comp: Some(0),
            state: true,
            seqsim: Some(1.0),
            sizesim: Some(1.0),
            ovlpct: Some(1.0),
            score: Some(300.0),
            gt_match: Some(0),
            st_dist: Some(0),
            ed_dist: Some(0),
            sizediff: Some(0),
            base_gt: String::from("0/1"),
            comp_gt: String::from("0/1"),
            matid: String::from("0.0.0"),
            ..Default::default()
        };
        output.write_match(&m, &variants, &variants, 4)?;

        let stats = output.finish()?;

        assert_eq!(stats.tp_base, 1);
        assert_eq!(stats.tp_comp, 1);
        assert_eq!(stats.fp, 0);
        assert_eq!(stats.fn_, 0);
        assert_eq!(stats.base_cnt, 1);
        assert_eq!(stats.comp_cnt, 1);
        assert_eq!(stats.precision, 1.0);
        assert_eq!(stats.recall, 1.0);
        assert_eq!(stats.f1, 1.0);
        assert_eq!(stats.gt_matrix["0/1"]["0/1"], 1);

        assert!(outdir.join("tp-base.vcf.gz").exists());
        assert!(outdir.join("tp-base.vcf.gz.tbi").exists());
        assert!(outdir.join("summary.json").exists());

        Ok(())
    }

    #[test]
    fn small_fp_not_counted_or_written() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let outdir = tmpdir.join("bench");
        std::fs::create_dir(&outdir)?;

        let mut reader = noodles_vcf::Reader::new(TEST_HEADER.as_bytes());
        let header = reader.read_header()?;

        // size 4 with a counting floor of 50
        let variants = parse_test_variants(&format!(
            "{}chr1\t100\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t0/1\n",
            TEST_HEADER
        ));

        let mut output = super::BenchOutput::new(&outdir, &header, &header)?;
        let m = MatchResult {
            comp: Some(0),
            matid: String::from("0._.0"),
            ..Default::default()
        };
        output.write_match(&m, &[], &variants, 50)?;

        let stats = output.finish()?;

        assert_eq!(stats.fp, 0);
        assert_eq!(stats.comp_cnt, 0);

        Ok(())
    }
}
