//! Uniform view of one VCF record for comparison.

use noodles_vcf as vcf;

/// Type of a structural variant.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, strum_macros::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SvType {
    /// Insertion
    Ins,
    /// Deletion
    Del,
    /// Duplication
    Dup,
    /// Inversion
    Inv,
    /// Anything else (SNVs, MNVs, break-ends, ...)
    #[default]
    Other,
}

impl std::str::FromStr for SvType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use SvType::*;
        Ok(match s {
            "INS" => Ins,
            "DEL" => Del,
            "DUP" => Dup,
            "INV" => Inv,
            _ => Other,
        })
    }
}

impl SvType {
    /// The type used for comparison, optionally folding duplications into
    /// insertions.
    pub fn normalized(self, dup_to_ins: bool) -> SvType {
        if dup_to_ins && self == SvType::Dup {
            SvType::Ins
        } else {
            self
        }
    }
}

/// Genotype of the selected sample as ordered allele indices.
///
/// `None` entries are no-calls; an empty list means the record carried no
/// usable `GT` at all.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Genotype {
    /// Allele indices, `None` for `.`.
    pub alleles: Vec<Option<u8>>,
}

impl Genotype {
    /// Number of non-reference, non-missing alleles.
    pub fn allele_count(&self) -> u32 {
        self.alleles
            .iter()
            .filter(|a| matches!(a, Some(i) if *i > 0))
            .count() as u32
    }

    /// Whether any allele was parsed at all.
    pub fn is_present(&self) -> bool {
        !self.alleles.is_empty()
    }

    /// Render as a `/`-separated string, `.` standing in for no-calls.
    pub fn render(&self) -> String {
        if self.alleles.is_empty() {
            String::from(".")
        } else {
            self.alleles
                .iter()
                .map(|a| match a {
                    Some(i) => i.to_string(),
                    None => String::from("."),
                })
                .collect::<Vec<_>>()
                .join("/")
        }
    }
}

impl std::str::FromStr for Genotype {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut alleles = Vec::new();
        for part in s.split(['/', '|']) {
            if part == "." {
                alleles.push(None);
            } else {
                let idx = part
                    .parse::<u8>()
                    .map_err(|e| anyhow::anyhow!("invalid genotype value {:?}: {}", s, e))?;
                alleles.push(Some(idx));
            }
        }
        Ok(Genotype { alleles })
    }
}

/// One variant call with the attributes the comparison engine needs.
///
/// Coordinates are 0-based, half-open. Values are fixed at construction;
/// the carried `record` is only touched again when annotated output is
/// written.
#[derive(Debug, Clone)]
pub struct Variant {
    /// The underlying VCF record.
    pub record: vcf::Record,
    /// Chromosome name.
    pub chrom: String,
    /// 0-based start position.
    pub start: i64,
    /// 0-based end position (exclusive).
    pub end: i64,
    /// Reference allele sequence.
    pub ref_allele: String,
    /// The single alternate allele sequence (possibly symbolic).
    pub alt_allele: String,
    /// Type of the variant.
    pub sv_type: SvType,
    /// Absolute allele length difference.
    pub size: i64,
    /// Genotype of the selected sample.
    pub gt: Genotype,
    /// Whether FILTER is empty or PASS.
    pub is_pass: bool,
}

impl Variant {
    /// Build a `Variant` from a VCF record, taking the genotype from the
    /// sample with index `sample_idx`.
    ///
    /// Fails on records without exactly one alternate allele; such records
    /// are not comparable and the caller is expected to log and skip them.
    pub fn from_record(record: vcf::Record, sample_idx: usize) -> Result<Self, anyhow::Error> {
        let chrom = record.chromosome().to_string();
        let start = usize::from(record.position()).saturating_sub(1) as i64;

        if record.alternate_bases().len() != 1 {
            anyhow::bail!(
                "record at {}:{} does not have exactly one ALT allele",
                chrom,
                record.position()
            );
        }
        let ref_allele = record.reference_bases().to_string();
        let alt_allele = record.alternate_bases()[0].to_string();

        let end = record
            .end()
            .map(usize::from)
            .map_err(|e| anyhow::anyhow!("could not compute end position: {}", e))?
            as i64;

        let sv_type = if let Some(Some(vcf::record::info::field::Value::String(sv_type))) =
            record.info().get(&vcf::record::info::field::key::SV_TYPE)
        {
            sv_type.parse()?
        } else {
            infer_sv_type(&ref_allele, &alt_allele)
        };

        let size = if alt_allele.starts_with('<') {
            if let Some(Some(vcf::record::info::field::Value::Integer(svlen))) = record
                .info()
                .get(&vcf::record::info::field::key::SV_LENGTHS)
            {
                (*svlen as i64).abs()
            } else {
                end - start
            }
        } else {
            (alt_allele.len() as i64 - ref_allele.len() as i64).abs()
        };

        let gt = genotype_of_sample(&record, sample_idx);
        let is_pass = matches!(
            record.filters(),
            None | Some(vcf::record::Filters::Pass)
        );

        Ok(Variant {
            record,
            chrom,
            start,
            end,
            ref_allele,
            alt_allele,
            sv_type,
            size,
            gt,
            is_pass,
        })
    }

    /// The allele sequence relevant for sequence comparison: the ALT for
    /// insertions, the REF for deletions. `None` for symbolic alleles.
    pub fn comparison_seq(&self) -> Option<&str> {
        if self.alt_allele.starts_with('<') {
            return None;
        }
        match self.sv_type {
            SvType::Del => Some(&self.ref_allele),
            _ => Some(&self.alt_allele),
        }
    }
}

/// Infer the variant type from the ALT notation.
///
/// Symbolic alleles take their type from the bracketed symbol (first
/// `:`-separated token, so `<DUP:TANDEM>` reads as DUP); only
/// sequence-resolved alleles fall back to length comparison.
fn infer_sv_type(ref_allele: &str, alt_allele: &str) -> SvType {
    if let Some(symbol) = alt_allele
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
    {
        let token = symbol.split(':').next().unwrap_or(symbol);
        return token.parse().unwrap_or(SvType::Other);
    }
    use std::cmp::Ordering::*;
    match alt_allele.len().cmp(&ref_allele.len()) {
        Greater => SvType::Ins,
        Less => SvType::Del,
        Equal => SvType::Other,
    }
}

/// Extract the genotype of the given sample, falling back to an empty
/// genotype on missing or malformed data.
fn genotype_of_sample(record: &vcf::Record, sample_idx: usize) -> Genotype {
    if let Some(sample) = record.genotypes().values().nth(sample_idx) {
        if let Some(Some(gt)) = sample.get(&vcf::record::genotypes::keys::key::GENOTYPE) {
            if let vcf::record::genotypes::sample::Value::String(gt) = gt {
                return gt.parse().unwrap_or_default();
            }
        }
    }
    Genotype::default()
}

#[cfg(test)]
pub(crate) fn parse_test_variants(text: &str) -> Vec<Variant> {
    let mut reader = vcf::Reader::new(text.as_bytes());
    let header = reader.read_header().expect("invalid test VCF header");
    reader
        .records(&header)
        .map(|result| {
            Variant::from_record(result.expect("invalid test VCF record"), 0)
                .expect("uncomparable test VCF record")
        })
        .collect()
}

#[cfg(test)]
pub(crate) const TEST_HEADER: &str = "##fileformat=VCFv4.2\n\
    ##contig=<ID=chr1>\n\
    ##contig=<ID=chr2>\n\
    ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
    #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE\n";

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{parse_test_variants, Genotype, SvType, TEST_HEADER};

    #[test]
    fn variant_from_insertion_record() {
        let variants = parse_test_variants(&format!(
            "{}chr1\t100\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t0/1\n",
            TEST_HEADER
        ));

        assert_eq!(variants.len(), 1);
        let v = &variants[0];
        assert_eq!(v.chrom, "chr1");
        assert_eq!(v.start, 99);
        assert_eq!(v.end, 100);
        assert_eq!(v.sv_type, SvType::Ins);
        assert_eq!(v.size, 4);
        assert_eq!(v.gt.render(), "0/1");
        assert!(v.is_pass);
    }

    #[test]
    fn variant_from_deletion_record() {
        let variants = parse_test_variants(&format!(
            "{}chr1\t200\t.\tGAAAAA\tG\t.\t.\t.\tGT\t1/1\n",
            TEST_HEADER
        ));

        let v = &variants[0];
        assert_eq!(v.start, 199);
        assert_eq!(v.end, 205);
        assert_eq!(v.sv_type, SvType::Del);
        assert_eq!(v.size, 5);
        assert_eq!(v.gt.allele_count(), 2);
    }

    #[test]
    fn variant_from_symbolic_deletion_without_svtype() {
        let variants = parse_test_variants(&format!(
            "{}chr1\t100\t.\tG\t<DEL>\t.\tPASS\tEND=200\tGT\t0/1\n",
            TEST_HEADER
        ));

        let v = &variants[0];
        assert_eq!(v.sv_type, SvType::Del);
        assert_eq!(v.start, 99);
        assert_eq!(v.end, 200);
        assert_eq!(v.size, 101);
    }

    #[rstest::rstest]
    #[case("G", "<DEL>", SvType::Del)]
    #[case("G", "<DUP:TANDEM>", SvType::Dup)]
    #[case("G", "<WEIRD>", SvType::Other)]
    #[case("G", "GAAAA", SvType::Ins)]
    #[case("GAAAA", "G", SvType::Del)]
    #[case("G", "T", SvType::Other)]
    fn infer_sv_type(#[case] ref_allele: &str, #[case] alt_allele: &str, #[case] expected: SvType) {
        assert_eq!(super::infer_sv_type(ref_allele, alt_allele), expected);
    }

    #[rstest::rstest]
    #[case("0/1", 1, "0/1")]
    #[case("1|1", 2, "1/1")]
    #[case("./.", 0, "./.")]
    #[case("./1", 1, "./1")]
    #[case("0/0", 0, "0/0")]
    fn genotype_parsing(#[case] gt: &str, #[case] ac: u32, #[case] rendered: &str) {
        let gt: Genotype = gt.parse().unwrap();
        assert_eq!(gt.allele_count(), ac);
        assert_eq!(gt.render(), rendered);
    }

    #[test]
    fn genotype_missing() {
        let gt = Genotype::default();
        assert!(!gt.is_present());
        assert_eq!(gt.allele_count(), 0);
        assert_eq!(gt.render(), ".");
    }

    #[rstest::rstest]
    #[case(SvType::Dup, true, SvType::Ins)]
    #[case(SvType::Dup, false, SvType::Dup)]
    #[case(SvType::Del, true, SvType::Del)]
    fn sv_type_normalized(#[case] ty: SvType, #[case] dup_to_ins: bool, #[case] expected: SvType) {
        assert_eq!(ty.normalized(dup_to_ins), expected);
    }
}
