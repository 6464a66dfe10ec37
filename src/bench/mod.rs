//! Implementation of the `bench` subcommand.

pub mod chunker;
pub mod matching;
pub mod output;
pub mod pickers;
pub mod regions;
pub mod variant;

use std::io::BufRead;
use std::path::Path;

use clap::Parser;
use noodles_vcf as vcf;

use crate::common::{self, io::StderrTee, noodles::open_vcf_reader, ParamsError};

use self::chunker::Chunker;
use self::matching::{MatchParams, Matcher, NoRefSide};
use self::output::BenchOutput;
use self::pickers::{build_matrix, pick_matches};
use self::regions::RegionSet;
use self::variant::Variant;

/// Command line arguments for `bench` subcommand.
#[derive(Parser, Debug)]
#[command(author, version, about = "Benchmark a comparison call set", long_about = None)]
pub struct Args {
    /// Baseline truth-set calls (bgzip'd, tabix indexed).
    #[arg(short = 'b', long)]
    pub base: String,
    /// Comparison set of calls (bgzip'd, tabix indexed).
    #[arg(short = 'c', long)]
    pub comp: String,
    /// Output directory; must not exist yet.
    #[arg(short = 'o', long)]
    pub output: String,
    /// Indexed fasta used to call variants.
    #[arg(short = 'f', long)]
    pub reference: Option<String>,
    /// Verbose logging.
    #[arg(long)]
    pub debug: bool,
    /// Turn on progress monitoring.
    #[arg(long)]
    pub prog: bool,

    /// Max reference location distance.
    #[arg(short = 'r', long, default_value_t = 500)]
    pub refdist: i64,
    /// Min percent sequence similarity. Set to 0 to ignore.
    #[arg(short = 'p', long, default_value_t = 0.7)]
    pub pctseq: f64,
    /// Minimum haplotype sequence length to create.
    #[arg(short = 'B', long, default_value_t = 50)]
    pub minhaplen: i64,
    /// Min pct allele size similarity (minvarsize/maxvarsize).
    #[arg(short = 'P', long, default_value_t = 0.7)]
    pub pctsize: f64,
    /// Min pct reciprocal overlap.
    #[arg(short = 'O', long, default_value_t = 0.0)]
    pub pctovl: f64,
    /// Variant types don't need to match to compare.
    #[arg(short = 't', long)]
    pub typeignore: bool,
    /// Assume DUP svtypes are INS.
    #[arg(long)]
    pub dup_to_ins: bool,
    /// Use the Levenshtein distance ratio instead of the edit-distance ratio.
    #[arg(long)]
    pub use_lev: bool,
    /// Max reference distance to compare calls.
    #[arg(short = 'C', long, default_value_t = 1000)]
    pub chunksize: i64,

    /// Compare genotypes and allow homozygous variants to be matched twice.
    #[arg(short = 'g', long)]
    pub gtcomp: bool,
    /// Baseline calls sample to use (first).
    #[arg(long = "bSample")]
    pub b_sample: Option<String>,
    /// Comparison calls sample to use (first).
    #[arg(long = "cSample")]
    pub c_sample: Option<String>,

    /// Minimum variant size to consider from the baseline set.
    #[arg(short = 's', long, default_value_t = 50)]
    pub sizemin: i64,
    /// Minimum variant size to consider from the comparison set.
    #[arg(short = 'S', long)]
    pub sizefilt: Option<i64>,
    /// Maximum variant size to consider for comparison.
    #[arg(long, default_value_t = 50_000)]
    pub sizemax: i64,
    /// Only consider calls with FILTER == PASS.
    #[arg(long)]
    pub passonly: bool,
    /// Don't include 0/0 or ./. GT calls from all (a), base (b), or comp (c) vcfs.
    #[arg(long = "no-ref", value_enum)]
    pub no_ref: Option<NoRefSide>,
    /// Bed file of regions in the genome to include only calls overlapping.
    #[arg(long)]
    pub includebed: Option<String>,
    /// Distance to allow comp entries outside of includebed regions.
    #[arg(long, default_value_t = 0)]
    pub extend: i64,
    /// Allow base calls to match multiple comparison calls, and vice versa.
    #[arg(long)]
    pub multimatch: bool,
}

impl Args {
    /// The effective comparison parameters.
    ///
    /// When `--sizefilt` is not given and `--sizemin` has been lowered below
    /// the default comparison floor, the floor follows `--sizemin`.
    pub fn match_params(&self) -> MatchParams {
        let defaults = MatchParams::default();
        let sizefilt = self.sizefilt.unwrap_or(if self.sizemin < defaults.sizefilt {
            self.sizemin
        } else {
            defaults.sizefilt
        });
        MatchParams {
            refdist: self.refdist,
            pctseq: self.pctseq,
            pctsize: self.pctsize,
            pctovl: self.pctovl,
            typeignore: self.typeignore,
            dup_to_ins: self.dup_to_ins,
            use_lev: self.use_lev,
            minhaplen: self.minhaplen,
            chunksize: self.chunksize,
            sizemin: self.sizemin,
            sizefilt,
            sizemax: self.sizemax,
            passonly: self.passonly,
            no_ref: self.no_ref,
            gtcomp: self.gtcomp,
            multimatch: self.multimatch,
        }
    }
}

/// The effective run configuration written to `params.json`.
#[derive(Debug, serde::Serialize)]
struct RunParams<'a> {
    version: &'a str,
    base: &'a str,
    comp: &'a str,
    output: &'a str,
    reference: &'a Option<String>,
    includebed: &'a Option<String>,
    extend: i64,
    debug: bool,
    #[serde(flatten)]
    params: &'a MatchParams,
}

/// Check parameters as much as possible, collecting all failures.
fn check_params(args: &Args) -> Vec<String> {
    let mut messages = Vec::new();

    if args.chunksize < args.refdist {
        messages.push(String::from("--chunksize must be >= --refdist"));
    }
    if args.extend != 0 && args.includebed.is_none() {
        messages.push(String::from(
            "--extend can only be used when --includebed is set",
        ));
    }
    if Path::new(&args.output).exists() {
        messages.push(format!("Output directory '{}' already exists", args.output));
    }
    for (label, path) in [("base", &args.base), ("comp", &args.comp)] {
        if !Path::new(path).exists() {
            messages.push(format!("File {} does not exist", path));
            continue;
        }
        if !path.ends_with(".gz") {
            messages.push(format!(
                "{} vcf {} does not end with .gz. Must be bgzip'd",
                label, path
            ));
        }
        if !Path::new(&format!("{}.tbi", path)).exists() {
            messages.push(format!(
                "{} vcf index {}.tbi does not exist. Must be indexed",
                label, path
            ));
        }
    }
    if let Some(includebed) = &args.includebed {
        if !Path::new(includebed).exists() {
            messages.push(format!("Include bed {} does not exist", includebed));
        }
    }
    if let Some(reference) = &args.reference {
        if !Path::new(reference).exists() {
            messages.push(format!("Reference {} does not exist", reference));
        }
    }

    messages
}

/// Resolve the sample to use from `path`'s header, checking it exists.
fn check_sample(path: &str, sample: Option<&str>) -> Result<usize, String> {
    let header = open_vcf_reader(path)
        .and_then(|mut reader| {
            reader
                .read_header()
                .map_err(|e| anyhow::anyhow!("problem reading header: {}", e))
        })
        .map_err(|e| format!("Could not read VCF header ({}): {}", path, e))?;

    if header.sample_names().is_empty() {
        return Err(format!("No SAMPLE columns found in vcf ({})", path));
    }
    match sample {
        Some(name) => header
            .sample_names()
            .get_index_of(name)
            .ok_or_else(|| format!("Sample {} not found in vcf ({})", name, path)),
        None => Ok(0),
    }
}

/// Lazily turn VCF records into filtered `Variant`s.
fn variant_stream<'a, R>(
    reader: &'a mut vcf::Reader<R>,
    header: &'a vcf::Header,
    sample_idx: usize,
    is_base: bool,
    params: MatchParams,
    regions: Option<&'a RegionSet>,
) -> impl Iterator<Item = Variant> + 'a
where
    R: BufRead,
{
    reader
        .records(header)
        .filter_map(move |result| match result {
            Ok(record) => match Variant::from_record(record, sample_idx) {
                Ok(variant) => Some(variant),
                Err(e) => {
                    tracing::debug!("skipping uncomparable record: {}", e);
                    None
                }
            },
            Err(e) => {
                tracing::debug!("skipping malformed record: {}", e);
                None
            }
        })
        .filter(move |v| params.keep_variant(v, is_base))
        .filter(move |v| {
            regions
                .map(|r| r.contains(&v.chrom, v.start, v.end))
                .unwrap_or(true)
        })
}

/// Main entry point for the `bench` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("args_common = {:#?}", args_common);
    tracing::info!("args = {:#?}", args);

    let mut messages = check_params(args);
    let b_sample = check_sample(&args.base, args.b_sample.as_deref()).unwrap_or_else(|msg| {
        messages.push(msg);
        0
    });
    let c_sample = check_sample(&args.comp, args.c_sample.as_deref()).unwrap_or_else(|msg| {
        messages.push(msg);
        0
    });
    if !messages.is_empty() {
        for message in &messages {
            tracing::error!("{}", message);
        }
        return Err(ParamsError { messages }.into());
    }

    let outdir = Path::new(&args.output);
    std::fs::create_dir(outdir)
        .map_err(|e| anyhow::anyhow!("could not create output directory {:?}: {}", outdir, e))?;

    // From here on, log to both stderr and `<outdir>/log.txt`.
    let tee = StderrTee::new(outdir.join("log.txt"))?;
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(if args.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(tee)
        .compact()
        .finish();
    tracing::subscriber::with_default(collector, || run_bench(args, b_sample, c_sample))
}

/// Run the benchmarking pipeline proper.
fn run_bench(args: &Args, b_sample: usize, c_sample: usize) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    let outdir = Path::new(&args.output);
    let params = args.match_params();

    let run_params = RunParams {
        version: common::VERSION,
        base: &args.base,
        comp: &args.comp,
        output: &args.output,
        reference: &args.reference,
        includebed: &args.includebed,
        extend: args.extend,
        debug: args.debug,
        params: &params,
    };
    tracing::info!(
        "Params:\n{}",
        serde_json::to_string_pretty(&run_params)
            .map_err(|e| anyhow::anyhow!("could not serialize params: {}", e))?
    );
    let params_path = outdir.join("params.json");
    let params_file = std::fs::File::create(&params_path)
        .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", params_path, e))?;
    serde_json::to_writer(params_file, &run_params)
        .map_err(|e| anyhow::anyhow!("could not write {:?}: {}", params_path, e))?;

    let mut base_reader = open_vcf_reader(&args.base)?;
    let base_header = base_reader
        .read_header()
        .map_err(|e| anyhow::anyhow!("problem reading VCF header {}: {}", &args.base, e))?;
    let mut comp_reader = open_vcf_reader(&args.comp)?;
    let comp_header = comp_reader
        .read_header()
        .map_err(|e| anyhow::anyhow!("problem reading VCF header {}: {}", &args.comp, e))?;

    let contigs: Vec<String> = base_header
        .contigs()
        .keys()
        .map(|name| name.to_string())
        .collect();

    let mut output = BenchOutput::new(outdir, &base_header, &comp_header)?;

    let regions = args
        .includebed
        .as_deref()
        .map(RegionSet::from_bed)
        .transpose()?;
    let regions_extended = if args.extend > 0 {
        regions.as_ref().map(|r| r.extend(args.extend))
    } else {
        None
    };

    let mut matcher = Matcher::new(params.clone(), args.reference.as_deref())?;

    let base_stream = variant_stream(
        &mut base_reader,
        &base_header,
        b_sample,
        true,
        params.clone(),
        regions.as_ref(),
    );
    let comp_stream = variant_stream(
        &mut comp_reader,
        &comp_header,
        c_sample,
        false,
        params.clone(),
        regions_extended.as_ref().or(regions.as_ref()),
    );

    let chunks = Chunker::new(base_stream, comp_stream, params.chunksize, &contigs);
    let mut n_chunks = 0u64;
    for chunk in chunks {
        n_chunks += 1;
        if args.prog && n_chunks % 100 == 0 {
            tracing::info!("processed {} chunks", n_chunks);
        }
        let matrix = build_matrix(&mut matcher, &chunk);
        let mut matches = pick_matches(matrix, &params);
        for m in matches.iter_mut() {
            // Unmatched comp calls that only passed the widened region
            // filter do not count as FP and are not written.
            if args.extend > 0 && !m.state {
                if let Some(cid) = m.comp {
                    let v = &chunk.comp[cid];
                    let contained = regions
                        .as_ref()
                        .map(|r| r.contains(&v.chrom, v.start, v.end))
                        .unwrap_or(true);
                    if !contained {
                        m.comp = None;
                    }
                }
            }
            if m.base.is_none() && m.comp.is_none() {
                continue;
            }
            output.write_match(m, &chunk.base, &chunk.comp, params.sizemin)?;
        }
    }
    tracing::info!("processed {} chunks overall", n_chunks);

    let stats = output.finish()?;
    tracing::info!(
        "Stats: {}",
        serde_json::to_string_pretty(&stats)
            .map_err(|e| anyhow::anyhow!("could not serialize stats: {}", e))?
    );

    tracing::info!(
        "All of `bench` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::Args;

    fn args_with(argv: &[&str]) -> Args {
        use clap::Parser;
        let mut full = vec!["bench", "-b", "base.vcf.gz", "-c", "comp.vcf.gz", "-o", "out"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).expect("invalid test arguments")
    }

    #[test]
    fn sizefilt_follows_lowered_sizemin() {
        let args = args_with(&["-s", "1"]);
        let params = args.match_params();
        assert_eq!(params.sizemin, 1);
        assert_eq!(params.sizefilt, 1);
    }

    #[test]
    fn sizefilt_defaults_to_30() {
        let args = args_with(&[]);
        let params = args.match_params();
        assert_eq!(params.sizemin, 50);
        assert_eq!(params.sizefilt, 30);
    }

    #[test]
    fn sizefilt_explicit_wins() {
        let args = args_with(&["-s", "1", "-S", "10"]);
        let params = args.match_params();
        assert_eq!(params.sizefilt, 10);
    }

    #[test]
    fn check_params_collects_all_failures() {
        let args = args_with(&["-C", "100", "-r", "500", "--extend", "10"]);
        let messages = super::check_params(&args);

        assert!(messages.iter().any(|m| m.contains("--chunksize")));
        assert!(messages.iter().any(|m| m.contains("--extend")));
        assert!(messages.iter().any(|m| m.contains("does not exist")));
        assert!(messages.len() >= 4);
    }

    #[test]
    fn counts_balance_over_a_chunk() -> Result<(), anyhow::Error> {
        use crate::bench::chunker::Chunk;
        use crate::bench::matching::{MatchParams, Matcher};
        use crate::bench::output::BenchOutput;
        use crate::bench::pickers::{build_matrix, pick_matches};
        use crate::bench::variant::{parse_test_variants, TEST_HEADER};

        let tmpdir = temp_testdir::TempDir::default();
        let outdir = tmpdir.join("bench");
        std::fs::create_dir(&outdir)?;

        let mut reader = noodles_vcf::Reader::new(TEST_HEADER.as_bytes());
        let header = reader.read_header()?;

        // Two baseline calls, only the first one is recovered.
        let base = parse_test_variants(&format!(
            "{}chr1\t100\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t0/1\n\
             chr1\t400\t.\tG\tGTTTT\t.\tPASS\t.\tGT\t0/1\n",
            TEST_HEADER
        ));
        let comp = parse_test_variants(&format!(
            "{}chr1\t100\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t0/1\n",
            TEST_HEADER
        ));
        let chunk = Chunk { id: 0, base, comp };

        let params = MatchParams {
            sizemin: 4,
            sizefilt: 4,
            ..Default::default()
        };
        let mut matcher = Matcher::new(params.clone(), None)?;
        let mut output = BenchOutput::new(&outdir, &header, &header)?;

        let matches = pick_matches(build_matrix(&mut matcher, &chunk), &params);
        for m in &matches {
            output.write_match(m, &chunk.base, &chunk.comp, params.sizemin)?;
        }
        let stats = output.finish()?;

        assert_eq!(stats.tp_base + stats.fn_, stats.base_cnt);
        assert_eq!(stats.tp_comp + stats.fp, stats.comp_cnt);
        assert_eq!((stats.tp_base, stats.fn_), (1, 1));
        assert_eq!((stats.tp_comp, stats.fp), (1, 0));

        Ok(())
    }
}
