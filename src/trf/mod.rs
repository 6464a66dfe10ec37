//! Implementation of the `trf` subcommand.

pub mod annotate;
pub mod repeats;
pub mod tool;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::Parser;
use noodles_core::Position;
use noodles_vcf as vcf;
use rayon::prelude::*;

use crate::bench::variant::Variant;
use crate::common::{noodles::open_vcf_reader, ParamsError};

use self::annotate::{apply_annotation, RegionAnnotator};
use self::repeats::{read_tr_regions, RegionIndex, TrRegion};
use self::tool::TrfRunner;

/// Command line arguments for `trf` subcommand.
#[derive(Parser, Debug)]
#[command(author, version, about = "Annotate tandem repeats", long_about = None)]
pub struct Args {
    /// VCF to annotate (bgzip'd, tabix indexed).
    #[arg(short = 'i', long)]
    pub input: String,
    /// Output filename (stdout).
    #[arg(short = 'o', long)]
    pub output: Option<String>,
    /// Path to tandem repeat finder executable.
    #[arg(short = 'e', long, default_value = "trf409.linux64")]
    pub executable: String,
    /// Default parameters to send to the tandem repeat finder.
    #[arg(short = 'T', long, default_value = "3 7 7 80 5 40 500 -h -ngs")]
    pub trf_params: String,
    /// Reference repeat annotations.
    #[arg(short = 'r', long)]
    pub repeats: String,
    /// Reference fasta file.
    #[arg(short = 'f', long)]
    pub reference: String,
    /// Minimum size of entry to annotate.
    #[arg(short = 'm', long, default_value_t = 50)]
    pub min_length: i64,
    /// Maximum size of sequence to run through the tandem repeat finder.
    #[arg(short = 'M', long, default_value_t = 10_000)]
    pub max_length: i64,
    /// Number of worker threads, 0 meaning one per core.
    #[arg(short = 't', long, default_value_t = 0)]
    pub threads: usize,
    /// Verbose logging.
    #[arg(long)]
    pub debug: bool,
}

/// Whether `name` is a path to an executable or can be found on `PATH`.
fn executable_exists(name: &str) -> bool {
    let path = Path::new(name);
    if path.components().count() > 1 {
        return path.exists();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).exists()))
        .unwrap_or(false)
}

/// Ensure the input files are compressed/indexed, collecting all failures.
fn check_params(args: &Args) -> Vec<String> {
    let mut messages = Vec::new();

    if !Path::new(&args.input).exists() {
        messages.push(format!("{} doesn't exist", args.input));
    }
    if !args.input.ends_with(".vcf.gz") && !args.input.ends_with(".bcf.gz") {
        messages.push(format!("{} isn't a compressed vcf", args.input));
    }
    if !Path::new(&format!("{}.tbi", args.input)).exists()
        && !Path::new(&format!("{}.csi", args.input)).exists()
    {
        messages.push(format!("{}[.tbi|.csi] doesn't exist", args.input));
    }
    if !args.repeats.ends_with(".bed.gz") {
        messages.push(format!("{} isn't a compressed bed", args.repeats));
    }
    if !Path::new(&format!("{}.tbi", args.repeats)).exists() {
        messages.push(format!("{}.tbi doesn't exist", args.repeats));
    }
    if !Path::new(&args.reference).exists() {
        messages.push(format!("{} doesn't exist", args.reference));
    }
    if !executable_exists(&args.executable) {
        messages.push(format!("{} not found in path", args.executable));
    }

    messages
}

/// The INFO lines added to the output header.
const INFO_LINES: &[(&str, usize, &str, &str)] = &[
    ("TRF", 0, "Flag", "Entry hits a simple repeat region"),
    (
        "TRFdiff",
        1,
        "Float",
        "ALT TR copy difference from reference",
    ),
    ("TRFperiod", 1, "Integer", "Period size of the repeat"),
    (
        "TRFcopies",
        1,
        "Float",
        "Number of copies aligned with the consensus pattern",
    ),
    ("TRFscore", 1, "Integer", "Alignment score"),
    ("TRFentropy", 1, "Float", "Entropy measure"),
    ("TRFrepeat", 1, "String", "Repeat motif"),
    (
        "TRFovl",
        1,
        "Float",
        "Percent of ALT covered by TRF annotation",
    ),
];

/// Return a copy of `header` with the repeat annotation INFO lines added.
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

/// The 0-based half-open interval of a record, as used for the containment
/// check on both the coordinator and the worker side.
fn record_interval(record: &vcf::Record) -> (i64, i64) {
    let start = usize::from(record.position()).saturating_sub(1) as i64;
    let end = record.end().map(usize::from).unwrap_or(start as usize + 1) as i64;
    (start, end)
}

/// One record of a repeat region: scored against motifs when it enters the
/// comparison model, otherwise written with the region flag only.
enum RegionEntry {
    Scored(Variant),
    FlagOnly(vcf::Record),
}

/// Annotate all records of one repeat region into an in-memory buffer.
///
/// Every failure is logged; a region never aborts the whole run.
fn process_region(
    region: &TrRegion,
    input: &str,
    reference: &str,
    runner: &TrfRunner,
    min_length: i64,
    max_length: i64,
) -> Vec<vcf::Record> {
    tracing::debug!(
        "starting region {}:{}-{}",
        region.chrom,
        region.start,
        region.end
    );

    let mut reader = match vcf::indexed_reader::Builder::default().build_from_path(input) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!("could not open {} for region fetch: {}", input, e);
            return Vec::new();
        }
    };
    let header = match reader.read_header() {
        Ok(header) => header,
        Err(e) => {
            tracing::warn!("could not read header of {}: {}", input, e);
            return Vec::new();
        }
    };

    let interval = match (
        Position::try_from((region.start + 1) as usize),
        Position::try_from(region.end as usize),
    ) {
        (Ok(start), Ok(end)) => start..=end,
        _ => {
            tracing::warn!(
                "invalid region {}:{}-{}",
                region.chrom,
                region.start,
                region.end
            );
            return Vec::new();
        }
    };
    let query_region = noodles_core::Region::new(region.chrom.clone(), interval);

    let mut entries = Vec::new();
    match reader.query(&header, &query_region) {
        Ok(query) => {
            for result in query {
                let record = match result {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::debug!("skipping malformed record: {}", e);
                        continue;
                    }
                };
                // Entries must be entirely contained within the region;
                // containment uses the same interval as the coordinator.
                let (start, end) = record_interval(&record);
                if !(start >= region.start && end < region.end) {
                    continue;
                }
                match Variant::from_record(record.clone(), 0) {
                    Ok(variant) => entries.push(RegionEntry::Scored(variant)),
                    Err(e) => {
                        tracing::debug!("record only gets the region flag: {}", e);
                        entries.push(RegionEntry::FlagOnly(record));
                    }
                }
            }
        }
        Err(e) => {
            tracing::debug!("skipping VCF fetch: {}", e);
            return Vec::new();
        }
    }

    // No entries, so nothing to do.
    if entries.is_empty() {
        return Vec::new();
    }

    let needs_scoring = entries
        .iter()
        .any(|entry| matches!(entry, RegionEntry::Scored(_)));
    let annotator = if needs_scoring {
        let mut fasta = match bio::io::fasta::IndexedReader::from_file(&reference) {
            Ok(fasta) => fasta,
            Err(e) => {
                tracing::warn!("could not open reference {}: {}", reference, e);
                return Vec::new();
            }
        };
        let mut ref_seq = Vec::new();
        let fetched = fasta
            .fetch(&region.chrom, region.start as u64, region.end as u64)
            .and_then(|_| fasta.read(&mut ref_seq));
        if let Err(e) = fetched {
            tracing::warn!(
                "could not fetch reference {}:{}-{}: {}",
                region.chrom,
                region.start,
                region.end,
                e
            );
            return Vec::new();
        }
        Some(RegionAnnotator::new(
            region.clone(),
            String::from_utf8_lossy(&ref_seq).to_string(),
            runner.clone(),
            min_length,
            max_length,
        ))
    } else {
        None
    };

    let mut buffer = Vec::with_capacity(entries.len());
    for entry in entries {
        let (mut record, best) = match entry {
            RegionEntry::Scored(variant) => {
                let best = annotator.as_ref().and_then(|a| a.annotate(&variant));
                (variant.record, best)
            }
            RegionEntry::FlagOnly(record) => (record, None),
        };
        match apply_annotation(&mut record, best.as_ref()) {
            Ok(()) => buffer.push(record),
            Err(e) => {
                tracing::warn!("could not annotate record: {}", e);
                buffer.push(record);
            }
        }
    }

    tracing::debug!(
        "done region {}:{}-{}",
        region.chrom,
        region.start,
        region.end
    );
    buffer
}

/// Main entry point for the `trf` subcommand.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = std::time::Instant::now();
    tracing::info!("args_common = {:#?}", args_common);
    tracing::info!("args = {:#?}", args);

    let messages = check_params(args);
    if !messages.is_empty() {
        for message in &messages {
            tracing::error!("{}", message);
        }
        return Err(ParamsError { messages }.into());
    }

    let regions = read_tr_regions(&args.repeats)?;
    let region_index = RegionIndex::new(&regions);
    tracing::info!("loaded {} repeat regions", regions.len());

    let mut reader = open_vcf_reader(&args.input)?;
    let header = reader
        .read_header()
        .map_err(|e| anyhow::anyhow!("problem reading VCF header {}: {}", &args.input, e))?;
    let out_header = edit_header(&header)?;

    let inner: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|e| {
            anyhow::anyhow!("could not create output file {}: {}", path, e)
        })?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let mut writer = vcf::Writer::new(inner);
    writer.write_header(&out_header)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()
        .map_err(|e| anyhow::anyhow!("could not build thread pool: {}", e))?;
    let (tx, rx) = std::sync::mpsc::sync_channel::<Vec<vcf::Record>>(
        2 * std::cmp::max(1, args.threads),
    );

    let runner = TrfRunner::new(&args.executable, &args.trf_params);
    let regions_ref = &regions;
    let runner_ref = &runner;
    let (input, reference) = (args.input.clone(), args.reference.clone());
    let (min_length, max_length) = (args.min_length, args.max_length);

    std::thread::scope(|scope| -> Result<(), anyhow::Error> {
        scope.spawn(move || {
            pool.install(|| {
                regions_ref.par_iter().for_each_with(tx, |tx, region| {
                    let buffer =
                        process_region(region, &input, &reference, runner_ref, min_length, max_length);
                    // The receiver only goes away when the coordinator failed.
                    let _ = tx.send(buffer);
                });
            });
        });

        // Write all variants that overlap no repeat region.
        for result in reader.records(&header) {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!("skipping malformed record: {}", e);
                    continue;
                }
            };
            let (start, end) = record_interval(&record);
            if !region_index.contains(&record.chromosome().to_string(), start, end) {
                writer.write_record(&out_header, &record)?;
            }
        }

        // Now collect the per-region buffers in arrival order.
        for buffer in rx {
            for record in buffer {
                writer.write_record(&out_header, &record)?;
            }
        }

        Ok(())
    })?;

    tracing::info!("All of `trf` completed in {:?}", before_anything.elapsed());
    Ok(())
}
