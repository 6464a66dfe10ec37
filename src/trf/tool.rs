//! Invocation of the external tandem repeat finder.

use std::io::Write;
use std::process::Command;

use super::repeats::MotifRecord;

/// Configuration for running the external tandem repeat finder.
#[derive(Debug, Clone)]
pub struct TrfRunner {
    /// Name or path of the executable.
    pub executable: String,
    /// Parameters passed through to the tool; `-ngs` is enforced.
    pub params: Vec<String>,
}

impl TrfRunner {
    /// Create a new runner from the executable and its parameter string.
    pub fn new(executable: &str, params: &str) -> Self {
        let mut params: Vec<String> = params.split_whitespace().map(String::from).collect();
        if !params.iter().any(|p| p == "-ngs") {
            params.push(String::from("-ngs"));
        }
        TrfRunner {
            executable: executable.to_string(),
            params,
        }
    }

    /// Run the tool on `seq` and return the motifs it reports.
    ///
    /// A failed invocation is logged and yields an empty list; it never
    /// aborts the surrounding region.
    pub fn run(&self, seq: &str) -> Result<Vec<MotifRecord>, anyhow::Error> {
        let mut fasta = tempfile::Builder::new()
            .prefix("sv-bencher")
            .suffix(".fa")
            .tempfile()
            .map_err(|e| anyhow::anyhow!("could not create temporary fasta: {}", e))?;
        fasta
            .write_all(format!(">seq\n{}\n", seq).as_bytes())
            .map_err(|e| anyhow::anyhow!("could not write temporary fasta: {}", e))?;
        fasta
            .flush()
            .map_err(|e| anyhow::anyhow!("could not flush temporary fasta: {}", e))?;

        let output = Command::new(&self.executable)
            .arg(fasta.path())
            .args(&self.params)
            .output()
            .map_err(|e| anyhow::anyhow!("could not launch {}: {}", self.executable, e))?;

        if !output.status.success() {
            tracing::error!("Couldn't run {}. Check parameters", self.executable);
            tracing::error!(
                "{} {:?} {}",
                self.executable,
                fasta.path(),
                self.params.join(" ")
            );
            tracing::error!("status: {}", output.status);
            tracing::error!("stderr: {}", String::from_utf8_lossy(&output.stderr));
            // Keep the input around for debugging.
            match fasta.into_temp_path().keep() {
                Ok(path) => tracing::error!("input fasta left at {:?}", path),
                Err(e) => tracing::debug!("could not keep input fasta: {}", e),
            }
            return Ok(Vec::new());
        }

        Ok(parse_ngs_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the `-ngs` output format of the tandem repeat finder.
///
/// Sequence names come on `@`-prefixed lines, motifs as space-separated
/// records below them. Start coordinates are converted to 0-based.
pub fn parse_ngs_output(text: &str) -> Vec<MotifRecord> {
    let mut ret = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('@') {
            continue;
        }
        match parse_ngs_line(line) {
            Some(record) => ret.push(record),
            None => tracing::debug!("skipping unparseable repeat line {:?}", line),
        }
    }
    ret
}

fn parse_ngs_line(line: &str) -> Option<MotifRecord> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() < 14 {
        return None;
    }
    Some(MotifRecord {
        start: fields[0].parse::<i64>().ok()? - 1,
        end: fields[1].parse().ok()?,
        period: fields[2].parse().ok()?,
        copies: fields[3].parse().ok()?,
        consize: fields[4].parse().ok()?,
        pctmat: fields[5].parse().ok()?,
        pctindel: fields[6].parse().ok()?,
        score: fields[7].parse().ok()?,
        // fields 8..=11 are the nucleotide composition
        entropy: fields[12].parse().ok()?,
        repeat: fields[13].to_string(),
    })
}
