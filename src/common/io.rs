//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
    sync::{Arc, Mutex},
};

use flate2::bufread::MultiGzDecoder;

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let file = File::open(path)?;
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        let file = File::open(path).map(BufReader::new)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// `MakeWriter` that duplicates log lines to stderr and a log file.
#[derive(Clone)]
pub struct StderrTee {
    file: Arc<Mutex<File>>,
}

impl StderrTee {
    /// Create a new `StderrTee` logging to the file at `path`.
    pub fn new<P>(path: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
    {
        let file = File::create(path.as_ref())
            .map_err(|e| anyhow::anyhow!("could not create log file {:?}: {}", path.as_ref(), e))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for StderrTee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        if let Ok(mut file) = self.file.lock() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        if let Ok(mut file) = self.file.lock() {
            file.flush()?;
        }
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for StderrTee {
    type Writer = StderrTee;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod test {
    use std::io::{BufRead, Write};

    #[test]
    fn open_read_maybe_gz_plain() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("lines.txt");
        std::fs::write(&path, "one\ntwo\n")?;

        let reader = super::open_read_maybe_gz(&path)?;
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;

        pretty_assertions::assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);

        Ok(())
    }

    #[test]
    fn open_read_maybe_gz_gzip() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("lines.txt.gz");
        {
            let file = std::fs::File::create(&path)?;
            let mut encoder =
                flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"one\ntwo\n")?;
            encoder.finish()?;
        }

        let reader = super::open_read_maybe_gz(&path)?;
        let lines = reader.lines().collect::<Result<Vec<_>, _>>()?;

        pretty_assertions::assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);

        Ok(())
    }
}
