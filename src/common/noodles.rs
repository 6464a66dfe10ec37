//! Common utility code for noodles.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use noodles_bgzf as bgzf;
use noodles_core::Position;
use noodles_csi::{self as csi, binning_index::index::reference_sequence::bin::Chunk};
use noodles_tabix as tabix;
use noodles_vcf as vcf;

/// Transparently open a plain or bgzip-compressed VCF file for reading.
pub fn open_vcf_reader<P>(path: P) -> Result<vcf::Reader<Box<dyn BufRead>>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("could not open VCF file {:?}: {}", path.as_ref(), e))?;
    let inner: Box<dyn BufRead> =
        if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
            Box::new(BufReader::new(bgzf::Reader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
    Ok(vcf::Reader::new(inner))
}

/// Build TBI for file at `path_src` and write to `path_dst`.
pub fn build_tbi<S, D>(path_src: S, path_dst: D) -> Result<(), anyhow::Error>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    let mut reader = File::open(path_src.as_ref())
        .map(bgzf::Reader::new)
        .map(vcf::Reader::new)
        .map_err(|e| anyhow::anyhow!("error opening input file for tbi creation: {}", e))?;

    let header = reader
        .read_header()
        .map_err(|e| anyhow::anyhow!("error reading header: {}", e))?;

    let mut record = vcf::Record::default();

    let mut indexer = tabix::index::Indexer::default();
    indexer.set_header(csi::binning_index::index::header::Builder::vcf().build());

    let mut start_position = reader.get_ref().virtual_position();

    while reader
        .read_record(&header, &mut record)
        .map_err(|e| anyhow::anyhow!("problem reading record: {}", e))?
        != 0
    {
        let end_position = reader.get_ref().virtual_position();
        let chunk = Chunk::new(start_position, end_position);

        let reference_sequence_name = record.chromosome().to_string();
        let start = Position::try_from(usize::from(record.position()))
            .map_err(|e| anyhow::anyhow!("error converting start position: {}", e))?;
        let end = record
            .end()
            .map_err(|e| anyhow::anyhow!("error computing end position: {}", e))
            .and_then(|position| {
                Position::try_from(usize::from(position))
                    .map_err(|e| anyhow::anyhow!("error converting end position: {}", e))
            })?;

        indexer
            .add_record(&reference_sequence_name, start, end, chunk)
            .map_err(|e| anyhow::anyhow!("error adding record to tabix index: {}", e))?;

        start_position = end_position;
    }

    let index = indexer.build();

    let mut writer = File::create(path_dst.as_ref())
        .map(tabix::Writer::new)
        .map_err(|e| anyhow::anyhow!("error opening output file for tbi creation: {}", e))?;
    writer
        .write_index(&index)
        .map_err(|e| anyhow::anyhow!("error writing tabix index: {}", e))?;

    Ok(())
}

/// Compress the plain VCF file at `path_src` to bgzip at `path_dst`, build the
/// adjacent tabix index, and remove the plain file.
pub fn compress_index_vcf<S, D>(path_src: S, path_dst: D) -> Result<(), anyhow::Error>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    {
        let mut reader = File::open(path_src.as_ref())
            .map(BufReader::new)
            .map_err(|e| anyhow::anyhow!("could not open {:?}: {}", path_src.as_ref(), e))?;
        let writer = File::create(path_dst.as_ref())
            .map_err(|e| anyhow::anyhow!("could not create {:?}: {}", path_dst.as_ref(), e))?;
        let mut writer = bgzf::Writer::new(writer);
        std::io::copy(&mut reader, &mut writer)
            .map_err(|e| anyhow::anyhow!("problem compressing VCF file: {}", e))?;
        writer
            .finish()
            .map_err(|e| anyhow::anyhow!("problem finishing bgzip stream: {}", e))?;
    }

    let mut path_tbi = path_dst.as_ref().as_os_str().to_owned();
    path_tbi.push(".tbi");
    build_tbi(path_dst.as_ref(), &path_tbi)?;

    std::fs::remove_file(path_src.as_ref())
        .map_err(|e| anyhow::anyhow!("could not remove {:?}: {}", path_src.as_ref(), e))?;

    Ok(())
}

#[cfg(test)]
mod test {
    const VCF_TEXT: &str = "##fileformat=VCFv4.2\n\
        ##contig=<ID=1>\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
        1\t100\t.\tG\tGAAAA\t.\tPASS\t.\n";

    #[test]
    fn compress_index_vcf() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();

        let path_plain = tmpdir.join("out.vcf");
        let path_gz = tmpdir.join("out.vcf.gz");
        std::fs::write(&path_plain, VCF_TEXT)?;

        super::compress_index_vcf(&path_plain, &path_gz)?;

        assert!(path_gz.exists());
        assert!(tmpdir.join("out.vcf.gz.tbi").exists());
        assert!(!path_plain.exists());

        Ok(())
    }

    #[test]
    fn open_vcf_reader_plain() -> Result<(), anyhow::Error> {
        let tmpdir = temp_testdir::TempDir::default();
        let path = tmpdir.join("in.vcf");
        std::fs::write(&path, VCF_TEXT)?;

        let mut reader = super::open_vcf_reader(&path)?;
        let header = reader.read_header()?;
        let records = reader.records(&header).collect::<Result<Vec<_>, _>>()?;

        pretty_assertions::assert_eq!(records.len(), 1);

        Ok(())
    }
}
