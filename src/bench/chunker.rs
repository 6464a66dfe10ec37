//! Merging two sorted variant streams into locally comparable chunks.

use std::iter::Peekable;

use indexmap::IndexMap;

use super::variant::Variant;

/// One group of mutually close variants from both call sets.
#[derive(Debug, Default)]
pub struct Chunk {
    /// Monotonically increasing chunk number.
    pub id: u64,
    /// Baseline variants in input order.
    pub base: Vec<Variant>,
    /// Comparison variants in input order.
    pub comp: Vec<Variant>,
}

impl Chunk {
    /// Whether the chunk holds no variants.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.comp.is_empty()
    }
}

/// Pull-based iterator merging two sorted variant streams into `Chunk`s.
///
/// The merge is keyed by `(contig rank, start)`; a chunk is closed when the
/// smaller of the two look-aheads switches chromosome or starts more than
/// `chunksize` bases past the most recently accepted variant.
pub struct Chunker<B, C>
where
    B: Iterator<Item = Variant>,
    C: Iterator<Item = Variant>,
{
    base: Peekable<B>,
    comp: Peekable<C>,
    chunksize: i64,
    contig_rank: IndexMap<String, usize>,
    next_id: u64,
}

impl<B, C> Chunker<B, C>
where
    B: Iterator<Item = Variant>,
    C: Iterator<Item = Variant>,
{
    /// Create a new `Chunker` over the two streams.
    ///
    /// `contigs` fixes the chromosome order of the merge; contigs absent
    /// from it are ranked behind in first-seen order.
    pub fn new(base: B, comp: C, chunksize: i64, contigs: &[String]) -> Self {
        let contig_rank = contigs
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Chunker {
            base: base.peekable(),
            comp: comp.peekable(),
            chunksize,
            contig_rank,
            next_id: 0,
        }
    }

    fn rank_of(&mut self, chrom: &str) -> usize {
        let next = self.contig_rank.len();
        *self.contig_rank.entry(chrom.to_string()).or_insert(next)
    }

    /// Key of the stream whose head comes first, `true` meaning base.
    fn next_stream(&mut self) -> Option<(bool, usize, i64)> {
        let base_key = self
            .base
            .peek()
            .map(|v| (v.chrom.clone(), v.start));
        let comp_key = self
            .comp
            .peek()
            .map(|v| (v.chrom.clone(), v.start));

        match (base_key, comp_key) {
            (None, None) => None,
            (Some((chrom, start)), None) => {
                let rank = self.rank_of(&chrom);
                Some((true, rank, start))
            }
            (None, Some((chrom, start))) => {
                let rank = self.rank_of(&chrom);
                Some((false, rank, start))
            }
            (Some((b_chrom, b_start)), Some((c_chrom, c_start))) => {
                let b_rank = self.rank_of(&b_chrom);
                let c_rank = self.rank_of(&c_chrom);
                if (b_rank, b_start) <= (c_rank, c_start) {
                    Some((true, b_rank, b_start))
                } else {
                    Some((false, c_rank, c_start))
                }
            }
        }
    }
}

impl<B, C> Iterator for Chunker<B, C>
where
    B: Iterator<Item = Variant>,
    C: Iterator<Item = Variant>,
{
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let mut chunk = Chunk {
            id: self.next_id,
            ..Default::default()
        };
        let mut cur_rank = None;
        let mut cur_start = 0i64;

        while let Some((is_base, rank, start)) = self.next_stream() {
            if let Some(cur) = cur_rank {
                if rank != cur || start > cur_start + self.chunksize {
                    break;
                }
            }
            cur_rank = Some(rank);
            cur_start = start;
            if is_base {
                chunk.base.push(self.base.next().expect("peeked variant"));
            } else {
                chunk.comp.push(self.comp.next().expect("peeked variant"));
            }
        }

        if chunk.is_empty() {
            None
        } else {
            tracing::debug!(
                "chunk {}: {} base, {} comp variants",
                chunk.id,
                chunk.base.len(),
                chunk.comp.len()
            );
            self.next_id += 1;
            Some(chunk)
        }
    }
}
