//! Match matrix construction and the assignment policies collapsing it.

use std::collections::{HashMap, HashSet};

use super::chunker::Chunk;
use super::matching::{sort_matches, MatchParams, MatchResult, Matcher};

/// Counter value marking a side as fully used in the genotype-aware picker.
/// Valid while genotype capacities stay in `{1, 2}`.
const SATURATED: u32 = 9;

/// Scoring results for one chunk.
#[derive(Debug)]
pub enum MatchMatrix {
    /// One side of the chunk was empty; all results are single-sided.
    Unmatched(Vec<MatchResult>),
    /// The dense base x comp matrix, stored row-major.
    Pairs {
        /// Number of baseline variants (rows).
        n_base: usize,
        /// Number of comparison variants (columns).
        n_comp: usize,
        /// The per-pair results.
        rows: Vec<Vec<MatchResult>>,
    },
}

/// Score every pair in `chunk` and return the resulting matrix.
pub fn build_matrix(matcher: &mut Matcher, chunk: &Chunk) -> MatchMatrix {
    if chunk.base.is_empty() {
        let fps = chunk
            .comp
            .iter()
            .enumerate()
            .map(|(cid, c)| {
                let ret = MatchResult {
                    comp: Some(cid),
                    comp_gt_count: c.gt.allele_count(),
                    comp_gt: c.gt.render(),
                    matid: format!("{}._.{}", chunk.id, cid),
                    ..Default::default()
                };
                tracing::debug!("all FP -> {:?}", ret);
                ret
            })
            .collect();
        return MatchMatrix::Unmatched(fps);
    }

    if chunk.comp.is_empty() {
        let fns = chunk
            .base
            .iter()
            .enumerate()
            .map(|(bid, b)| {
                let ret = MatchResult {
                    base: Some(bid),
                    base_gt_count: b.gt.allele_count(),
                    base_gt: b.gt.render(),
                    matid: format!("{}.{}._", chunk.id, bid),
                    ..Default::default()
                };
                tracing::debug!("all FN -> {:?}", ret);
                ret
            })
            .collect();
        return MatchMatrix::Unmatched(fns);
    }

    let mut rows = Vec::with_capacity(chunk.base.len());
    for (bid, b) in chunk.base.iter().enumerate() {
        let mut row = Vec::with_capacity(chunk.comp.len());
        for (cid, c) in chunk.comp.iter().enumerate() {
            let mat = matcher.build_match(b, bid, c, cid, format!("{}.{}.{}", chunk.id, bid, cid));
            tracing::debug!("made mat -> {:?}", mat);
            row.push(mat);
        }
        rows.push(row);
    }

    MatchMatrix::Pairs {
        n_base: chunk.base.len(),
        n_comp: chunk.comp.len(),
        rows,
    }
}

/// Collapse the matrix into a flat list of decisions using the picker
/// selected by `params`.
pub fn pick_matches(matrix: MatchMatrix, params: &MatchParams) -> Vec<MatchResult> {
    match matrix {
        MatchMatrix::Unmatched(results) => results,
        MatchMatrix::Pairs {
            n_base,
            n_comp,
            rows,
        } => {
            if params.multimatch {
                pick_multi_matches(rows)
            } else if params.gtcomp {
                pick_gtcomp_matches(rows, n_base, n_comp)
            } else {
                pick_single_matches(rows, n_base, n_comp)
            }
        }
    }
}

/// Give every baseline call its best comparison match and vice versa,
/// independently.
fn pick_multi_matches(rows: Vec<Vec<MatchResult>>) -> Vec<MatchResult> {
    let mut ret = Vec::new();

    for row in &rows {
        let mut best = &row[0];
        for m in &row[1..] {
            if m.cmp_quality(best) == std::cmp::Ordering::Greater {
                best = m;
            }
        }
        let mut b_max = best.clone();
        b_max.comp = None;
        ret.push(b_max);
    }

    let n_comp = rows[0].len();
    for cid in 0..n_comp {
        let mut best = &rows[0][cid];
        for row in &rows[1..] {
            if row[cid].cmp_quality(best) == std::cmp::Ordering::Greater {
                best = &row[cid];
            }
        }
        let mut c_max = best.clone();
        c_max.base = None;
        ret.push(c_max);
    }

    ret
}

/// Greedy one-to-one assignment: walk the ranked results, pairing sides
/// that are both unused, and hand consolation records to whatever is left.
fn pick_single_matches(
    rows: Vec<Vec<MatchResult>>,
    n_base: usize,
    n_comp: usize,
) -> Vec<MatchResult> {
    let mut flat: Vec<MatchResult> = rows.into_iter().flatten().collect();
    sort_matches(&mut flat);

    let mut ret = Vec::new();
    let mut base_cnt = n_base as i64;
    let mut comp_cnt = n_comp as i64;
    let mut used_base: HashSet<usize> = HashSet::new();
    let mut used_comp: HashSet<usize> = HashSet::new();

    for m in flat {
        if base_cnt <= 0 && comp_cnt <= 0 {
            break;
        }
        let bid = m.base.expect("matrix result without base");
        let cid = m.comp.expect("matrix result without comp");
        let base_is_used = used_base.contains(&bid);
        let comp_is_used = used_comp.contains(&cid);

        if base_cnt <= 0 && !comp_is_used {
            let mut to_process = m.clone();
            to_process.base = None;
            to_process.state = false;
            to_process.multi = true;
            comp_cnt -= 1;
            used_comp.insert(cid);
            ret.push(to_process);
        } else if comp_cnt <= 0 && !base_is_used {
            let mut to_process = m.clone();
            to_process.comp = None;
            to_process.state = false;
            to_process.multi = true;
            base_cnt -= 1;
            used_base.insert(bid);
            ret.push(to_process);
        } else if !base_is_used && !comp_is_used {
            base_cnt -= 1;
            comp_cnt -= 1;
            used_base.insert(bid);
            used_comp.insert(cid);
            ret.push(m);
        }
    }

    ret
}

/// Greedy assignment with per-variant genotype capacities: heterozygous
/// calls may be used once, homozygous calls twice.
fn pick_gtcomp_matches(
    rows: Vec<Vec<MatchResult>>,
    n_base: usize,
    n_comp: usize,
) -> Vec<MatchResult> {
    let mut flat: Vec<MatchResult> = rows.into_iter().flatten().collect();
    sort_matches(&mut flat);

    let mut ret = Vec::new();
    let mut base_cnt = n_base as i64;
    let mut comp_cnt = n_comp as i64;
    let mut used_base: HashMap<usize, u32> = HashMap::new();
    let mut used_comp: HashMap<usize, u32> = HashMap::new();

    for m in flat {
        if base_cnt <= 0 && comp_cnt <= 0 {
            break;
        }
        let bid = m.base.expect("matrix result without base");
        let cid = m.comp.expect("matrix result without comp");
        let base_used = *used_base.get(&bid).unwrap_or(&0);
        let comp_used = *used_comp.get(&cid).unwrap_or(&0);
        let base_is_used = base_used >= m.base_gt_count;
        let comp_is_used = comp_used >= m.comp_gt_count;

        if base_cnt <= 0 && !comp_is_used {
            let mut to_process = m.clone();
            to_process.base = None;
            to_process.state = false;
            to_process.multi = true;
            comp_cnt -= 1;
            // Only write as a false call if it has not been a true one.
            if comp_used == 0 {
                ret.push(to_process);
            }
            used_comp.insert(cid, SATURATED);
        } else if comp_cnt <= 0 && !base_is_used {
            let mut to_process = m.clone();
            to_process.comp = None;
            to_process.state = false;
            to_process.multi = true;
            base_cnt -= 1;
            if base_used == 0 {
                ret.push(to_process);
            }
            used_base.insert(bid, SATURATED);
        } else if !base_is_used && !comp_is_used {
            let mut to_process = m.clone();
            // Don't write either side twice.
            if base_used != 0 {
                to_process.base = None;
            }
            if comp_used != 0 {
                to_process.comp = None;
            }

            let base_used = base_used + m.comp_gt_count;
            let comp_used = comp_used + m.base_gt_count;
            used_base.insert(bid, base_used);
            used_comp.insert(cid, comp_used);
            if base_used >= m.base_gt_count {
                base_cnt -= 1;
            }
            if comp_used >= m.comp_gt_count {
                comp_cnt -= 1;
            }

            if to_process.base.is_some() || to_process.comp.is_some() {
                ret.push(to_process);
            }
        }
    }

    ret
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::bench::chunker::Chunk;
    use crate::bench::matching::{MatchParams, Matcher};
    use crate::bench::variant::{parse_test_variants, TEST_HEADER};

    use super::{build_matrix, pick_matches, MatchMatrix};

    fn matcher() -> Matcher {
        let params = MatchParams {
            sizemin: 4,
            sizefilt: 4,
            ..Default::default()
        };
        Matcher::new(params, None).unwrap()
    }

    fn chunk(base_lines: &[&str], comp_lines: &[&str]) -> Chunk {
        let to_variants = |lines: &[&str]| {
            if lines.is_empty() {
                Vec::new()
            } else {
                parse_test_variants(&format!("{}{}\n", TEST_HEADER, lines.join("\n")))
            }
        };
        Chunk {
            id: 0,
            base: to_variants(base_lines),
            comp: to_variants(comp_lines),
        }
    }

    const INS_100_HET: &str = "chr1\t100\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t0/1";
    const INS_100_HOM: &str = "chr1\t100\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t1/1";
    const INS_101_HET: &str = "chr1\t101\t.\tG\tGAAAA\t.\tPASS\t.\tGT\t0/1";

    #[test]
    fn empty_base_yields_unmatched_comps() {
        let mut m = matcher();
        let chunk = chunk(&[], &[INS_100_HET, INS_101_HET]);

        let matrix = build_matrix(&mut m, &chunk);
        let picked = pick_matches(matrix, &m.params);

        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|r| r.base.is_none() && !r.state));
        assert_eq!(picked[0].matid, "0._.0");
        assert_eq!(picked[1].matid, "0._.1");
    }

    #[test]
    fn empty_comp_yields_unmatched_bases() {
        let mut m = matcher();
        let chunk = chunk(&[INS_100_HET], &[]);

        let matrix = build_matrix(&mut m, &chunk);
        let picked = pick_matches(matrix, &m.params);

        assert_eq!(picked.len(), 1);
        assert!(picked[0].comp.is_none());
        assert_eq!(picked[0].matid, "0.0._");
    }

    #[test]
    fn matrix_is_dense() {
        let mut m = matcher();
        let chunk = chunk(&[INS_100_HET, INS_101_HET], &[INS_100_HET]);

        match build_matrix(&mut m, &chunk) {
            MatchMatrix::Pairs {
                n_base,
                n_comp,
                rows,
            } => {
                assert_eq!((n_base, n_comp), (2, 1));
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].len(), 1);
                assert_eq!(rows[0][0].matid, "0.0.0");
                assert_eq!(rows[1][0].matid, "0.1.0");
            }
            MatchMatrix::Unmatched(_) => panic!("expected a dense matrix"),
        }
    }

    #[test]
    fn single_picker_pairs_best_and_consoles_rest() {
        let mut m = matcher();
        let chunk = chunk(&[INS_100_HET], &[INS_100_HET, INS_101_HET]);

        let matrix = build_matrix(&mut m, &chunk);
        let picked = pick_matches(matrix, &m.params);

        assert_eq!(picked.len(), 2);
        // The exact pair wins; the second comp becomes a consolation FP.
        let tp = &picked[0];
        assert!(tp.state);
        assert_eq!(tp.base, Some(0));
        assert_eq!(tp.comp, Some(0));
        let fp = &picked[1];
        assert!(!fp.state);
        assert!(fp.multi);
        assert_eq!(fp.base, None);
        assert_eq!(fp.comp, Some(1));
    }

    #[test]
    fn multi_picker_matches_every_side() {
        let mut m = matcher();
        m.params.multimatch = true;
        let chunk = chunk(&[INS_100_HET], &[INS_100_HET, INS_101_HET]);

        let matrix = build_matrix(&mut m, &chunk);
        let picked = pick_matches(matrix, &m.params);

        // One row maximum and two column maxima.
        assert_eq!(picked.len(), 3);
        let base_side: Vec<_> = picked.iter().filter(|r| r.base.is_some()).collect();
        let comp_side: Vec<_> = picked.iter().filter(|r| r.comp.is_some()).collect();
        assert_eq!(base_side.len(), 1);
        assert_eq!(comp_side.len(), 2);
        assert!(base_side.iter().all(|r| r.state));
        assert!(comp_side.iter().all(|r| r.state));
    }

    #[test]
    fn gtcomp_picker_lets_hom_base_match_twice() {
        let mut m = matcher();
        m.params.gtcomp = true;
        let chunk = chunk(&[INS_100_HOM], &[INS_100_HET, INS_101_HET]);

        let matrix = build_matrix(&mut m, &chunk);
        let picked = pick_matches(matrix, &m.params);

        // Both comps pair against the homozygous base; the base itself is
        // only written once.
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|r| r.state));
        assert_eq!(picked[0].base, Some(0));
        assert_eq!(picked[0].comp, Some(0));
        assert_eq!(picked[1].base, None);
        assert_eq!(picked[1].comp, Some(1));
        assert!(picked
            .iter()
            .all(|r| r.base.is_some() || r.comp.is_some()));
    }

    #[test]
    fn every_picked_result_has_a_side() {
        for (multimatch, gtcomp) in [(false, false), (true, false), (false, true)] {
            let mut m = matcher();
            m.params.multimatch = multimatch;
            m.params.gtcomp = gtcomp;
            let chunk = chunk(
                &[INS_100_HET, INS_101_HET],
                &[INS_100_HET, INS_101_HET],
            );

            let matrix = build_matrix(&mut m, &chunk);
            let picked = pick_matches(matrix, &m.params);

            assert!(!picked.is_empty());
            assert!(picked
                .iter()
                .all(|r| r.base.is_some() || r.comp.is_some()));
        }
    }
}
