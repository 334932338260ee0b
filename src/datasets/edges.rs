use itertools::{izip, multiunzip, Itertools};

use crate::error::{PlanetoidError, Result};

/// Node -> neighbors, in the order the source dictionary iterates.
pub type AdjacencyDict = Vec<(i64, Vec<i64>)>;

/// Parallel source/target lists, i.e. the two rows of a `[2, E]` edge index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeIndex {
    pub row: Vec<u32>,
    pub col: Vec<u32>,
}

impl EdgeIndex {
    pub fn len(&self) -> usize {
        self.row.len()
    }
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.row.iter().copied().zip(self.col.iter().copied())
    }

    /// Appends every edge reversed: `row ++ col`, `col ++ row`.
    pub fn symmetrize(self) -> Self {
        let Self { row, col } = self;
        Self {
            row: row.iter().chain(&col).copied().collect(),
            col: col.iter().chain(&row).copied().collect(),
        }
    }
}

/// Builds the undirected edge list of a Planetoid graph dictionary.
///
/// Every pair is first stored with its larger endpoint as the row, then the
/// pairs are sorted by `(row, col)`, duplicates are merged and self-loops
/// dropped. The result is symmetrized: all canonical edges, then all of them
/// reversed.
pub fn edge_index_from_dict(
    adjacency: &[(i64, Vec<i64>)],
    num_nodes: usize,
) -> Result<EdgeIndex> {
    let node = |v: i64| {
        u32::try_from(v)
            .ok()
            .filter(|&v| (v as usize) < num_nodes)
            .ok_or(PlanetoidError::IndexOutOfRange {
                index: v,
                len: num_nodes,
            })
    };

    let mut row = Vec::new();
    let mut col = Vec::new();
    for (key, neighbors) in adjacency {
        let key = node(*key)?;
        for &neighbor in neighbors {
            row.push(key);
            col.push(node(neighbor)?);
        }
    }

    let row_dominant = row.iter().zip(&col).filter(|(r, c)| r > c).map(|(&r, &c)| (r, c));
    let col_dominant = row.iter().zip(&col).filter(|(r, c)| c > r).map(|(&r, &c)| (c, r));
    let mut edges = row_dominant.chain(col_dominant).collect::<Vec<_>>();
    edges.sort();
    let (row, col): (Vec<u32>, Vec<u32>) = edges.into_iter().unzip();

    let (row, col, _) = coalesce(&row, &col, None);
    let canonical = remove_self_loops(EdgeIndex { row, col });
    tracing::debug!(
        "{} adjacency entries -> {} undirected edges",
        adjacency.iter().map(|(_, v)| v.len()).sum::<usize>(),
        canonical.len()
    );
    Ok(canonical.symmetrize())
}

/// Merges adjacent duplicate `(row, col)` pairs of a sorted edge list. Values of
/// merged edges are summed.
pub fn coalesce(
    row: &[u32],
    col: &[u32],
    value: Option<&[f32]>,
) -> (Vec<u32>, Vec<u32>, Option<Vec<f32>>) {
    match value {
        None => {
            let (row, col) = row.iter().copied().zip(col.iter().copied()).dedup().unzip();
            (row, col, None)
        }
        Some(value) => {
            let merged = izip!(row, col, value)
                .map(|(&r, &c, &v)| (r, c, v))
                .coalesce(|a, b| {
                    if (a.0, a.1) == (b.0, b.1) {
                        Ok((a.0, a.1, a.2 + b.2))
                    } else {
                        Err((a, b))
                    }
                });
            let (row, col, value): (Vec<u32>, Vec<u32>, Vec<f32>) = multiunzip(merged);
            (row, col, Some(value))
        }
    }
}

pub fn remove_self_loops(edge_index: EdgeIndex) -> EdgeIndex {
    let (row, col) = edge_index.iter().filter(|(r, c)| r != c).unzip();
    EdgeIndex { row, col }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn small_graph() {
        let adjacency = vec![
            (0, vec![1, 2]),
            (1, vec![0]),
            (2, vec![0, 3]),
            (3, vec![2]),
        ];
        let edge_index = edge_index_from_dict(&adjacency, 4).unwrap();
        assert_eq!(edge_index.row, vec![1, 2, 3, 0, 0, 2]);
        assert_eq!(edge_index.col, vec![0, 0, 2, 1, 2, 3]);

        let edges: HashSet<_> = edge_index.iter().collect();
        let expected: HashSet<_> = [(0, 1), (1, 0), (0, 2), (2, 0), (2, 3), (3, 2)]
            .into_iter()
            .collect();
        assert_eq!(edges, expected);
    }

    #[test]
    fn one_directional_entries_and_self_loops() {
        let adjacency = vec![(0, vec![0, 3]), (2, vec![1, 1, 2])];
        let edge_index = edge_index_from_dict(&adjacency, 4).unwrap();
        assert_eq!(edge_index.row, vec![2, 3, 1, 0]);
        assert_eq!(edge_index.col, vec![1, 0, 2, 3]);
    }

    #[test]
    fn out_of_range_neighbor() {
        let adjacency = vec![(0, vec![4])];
        assert!(matches!(
            edge_index_from_dict(&adjacency, 4),
            Err(PlanetoidError::IndexOutOfRange { index: 4, len: 4 })
        ));
        let adjacency = vec![(-1, vec![0])];
        assert!(matches!(
            edge_index_from_dict(&adjacency, 4),
            Err(PlanetoidError::IndexOutOfRange { index: -1, .. })
        ));
    }

    #[test]
    fn coalesce_sums_values() {
        let (row, col, value) = coalesce(
            &[0, 0, 1, 1, 1],
            &[1, 1, 0, 2, 2],
            Some(&[1.0, 2.0, 3.0, 4.0, 5.0]),
        );
        assert_eq!(row, vec![0, 1, 1]);
        assert_eq!(col, vec![1, 0, 2]);
        assert_eq!(value, Some(vec![3.0, 3.0, 9.0]));
    }

    fn adjacency_strategy() -> impl Strategy<Value = AdjacencyDict> {
        prop::collection::vec(
            (0i64..20, prop::collection::vec(0i64..20, 0..6)),
            0..30,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn canonical_edges_are_symmetric_and_simple(adjacency in adjacency_strategy()) {
            let edge_index = edge_index_from_dict(&adjacency, 20).unwrap();
            let edges: Vec<_> = edge_index.iter().collect();
            let unique: HashSet<_> = edges.iter().copied().collect();

            prop_assert_eq!(edges.len() % 2, 0);
            prop_assert_eq!(unique.len(), edges.len(), "duplicate directed pair");
            for &(a, b) in &edges {
                prop_assert_ne!(a, b);
                prop_assert!(unique.contains(&(b, a)), "({}, {}) has no reverse", a, b);
            }

            let expected: HashSet<_> = adjacency
                .iter()
                .flat_map(|(k, v)| v.iter().map(move |n| (*k as u32, *n as u32)))
                .filter(|(a, b)| a != b)
                .flat_map(|(a, b)| [(a, b), (b, a)])
                .collect();
            prop_assert_eq!(unique, expected);
        }

        #[test]
        fn canonical_half_is_sorted(adjacency in adjacency_strategy()) {
            let edge_index = edge_index_from_dict(&adjacency, 20).unwrap();
            let half = edge_index.len() / 2;
            let canonical: Vec<_> = edge_index.iter().take(half).collect();
            prop_assert!(canonical.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(canonical.iter().all(|(r, c)| r > c));
        }
    }
}
