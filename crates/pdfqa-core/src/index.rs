//! In-memory vector index with exact nearest-neighbour search
//!
//! Vectors are stored row-major in one contiguous buffer and scanned
//! brute-force. A bounded max-heap keeps the `k` best candidates, ordered by
//! distance and then by insertion position, so equal distances rank in
//! document order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::{Chunk, PdfQaError, Result};

/// Distance used to rank chunks. Lower is closer for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Euclidean distance
    #[default]
    L2,
    /// One minus cosine similarity; zero vectors sit at distance 1
    Cosine,
}

impl Metric {
    fn distance(self, a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
        match self {
            Metric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            Metric::Cosine => {
                let denominator = a_norm * b_norm;
                if denominator == 0.0 {
                    return 1.0;
                }
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                1.0 - dot / denominator
            }
        }
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// A ranked search result.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub chunk: &'a Chunk,
    /// Distance to the query under the index metric
    pub distance: f32,
}

/// Heap entry; `Ord` puts the worst candidate on top.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    position: usize,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.position.cmp(&other.position))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Flat index over one document's chunks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    data: Vec<f32>,
    norms: Vec<f32>,
    dimension: usize,
    metric: Metric,
}

impl VectorIndex {
    /// Build an index from parallel chunk and vector lists.
    pub fn build(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>, metric: Metric) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(PdfQaError::Config(format!(
                "chunk count ({}) doesn't match vector count ({})",
                chunks.len(),
                vectors.len()
            )));
        }
        if chunks.is_empty() {
            return Err(PdfQaError::Config("cannot build an empty index".into()));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(PdfQaError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        let mut norms = Vec::with_capacity(vectors.len());
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(PdfQaError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            norms.push(norm(vector));
            data.extend_from_slice(vector);
        }

        Ok(Self {
            chunks,
            data,
            norms,
            dimension,
            metric,
        })
    }

    /// Return the `k` chunks nearest to `query`, closest first.
    ///
    /// `k` is clamped to the number of indexed chunks.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>> {
        if query.len() != self.dimension {
            return Err(PdfQaError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = norm(query);
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);

        for (position, row) in self.data.chunks_exact(self.dimension).enumerate() {
            let candidate = Candidate {
                distance: self
                    .metric
                    .distance(query, query_norm, row, self.norms[position]),
                position,
            };

            if heap.len() < k {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                heap.pop();
                heap.push(candidate);
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| SearchHit {
                chunk: &self.chunks[c.position],
                distance: c.distance,
            })
            .collect())
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            index,
            start: 0,
        }
    }

    fn sample(metric: Metric) -> VectorIndex {
        let chunks = vec![chunk(0, "east"), chunk(1, "north"), chunk(2, "west")];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
        VectorIndex::build(chunks, vectors, metric).unwrap()
    }

    #[test]
    fn test_exact_match_ranks_first() {
        for metric in [Metric::L2, Metric::Cosine] {
            let index = sample(metric);
            let hits = index.search(&[0.0, 1.0], 3).unwrap();

            assert_eq!(hits[0].chunk.text, "north");
            assert!(hits[0].distance.abs() < 1e-6);
        }
    }

    #[test]
    fn test_results_are_ordered() {
        let index = sample(Metric::L2);
        let hits = index.search(&[0.9, 0.2], 3).unwrap();

        let order: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(order, vec!["east", "north", "west"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_k_is_clamped() {
        let index = sample(Metric::Cosine);
        let hits = index.search(&[1.0, 1.0], 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_k_zero() {
        let index = sample(Metric::L2);
        assert!(index.search(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_top_k_subset() {
        let chunks: Vec<Chunk> = (0..50).map(|i| chunk(i, &format!("c{i}"))).collect();
        let vectors: Vec<Vec<f32>> = (0..50).map(|i| vec![i as f32, 0.0]).collect();
        let index = VectorIndex::build(chunks, vectors, Metric::L2).unwrap();

        let hits = index.search(&[20.2, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.index).collect();
        assert_eq!(order, vec![20, 21, 19]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let chunks: Vec<Chunk> = (0..6).map(|i| chunk(i, &format!("dup{i}"))).collect();
        let vectors = vec![vec![1.0, 1.0]; 6];
        let index = VectorIndex::build(chunks, vectors, Metric::L2).unwrap();

        let hits = index.search(&[0.0, 0.0], 4).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cosine_ignores_magnitude() {
        let chunks = vec![chunk(0, "small"), chunk(1, "large")];
        let vectors = vec![vec![0.1, 0.0], vec![0.0, 50.0]];
        let index = VectorIndex::build(chunks, vectors, Metric::Cosine).unwrap();

        let hits = index.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(hits[0].chunk.text, "large");
    }

    #[test]
    fn test_cosine_zero_vector() {
        let chunks = vec![chunk(0, "zero"), chunk(1, "unit")];
        let vectors = vec![vec![0.0, 0.0], vec![1.0, 0.0]];
        let index = VectorIndex::build(chunks, vectors, Metric::Cosine).unwrap();

        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].chunk.text, "unit");
        assert_eq!(hits[1].distance, 1.0);
    }

    #[test]
    fn test_build_length_mismatch() {
        let result = VectorIndex::build(vec![chunk(0, "a")], vec![], Metric::L2);
        assert!(matches!(result, Err(PdfQaError::Config(_))));
    }

    #[test]
    fn test_build_empty() {
        let result = VectorIndex::build(vec![], vec![], Metric::L2);
        assert!(matches!(result, Err(PdfQaError::Config(_))));
    }

    #[test]
    fn test_build_mixed_dimensions() {
        let result = VectorIndex::build(
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 2.0], vec![1.0]],
            Metric::L2,
        );
        assert!(matches!(
            result,
            Err(PdfQaError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = sample(Metric::L2);
        let result = index.search(&[1.0, 0.0, 0.0], 1);
        assert!(matches!(result, Err(PdfQaError::DimensionMismatch { .. })));
    }
}
