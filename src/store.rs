//! Exact nearest-neighbor store over the raw embeddings.
//!
//! The store keeps its own copy of the embedding matrix inside a [`FlatIndex`]
//! and answers k-NN queries by exhaustive Euclidean scan. Exact search keeps
//! inference reproducible: the same query against the same store always
//! yields the same neighbors in the same order.
//!
//! The index is only ever (re)built from a whole matrix; there is no
//! incremental insert, so the index and the matrix it was built from cannot
//! drift apart.
//!
//! # On-disk format
//!
//! ```text
//! magic    b"TSFI"      4 bytes
//! version  u32 LE       currently 1
//! dim      u32 LE
//! rows     u64 LE
//! data     f32 LE       rows * dim values, row-major
//! ```

use crate::embed::rows_to_matrix;
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const MAGIC: &[u8; 4] = b"TSFI";
const VERSION: u32 = 1;
/// Magic, version, dim and row count.
const HEADER_LEN: u64 = 4 + 4 + 4 + 8;

/// One k-NN hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row index in the stored matrix.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f32,
}

/// Exact L2 index over a dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Build an index over `vectors`.
    pub fn new(vectors: Array2<f32>) -> Result<Self> {
        if vectors.nrows() == 0 || vectors.ncols() == 0 {
            return Err(Error::EmptyInput);
        }
        Ok(Self { vectors })
    }

    /// Vector width.
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    /// Whether the index holds no vectors (never true for a built index).
    pub fn is_empty(&self) -> bool {
        self.vectors.nrows() == 0
    }

    /// Stored vectors.
    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    /// The `k` nearest stored rows to `query`, nearest first.
    ///
    /// Equal distances are ordered by lower row index.
    pub fn search(&self, query: ArrayView1<'_, f32>, k: usize) -> Vec<Neighbor> {
        let mut hits: Vec<Neighbor> = self
            .vectors
            .rows()
            .into_iter()
            .enumerate()
            .map(|(index, row)| Neighbor {
                index,
                distance: squared_distance(query, row),
            })
            .collect();

        let k = k.min(hits.len());
        let by_distance = |a: &Neighbor, b: &Neighbor| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        };
        if k < hits.len() {
            let _ = hits.select_nth_unstable_by(k, by_distance);
            hits.truncate(k);
        }
        hits.sort_by(by_distance);
        for h in &mut hits {
            h.distance = h.distance.sqrt();
        }
        hits
    }

    /// Write the index to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        w.write_all(MAGIC)?;
        w.write_all(&VERSION.to_le_bytes())?;
        w.write_all(&(self.dim() as u32).to_le_bytes())?;
        w.write_all(&(self.len() as u64).to_le_bytes())?;
        for &x in self.vectors.iter() {
            w.write_all(&x.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }

    /// Read an index previously written with [`FlatIndex::write_to`].
    ///
    /// The header's shape is checked against the file length before any
    /// payload is allocated.
    pub fn read_from(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut r = BufReader::new(file);
        let corrupt = |what: String| Error::Format(format!("{}: {what}", path.display()));

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(corrupt(format!("bad index magic {magic:?}")));
        }
        let mut buf4 = [0u8; 4];
        r.read_exact(&mut buf4)?;
        let version = u32::from_le_bytes(buf4);
        if version != VERSION {
            return Err(corrupt(format!("unsupported index version {version}")));
        }
        r.read_exact(&mut buf4)?;
        let dim = u64::from(u32::from_le_bytes(buf4));
        let mut buf8 = [0u8; 8];
        r.read_exact(&mut buf8)?;
        let rows = u64::from_le_bytes(buf8);

        let payload = file_len.saturating_sub(HEADER_LEN);
        let expected = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .filter(|&n| n == payload)
            .ok_or_else(|| {
                corrupt(format!(
                    "header says {rows} x {dim} f32 values but {payload} payload bytes follow"
                ))
            })?;
        let len = usize::try_from(expected)
            .map_err(|_| corrupt(format!("{expected} payload bytes exceed addressable memory")))?;

        let mut bytes = vec![0u8; len];
        r.read_exact(&mut bytes)?;
        let data: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        // rows * dim fits in usize because the byte count does.
        let vectors = Array2::from_shape_vec((rows as usize, dim as usize), data)
            .map_err(|e| corrupt(e.to_string()))?;
        Self::new(vectors)
    }
}

#[inline]
fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Holds the k-NN index used for inference.
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    index: Option<FlatIndex>,
}

impl VectorStore {
    /// Create an unbuilt store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-built index.
    pub fn from_index(index: FlatIndex) -> Self {
        Self { index: Some(index) }
    }

    /// Build (or rebuild) the index from `embeddings`, replacing any prior index.
    pub fn build(&mut self, embeddings: ArrayView2<'_, f32>) -> Result<()> {
        self.index = Some(FlatIndex::new(embeddings.to_owned())?);
        Ok(())
    }

    /// Build from possibly-ragged rows.
    pub fn build_from_rows(&mut self, rows: &[Vec<f32>]) -> Result<()> {
        self.index = Some(FlatIndex::new(rows_to_matrix(rows)?)?);
        Ok(())
    }

    /// Whether [`VectorStore::build`] has been called.
    pub fn is_built(&self) -> bool {
        self.index.is_some()
    }

    /// The built index, if any.
    pub fn index(&self) -> Option<&FlatIndex> {
        self.index.as_ref()
    }

    /// Number of stored vectors (0 when unbuilt).
    pub fn len(&self) -> usize {
        self.index.as_ref().map_or(0, FlatIndex::len)
    }

    /// Whether the store holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// For each query row, the `k` nearest stored rows, nearest first.
    ///
    /// `k` larger than the store is clamped to the store size.
    pub fn query(&self, queries: ArrayView2<'_, f32>, k: usize) -> Result<Vec<Vec<Neighbor>>> {
        let index = self.index.as_ref().ok_or(Error::NotBuilt)?;
        if k == 0 {
            return Err(Error::invalid_parameter("k", "must be at least 1"));
        }
        if queries.ncols() != index.dim() {
            return Err(Error::DimensionMismatch {
                expected: index.dim(),
                found: queries.ncols(),
            });
        }

        #[cfg(feature = "parallel")]
        let hits = {
            let rows: Vec<_> = queries.rows().into_iter().collect();
            rows.into_par_iter().map(|q| index.search(q, k)).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let hits = queries
            .rows()
            .into_iter()
            .map(|q| index.search(q, k))
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid() -> Array2<f32> {
        array![[0.0, 0.0], [1.0, 0.0], [0.0, 2.0], [5.0, 5.0]]
    }

    #[test]
    fn query_before_build_fails() {
        let store = VectorStore::new();
        let q = array![[0.0f32, 0.0]];
        assert!(matches!(store.query(q.view(), 1), Err(Error::NotBuilt)));
    }

    #[test]
    fn build_rejects_empty_and_ragged() {
        let mut store = VectorStore::new();
        assert!(matches!(
            store.build(Array2::<f32>::zeros((0, 3)).view()),
            Err(Error::EmptyInput)
        ));
        assert!(matches!(
            store.build_from_rows(&[vec![1.0, 2.0], vec![3.0]]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(!store.is_built());
    }

    #[test]
    fn query_returns_nearest_first_with_distances() {
        let mut store = VectorStore::new();
        store.build(grid().view()).unwrap();
        let q = array![[0.9f32, 0.1]];
        let hits = store.query(q.view(), 3).unwrap();
        assert_eq!(hits.len(), 1);
        let idx: Vec<usize> = hits[0].iter().map(|n| n.index).collect();
        assert_eq!(idx, vec![1, 0, 2]);
        assert!((hits[0][0].distance - (0.01f32 + 0.01).sqrt()).abs() < 1e-6);
        assert!(hits[0].windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn exact_match_is_its_own_nearest_neighbor() {
        let mut store = VectorStore::new();
        store.build(grid().view()).unwrap();
        let hits = store.query(grid().view(), 1).unwrap();
        for (i, h) in hits.iter().enumerate() {
            assert_eq!(h[0].index, i);
            assert_eq!(h[0].distance, 0.0);
        }
    }

    #[test]
    fn k_is_clamped_and_zero_rejected() {
        let mut store = VectorStore::new();
        store.build(grid().view()).unwrap();
        let q = array![[0.0f32, 0.0]];
        assert_eq!(store.query(q.view(), 99).unwrap()[0].len(), 4);
        assert!(store.query(q.view(), 0).is_err());
        let wide = array![[0.0f32, 0.0, 0.0]];
        assert!(matches!(
            store.query(wide.view(), 1),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn ties_break_by_lower_index() {
        let mut store = VectorStore::new();
        store
            .build(array![[1.0f32, 0.0], [-1.0, 0.0], [0.0, 1.0]].view())
            .unwrap();
        let hits = store.query(array![[0.0f32, 0.0]].view(), 3).unwrap();
        let idx: Vec<usize> = hits[0].iter().map(|n| n.index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn rebuild_replaces_prior_index() {
        let mut store = VectorStore::new();
        store.build(grid().view()).unwrap();
        store.build(array![[9.0f32, 9.0]].view()).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn index_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        let index = FlatIndex::new(grid()).unwrap();
        index.write_to(&path).unwrap();
        let back = FlatIndex::read_from(&path).unwrap();
        assert_eq!(back, index);
    }

    #[test]
    fn index_file_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        std::fs::write(&path, b"NOPE\x01\x00\x00\x00").unwrap();
        assert!(matches!(FlatIndex::read_from(&path), Err(Error::Format(_))));
    }

    fn header(dim: u32, rows: u64) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend(VERSION.to_le_bytes());
        bytes.extend(dim.to_le_bytes());
        bytes.extend(rows.to_le_bytes());
        bytes
    }

    #[test]
    fn index_file_with_oversized_header_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        std::fs::write(&path, header(u32::MAX, u64::MAX)).unwrap();
        assert!(matches!(FlatIndex::read_from(&path), Err(Error::Format(_))));
    }

    #[test]
    fn index_file_payload_must_match_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.index");

        let mut short = header(3, 2);
        short.extend([0u8; 5 * 4]);
        std::fs::write(&path, &short).unwrap();
        assert!(matches!(FlatIndex::read_from(&path), Err(Error::Format(_))));

        let mut long = header(3, 2);
        long.extend([0u8; 7 * 4]);
        std::fs::write(&path, &long).unwrap();
        assert!(matches!(FlatIndex::read_from(&path), Err(Error::Format(_))));

        let mut exact = header(3, 2);
        exact.extend([0u8; 6 * 4]);
        std::fs::write(&path, &exact).unwrap();
        assert_eq!(FlatIndex::read_from(&path).unwrap().len(), 2);
    }
}
