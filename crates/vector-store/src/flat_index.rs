use crate::error::{Result, VectorStoreError};
use std::cmp::Ordering;
use std::ops::Range;

const INDEX_MAGIC: &[u8; 4] = b"KVIX";
const INDEX_FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

/// Exact nearest-neighbor index over squared Euclidean distance.
///
/// Vectors live in one contiguous buffer; the id of a vector is its append position, so the
/// id-to-position mapping is the identity and nothing is ever removed. Search is brute force
/// (O(n·d) per query), which is the scaling limit of this index: an approximate structure can
/// replace it behind the same `add`/`search` contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: Option<usize>,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Empty index whose dimension is fixed by the first `add`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dimension: None,
            data: Vec::new(),
        }
    }

    /// Empty index with a fixed dimension
    #[must_use]
    pub const fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            data: Vec::new(),
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of vectors in the index
    #[must_use]
    pub fn len(&self) -> usize {
        match self.dimension {
            Some(dim) if dim > 0 => self.data.len() / dim,
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector stored at `id`
    #[must_use]
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        let dim = self.dimension?;
        let start = id.checked_mul(dim)?;
        self.data.get(start..start + dim)
    }

    /// Append vectors in order; returns the ids they were assigned.
    ///
    /// The whole batch is validated before anything is appended, so a dimension mismatch
    /// leaves the index untouched.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<Range<usize>> {
        let start = self.len();
        let Some(first) = vectors.first() else {
            return Ok(start..start);
        };

        let dimension = self.dimension.unwrap_or(first.len());
        if dimension == 0 {
            return Err(VectorStoreError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.dimension = Some(dimension);
        self.data.reserve(vectors.len() * dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(start..start + vectors.len())
    }

    /// Find the `k` nearest vectors to `query`.
    ///
    /// Returns `(id, squared distance)` sorted ascending by distance, ties broken by the
    /// smaller id. Fewer than `k` results are returned when the index holds fewer vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(dim) = self.dimension.filter(|_| !self.is_empty()) else {
            return Err(VectorStoreError::EmptyIndex);
        };
        if query.len() != dim {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(dim)
            .enumerate()
            .map(|(id, vector)| (id, squared_l2(query, vector)))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, compare_hits);
            scored.truncate(k);
        }
        scored.sort_by(compare_hits);
        Ok(scored)
    }

    /// Serialize the dimension and every vector into a self-describing little-endian blob.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let dimension = self.dimension.unwrap_or(0);
        let count = self.len();
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(INDEX_MAGIC);
        out.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(dimension as u32).to_le_bytes());
        out.extend_from_slice(&(count as u64).to_le_bytes());
        for value in &self.data {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Inverse of [`VectorIndex::to_bytes`]; every float is restored bit-for-bit.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(VectorStoreError::corrupt(format!(
                "index blob too short ({} bytes)",
                bytes.len()
            )));
        }
        if &bytes[0..4] != INDEX_MAGIC {
            return Err(VectorStoreError::corrupt("index blob has wrong magic"));
        }
        let version = read_u32(&bytes[4..8]);
        if version != INDEX_FORMAT_VERSION {
            return Err(VectorStoreError::corrupt(format!(
                "unsupported index format version {version} (expected {INDEX_FORMAT_VERSION})"
            )));
        }
        let dimension = read_u32(&bytes[8..12]) as usize;
        let count = read_u64(&bytes[12..20]);
        let payload = &bytes[HEADER_LEN..];

        let expected_len = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(dimension))
            .and_then(|values| values.checked_mul(4))
            .ok_or_else(|| VectorStoreError::corrupt("index header overflows"))?;
        if payload.len() != expected_len {
            return Err(VectorStoreError::corrupt(format!(
                "index payload is {} bytes, header declares {count} x {dimension} floats",
                payload.len()
            )));
        }
        if dimension == 0 && count > 0 {
            return Err(VectorStoreError::corrupt("index has vectors but no dimension"));
        }

        let data = payload
            .chunks_exact(4)
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect();
        Ok(Self {
            dimension: (dimension > 0).then_some(dimension),
            data,
        })
    }
}

fn compare_hits(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn read_u32(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
}

fn read_u64(raw: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_index() -> VectorIndex {
        let mut index = VectorIndex::new();
        index
            .add(&[vec![0.0, 0.0], vec![1.0, 0.0], vec![10.0, 10.0]])
            .unwrap();
        index
    }

    #[test]
    fn test_add_and_search() {
        let index = scenario_index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), Some(2));

        let results = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(results, vec![(0, 0.0), (1, 1.0)]);
    }

    #[test]
    fn returns_everything_when_k_exceeds_count() {
        let index = scenario_index();
        let results = index.search(&[10.0, 10.0], 10).unwrap();
        let ids: Vec<usize> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 1, 0]);
        assert!(results.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn ties_prefer_first_inserted() {
        let mut index = VectorIndex::new();
        index
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]])
            .unwrap();
        let results = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(results, vec![(0, 1.0), (1, 1.0), (2, 1.0)]);
    }

    #[test]
    fn ids_follow_append_order() {
        let mut index = VectorIndex::with_dimension(1);
        assert_eq!(index.add(&[vec![1.0], vec![2.0]]).unwrap(), 0..2);
        assert_eq!(index.add(&[vec![3.0]]).unwrap(), 2..3);
        assert_eq!(index.add(&[]).unwrap(), 3..3);
        assert_eq!(index.vector(2), Some(&[3.0][..]));
        assert_eq!(index.vector(3), None);
    }

    #[test]
    fn empty_index_reports_empty() {
        let index = VectorIndex::new();
        assert!(matches!(
            index.search(&[0.0], 1),
            Err(VectorStoreError::EmptyIndex)
        ));
        assert!(index.search(&[0.0], 0).unwrap().is_empty());

        let fixed = VectorIndex::with_dimension(4);
        assert!(matches!(
            fixed.search(&[0.0; 4], 3),
            Err(VectorStoreError::EmptyIndex)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = scenario_index();
        let err = index.add(&[vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(index.len(), 3, "rejected batch must not be partially applied");

        let err = index.search(&[1.0], 1).unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { .. }));

        let mut fresh = VectorIndex::new();
        assert!(fresh.add(&[vec![1.0, 2.0], vec![1.0]]).is_err());
        assert_eq!(fresh.dimension(), None);
    }

    #[test]
    fn bytes_roundtrip_is_lossless() {
        let mut index = VectorIndex::new();
        index
            .add(&[
                vec![0.1, -3.25, f32::MIN_POSITIVE],
                vec![1.0e-7, 42.0, -0.0],
            ])
            .unwrap();

        let restored = VectorIndex::from_bytes(&index.to_bytes()).unwrap();
        assert_eq!(restored.dimension(), Some(3));
        for id in 0..2 {
            let a = index.vector(id).unwrap();
            let b = restored.vector(id).unwrap();
            assert!(a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits()));
        }
        assert_eq!(
            index.search(&[0.0, 1.0, 0.0], 2).unwrap(),
            restored.search(&[0.0, 1.0, 0.0], 2).unwrap()
        );
    }

    #[test]
    fn empty_roundtrip_keeps_dimension_unset() {
        let restored = VectorIndex::from_bytes(&VectorIndex::new().to_bytes()).unwrap();
        assert_eq!(restored, VectorIndex::new());
    }

    #[test]
    fn rejects_truncated_blob() {
        let bytes = scenario_index().to_bytes();
        let err = VectorIndex::from_bytes(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, VectorStoreError::CorruptPersistedState(_)));

        let err = VectorIndex::from_bytes(b"nope").unwrap_err();
        assert!(matches!(err, VectorStoreError::CorruptPersistedState(_)));
    }
}
