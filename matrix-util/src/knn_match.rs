use instant_distance::{Builder, HnswMap, Search};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A dictionary (HnswMap wrapper) for approximate nearest-neighbour
/// look-up of named points
pub struct ColumnDict<T> {
    pub dict: HnswMap<VecPoint, T>,
    pub data_vec: Vec<VecPoint>,
    pub name2index: HashMap<T, usize>,
}

impl<T> ColumnDict<T>
where
    T: Clone + Eq + Hash + Debug + Display,
{
    pub fn len(&self) -> usize {
        self.data_vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_vec.is_empty()
    }

    /// Build the HNSW index over the rows of an `n x d` matrix
    ///
    /// * `data` - each row is a point
    /// * `names` - one name per row
    /// * `seed` - seed of the HNSW level assignment
    pub fn from_dmatrix_rows(
        data: &nalgebra::DMatrix<f32>,
        names: Vec<T>,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let points = data
            .row_iter()
            .map(|r| VecPoint {
                data: r.iter().cloned().collect(),
            })
            .collect();
        Self::from_points(points, names, seed)
    }

    pub fn from_points(data_vec: Vec<VecPoint>, names: Vec<T>, seed: u64) -> anyhow::Result<Self> {
        if data_vec.len() != names.len() {
            anyhow::bail!(
                "{} points but {} names in the dictionary",
                data_vec.len(),
                names.len()
            );
        }

        let name2index: HashMap<T, usize> = names
            .iter()
            .enumerate()
            .map(|(j, x)| (x.clone(), j))
            .collect();

        let dict = Builder::default()
            .seed(seed)
            .build(data_vec.clone(), names);

        Ok(ColumnDict {
            dict,
            data_vec,
            name2index,
        })
    }

    /// `knn` nearest entries of `query`, closest first
    pub fn search(&self, query: &VecPoint, knn: usize) -> Vec<(T, f32)> {
        let mut search = Search::default();
        self.dict
            .search(query, &mut search)
            .take(knn.min(self.len()))
            .map(|item| (item.value.clone(), item.distance))
            .collect()
    }

    /// `knn` nearest entries of the point named `query_name`,
    /// excluding the point itself
    pub fn search_others(&self, query_name: &T, knn: usize) -> anyhow::Result<Vec<(T, f32)>> {
        let self_idx = self
            .name2index
            .get(query_name)
            .ok_or_else(|| anyhow::anyhow!("name {} not found", query_name))?;

        let mut ret = self.search(&self.data_vec[*self_idx], knn + 1);
        if let Some(pos) = ret.iter().position(|(v, _)| v == query_name) {
            ret.remove(pos);
        }
        ret.truncate(knn);
        Ok(ret)
    }
}

#[derive(Clone, Debug)]
/// a wrapper for Vec<f32>
pub struct VecPoint {
    pub data: Vec<f32>,
}

impl VecPoint {
    pub fn squared_distance(&self, other: &Self) -> f32 {
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
    }
}

impl instant_distance::Point for VecPoint {
    fn distance(&self, other: &Self) -> f32 {
        self.squared_distance(other).sqrt()
    }
}
