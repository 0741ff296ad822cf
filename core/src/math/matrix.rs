use ndarray::{Array2, ArrayView2};

pub struct MatrixHelper;

impl MatrixHelper {
    /// Euclidean distance between every pair of rows.
    pub fn pairwise_distances(points: ArrayView2<f64>) -> Array2<f64> {
        let n = points.nrows();
        let mut distances = Array2::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let d = (&points.row(i) - &points.row(j))
                    .mapv(|v| v * v)
                    .sum()
                    .sqrt();
                distances[[i, j]] = d;
                distances[[j, i]] = d;
            }
        }
        distances
    }
}
