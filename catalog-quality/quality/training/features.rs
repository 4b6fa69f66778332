use super::vectorizer::SparseRow;

/// Combined feature matrix: TF-IDF columns followed by the scaled price column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<SparseRow>,
    n_features: usize,
}

impl FeatureMatrix {
    /// Appends the scaled price as column `text_columns` of every row.
    ///
    /// # Panics
    ///
    /// Panics when the text rows and prices differ in length.
    #[must_use]
    pub fn combine(text: Vec<SparseRow>, scaled_price: &[f64], text_columns: usize) -> Self {
        assert_eq!(text.len(), scaled_price.len(), "one price per text row");
        let rows = text
            .into_iter()
            .zip(scaled_price)
            .map(|(mut row, price)| {
                row.push((text_columns, *price));
                row
            })
            .collect();
        Self {
            rows,
            n_features: text_columns + 1,
        }
    }

    /// Sparse rows.
    #[must_use]
    pub fn rows(&self) -> &[SparseRow] {
        &self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True without rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_last_column() {
        let matrix = FeatureMatrix::combine(vec![vec![(0, 0.6), (2, 0.8)], Vec::new()], &[1.5, -0.5], 3);
        assert_eq!(matrix.n_features(), 4);
        assert_eq!(matrix.rows()[0], vec![(0, 0.6), (2, 0.8), (3, 1.5)]);
        assert_eq!(matrix.rows()[1], vec![(3, -0.5)]);
    }
}
