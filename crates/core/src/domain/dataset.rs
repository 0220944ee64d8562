use std::collections::{BTreeMap, BTreeSet};

use crate::domain::table::{Scalar, TabularResult};

/// Column-oriented, read-only copy of the analysis dataset used for significance
/// testing. Column names are stored lower-cased.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    columns: BTreeMap<String, Vec<Scalar>>,
    row_count: usize,
}

/// Observed frequencies of two categorical columns.
#[derive(Clone, Debug, PartialEq)]
pub struct Contingency {
    pub row_levels: Vec<String>,
    pub column_levels: Vec<String>,
    pub counts: Vec<Vec<f64>>,
}

impl Contingency {
    pub fn total(&self) -> f64 {
        self.counts.iter().flatten().sum()
    }
}

impl Dataset {
    pub fn from_table(table: &TabularResult) -> Self {
        let mut columns = BTreeMap::new();
        for column in table.columns() {
            let values = table.column_values(column).cloned().collect::<Vec<_>>();
            columns.insert(column.to_ascii_lowercase(), values);
        }
        Self { columns, row_count: table.row_count() }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(&name.trim().to_ascii_lowercase())
    }

    pub fn column(&self, name: &str) -> Option<&[Scalar]> {
        self.columns.get(&name.trim().to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// Distinct non-null values of a column, sorted.
    pub fn levels(&self, name: &str) -> Option<Vec<String>> {
        let values = self.column(name)?;
        let levels = values.iter().filter_map(Scalar::level).collect::<BTreeSet<_>>();
        Some(levels.into_iter().collect())
    }

    /// Rows where both columns hold numeric values.
    pub fn paired_numeric(&self, a: &str, b: &str) -> Option<Vec<(f64, f64)>> {
        let left = self.column(a)?;
        let right = self.column(b)?;
        Some(
            left.iter()
                .zip(right)
                .filter_map(|(x, y)| Some((x.as_f64()?, y.as_f64()?)))
                .collect(),
        )
    }

    /// Numeric values of `numeric` grouped by the levels of `categorical`, in level order.
    pub fn grouped_numeric(&self, categorical: &str, numeric: &str) -> Option<Vec<(String, Vec<f64>)>> {
        let groups = self.column(categorical)?;
        let values = self.column(numeric)?;

        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (group, value) in groups.iter().zip(values) {
            if let (Some(level), Some(number)) = (group.level(), value.as_f64()) {
                grouped.entry(level).or_default().push(number);
            }
        }
        Some(grouped.into_iter().collect())
    }

    pub fn crosstab(&self, a: &str, b: &str) -> Option<Contingency> {
        let left = self.column(a)?;
        let right = self.column(b)?;

        let pairs = left
            .iter()
            .zip(right)
            .filter_map(|(x, y)| Some((x.level()?, y.level()?)))
            .collect::<Vec<_>>();

        let row_levels =
            pairs.iter().map(|(x, _)| x.clone()).collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>();
        let column_levels =
            pairs.iter().map(|(_, y)| y.clone()).collect::<BTreeSet<_>>().into_iter().collect::<Vec<_>>();

        let mut counts = vec![vec![0.0; column_levels.len()]; row_levels.len()];
        for (x, y) in &pairs {
            let row = row_levels.binary_search(x).ok()?;
            let column = column_levels.binary_search(y).ok()?;
            counts[row][column] += 1.0;
        }

        Some(Contingency { row_levels, column_levels, counts })
    }
}
