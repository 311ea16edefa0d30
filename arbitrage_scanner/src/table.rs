//! Timestamp-indexed tables of price columns.
//!
//! A [`Table`] wraps a polars [`DataFrame`] whose first column,
//! [`INDEX_COLUMN`], holds millisecond UTC datetimes. Every other column is a
//! nullable `f64` named after its series. Joining is a full outer join on the
//! index, so cells with no observation are null. Values are never filled or
//! interpolated.

use chrono::{DateTime, Utc};
use polars::lazy::dsl::pearson_corr;
use polars::prelude::*;
use thiserror::Error;

use crate::series::PriceSeries;

/// Name of the datetime column every table is indexed by.
pub const INDEX_COLUMN: &str = "timestamp";

/// Errors raised while assembling tables.
#[derive(Debug, Error)]
pub enum TableError {
    /// A column with this name is already present.
    #[error("column {0:?} already exists")]
    DuplicateColumn(String),

    /// `merge_tables_on_column` received a different number of tables and labels.
    #[error("got {tables} tables but {labels} labels")]
    LengthMismatch {
        /// Number of tables passed.
        tables: usize,
        /// Number of labels passed.
        labels: usize,
    },

    /// The table for `label` has no column named `column`.
    #[error("table {label:?} has no column {column:?}")]
    MissingColumn {
        /// Label of the offending table.
        label: String,
        /// Requested column.
        column: String,
    },

    /// polars rejected a frame operation.
    #[error("frame error: {0}")]
    Frame(#[from] PolarsError),
}

/// Price columns sharing a strictly increasing timestamp index.
#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
}

/// Pairwise Pearson correlations between the columns of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    /// Column names, in table order; rows and columns of `values` follow it.
    pub labels: Vec<String>,
    /// Square matrix, `NaN` where a pair has too few shared observations.
    pub values: Vec<Vec<f64>>,
}

fn index_series(millis: Vec<i64>) -> Series {
    Int64Chunked::from_vec(INDEX_COLUMN.into(), millis)
        .into_datetime(TimeUnit::Milliseconds, None)
        .into_series()
}

fn full_join() -> JoinArgs {
    JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns)
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.frame.equals_missing(&other.frame)
    }
}

impl Table {
    /// Empty table: no rows, only the index column.
    pub fn new() -> Self {
        Self {
            frame: index_series(Vec::new()).into_frame(),
        }
    }

    /// The underlying frame, index column first.
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Row timestamps in increasing order.
    pub fn index(&self) -> Vec<DateTime<Utc>> {
        self.index_millis()
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(DateTime::from_timestamp_millis)
            .collect()
    }

    fn index_millis(&self) -> PolarsResult<Vec<Option<i64>>> {
        let millis = self
            .frame
            .column(INDEX_COLUMN)?
            .as_materialized_series()
            .cast(&DataType::Int64)?;
        Ok(millis.i64()?.into_iter().collect())
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    /// Number of price columns.
    pub fn n_columns(&self) -> usize {
        self.column_names().count()
    }

    /// Price column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.frame
            .get_columns()
            .iter()
            .map(|column| column.name().as_str())
            .filter(|name| *name != INDEX_COLUMN)
    }

    /// `true` when a price column named `name` exists.
    pub fn has_column(&self, name: &str) -> bool {
        name != INDEX_COLUMN && self.frame.get_column_index(name).is_some()
    }

    /// Cells of one column, aligned with [`index`](Self::index).
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        if name == INDEX_COLUMN {
            return None;
        }
        let column = self.frame.column(name).ok()?;
        Some(column.as_materialized_series().f64().ok()?.into_iter().collect())
    }

    /// The observed (non-null) cells of one column as a series.
    pub fn series(&self, name: &str) -> Option<PriceSeries> {
        let cells = self.column(name)?;
        Some(PriceSeries::from_points(
            name,
            self.index()
                .into_iter()
                .zip(cells)
                .filter_map(|(ts, cell)| cell.map(|value| (ts, value))),
        ))
    }

    /// Cell at `timestamp` in `column`, `None` when the row, the column or
    /// the observation is missing.
    pub fn get(&self, timestamp: &DateTime<Utc>, column: &str) -> Option<f64> {
        let row = self.index().binary_search(timestamp).ok()?;
        self.column(column)?.get(row).copied().flatten()
    }

    /// Outer-joins `series` as a new column named after it.
    pub fn join_series(&mut self, series: &PriceSeries) -> Result<(), TableError> {
        let (millis, values): (Vec<i64>, Vec<f64>) = series
            .iter()
            .map(|(ts, value)| (ts.timestamp_millis(), value))
            .unzip();
        let right = DataFrame::new(vec![
            Column::from(index_series(millis)),
            Column::from(Float64Chunked::from_vec(series.name().into(), values).into_series()),
        ])?;
        self.join_frame(series.name(), right)
    }

    /// Outer-joins `right`, a frame of the index plus one column `name`.
    fn join_frame(&mut self, name: &str, right: DataFrame) -> Result<(), TableError> {
        if name == INDEX_COLUMN || self.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        self.frame = self
            .frame
            .clone()
            .lazy()
            .join(
                right.lazy(),
                [col(INDEX_COLUMN)],
                [col(INDEX_COLUMN)],
                full_join(),
            )
            .sort([INDEX_COLUMN], SortMultipleOptions::default())
            .collect()?;
        Ok(())
    }

    /// Pearson correlation of every column pair over the rows where both are
    /// observed.
    ///
    /// Pairs with fewer than two shared rows, or with a constant column over
    /// those rows, are `NaN`.
    pub fn correlation(&self) -> Result<CorrelationMatrix, TableError> {
        let labels: Vec<String> = self.column_names().map(str::to_string).collect();
        let n = labels.len();
        let mut values = vec![vec![f64::NAN; n]; n];
        for a in 0..n {
            for b in a..n {
                let r = match self.pearson(&labels[a], &labels[b])? {
                    r if a == b && !r.is_nan() => 1.0,
                    r => r,
                };
                values[a][b] = r;
                values[b][a] = r;
            }
        }
        Ok(CorrelationMatrix { labels, values })
    }

    fn pearson(&self, a: &str, b: &str) -> Result<f64, TableError> {
        let out = self
            .frame
            .clone()
            .lazy()
            .filter(col(a).is_not_null().and(col(b).is_not_null()))
            .select([
                col(a).count().alias("n"),
                pearson_corr(col(a), col(b)).alias("r"),
            ])
            .collect()?;

        let shared = out
            .column("n")?
            .as_materialized_series()
            .cast(&DataType::UInt64)?
            .u64()?
            .get(0)
            .unwrap_or(0);
        if shared < 2 {
            return Ok(f64::NAN);
        }
        let r = out
            .column("r")?
            .as_materialized_series()
            .cast(&DataType::Float64)?
            .f64()?
            .get(0)
            .unwrap_or(f64::NAN);
        Ok(if r.is_finite() { r.clamp(-1.0, 1.0) } else { f64::NAN })
    }
}

/// Outer-joins several series into one table, one column per series name.
pub fn merge_series<'a>(
    series: impl IntoIterator<Item = &'a PriceSeries>,
) -> Result<Table, TableError> {
    let mut table = Table::new();
    for s in series {
        table.join_series(s)?;
    }
    Ok(table)
}

/// Takes `column` from each table and joins them into one table whose columns
/// are `labels`, e.g. one symbol's close on several exchanges.
pub fn merge_tables_on_column(
    tables: &[&Table],
    labels: &[&str],
    column: &str,
) -> Result<Table, TableError> {
    if tables.len() != labels.len() {
        return Err(TableError::LengthMismatch {
            tables: tables.len(),
            labels: labels.len(),
        });
    }

    let mut merged = Table::new();
    for (table, label) in tables.iter().zip(labels) {
        if !table.has_column(column) {
            return Err(TableError::MissingColumn {
                label: label.to_string(),
                column: column.to_string(),
            });
        }
        let relabelled = table
            .frame
            .clone()
            .lazy()
            .select([col(INDEX_COLUMN), col(column).alias(*label)])
            .filter(col(*label).is_not_null())
            .collect()?;
        merged.join_frame(label, relabelled)?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn series(name: &str, points: &[(u32, f64)]) -> PriceSeries {
        PriceSeries::from_points(name, points.iter().map(|(d, v)| (day(*d), *v)))
    }

    #[test]
    fn merge_is_an_outer_join_without_fill() {
        let btc = series("BTC/USDT", &[(1, 100.0), (3, 300.0)]);
        let eth = series("ETH/USDT", &[(2, 20.0), (3, 30.0)]);
        let table = merge_series([&btc, &eth]).unwrap();

        assert_eq!(table.index(), vec![day(1), day(2), day(3)]);
        assert_eq!(
            table.column("BTC/USDT").unwrap(),
            vec![Some(100.0), None, Some(300.0)]
        );
        assert_eq!(
            table.column("ETH/USDT").unwrap(),
            vec![None, Some(20.0), Some(30.0)]
        );
        assert_eq!(table.get(&day(2), "ETH/USDT"), Some(20.0));
        assert_eq!(table.get(&day(2), "BTC/USDT"), None);
        assert_eq!(table.get(&day(9), "BTC/USDT"), None);
    }

    #[test]
    fn frame_is_indexed_by_a_datetime_column() {
        let table = merge_series([&series("BTC/USDT", &[(1, 100.0)])]).unwrap();
        let frame = table.frame();
        assert_eq!(frame.width(), 2);
        assert_eq!(
            frame.column(INDEX_COLUMN).unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["BTC/USDT"]);
        assert!(!table.has_column(INDEX_COLUMN));
    }

    #[test]
    fn empty_series_still_adds_a_column() {
        let btc = series("BTC/USDT", &[(1, 100.0)]);
        let empty = PriceSeries::new("ETH/USDT");
        let table = merge_series([&btc, &empty]).unwrap();
        assert_eq!(table.n_rows(), 1);
        assert_eq!(table.column("ETH/USDT").unwrap(), vec![None]);

        let only_empty = merge_series([&empty]).unwrap();
        assert_eq!(only_empty.n_rows(), 0);
        assert!(only_empty.has_column("ETH/USDT"));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let btc = series("BTC/USDT", &[(1, 100.0)]);
        let err = merge_series([&btc, &btc]).unwrap_err();
        assert!(matches!(err, TableError::DuplicateColumn(name) if name == "BTC/USDT"));

        let clash = series(INDEX_COLUMN, &[(1, 1.0)]);
        assert!(matches!(
            merge_series([&clash]).unwrap_err(),
            TableError::DuplicateColumn(_)
        ));
    }

    #[test]
    fn series_roundtrips_only_observed_cells() {
        let btc = series("BTC/USDT", &[(1, 100.0), (3, 300.0)]);
        let eth = series("ETH/USDT", &[(2, 20.0)]);
        let table = merge_series([&btc, &eth]).unwrap();
        assert_eq!(table.series("BTC/USDT").unwrap(), btc);
        assert!(table.series("DOGE/USDT").is_none());
    }

    #[test]
    fn merge_on_column_relabels_by_exchange() {
        let a = merge_series([
            &series("BTC/USDT", &[(1, 100.0), (2, 101.0)]),
            &series("ETH/USDT", &[(4, 10.0)]),
        ])
        .unwrap();
        let b = merge_series([&series("BTC/USDT", &[(2, 102.0), (3, 103.0)])]).unwrap();
        let merged = merge_tables_on_column(&[&a, &b], &["binance", "bybit"], "BTC/USDT").unwrap();

        assert_eq!(merged.column_names().collect::<Vec<_>>(), vec!["binance", "bybit"]);
        // day 4 only has ETH on binance, so it is not a row here
        assert_eq!(merged.index(), vec![day(1), day(2), day(3)]);
        assert_eq!(merged.get(&day(2), "bybit"), Some(102.0));
        assert_eq!(merged.get(&day(3), "binance"), None);
    }

    #[test]
    fn merge_on_column_checks_its_inputs() {
        let a = merge_series([&series("BTC/USDT", &[(1, 100.0)])]).unwrap();
        assert!(matches!(
            merge_tables_on_column(&[&a], &["binance", "bybit"], "BTC/USDT").unwrap_err(),
            TableError::LengthMismatch { tables: 1, labels: 2 }
        ));
        match merge_tables_on_column(&[&a], &["binance"], "ETH/USDT").unwrap_err() {
            TableError::MissingColumn { label, column } => {
                assert_eq!(label, "binance");
                assert_eq!(column, "ETH/USDT");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            merge_tables_on_column(&[&a, &a], &["binance", "binance"], "BTC/USDT").unwrap_err(),
            TableError::DuplicateColumn(_)
        ));
    }

    #[test]
    fn correlation_uses_pairwise_complete_rows() {
        let a = series("a", &[(1, 1.0), (2, 2.0), (3, 3.0), (4, 4.0)]);
        let b = series("b", &[(1, 2.0), (2, 4.0), (3, 6.0)]);
        let c = series("c", &[(1, 3.0), (2, 2.0), (3, 1.0)]);
        let lonely = series("d", &[(4, 1.0)]);
        let corr = merge_series([&a, &b, &c, &lonely])
            .unwrap()
            .correlation()
            .unwrap();

        assert_eq!(corr.labels, vec!["a", "b", "c", "d"]);
        assert!((corr.values[0][1] - 1.0).abs() < 1e-9);
        assert!((corr.values[0][2] + 1.0).abs() < 1e-9);
        assert_eq!(corr.values[0][0], 1.0);
        assert!(corr.values[0][3].is_nan());
        assert!(corr.values[3][3].is_nan());
    }
}
