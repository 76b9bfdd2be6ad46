use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use polars::prelude::{DataFrame, DataType, LazyCsvReader, LazyFileListReader, PlPath};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, info, warn};

use crate::{
    data::domain::IndexId,
    error::{DataError, IoError, StockcastError, StockcastResult},
};

// ================================================================================================
// Raw Rows
// ================================================================================================

/// One unvalidated input row. Cells are kept as text so cleaning can tell a
/// missing value apart from garbage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPriceRow {
    pub date: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<String>,
}

impl RawPriceRow {
    /// Convenience constructor for the three cells every row needs.
    pub fn new(date: &str, open: &str, close: &str) -> Self {
        Self {
            date: Some(date.to_string()),
            open: Some(open.to_string()),
            close: Some(close.to_string()),
            ..Default::default()
        }
    }

    pub fn with_volume(self, volume: &str) -> Self {
        Self {
            volume: Some(volume.to_string()),
            ..self
        }
    }
}

/// An input file skipped because it cannot be read as price data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Raw rows grouped by index, in file order.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    series: BTreeMap<IndexId, Vec<RawPriceRow>>,
    rows_without_index: usize,
    rejected_files: Vec<RejectedFile>,
}

impl RawDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: IndexId, row: RawPriceRow) {
        self.series.entry(index).or_default().push(row);
    }

    /// Appends `other`, keeping this dataset's rows first for shared indices.
    pub fn merge(&mut self, other: RawDataset) {
        for (index, rows) in other.series {
            self.series.entry(index).or_default().extend(rows);
        }
        self.rows_without_index += other.rows_without_index;
        self.rejected_files.extend(other.rejected_files);
    }

    pub fn series(&self) -> &BTreeMap<IndexId, Vec<RawPriceRow>> {
        &self.series
    }

    pub fn rows(&self, index: &IndexId) -> Option<&[RawPriceRow]> {
        self.series.get(index).map(Vec::as_slice)
    }

    pub fn indices(&self) -> impl Iterator<Item = &IndexId> {
        self.series.keys()
    }

    /// Rows whose index cell was empty; they cannot be assigned to a series.
    pub fn rows_without_index(&self) -> usize {
        self.rows_without_index
    }

    /// Files left out of the dataset, in load order.
    pub fn rejected_files(&self) -> &[RejectedFile] {
        &self.rejected_files
    }

    pub fn total_rows(&self) -> usize {
        self.series.values().map(Vec::len).sum::<usize>() + self.rows_without_index
    }

    pub fn is_empty(&self) -> bool {
        self.total_rows() == 0
    }
}

// ================================================================================================
// Column Standardization
// ================================================================================================

/// Canonical input columns.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum InputCol {
    Index,
    Date,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl InputCol {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Maps a source header to its canonical column, case-insensitively.
    ///
    /// `Adj Close` and unknown headers map to `None`.
    pub fn standardize(header: &str) -> Option<Self> {
        let normalized = header.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "index" | "stock_index" | "symbol" | "ticker" => Some(Self::Index),
            "date" | "timestamp" => Some(Self::Date),
            "open" => Some(Self::Open),
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "close" => Some(Self::Close),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }
}

// ================================================================================================
// Readers
// ================================================================================================

/// Reads a single CSV file into raw rows.
///
/// Every column is read as text. A file without an index column is treated as a
/// single series named after the file stem.
pub fn read_csv(path: &Path) -> StockcastResult<RawDataset> {
    let source_name = path.display().to_string();
    let uri = path.to_str().ok_or_else(|| {
        IoError::FileSystem(format!(
            "Path contains invalid UTF-8 characters: {source_name}"
        ))
    })?;

    let df = LazyCsvReader::new(PlPath::new(uri))
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| IoError::ReadFailed(format!("{source_name}: {e}")))?;

    let columns = standardized_columns(&df);
    for required in [InputCol::Date, InputCol::Open, InputCol::Close] {
        if !columns.contains_key(&required) {
            return Err(DataError::MissingColumn {
                column: required.as_str(),
                source_name,
            }
            .into());
        }
    }

    let cells = |col: InputCol| -> StockcastResult<Vec<Option<String>>> {
        match columns.get(&col) {
            Some(name) => text_cells(&df, name),
            None => Ok(vec![None; df.height()]),
        }
    };

    let dates = cells(InputCol::Date)?;
    let opens = cells(InputCol::Open)?;
    let highs = cells(InputCol::High)?;
    let lows = cells(InputCol::Low)?;
    let closes = cells(InputCol::Close)?;
    let volumes = cells(InputCol::Volume)?;

    let fallback_index = columns
        .get(&InputCol::Index)
        .is_none()
        .then(|| file_stem_index(path))
        .transpose()?;
    let index_cells = cells(InputCol::Index)?;

    let mut dataset = RawDataset::new();
    let rows = itertools::izip!(dates, opens, highs, lows, closes, volumes, index_cells);
    for (date, open, high, low, close, volume, index_cell) in rows {
        let index = match (&fallback_index, index_cell) {
            (Some(stem), _) => stem.clone(),
            (None, Some(cell)) if !cell.trim().is_empty() => IndexId::new(cell),
            (None, _) => {
                dataset.rows_without_index += 1;
                continue;
            }
        };
        dataset.push(
            index,
            RawPriceRow {
                date,
                open,
                high,
                low,
                close,
                volume,
            },
        );
    }

    debug!(
        source = %source_name,
        rows = df.height(),
        indices = dataset.series.len(),
        "Read price file"
    );
    Ok(dataset)
}

/// Loads every input path. Directories contribute their `*.csv` files in name order.
///
/// A file that fails with a data error (such as a missing required column) is
/// recorded in [`RawDataset::rejected_files`] and the remaining files still load.
pub fn load_inputs(paths: &[PathBuf]) -> StockcastResult<RawDataset> {
    let files = expand_inputs(paths)?;
    if files.is_empty() {
        let joined = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(DataError::NoInputFiles(joined).into());
    }

    let mut dataset = RawDataset::new();
    for file in &files {
        match read_csv(file) {
            Ok(ds) => dataset.merge(ds),
            Err(StockcastError::Data(e)) => {
                warn!(source = %file.display(), error = %e, "Rejected price file");
                dataset.rejected_files.push(RejectedFile {
                    path: file.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        files = files.len(),
        rejected = dataset.rejected_files.len(),
        indices = dataset.series.len(),
        rows = dataset.total_rows(),
        "Loaded raw price data"
    );
    Ok(dataset)
}

fn expand_inputs(paths: &[PathBuf]) -> StockcastResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = fs::read_dir(path)
                .map_err(IoError::Io)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
                })
                .collect::<Vec<_>>();
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(DataError::NoInputFiles(path.display().to_string()).into());
        }
    }
    Ok(files)
}

fn standardized_columns(df: &DataFrame) -> HashMap<InputCol, String> {
    let mut columns = HashMap::new();
    for name in df.get_column_names() {
        if let Some(col) = InputCol::standardize(name.as_str()) {
            // First matching header wins.
            columns.entry(col).or_insert_with(|| name.to_string());
        }
    }
    columns
}

fn text_cells(df: &DataFrame, name: &str) -> StockcastResult<Vec<Option<String>>> {
    let column = df
        .column(name)
        .and_then(|c| c.cast(&DataType::String))
        .map_err(|e| DataError::DataFrame(format!("Column '{name}': {e}")))?;
    let ca = column
        .str()
        .map_err(|e| DataError::DataFrame(format!("Column '{name}': {e}")))?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

fn file_stem_index(path: &Path) -> StockcastResult<IndexId> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(IndexId::new)
        .ok_or_else(|| {
            IoError::FileSystem(format!(
                "Cannot derive an index name from {}",
                path.display()
            ))
            .into()
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).expect("failed to create csv");
        file.write_all(contents.as_bytes())
            .expect("failed to write csv");
        path
    }

    #[test]
    fn test_standardize_headers() {
        assert_eq!(InputCol::standardize("Index"), Some(InputCol::Index));
        assert_eq!(InputCol::standardize(" Stock Index "), Some(InputCol::Index));
        assert_eq!(InputCol::standardize("CLOSE"), Some(InputCol::Close));
        assert_eq!(InputCol::standardize("Adj Close"), None);
        assert_eq!(InputCol::standardize("CloseUSD"), None);
    }

    #[test]
    fn test_read_multi_index_file_keeps_text_cells() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = write_file(
            dir.path(),
            "indices.csv",
            "Index,Date,Open,High,Low,Close,Adj Close,Volume\n\
             NYA,1965-12-31,528.69,528.69,528.69,528.69,528.69,0\n\
             NYA,1966-01-03,527.21,527.21,527.21,527.21,527.21,0\n\
             N225,1965-01-05,1257.72,1257.72,1257.72,1257.72,1257.72,\n\
             ,1965-01-06,1.0,1.0,1.0,1.0,1.0,0\n",
        );

        let ds = read_csv(&path).expect("failed to read csv");
        assert_eq!(ds.indices().count(), 2);
        assert_eq!(ds.rows_without_index(), 1);
        assert_eq!(ds.total_rows(), 4);

        let nya = ds.rows(&IndexId::new("NYA")).expect("NYA present");
        assert_eq!(nya.len(), 2);
        assert_eq!(nya[0].date.as_deref(), Some("1965-12-31"));
        assert_eq!(nya[1].close.as_deref(), Some("527.21"));

        let n225 = ds.rows(&IndexId::new("N225")).expect("N225 present");
        assert_eq!(n225[0].volume, None);
    }

    #[test]
    fn test_file_stem_names_single_series() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        write_file(
            dir.path(),
            "GDAXI.csv",
            "date,open,close\n2020-01-02,100,101\n2020-01-03,abc,102\n",
        );
        write_file(dir.path(), "notes.txt", "ignored");

        let ds = load_inputs(&[dir.path().to_path_buf()]).expect("failed to load dir");
        let rows = ds.rows(&IndexId::new("GDAXI")).expect("stem used as index");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].open.as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_close_column_is_reported() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = write_file(dir.path(), "bad.csv", "date,open\n2020-01-02,1\n");

        let err = read_csv(&path).expect_err("close column is required");
        assert!(err.to_string().contains("close"));
    }

    #[test]
    fn test_file_without_close_is_rejected_and_others_load() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        write_file(
            dir.path(),
            "GOOD.csv",
            "Date,Open,Close\n2020-01-02,100,101\n2020-01-03,101,102\n",
        );
        write_file(dir.path(), "BAD.csv", "Date,Open\n2020-01-02,1\n");

        let ds = load_inputs(&[dir.path().to_path_buf()]).expect("good file still loads");
        assert_eq!(ds.indices().collect::<Vec<_>>(), vec![&IndexId::new("GOOD")]);
        assert_eq!(ds.total_rows(), 2);

        let rejected = ds.rejected_files();
        assert_eq!(rejected.len(), 1);
        assert!(rejected[0].path.ends_with("BAD.csv"));
        assert!(rejected[0].reason.contains("close"));
    }

    #[test]
    fn test_missing_path_is_no_input() {
        let err = load_inputs(&[PathBuf::from("/definitely/not/here.csv")])
            .expect_err("missing path must fail");
        assert!(matches!(
            err,
            crate::error::StockcastError::Data(DataError::NoInputFiles(_))
        ));
    }
}
