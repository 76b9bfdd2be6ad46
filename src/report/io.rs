use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use polars::{
    frame::DataFrame,
    prelude::{
        CsvWriterOptions, IntoLazy, LazyFrame, PlPath, SchemaRef, SinkOptions, SinkTarget, col,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::{DataError, IoError, StockcastError, StockcastResult},
    report::polars_ext::DataFrameExt,
};

// ================================================================================================
// Traits
// ================================================================================================

/// Defines a common interface for all tabular report types.
pub trait Report {
    /// Access the underlying DataFrame (Immutable).
    fn as_df(&self) -> &DataFrame;

    /// Access the underlying DataFrame (Mutable).
    fn as_df_mut(&mut self) -> &mut DataFrame;
}

pub trait ReportName {
    fn base_name(&self) -> String;

    fn filename(&self, ext: FileExtension) -> String {
        format!("{}.{}", self.base_name(), ext)
    }
}

pub trait ToSchema {
    /// Returns the canonical schema for this report type.
    fn to_schema() -> SchemaRef;
}

pub trait AsFormattedLazyFrame {
    /// The report's columns in schema order, cast to their canonical types.
    fn as_formatted_lf(&self) -> LazyFrame;
}

pub trait ToJson {
    /// Serializes the report to a generic JSON Value.
    /// Returns a `Value::Array` containing row objects.
    fn to_json(&self) -> StockcastResult<serde_json::Value>;
}

pub trait ToCsv {
    /// Writes the report to a CSV file in the target directory.
    ///
    /// # Side Effects
    /// - Creates the directory if missing.
    /// - Overwrites the file if it exists.
    fn to_csv(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&CsvWriterOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> StockcastResult<PathBuf>;
}

pub trait ToJsonFile {
    /// Writes the report rows as a pretty-printed JSON array next to its CSV.
    fn to_json_file(&self, dir: impl AsRef<Path>) -> StockcastResult<PathBuf>;
}

// ================================================================================================
// Blanket Implementations
// ================================================================================================

impl<T> AsFormattedLazyFrame for T
where
    T: Report + ToSchema,
{
    fn as_formatted_lf(&self) -> LazyFrame {
        let columns = T::to_schema()
            .iter()
            .map(|(name, dtype)| col(name.clone()).cast(dtype.clone()))
            .collect::<Vec<_>>();
        self.as_df().clone().lazy().select(columns)
    }
}

impl<T> ToJson for T
where
    T: Report + ToSchema,
{
    fn to_json(&self) -> StockcastResult<serde_json::Value> {
        let rows = self
            .as_formatted_lf()
            .collect()
            .map_err(|e| StockcastError::Data(DataError::DataFrame(e.to_string())))?
            .to_json_rows()?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

impl<T> ToCsv for T
where
    T: Report + ReportName + ToSchema,
{
    fn to_csv(
        &self,
        dir: impl AsRef<Path>,
        opts: Option<&CsvWriterOptions>,
        sink_opts: Option<&SinkOptions>,
    ) -> StockcastResult<PathBuf> {
        let dir = dir.as_ref();
        let file_path = dir.join(self.filename(FileExtension::Csv));
        ensure_dir(dir)?;

        let uri = file_path.to_str().ok_or_else(|| {
            IoError::FileSystem(format!(
                "Path contains invalid UTF-8 characters: {}",
                file_path.display()
            ))
        })?;
        let target = SinkTarget::Path(PlPath::new(uri));
        let options = opts.cloned().unwrap_or_default();
        let sink_opts = sink_opts.cloned().unwrap_or_default();

        let lf = self.as_formatted_lf();

        let sink_plan = lf
            .sink_csv(target, options, None, sink_opts)
            .map_err(|e| DataError::DataFrame(format!("Failed to build CSV sink plan: {e}")))?;

        let _ = sink_plan.collect().map_err(|e| {
            DataError::DataFrame(format!(
                "Failed to write CSV to '{}': {e}",
                file_path.display()
            ))
        })?;

        Ok(file_path)
    }
}

impl<T> ToJsonFile for T
where
    T: Report + ReportName + ToSchema,
{
    fn to_json_file(&self, dir: impl AsRef<Path>) -> StockcastResult<PathBuf> {
        let path = dir.as_ref().join(self.filename(FileExtension::Json));
        write_json(&path, &self.to_json()?)?;
        Ok(path)
    }
}

// ================================================================================================
// Helper Functions
// ================================================================================================

/// Serializes `value` as pretty JSON, creating the parent directory if needed.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StockcastResult<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }
    let file = File::create(path).map_err(|e| {
        IoError::WriteFailed(format!("Failed to create {}: {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), value).map_err(IoError::Json)?;
    Ok(())
}

fn ensure_dir(dir: &Path) -> StockcastResult<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| {
        IoError::FileSystem(format!(
            "Failed to create directory {}: {}",
            dir.display(),
            e
        ))
        .into()
    })
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum FileExtension {
    Csv,
    Json,
}
