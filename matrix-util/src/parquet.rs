use parquet::basic::Type as ParquetType;
use parquet::basic::{Compression, ConvertedType, Repetition, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RowAccessor;
use parquet::schema::types::Type;
use std::fs::File;
use std::sync::Arc;

pub struct ParquetReader {
    pub row_major_data: Vec<f64>,
    pub row_names: Vec<Box<str>>,
    pub column_names: Vec<Box<str>>,
}

impl ParquetReader {
    /// Read a matrix with row names from a parquet file. Every numeric
    /// field other than the row-name field becomes a column; other
    /// field types are skipped.
    ///
    /// * `row_name_index`: if `None`, the field `0` will be so.
    pub fn new(file_path: &str, row_name_index: Option<usize>) -> anyhow::Result<Self> {
        let row_name_index = row_name_index.unwrap_or(0);

        let file = File::open(file_path)
            .map_err(|e| anyhow::anyhow!("failed to open {}: {}", file_path, e))?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();
        let nrows = metadata.file_metadata().num_rows() as usize;
        let fields = metadata.file_metadata().schema().get_fields();

        let select_indices = fields
            .iter()
            .enumerate()
            .filter(|&(j, f)| j != row_name_index && f.is_primitive())
            .filter_map(|(j, f)| match f.get_physical_type() {
                ParquetType::FLOAT
                | ParquetType::DOUBLE
                | ParquetType::INT32
                | ParquetType::INT64 => Some((f.get_physical_type(), j)),
                _ => None,
            })
            .collect::<Vec<_>>();

        if select_indices.is_empty() {
            return Err(anyhow::anyhow!("{}: no numeric columns", file_path));
        }

        let ncols = select_indices.len();
        let column_names: Vec<Box<str>> = select_indices
            .iter()
            .map(|&(_, j)| fields[j].name().to_string().into_boxed_str())
            .collect();

        let row_iter = reader.get_row_iter(None)?;
        let mut row_names: Vec<Box<str>> = Vec::with_capacity(nrows);
        let mut row_major_data: Vec<f64> = Vec::with_capacity(nrows * ncols);

        for record in row_iter {
            let row = record?;
            row_names.push(row.get_string(row_name_index)?.clone().into_boxed_str());

            for &(tt, j) in select_indices.iter() {
                let x = match tt {
                    ParquetType::FLOAT => row.get_float(j)? as f64,
                    ParquetType::DOUBLE => row.get_double(j)?,
                    ParquetType::INT32 => row.get_int(j)? as f64,
                    _ => row.get_long(j)? as f64,
                };
                row_major_data.push(x);
            }
        }

        Ok(Self {
            row_major_data,
            row_names,
            column_names,
        })
    }
}

pub struct ParquetWriter {
    file: File,
    schema: Arc<Type>,
    writer_properties: Arc<WriterProperties>,
    row_names: Vec<ByteArray>,
    ncols: usize,
}

impl ParquetWriter {
    /// Create a new parquet writer for a matrix with row and column
    /// names.
    ///
    /// * `file_path`: output file path
    ///
    /// * `shape`: number of rows and columns
    ///
    /// * `names`: for row and column names, respectively; if `None`, just add `[0, n)` numbers.
    ///
    /// * `row_header`: name of the row-name field
    pub fn new(
        file_path: &str,
        shape: (usize, usize),
        names: (Option<&[Box<str>]>, Option<&[Box<str>]>),
        row_header: &str,
    ) -> anyhow::Result<Self> {
        let (nrows, ncols) = shape;
        let (row_names, column_names) = names;

        let schema = build_columns_schema(ncols, column_names, row_header)?;

        let file = File::create(file_path)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {}", file_path, e))?;

        let zstd_level = ZstdLevel::try_new(5)?;
        let writer_properties = Arc::new(
            WriterProperties::builder()
                .set_compression(Compression::ZSTD(zstd_level))
                .build(),
        );

        let row_names: Vec<ByteArray> = match row_names {
            Some(row_names) => row_names
                .iter()
                .map(|r| ByteArray::from(r.as_ref()))
                .collect(),
            None => (0..nrows)
                .map(|i| ByteArray::from(i.to_string().as_str()))
                .collect(),
        };

        Ok(Self {
            file,
            schema,
            writer_properties,
            row_names,
            ncols,
        })
    }

    /// Write all the columns as one row group
    pub fn write_columns(self, columns: &[Vec<f64>]) -> anyhow::Result<()> {
        if columns.len() != self.ncols {
            return Err(anyhow::anyhow!(
                "{} columns given, schema has {}",
                columns.len(),
                self.ncols
            ));
        }

        let mut writer = SerializedFileWriter::new(
            self.file,
            self.schema.clone(),
            self.writer_properties.clone(),
        )?;

        let mut row_group_writer = writer.next_row_group()?;

        let mut col_writer = row_group_writer
            .next_column()?
            .ok_or(anyhow::anyhow!("missing row-name column"))?;
        col_writer
            .typed::<ByteArrayType>()
            .write_batch(&self.row_names, None, None)?;
        col_writer.close()?;

        for values in columns {
            if values.len() != self.row_names.len() {
                return Err(anyhow::anyhow!(
                    "column of length {}, expected {}",
                    values.len(),
                    self.row_names.len()
                ));
            }
            let mut col_writer = row_group_writer
                .next_column()?
                .ok_or(anyhow::anyhow!("fewer columns in the schema"))?;
            col_writer
                .typed::<DoubleType>()
                .write_batch(values, None, None)?;
            col_writer.close()?;
        }

        row_group_writer.close()?;
        writer.close()?;
        Ok(())
    }
}

fn build_columns_schema(
    ncols: usize,
    column_names: Option<&[Box<str>]>,
    row_header: &str,
) -> anyhow::Result<Arc<Type>> {
    if let Some(column_names) = column_names {
        if column_names.len() != ncols {
            return Err(anyhow::anyhow!(
                "Column names length ({}) does not match number of columns ({})",
                column_names.len(),
                ncols
            ));
        }
    }

    let mut fields = vec![Arc::new(
        Type::primitive_type_builder(row_header, ParquetType::BYTE_ARRAY)
            .with_repetition(Repetition::REQUIRED)
            .with_converted_type(ConvertedType::UTF8)
            .build()?,
    )];

    let default_names: Vec<Box<str>> = (0..ncols).map(|x| x.to_string().into_boxed_str()).collect();
    let column_names: &[Box<str>] = column_names.unwrap_or(&default_names);

    for column_name in column_names {
        fields.push(Arc::new(
            Type::primitive_type_builder(column_name, ParquetType::DOUBLE)
                .with_repetition(Repetition::REQUIRED)
                .build()?,
        ));
    }

    let schema = Arc::new(
        Type::group_type_builder("2dMatrix")
            .with_fields(fields)
            .build()?,
    );

    Ok(schema)
}
