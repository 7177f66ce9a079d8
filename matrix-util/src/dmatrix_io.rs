use crate::common_io::{read_lines_of_words_delim, write_lines, Delimiter, ReadLinesOut};
use crate::parquet::*;
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};

fn default_names(n: usize) -> Vec<Box<str>> {
    (0..n).map(|i| i.to_string().into_boxed_str()).collect()
}

impl IoOps for DMatrix<f32> {
    type Scalar = f32;
    type Mat = Self;

    fn read_names_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        row_name_index: Option<usize>,
    ) -> anyhow::Result<MatWithNames<Self>> {
        let ReadLinesOut { lines, header } = read_lines_of_words_delim(file, delim, 0)?;

        let header: Vec<Box<str>> = header
            .into_iter()
            .map(|x| x.trim().trim_matches('"').to_string().into_boxed_str())
            .collect();

        let ncols_line = lines.first().map(|x| x.len()).unwrap_or(header.len());

        // A header may skip the row-name column, as R writes them
        let cols: Vec<Box<str>> = match row_name_index {
            Some(r) if header.len() == ncols_line => header
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != r)
                .map(|(_, x)| x.clone())
                .collect(),
            Some(_) if header.len() + 1 == ncols_line => header.clone(),
            Some(r) => {
                return Err(anyhow::anyhow!(
                    "{}: header has {} fields, data lines {} (row names at {})",
                    file,
                    header.len(),
                    ncols_line,
                    r
                ))
            }
            None => header.clone(),
        };

        let ncols = cols.len();
        let nrows = lines.len();
        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);

        for (i, words) in lines.iter().enumerate() {
            if words.len() != ncols_line {
                return Err(anyhow::anyhow!(
                    "{}: data line {} has {} fields, expected {}",
                    file,
                    i + 1,
                    words.len(),
                    ncols_line
                ));
            }
            for (j, w) in words.iter().enumerate() {
                if Some(j) == row_name_index {
                    rows.push(w.trim().trim_matches('"').to_string().into_boxed_str());
                    continue;
                }
                let x = w.trim().parse::<f32>().map_err(|e| {
                    anyhow::anyhow!(
                        "{}: data line {}, field {}: cannot parse '{}' ({})",
                        file,
                        i + 1,
                        j + 1,
                        w,
                        e
                    )
                })?;
                data.push(x);
            }
        }

        if row_name_index.is_none() {
            rows = default_names(nrows);
        }

        if data.len() != nrows * ncols {
            return Err(anyhow::anyhow!(
                "{}: expected {} x {} values, found {}",
                file,
                nrows,
                ncols,
                data.len()
            ));
        }

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<f32>::from_row_iterator(nrows, ncols, data),
        })
    }

    fn write_names_delim(
        &self,
        file: &str,
        names: (Option<&[Box<str>]>, Option<&[Box<str>]>),
        row_header: &str,
        delim: &str,
    ) -> anyhow::Result<()> {
        let (row_names, col_names) = names;
        check_names(self.nrows(), self.ncols(), row_names, col_names)?;

        let col_names = col_names
            .map(|x| x.to_vec())
            .unwrap_or_else(|| default_names(self.ncols()));

        let mut lines: Vec<Box<str>> = Vec::with_capacity(self.nrows() + 1);

        let mut hdr = vec![];
        if row_names.is_some() {
            hdr.push(row_header.to_string());
        }
        hdr.extend(col_names.iter().map(|x| x.to_string()));
        lines.push(hdr.join(delim).into_boxed_str());

        // keep the order of the rows; no par_iter here
        for (i, row) in self.row_iter().enumerate() {
            let mut words: Vec<String> = Vec::with_capacity(self.ncols() + 1);
            if let Some(r) = row_names {
                words.push(r[i].to_string());
            }
            words.extend(row.iter().map(|x| format!("{}", x)));
            lines.push(words.join(delim).into_boxed_str());
        }

        write_lines(&lines, file)
    }

    fn from_parquet(file: &str) -> anyhow::Result<MatWithNames<Self>> {
        let parquet = ParquetReader::new(file, Some(0))?;

        let nrows = parquet.row_names.len();
        let ncols = parquet.column_names.len();

        Ok(MatWithNames {
            rows: parquet.row_names,
            cols: parquet.column_names,
            mat: DMatrix::<f32>::from_row_iterator(
                nrows,
                ncols,
                parquet.row_major_data.into_iter().map(|x| x as f32),
            ),
        })
    }

    fn to_parquet_with_names(
        &self,
        file: &str,
        names: (Option<&[Box<str>]>, Option<&[Box<str>]>),
        row_header: &str,
    ) -> anyhow::Result<()> {
        let (row_names, col_names) = names;
        check_names(self.nrows(), self.ncols(), row_names, col_names)?;

        let writer = ParquetWriter::new(
            file,
            (self.nrows(), self.ncols()),
            (row_names, col_names),
            row_header,
        )?;

        let columns = (0..self.ncols())
            .map(|j| self.column(j).iter().map(|&x| x as f64).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        writer.write_columns(&columns)
    }
}

fn check_names(
    nrows: usize,
    ncols: usize,
    row_names: Option<&[Box<str>]>,
    col_names: Option<&[Box<str>]>,
) -> anyhow::Result<()> {
    if let Some(r) = row_names {
        if r.len() != nrows {
            return Err(anyhow::anyhow!(
                "{} row names for {} rows",
                r.len(),
                nrows
            ));
        }
    }
    if let Some(c) = col_names {
        if c.len() != ncols {
            return Err(anyhow::anyhow!(
                "{} column names for {} columns",
                c.len(),
                ncols
            ));
        }
    }
    Ok(())
}
