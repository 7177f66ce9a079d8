//! Expression matrix: cells × channels with channel and marker names

use crate::common::*;
use crate::error::{LupinError, Result};
use crate::markers::*;

use matrix_util::common_io::{detect_delimiter, file_ext};
use matrix_util::membership::Membership;
use matrix_util::traits::{IoOps, MatOps, MatWithNames};

/// Per-cell marker intensities. Rows are cells, columns are channels.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    data: Mat,
    cells: Vec<Box<str>>,
    channels: Vec<Box<str>>,
    markers: Vec<Box<str>>,
}

impl ExpressionMatrix {
    /// Build from a matrix and its channel identifiers.
    ///
    /// * `descriptions` - optional marker description per channel;
    ///   missing ones fall back to the channel name
    pub fn new(
        data: Mat,
        cells: Option<Vec<Box<str>>>,
        channels: Vec<Box<str>>,
        descriptions: &[Option<Box<str>>],
    ) -> Result<Self> {
        if channels.len() != data.ncols() {
            return Err(LupinError::InvalidConfiguration(format!(
                "{} channel names for {} columns",
                channels.len(),
                data.ncols()
            )));
        }

        let cells = match cells {
            Some(cells) if cells.len() != data.nrows() => {
                return Err(LupinError::InvalidConfiguration(format!(
                    "{} cell names for {} rows",
                    cells.len(),
                    data.nrows()
                )));
            }
            Some(cells) => cells,
            None => (0..data.nrows())
                .map(|i| (i + 1).to_string().into_boxed_str())
                .collect(),
        };

        let markers = clean_marker_names(&channels, descriptions);

        Ok(Self {
            data,
            cells,
            channels,
            markers,
        })
    }

    /// Read a table of intensities.
    ///
    /// * `data_file` - `.tsv`, `.csv`, `.txt` (optionally gzipped) with
    ///   channel names on the first line, or `.parquet` with cell names
    ///   in the first column
    /// * `marker_file` - optional `channel -> marker` table
    pub fn from_file(data_file: &str, marker_file: Option<&str>) -> anyhow::Result<Self> {
        let MatWithNames {
            rows,
            cols: channels,
            mat,
        } = match file_ext(data_file)?.as_ref() {
            "parquet" => Mat::from_parquet(data_file)?,
            _ => Mat::read_names_delim(data_file, detect_delimiter(data_file), None)?,
        };

        info!(
            "Loaded {}: {} cells x {} channels",
            data_file,
            mat.nrows(),
            mat.ncols()
        );

        let descriptions: Vec<Option<Box<str>>> = match marker_file {
            Some(marker_file) => {
                let membership = Membership::from_file(marker_file, 0, 1, true)?;
                let (matched, stats) = membership.match_keys(&channels);
                info!(
                    "Marker descriptions: {} exact, {} prefix, {} channel(s) without",
                    stats.exact, stats.prefix, stats.unmatched
                );
                matched
            }
            None => vec![None; channels.len()],
        };

        let cells = if file_ext(data_file)?.as_ref() == "parquet" {
            Some(rows)
        } else {
            None
        };

        Ok(Self::new(mat, cells, channels, &descriptions)?)
    }

    /// `x <- asinh(x / cofactor)` on every intensity
    pub fn arcsinh_inplace(&mut self, cofactor: f32) -> Result<()> {
        if !cofactor.is_finite() || cofactor <= 0.0 {
            return Err(LupinError::InvalidConfiguration(format!(
                "asinh cofactor must be positive and finite, got {}",
                cofactor
            )));
        }
        self.data.arcsinh_inplace(cofactor);
        Ok(())
    }

    /// Cells × subset matrix, columns in subset order
    pub fn subset_data(&self, subset: &MarkerSubset) -> Result<Mat> {
        subset.check_bounds(self.ncols())?;
        Ok(self.data.select_columns(&subset.indices))
    }

    pub fn data(&self) -> &Mat {
        &self.data
    }

    pub fn cells(&self) -> &[Box<str>] {
        &self.cells
    }

    pub fn channels(&self) -> &[Box<str>] {
        &self.channels
    }

    pub fn markers(&self) -> &[Box<str>] {
        &self.markers
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checks_names() {
        let data = Mat::zeros(3, 2);
        let channels: Vec<Box<str>> = vec!["a".into()];
        assert!(matches!(
            ExpressionMatrix::new(data, None, channels, &[]),
            Err(LupinError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_arcsinh_rejects_bad_cofactor() {
        let data = Mat::from_element(2, 1, 5.0);
        let mut xx = ExpressionMatrix::new(data, None, vec!["CD3".into()], &[]).unwrap();
        assert!(xx.arcsinh_inplace(0.0).is_err());
        assert!(xx.arcsinh_inplace(f32::NAN).is_err());

        xx.arcsinh_inplace(DEFAULT_COFACTOR).unwrap();
        approx::assert_abs_diff_eq!(xx.data()[(1, 0)], 1_f32.asinh(), epsilon = 1e-6);
        assert_eq!(xx.cells()[1].as_ref(), "2");
    }
}
