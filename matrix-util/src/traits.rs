use crate::common_io::Delimiter;

/// A matrix together with its row and column names
pub struct MatWithNames<Mat> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: Mat,
}

/// Read and write named matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    /// Read a delimited table whose first line holds column names.
    ///
    /// * `row_name_index` - column holding row names; if `None`,
    ///   rows are named `0, 1, 2, ...` and every column is numeric
    fn read_names_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        row_name_index: Option<usize>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    /// Write a delimited table with a header line. Row names, if
    /// given, go to the first column named `row_header`.
    fn write_names_delim(
        &self,
        file: &str,
        names: (Option<&[Box<str>]>, Option<&[Box<str>]>),
        row_header: &str,
        delim: &str,
    ) -> anyhow::Result<()>;

    fn to_tsv_with_names(
        &self,
        file: &str,
        names: (Option<&[Box<str>]>, Option<&[Box<str>]>),
        row_header: &str,
    ) -> anyhow::Result<()> {
        self.write_names_delim(file, names, row_header, "\t")
    }

    /// Read a parquet file: the first column carries row names and
    /// the remaining numeric columns the data
    fn from_parquet(file: &str) -> anyhow::Result<MatWithNames<Self::Mat>>;

    /// Write to a parquet file with row names in the first column
    fn to_parquet_with_names(
        &self,
        file: &str,
        names: (Option<&[Box<str>]>, Option<&[Box<str>]>),
        row_header: &str,
    ) -> anyhow::Result<()>;
}

/// Elementwise transforms
pub trait MatOps {
    type Scalar;

    /// `x <- asinh(x / cofactor)` for every element
    fn arcsinh_inplace(&mut self, cofactor: Self::Scalar);
}

/// Distances between columns treated as points
pub trait DistanceOps {
    type Scalar;

    /// Contiguous view of column `j`
    fn column_values(&self, j: usize) -> &[Self::Scalar];

    /// Column closest to `target` by squared Euclidean distance, and
    /// that distance. Ties go to the lowest column index.
    fn nearest_column(&self, target: &[Self::Scalar]) -> Option<(usize, Self::Scalar)>;

    /// All pairwise Euclidean distances between columns
    fn pairwise_column_distances(&self) -> Vec<Vec<Self::Scalar>>;
}
