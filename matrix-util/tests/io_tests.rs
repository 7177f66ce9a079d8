use matrix_util::common_io::{create_temp_dir_file, remove_file, write_lines};
use matrix_util::dmatrix_util::rnorm_seeded;
use matrix_util::traits::{IoOps, MatWithNames};
use nalgebra::DMatrix;

fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
    (0..n).map(|i| format!("{}{}", prefix, i).into_boxed_str()).collect()
}

#[test]
fn dmatrix_tsv_with_names() -> anyhow::Result<()> {
    let xx = rnorm_seeded(30, 4, 1);
    let rows = names("cell", 30);
    let cols = names("CD", 4);

    let tsv_file = create_temp_dir_file("tsv.gz")?;
    let tsv_file = tsv_file.to_str().unwrap();
    xx.to_tsv_with_names(tsv_file, (Some(&rows), Some(&cols)), "cell")?;

    let MatWithNames {
        rows: rows_in,
        cols: cols_in,
        mat: yy,
    } = DMatrix::<f32>::read_names_delim(tsv_file, "\t", Some(0))?;

    assert_eq!(rows, rows_in);
    assert_eq!(cols, cols_in);
    approx::assert_abs_diff_eq!(xx, yy, epsilon = 1e-5);

    remove_file(tsv_file)?;
    Ok(())
}

#[test]
fn dmatrix_csv_without_row_names() -> anyhow::Result<()> {
    let csv_file = create_temp_dir_file(".csv")?;
    let csv_file = csv_file.to_str().unwrap();
    let lines: Vec<Box<str>> = vec![
        "\"FSC-A\",CD3,CD19".into(),
        "1.5,2,3".into(),
        "4,5,6.25".into(),
    ];
    write_lines(&lines, csv_file)?;

    let data = DMatrix::<f32>::read_names_delim(csv_file, ",", None)?;
    assert_eq!(data.mat.shape(), (2, 3));
    assert_eq!(data.cols[0].as_ref(), "FSC-A");
    assert_eq!(data.rows[1].as_ref(), "1");
    approx::assert_abs_diff_eq!(data.mat[(1, 2)], 6.25);
    Ok(())
}

#[test]
fn dmatrix_header_only_gives_zero_rows() -> anyhow::Result<()> {
    let tsv_file = create_temp_dir_file(".tsv")?;
    let tsv_file = tsv_file.to_str().unwrap();
    let lines: Vec<Box<str>> = vec!["CD3\tCD4\tCD8".into()];
    write_lines(&lines, tsv_file)?;

    let data = DMatrix::<f32>::read_names_delim(tsv_file, "\t", None)?;
    assert_eq!(data.mat.nrows(), 0);
    assert_eq!(data.mat.ncols(), 3);
    Ok(())
}

#[test]
fn dmatrix_bad_number_is_reported() -> anyhow::Result<()> {
    let tsv_file = create_temp_dir_file(".tsv")?;
    let tsv_file = tsv_file.to_str().unwrap();
    let lines: Vec<Box<str>> = vec!["CD3\tCD4".into(), "1\tabc".into()];
    write_lines(&lines, tsv_file)?;

    let err = DMatrix::<f32>::read_names_delim(tsv_file, "\t", None)
        .err()
        .expect("parse should fail");
    assert!(err.to_string().contains("abc"));
    Ok(())
}

#[test]
fn dmatrix_parquet_with_names() -> anyhow::Result<()> {
    let xx = rnorm_seeded(25, 3, 2);
    let rows = names("cell", 25);
    let cols = names("marker", 3);

    let parquet_file = create_temp_dir_file(".parquet")?;
    let parquet_file = parquet_file.to_str().unwrap();
    xx.to_parquet_with_names(parquet_file, (Some(&rows), Some(&cols)), "cell")?;

    let yy = DMatrix::<f32>::from_parquet(parquet_file)?;
    assert_eq!(yy.rows, rows);
    assert_eq!(yy.cols, cols);
    approx::assert_abs_diff_eq!(xx, yy.mat, epsilon = 1e-6);
    Ok(())
}
