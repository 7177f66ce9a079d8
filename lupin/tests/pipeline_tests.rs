use lupin::aggregate::frequencies;
use lupin::common::Mat;
use lupin::expression::ExpressionMatrix;
use lupin::markers::{select_markers, MarkerSubset, DEFAULT_SURFACE_PATTERNS};
use lupin::pipeline::{run_pipeline, PipelineArgs};
use lupin::LupinError;

use matrix_util::common_io::{create_temp_dir_file, remove_file, write_lines};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// `n_per` cells around each center, with unit-variance noise
fn blobs(centers: &[f32], n_per: usize, ndim: usize, seed: u64) -> ExpressionMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0_f32, 1.0).unwrap();

    let ntot = centers.len() * n_per;
    let mut data = Mat::zeros(ntot, ndim);
    for (c, &mu) in centers.iter().enumerate() {
        for i in 0..n_per {
            for j in 0..ndim {
                data[(c * n_per + i, j)] = mu + noise.sample(&mut rng);
            }
        }
    }

    let channels = (0..ndim)
        .map(|j| format!("CD{}", j + 1).into_boxed_str())
        .collect();
    ExpressionMatrix::new(data, None, channels, &[]).unwrap()
}

fn majority_fraction(labels: &[usize]) -> f64 {
    let top = (1..=labels.iter().copied().max().unwrap_or(0))
        .map(|k| labels.iter().filter(|&&x| x == k).count())
        .max()
        .unwrap_or(0);
    top as f64 / labels.len() as f64
}

#[test]
fn two_blobs_two_metaclusters() {
    let xx = blobs(&[0.0, 10.0], 100, 5, 1);
    let subset = MarkerSubset::all(xx.markers());
    let args = PipelineArgs::new(2, 1, Some(2), 42);

    let out = run_pipeline(&xx, &subset, &args).unwrap();
    let meta = out.cells.cell_metaclusters();

    assert!(majority_fraction(&meta[..100]) >= 0.95);
    assert!(majority_fraction(&meta[100..]) >= 0.95);
    assert_ne!(meta[0], meta[199]);

    for (_, &pct) in out.frequencies.metacluster.iter() {
        assert!((40.0..=60.0).contains(&pct));
    }

    // metacluster means sit at the blob centers
    let means = out.mean_expression.as_ref().unwrap();
    let low = meta[0];
    let high = meta[199];
    for j in 0..5 {
        assert!(means.get(low, j).unwrap().abs() < 0.5);
        assert!((means.get(high, j).unwrap() - 10.0).abs() < 0.5);
    }
}

#[test]
fn two_blobs_split_evenly_on_a_two_node_grid() {
    // 100 cells x 3 markers, 50 cells around [0, 0, 0] and 50 around [10, 10, 10]
    for seed in [1_u64, 2, 3] {
        let xx = blobs(&[0.0, 10.0], 50, 3, seed);
        let subset = MarkerSubset::all(xx.markers());
        let args = PipelineArgs::new(2, 1, Some(2), 42);

        let out = run_pipeline(&xx, &subset, &args).unwrap();

        let clusters = out.cells.clusters().ids();
        assert!(majority_fraction(&clusters[..50]) >= 0.95);
        assert!(majority_fraction(&clusters[50..]) >= 0.95);

        assert_eq!(out.frequencies.metacluster.len(), 2);
        for (_, &pct) in out.frequencies.metacluster.iter() {
            approx::assert_abs_diff_eq!(pct, 50.0, epsilon = 1.0);
        }

        let by_node = &out.node_expression;
        assert_eq!(by_node.num_clusters(), 2);
        assert_eq!(by_node.num_empty(), 0);
    }
}

#[test]
fn every_cell_gets_a_cluster_and_metacluster() {
    let xx = blobs(&[0.0, 6.0, 12.0], 60, 4, 2);
    let subset = MarkerSubset::all(xx.markers());
    let args = PipelineArgs::new(3, 3, Some(3), 7);

    let out = run_pipeline(&xx, &subset, &args).unwrap();
    let cells = &out.cells;

    assert_eq!(cells.num_cells(), 180);
    for i in 0..cells.num_cells() {
        let (k, m) = cells.cell(i).unwrap();
        assert!((1..=9).contains(&k));
        assert!((1..=3).contains(&m));
    }

    // every node maps to a metacluster and every metacluster has a node
    let map = cells.metaclusters();
    assert_eq!(map.num_clusters(), 9);
    for m in 1..=3 {
        assert!(!map.members(m).is_empty());
    }

    let freq = frequencies(cells.clusters(), map).unwrap();
    let cluster_total: f64 = freq.cluster.values().sum();
    let meta_total: f64 = freq.metacluster.values().sum();
    assert!((cluster_total - 100.0).abs() < 1e-6);
    assert!((meta_total - 100.0).abs() < 1e-6);
    assert_eq!(freq.cluster.len(), 9);
    assert_eq!(freq.metacluster.len(), 3);

    // per-node means exist exactly for the occupied nodes
    let by_node = &out.node_expression;
    assert_eq!(by_node.num_clusters(), 9);
    for (k, means) in by_node.means.iter().enumerate() {
        assert_eq!(means.is_some(), freq.cluster_counts[&(k + 1)] > 0);
    }
}

#[test]
fn same_seed_same_result() {
    let xx = blobs(&[0.0, 5.0], 50, 3, 3);
    let subset = MarkerSubset::all(xx.markers());
    let mut args = PipelineArgs::new(3, 2, Some(2), 11);
    args.som.max_train_cells = Some(60);

    let a = run_pipeline(&xx, &subset, &args).unwrap();
    let b = run_pipeline(&xx, &subset, &args).unwrap();

    assert_eq!(a.grid.codes(), b.grid.codes());
    assert_eq!(a.cells.clusters(), b.cells.clusters());
    assert_eq!(a.cells.metaclusters(), b.cells.metaclusters());
}

#[test]
fn more_metaclusters_than_nodes() {
    let xx = blobs(&[0.0, 5.0], 10, 3, 4);
    let subset = MarkerSubset::all(xx.markers());
    let args = PipelineArgs::new(2, 1, Some(3), 42);

    let err = run_pipeline(&xx, &subset, &args).unwrap_err();
    assert_eq!(
        err,
        LupinError::InvalidConfiguration(
            "requested 3 metaclusters but grid has only 2 nodes".into()
        )
    );
}

#[test]
fn empty_matrix() {
    let channels = (1..=5)
        .map(|j| format!("CD{}", j).into_boxed_str())
        .collect();
    let xx = ExpressionMatrix::new(Mat::zeros(0, 5), None, channels, &[]).unwrap();
    let subset = MarkerSubset::all(xx.markers());

    let err = run_pipeline(&xx, &subset, &PipelineArgs::default()).unwrap_err();
    assert!(matches!(err, LupinError::EmptyInput(_)));
}

#[test]
fn subset_out_of_range() {
    let xx = blobs(&[0.0], 10, 5, 5);
    let subset = MarkerSubset {
        indices: vec![0, 999],
        names: vec!["CD1".into(), "?".into()],
    };

    let err = run_pipeline(&xx, &subset, &PipelineArgs::new(2, 2, Some(2), 42)).unwrap_err();
    assert_eq!(err, LupinError::InvalidSubset { index: 999, ncols: 5 });
}

#[test]
fn no_markers_selected() {
    let xx = blobs(&[0.0], 10, 3, 6);
    let subset = select_markers(xx.markers(), &["pSTAT"]);
    assert!(subset.is_empty());

    let err = run_pipeline(&xx, &subset, &PipelineArgs::default()).unwrap_err();
    assert!(matches!(err, LupinError::EmptyInput(_)));
}

#[test]
fn read_table_with_marker_descriptions() -> anyhow::Result<()> {
    let data_file = create_temp_dir_file(".tsv.gz")?;
    let data_file = data_file.to_str().unwrap();
    let lines: Vec<Box<str>> = vec![
        "Time\tNd142Di\tNd144Di\tSm147Di".into(),
        "0.1\t5\t100\t0".into(),
        "0.2\t15\t0\t50".into(),
        "0.3\t25\t5\t5".into(),
    ];
    write_lines(&lines, data_file)?;

    let marker_file = create_temp_dir_file(".tsv")?;
    let marker_file = marker_file.to_str().unwrap();
    let lines: Vec<Box<str>> = vec![
        "Nd142Di\tCD19".into(),
        "Nd144Di\tpSTAT5".into(),
        "Sm147\tHLA DR".into(),
    ];
    write_lines(&lines, marker_file)?;

    let mut xx = ExpressionMatrix::from_file(data_file, Some(marker_file))?;
    assert_eq!(xx.nrows(), 3);
    assert_eq!(xx.channels()[1].as_ref(), "Nd142Di");

    let markers: Vec<&str> = xx.markers().iter().map(|x| x.as_ref()).collect();
    assert_eq!(markers, vec!["Time", "CD19", "pSTAT5", "HLA_DR"]);
    assert_eq!(xx.cells()[0].as_ref(), "1");

    let subset = select_markers(xx.markers(), &DEFAULT_SURFACE_PATTERNS);
    assert_eq!(subset.indices, vec![1, 3]);

    xx.arcsinh_inplace(5.0)?;
    approx::assert_abs_diff_eq!(xx.data()[(0, 1)], 1_f32.asinh(), epsilon = 1e-6);

    let sub = xx.subset_data(&subset)?;
    assert_eq!(sub.shape(), (3, 2));
    approx::assert_abs_diff_eq!(sub[(1, 1)], 10_f32.asinh(), epsilon = 1e-6);

    remove_file(data_file)?;
    remove_file(marker_file)?;
    Ok(())
}
