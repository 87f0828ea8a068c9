use proptest::prelude::*;
use tessera::cluster::{ClusterAssignment, Clustering, Dbscan, Hdbscan, Kmeans, Optics, NOISE};
use tessera::embed::rows_to_matrix;
use tessera::metrics::{ari, silhouette_score};
use tessera::store::VectorStore;

fn points(max: usize) -> impl Strategy<Value = Vec<Vec<f32>>> {
    prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 2), 1..max)
}

proptest! {
    #[test]
    fn prop_kmeans_all_assigned(data in points(20), k in 1usize..5) {
        if k <= data.len() {
            let labels = Kmeans::new(k).with_seed(42).fit_predict(&data).unwrap();
            prop_assert_eq!(labels.len(), data.len());
            for &l in &labels {
                prop_assert!(l >= 0 && (l as usize) < k);
            }
        }
    }

    #[test]
    fn prop_density_labels_are_noise_or_dense(data in points(30), min_pts in 1usize..5) {
        let methods: Vec<Box<dyn Clustering>> = vec![
            Box::new(Dbscan::new(1.5, min_pts)),
            Box::new(Hdbscan::new().with_min_cluster_size(2).with_min_samples(min_pts)),
            Box::new(Optics::new().with_min_samples(min_pts).with_eps(1.5)),
            Box::new(Optics::new().with_min_samples(min_pts)),
        ];
        for m in methods {
            let labels = m.fit_predict(&data).unwrap();
            prop_assert_eq!(labels.len(), data.len());
            let max = labels.iter().copied().max().unwrap_or(NOISE);
            for l in 0..=max {
                prop_assert!(labels.contains(&l), "label {} skipped", l);
            }
            prop_assert!(labels.iter().all(|&l| l >= NOISE));
        }
    }

    #[test]
    fn prop_assignment_partitions_documents(
        data in points(25),
        seed in any::<u64>(),
    ) {
        let k = data.len().min(3);
        let labels = Kmeans::new(k).with_seed(seed).fit_predict(&data).unwrap();
        let projections = rows_to_matrix(&data).unwrap();
        let a = ClusterAssignment::from_labels(labels.clone(), &projections).unwrap();

        let total: usize = a.members().values().map(Vec::len).sum();
        prop_assert_eq!(total, data.len());
        for (label, members) in a.members() {
            let centroid = &a.centroids()[label];
            for dim in 0..2 {
                let mean = members.iter().map(|&i| f64::from(data[i][dim])).sum::<f64>()
                    / members.len() as f64;
                prop_assert!((mean - f64::from(centroid[dim])).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn prop_knn_is_sorted_and_self_first(data in points(30), k in 1usize..8) {
        let mut store = VectorStore::new();
        store.build_from_rows(&data).unwrap();
        let m = rows_to_matrix(&data).unwrap();
        let hits = store.query(m.view(), k).unwrap();
        for (i, row) in hits.iter().enumerate() {
            prop_assert_eq!(row.len(), k.min(data.len()));
            prop_assert_eq!(row[0].distance, 0.0);
            prop_assert!(row.windows(2).all(|w| w[0].distance <= w[1].distance));
            prop_assert!(row.iter().any(|n| data[n.index] == data[i]));
        }
    }

    #[test]
    fn prop_silhouette_bounded(data in points(25), k in 2usize..4) {
        if k < data.len() {
            let labels = Kmeans::new(k).with_seed(1).fit_predict(&data).unwrap();
            if let Some(s) = silhouette_score(&data, &labels) {
                prop_assert!((-1.0..=1.0).contains(&s));
            }
        }
    }

    #[test]
    fn prop_ari_ignores_label_names(labels in prop::collection::vec(0i32..4, 2..30), shift in 1i32..10) {
        let renamed: Vec<i32> = labels.iter().map(|&l| l + shift).collect();
        prop_assert!((ari(&labels, &renamed) - 1.0).abs() < 1e-9);
    }
}
