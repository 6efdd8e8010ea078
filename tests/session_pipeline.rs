use approx::assert_relative_eq;
use rusty_lens::cleaning::conversion::TypeInference;
use rusty_lens::cleaning::imputation::ImputeStrategy;
use rusty_lens::cleaning::outliers::OutlierPolicy;
use rusty_lens::data::loader::{parse_csv, parse_json_records};
use rusty_lens::encoding::EncodingMethod;
use rusty_lens::modeling::{ModelMetrics, Prediction, PredictionInput};
use rusty_lens::stats::hypothesis::chi_squared;
use rusty_lens::stats::summary::ColumnSummary;
use rusty_lens::{CellValue, Column, ColumnType, EngineConfig, EngineError, Operation, Session, Table, VersionId};

fn session_from_csv(text: &str) -> Session {
    let table = parse_csv(text.as_bytes(), &TypeInference::default()).unwrap();
    let mut session = Session::default();
    session.load_table(table);
    session
}

#[test]
fn mean_imputation_of_age() {
    let mut session = session_from_csv("id,age\n1,25\n2,\n3,35\n4,40\n5,\n");
    let (version, applied) = session
        .run(&Operation::Impute {
            columns: vec!["age".into()],
            strategy: ImputeStrategy::Mean,
        })
        .unwrap();

    assert_eq!(applied.summary.cells_affected, 2);
    let age = version.table.numeric_values("age").unwrap();
    let expected = [25.0, 100.0 / 3.0, 35.0, 40.0, 100.0 / 3.0];
    for (got, want) in age.iter().zip(expected) {
        assert_relative_eq!(got.unwrap(), want, epsilon = 1e-12);
    }
}

#[test]
fn every_commit_extends_history_as_a_prefix() {
    let mut session = session_from_csv("a,b\n1,x\n1,x\n2,y\n,z\n100,x\n");
    let ops = [
        Operation::RemoveDuplicates { subset: None },
        Operation::Impute {
            columns: vec!["a".into()],
            strategy: ImputeStrategy::Median,
        },
        Operation::Encode {
            column: "b".into(),
            method: EncodingMethod::Label,
        },
    ];

    for op in &ops {
        let before: Vec<VersionId> = session.history().unwrap().iter().map(|v| v.id).collect();
        session.run(op).unwrap();
        let after: Vec<VersionId> = session.history().unwrap().iter().map(|v| v.id).collect();
        assert_eq!(after.len(), before.len() + 1);
        assert_eq!(&after[..before.len()], &before[..]);
    }

    let names: Vec<String> = session
        .history()
        .unwrap()
        .iter()
        .map(|v| v.operation.name.clone())
        .collect();
    assert_eq!(names, vec!["load", "remove_duplicates", "impute", "encode"]);
}

#[test]
fn duplicate_removal_is_idempotent() {
    let mut session = session_from_csv("a,b\n1,x\n1,x\n2,y\n1,x\n");
    let op = Operation::RemoveDuplicates { subset: None };
    let (_, first) = session.run(&op).unwrap();
    assert_eq!(first.summary.rows_removed(), 2);
    let (_, second) = session.run(&op).unwrap();
    assert_eq!(second.summary.rows_removed(), 0);
}

#[test]
fn revert_restores_an_earlier_table() {
    let mut session = session_from_csv("id,age\n1,25\n2,\n3,35\n");
    let loaded = session.history().unwrap()[0].clone();
    session
        .run(&Operation::Impute {
            columns: vec!["age".into()],
            strategy: ImputeStrategy::Mean,
        })
        .unwrap();

    let restored = session.revert(loaded.id).unwrap();
    assert_eq!(restored.as_ref(), loaded.table.as_ref());
    assert_eq!(session.current().unwrap().column("age").unwrap().missing_count(), 1);
    assert_eq!(session.history().unwrap().len(), 3);
    assert!(matches!(
        session.revert(VersionId(99)),
        Err(EngineError::UnknownVersion(99))
    ));
}

#[test]
fn one_hot_colors_and_decode() {
    let mut session = session_from_csv("color,n\nred,1\nblue,2\nred,3\ngreen,4\n");
    let original = session.current().unwrap().column("color").unwrap().clone();
    let (version, applied) = session
        .run(&Operation::Encode {
            column: "color".into(),
            method: EncodingMethod::OneHot { drop_first: false },
        })
        .unwrap();

    let table = &version.table;
    assert_eq!(table.column_names(), vec!["color_red", "color_blue", "color_green", "n"]);
    let col = |name: &str| -> Vec<f64> {
        table.numeric_values(name).unwrap().into_iter().flatten().collect()
    };
    assert_eq!(col("color_red"), vec![1.0, 0.0, 1.0, 0.0]);
    assert_eq!(col("color_blue"), vec![0.0, 1.0, 0.0, 0.0]);
    assert_eq!(col("color_green"), vec![0.0, 0.0, 0.0, 1.0]);

    let map = applied.encoding.unwrap();
    assert_eq!(map.decode(table).unwrap(), original);
    assert_eq!(session.encoding("color").unwrap(), &map);
}

#[test]
fn outlier_capping_uses_configured_iqr() {
    let mut session = session_from_csv("v\n1\n2\n3\n4\n5\n6\n7\n8\n9\n500\n");
    let iqr = session.config().iqr_method();
    let report = session.detect_outliers(&["v".to_string()], Some(iqr)).unwrap();
    assert_eq!(report.flagged_rows().into_iter().collect::<Vec<_>>(), vec![9]);

    let (version, applied) = session
        .run(&Operation::HandleOutliers {
            columns: vec![],
            method: Some(iqr),
            policy: OutlierPolicy::Cap,
        })
        .unwrap();
    assert_eq!(applied.table.n_rows(), 10);
    let capped = version.table.numeric_values("v").unwrap()[9].unwrap();
    assert!(capped < 500.0 && capped > 9.0);
}

#[test]
fn knn_imputation_with_configured_k() {
    let config = EngineConfig {
        knn_k: 2,
        ..EngineConfig::default()
    };
    let mut session = Session::new(config);
    session.load_table(
        Table::new(vec![
            Column::numeric("x", (0..8).map(|i| Some(i as f64))),
            Column::numeric(
                "y",
                vec![Some(0.0), Some(2.0), Some(4.0), None, Some(8.0), Some(10.0), Some(12.0), Some(14.0)],
            ),
        ])
        .unwrap(),
    );
    let knn = session.config().knn_params();
    let (version, applied) = session
        .run(&Operation::Impute {
            columns: vec!["y".into()],
            strategy: ImputeStrategy::Knn(knn),
        })
        .unwrap();
    assert!(applied.summary.notices.is_empty());
    // neighbours of x = 3 are x = 2 and x = 4
    assert_relative_eq!(version.table.numeric_values("y").unwrap()[3].unwrap(), 6.0);
}

#[test]
fn failed_conversion_reports_rows_and_keeps_store() {
    let mut session = session_from_csv("code\n1\n2\nabc\n4\nxyz\n");
    assert_eq!(session.current().unwrap().column("code").unwrap().column_type(), ColumnType::Text);
    let err = session
        .run(&Operation::ConvertType {
            column: "code".into(),
            target: ColumnType::Numeric,
        })
        .unwrap_err();
    match err {
        EngineError::Conversion { rows, .. } => assert_eq!(rows, vec![2, 4]),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(session.store().version_count(), 1);
}

#[test]
fn linear_model_recovers_line_and_predicts() {
    let rows: Vec<String> = (0..12).map(|i| format!("{i},{}", 2 * i + 1)).collect();
    let session = session_from_csv(&format!("x,y\n{}\n", rows.join("\n")));
    let model = session.fit_linear_regression("y", &["x".to_string()]).unwrap();

    assert_relative_eq!(model.intercept().unwrap(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(model.coefficients().unwrap()[0].1, 2.0, epsilon = 1e-9);
    match model.metrics() {
        ModelMetrics::Regression(m) => assert_relative_eq!(m.r_squared, 1.0, epsilon = 1e-9),
        other => panic!("unexpected metrics {other:?}"),
    }

    let input = [("x".to_string(), 20.0)];
    match &model.predict(PredictionInput::Manual(&input)).unwrap()[0] {
        Prediction::Regression { value, .. } => assert_relative_eq!(*value, 41.0, epsilon = 1e-9),
        other => panic!("unexpected prediction {other:?}"),
    }

    let wrong = [("z".to_string(), 1.0)];
    assert!(matches!(
        model.predict(PredictionInput::Manual(&wrong)),
        Err(EngineError::FeatureMismatch { .. })
    ));
}

#[test]
fn forest_on_encoded_table() {
    let mut csv = String::from("size,shade,label\n");
    for i in 0..60 {
        let shade = if i % 3 == 0 { "dark" } else { "light" };
        let label = if i < 30 { "small" } else { "large" };
        csv.push_str(&format!("{i},{shade},{label}\n"));
    }
    let mut session = session_from_csv(&csv);
    session
        .run(&Operation::Encode {
            column: "shade".into(),
            method: EncodingMethod::OneHot { drop_first: true },
        })
        .unwrap();

    let features = vec!["size".to_string(), "shade_light".to_string()];
    let model = session.fit_random_forest("label", &features, None).unwrap();
    let importances = model.importances().unwrap();
    let total: f64 = importances.iter().map(|(_, v)| v).sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    assert!(importances[0].1 > importances[1].1);

    match model.metrics() {
        ModelMetrics::Classification(m) => {
            assert_eq!(m.n_train + m.n_test, 60);
            assert!(m.test_accuracy.unwrap() > 0.8);
        }
        other => panic!("unexpected metrics {other:?}"),
    }

    let input = [("size".to_string(), 2.0), ("shade_light".to_string(), 1.0)];
    match &model.predict(PredictionInput::Manual(&input)).unwrap()[0] {
        Prediction::Class { label, .. } => assert_eq!(label, &CellValue::text("small")),
        other => panic!("unexpected prediction {other:?}"),
    }
}

#[test]
fn statistics_on_json_records() {
    let text = r#"[
        {"group": "a", "flag": "yes", "score": 1.0},
        {"group": "a", "flag": "no", "score": 2.0},
        {"group": "b", "flag": "yes", "score": 3.0},
        {"group": "b", "flag": "no", "score": null}
    ]"#;
    let mut session = Session::default();
    session.load_table(parse_json_records(text, &TypeInference::default()).unwrap());

    let summaries = session.describe().unwrap();
    match &summaries[2] {
        ColumnSummary::Numeric { count, missing, mean, .. } => {
            assert_eq!((*count, *missing), (3, 1));
            assert_relative_eq!(mean.unwrap(), 2.0);
        }
        other => panic!("unexpected summary {other:?}"),
    }

    let result = session.analyze(|t| chi_squared(t, "group", "flag")).unwrap();
    assert_eq!(result.dof, Some(1.0));
    assert!(!result.is_significant(0.05));
}

#[test]
fn moving_average_forecast_from_csv_dates() {
    let session = session_from_csv("day,sales\n2024-01-01,10\n2024-01-02,20\n2024-01-03,30\n2024-01-04,40\n");
    let forecast = session.forecast("day", "sales", 2, 2).unwrap();
    assert_eq!(forecast.values, vec![35.0, 37.5]);
    assert!(matches!(
        session.decompose("day", "sales", 2, 7),
        Err(EngineError::InsufficientData { .. })
    ));
}

#[test]
fn export_after_cleaning() {
    let mut session = session_from_csv("id,age\n1,25\n2,\n");
    session
        .run(&Operation::Impute {
            columns: vec!["age".into()],
            strategy: ImputeStrategy::Mean,
        })
        .unwrap();

    let csv = session.export_csv().unwrap();
    assert_eq!(csv.lines().collect::<Vec<_>>(), vec!["id,age", "1,25", "2,25"]);
    let records: serde_json::Value = serde_json::from_str(&session.export_json().unwrap()).unwrap();
    assert_eq!(records[1]["age"], 25.0);
    assert!(session.export_parquet().unwrap().starts_with(b"PAR1"));
}
