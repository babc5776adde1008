mod test_utils;

use historian_gateway::archive::{ArchiveConfig, ArchiveEngine, ArchiveMode};
use historian_gateway::tags::structures::{DataType, Quality, ValueVariant};
use std::collections::{BTreeMap, HashMap};
use test_utils::utc;

fn run(engine: &ArchiveEngine, data_type: DataType, config: &ArchiveConfig, values: &[ValueVariant]) -> Vec<ValueVariant> {
    values
        .iter()
        .filter(|v| engine.should_write("tag", data_type, config, v))
        .cloned()
        .collect()
}

fn ints(values: &[i64]) -> Vec<ValueVariant> {
    values.iter().map(|v| ValueVariant::Int(*v)).collect()
}

fn floats(values: &[f64]) -> Vec<ValueVariant> {
    values.iter().map(|v| ValueVariant::Float(*v)).collect()
}

#[test]
fn always_accepts_repeats() {
    let engine = ArchiveEngine::new();
    let accepted = run(&engine, DataType::Int, &ArchiveConfig::always(), &ints(&[1, 1, 1]));
    assert_eq!(accepted.len(), 3);
}

#[test]
fn change_only_keeps_transitions() {
    let engine = ArchiveEngine::new();
    let accepted = run(&engine, DataType::Int, &ArchiveConfig::change_only(), &ints(&[5, 5, 7, 7, 5]));
    assert_eq!(accepted, ints(&[5, 7, 5]));
}

#[test]
fn change_only_compares_text_and_bools() {
    let engine = ArchiveEngine::new();
    let config = ArchiveConfig::change_only();
    let values = vec![
        ValueVariant::String("a".into()),
        ValueVariant::String("a".into()),
        ValueVariant::String("b".into()),
    ];
    assert_eq!(run(&engine, DataType::String, &config, &values).len(), 2);

    let engine = ArchiveEngine::new();
    let values = vec![ValueVariant::Bool(true), ValueVariant::Bool(true), ValueVariant::Bool(false)];
    assert_eq!(run(&engine, DataType::Bool, &config, &values).len(), 2);
}

#[test]
fn absolute_deadband() {
    let engine = ArchiveEngine::new();
    let config = ArchiveConfig::deadband(1.0, 0.0);

    assert!(engine.should_write("t", DataType::Float, &config, &ValueVariant::Float(100.0)));
    assert!(!engine.should_write("t", DataType::Float, &config, &ValueVariant::Float(100.5)));
    assert!(engine.should_write("t", DataType::Float, &config, &ValueVariant::Float(101.5)));
}

#[test]
fn percent_deadband() {
    let engine = ArchiveEngine::new();
    let config = ArchiveConfig::deadband(0.0, 0.01);

    assert!(engine.should_write("t", DataType::Float, &config, &ValueVariant::Float(100.0)));
    assert!(!engine.should_write("t", DataType::Float, &config, &ValueVariant::Float(100.9)));
    assert!(engine.should_write("t", DataType::Float, &config, &ValueVariant::Float(101.1)));
}

#[test]
fn rejected_values_do_not_move_the_reference() {
    let engine = ArchiveEngine::new();
    let config = ArchiveConfig::deadband(1.0, 0.0);

    // Creeping by 0.6 each step: only the second step crosses 1.0 from 100
    let accepted = run(&engine, DataType::Float, &config, &floats(&[100.0, 100.6, 101.2, 101.8]));
    assert_eq!(accepted, floats(&[100.0, 101.2]));
    assert_eq!(
        engine.state("tag").map(|s| s.last_value),
        Some(ValueVariant::Float(101.2))
    );
}

#[test]
fn larger_of_both_deadbands_wins() {
    let engine = ArchiveEngine::new();
    // 5% of 100 beats the absolute 1.0
    let config = ArchiveConfig::deadband(1.0, 0.05);
    let accepted = run(&engine, DataType::Float, &config, &floats(&[100.0, 102.0, 106.0]));
    assert_eq!(accepted, floats(&[100.0, 106.0]));
}

#[test]
fn deadband_on_text_falls_back_to_change_only() {
    let engine = ArchiveEngine::new();
    let config = ArchiveConfig::deadband(10.0, 0.0);
    let values = vec![
        ValueVariant::String("x".into()),
        ValueVariant::String("x".into()),
        ValueVariant::String("y".into()),
    ];
    assert_eq!(run(&engine, DataType::String, &config, &values).len(), 2);
}

#[test]
fn first_observation_is_always_accepted() {
    for mode in [ArchiveMode::Always, ArchiveMode::ChangeOnly, ArchiveMode::Deadband] {
        let engine = ArchiveEngine::new();
        let config = ArchiveConfig {
            mode,
            deadband_abs: Some(1e9),
            ..Default::default()
        };
        assert!(engine.should_write("t", DataType::Float, &config, &ValueVariant::Float(0.0)));
    }
}

#[test]
fn tags_are_tracked_independently() {
    let engine = ArchiveEngine::new();
    let config = ArchiveConfig::change_only();
    assert!(engine.should_write("a", DataType::Int, &config, &ValueVariant::Int(1)));
    assert!(engine.should_write("b", DataType::Int, &config, &ValueVariant::Int(1)));
    assert!(!engine.should_write("a", DataType::Int, &config, &ValueVariant::Int(1)));
    assert_eq!(engine.len(), 2);

    assert!(engine.forget("a"));
    assert!(engine.should_write("a", DataType::Int, &config, &ValueVariant::Int(1)));
}

#[test]
fn filter_builds_samples_in_name_order() {
    let engine = ArchiveEngine::new();
    let mut results = BTreeMap::new();
    results.insert("zeta".to_string(), Some(ValueVariant::Float(1.5)));
    results.insert("alpha".to_string(), Some(ValueVariant::Bool(true)));
    results.insert("failed".to_string(), None);
    results.insert("unarchived".to_string(), Some(ValueVariant::Int(3)));

    let data_types: HashMap<String, DataType> = [
        ("zeta", DataType::Float),
        ("alpha", DataType::Bool),
        ("failed", DataType::Int),
        ("unarchived", DataType::Int),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mut configs = HashMap::new();
    configs.insert(
        "zeta".to_string(),
        ArchiveConfig {
            tag_id: Some(9),
            ..ArchiveConfig::always()
        },
    );
    configs.insert("alpha".to_string(), ArchiveConfig::change_only());
    configs.insert("failed".to_string(), ArchiveConfig::always());

    let at = utc(5);
    let samples = engine.filter(&results, &data_types, &configs, at);

    let tags: Vec<&str> = samples.iter().map(|s| s.tag.as_str()).collect();
    assert_eq!(tags, vec!["alpha", "zeta"]);
    assert!(samples.iter().all(|s| s.quality == Quality::Good && s.utc == at));

    assert_eq!(samples[0].value_bool, Some(true));
    assert_eq!(samples[0].data_type, DataType::Bool);
    assert_eq!(samples[1].value_numeric, Some(1.5));
    assert_eq!(samples[1].tag_id, Some(9));
}
