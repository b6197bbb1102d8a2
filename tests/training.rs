use snake_ga::{
    Activation, FEATURE_COUNT, GameState, Network, Player, TrainConfig, Trainer, evaluate_model,
};
use std::sync::Once;

static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

fn small_config() -> TrainConfig {
    TrainConfig {
        board_width: 8,
        board_height: 8,
        hidden_layers: vec![10, 6],
        activations: vec![Activation::Relu, Activation::Tanh, Activation::Sigmoid],
        population_size: 12,
        sampling_size: 6,
        max_generation: 4,
        episode_step_cap: 800,
        seed: Some(2024),
        threads: Some(3),
        ..Default::default()
    }
}

#[test]
fn train_from_json_then_evaluate_and_play() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("train.json");
    let model_path = dir.path().join("model.bin");
    small_config().to_json_file(&config_path).unwrap();

    let config = TrainConfig::from_json_file(&config_path).unwrap();
    let mut trainer = Trainer::new(config.clone()).unwrap();
    let summary = trainer.run(&model_path, |_| {}).unwrap();

    assert_eq!(summary.generations, 4);
    for pair in summary.history.windows(2) {
        assert!(pair[1].best >= pair[0].best, "elitism keeps the champion");
    }

    let net = Network::load(&model_path).unwrap();
    assert_eq!(net.layer_sizes(), vec![FEATURE_COUNT, 10, 6, 4]);
    assert_eq!(net.activations(), config.activations.as_slice());
    assert_eq!(net.parameter_count(), config.genetic_length());

    let stats = evaluate_model(&net, 8, 8, 30, 7, config.episode_step_cap).unwrap();
    assert_eq!(stats.episodes, 30);
    assert!(stats.avg_score <= stats.highest_score as f64);

    let mut player = Player::new(net, 8, 8, 1).unwrap();
    for _ in 0..300 {
        player.tick().unwrap();
        assert_eq!(player.game().state(), GameState::Running);
    }
}

#[test]
fn best_model_file_tracks_best_fitness() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let model_path = dir.path().join("best.bin");

    let mut trainer = Trainer::new(small_config()).unwrap();
    let summary = trainer.run(&model_path, |_| {}).unwrap();
    let saved = Network::load(&model_path).unwrap();

    let best = trainer.algorithm().best_individual().unwrap();
    assert_eq!(best.fitness(), summary.best_fitness);
    assert_eq!(saved.serialize_all_parameters(), best.genes());
}

#[test]
fn missing_model_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Network::load(dir.path().join("nope.bin")).unwrap_err();
    assert!(matches!(err, snake_ga::Error::Io(_)));
}
