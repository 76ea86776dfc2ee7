use clovars_core::{
    CellState, ColonyConfig, DistributionSpec, Frame, History, RunSettings, SIGNAL_MAX,
    SIGNAL_MIN, SignalConfig, SignalDisturbance, SimulationConfig, SimulationRunner,
    StopConditions, StopReason, Treatment, TreatmentSchedule,
};
use std::collections::BTreeMap;

fn control() -> Treatment {
    Treatment {
        name: "Control".to_string(),
        division_curve: DistributionSpec::Gamma {
            mean: 28.47,
            std: 0.9,
            a: 28.47,
        },
        death_curve: DistributionSpec::Gaussian {
            mean: 100.0,
            std: 1.0,
        },
        ..Treatment::control()
    }
}

fn temozolomide() -> Treatment {
    Treatment {
        name: "Temozolomide".to_string(),
        division_curve: DistributionSpec::EmGaussian {
            mean: 13.09,
            std: 7.17,
            k: 3.54,
        },
        ..control()
    }
}

fn treated_config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        run: RunSettings {
            delta: 3_600,
            seed: Some(seed),
            stop: StopConditions {
                stop_at_frame: Some(144),
                ..StopConditions::default()
            },
        },
        colonies: vec![ColonyConfig {
            initial_size: 1,
            fitness_memory: 0.0,
            treatments: BTreeMap::from([(0, control()), (72, temozolomide())]),
            ..ColonyConfig::default()
        }],
    }
}

fn run(config: &SimulationConfig) -> History {
    SimulationRunner::new(config)
        .expect("runner")
        .run()
        .expect("run")
}

#[test]
fn treatment_switch_scenario() {
    let history = run(&treated_config(0x5EED));
    assert_eq!(history.stop_reason, StopReason::FrameLimit(144));
    assert_eq!(history.frames.len(), 145);

    let first_division = history
        .cell_rows()
        .find(|row| row.state == CellState::Divided)
        .map(|row| row.frame)
        .expect("root divides");
    assert!(
        (25..=33).contains(&first_division.0),
        "first division at {first_division}"
    );

    assert!(
        history
            .cell_rows()
            .filter(|row| row.frame.0 < 100)
            .all(|row| row.state != CellState::Dead)
    );

    let newborn: Vec<f64> = history
        .cell_rows()
        .filter(|row| row.frame.0 > 72 && row.age_hours == 0.0)
        .map(|row| {
            assert_eq!(row.treatment, "Temozolomide");
            row.scheduled_division_hours
        })
        .collect();
    assert!(newborn.len() >= 20, "only {} cells born after frame 72", newborn.len());
    let mean = newborn.iter().sum::<f64>() / newborn.len() as f64;
    assert!(mean < 20.0, "mean scheduled division {mean}");

    let before: Vec<_> = history
        .cell_rows()
        .filter(|row| row.frame.0 > 0 && row.frame.0 < 72 && row.age_hours == 0.0)
        .collect();
    assert!(before.iter().all(|row| row.treatment == "Control"));
    assert!(
        before
            .iter()
            .all(|row| row.scheduled_division_hours > 20.0)
    );
}

#[test]
fn same_seed_reproduces_history() {
    let config = treated_config(99);
    let a = serde_json::to_string(&run(&config)).expect("json");
    let b = serde_json::to_string(&run(&config)).expect("json");
    assert_eq!(a, b);

    let other = serde_json::to_string(&run(&treated_config(100))).expect("json");
    assert_ne!(a, other);
}

#[test]
fn worker_count_does_not_change_history() {
    let mut config = treated_config(7);
    config.colonies[0].copies = 6;
    config.run.stop.stop_at_frame = Some(96);

    let run_with = |threads: usize| {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("pool");
        let mut out = Vec::new();
        pool.install(|| run(&config))
            .to_json_lines(&mut out)
            .expect("write");
        out
    };
    let single = run_with(1);
    let parallel = run_with(4);
    assert!(!single.is_empty());
    assert_eq!(single, parallel);
}

#[test]
fn every_frame_reports_every_colony() {
    let mut config = treated_config(3);
    config.colonies[0].copies = 3;
    config.colonies.push(ColonyConfig {
        label: Some("ctrl".to_string()),
        ..ColonyConfig::default()
    });
    config.run.stop.stop_at_frame = Some(40);
    let history = run(&config);
    for (expected, record) in history.frames.iter().enumerate() {
        assert_eq!(record.frame, Frame(expected as u64));
        assert_eq!(record.seconds, expected as u64 * 3_600);
        let labels: Vec<_> = record.colonies.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["1a", "1b", "1c", "ctrl"]);
        for summary in &record.colonies {
            let alive = record
                .cells
                .iter()
                .filter(|row| row.colony == summary.colony && row.state == CellState::Alive)
                .count();
            assert_eq!(alive, summary.alive);
        }
    }
}

#[test]
fn parents_precede_children_in_history() {
    let history = run(&treated_config(21));
    let mut divided = BTreeMap::new();
    for row in history.cell_rows() {
        if row.state == CellState::Divided {
            divided.insert((row.colony, row.cell), row.frame);
        }
    }
    for row in history.cell_rows().filter(|row| row.age_hours == 0.0) {
        if let Some(parent) = row.parent {
            let parent_frame = divided.get(&(row.colony, parent)).expect("parent divided");
            assert_eq!(*parent_frame, row.frame);
            assert!(parent < row.cell);
        }
    }
}

#[test]
fn signals_stay_bounded_under_heavy_disturbance() {
    let config = SimulationConfig {
        run: RunSettings {
            delta: 3_600,
            seed: Some(5),
            stop: StopConditions {
                stop_at_frame: Some(80),
                ..StopConditions::default()
            },
        },
        colonies: vec![ColonyConfig {
            initial_size: 4,
            signal: SignalConfig {
                initial: DistributionSpec::Gaussian {
                    mean: 0.9,
                    std: 0.5,
                },
                disturbance: Some(SignalDisturbance::Curve(DistributionSpec::Gaussian {
                    mean: 0.2,
                    std: 0.6,
                })),
                linked_sister_inheritance: false,
            },
            ..ColonyConfig::default()
        }],
    };
    let history = run(&config);
    assert!(history.cell_rows().count() > 4);
    assert!(
        history
            .cell_rows()
            .all(|row| (SIGNAL_MIN..=SIGNAL_MAX).contains(&row.signal))
    );
    assert!(history.cell_rows().any(|row| row.signal == SIGNAL_MAX));
}

#[test]
fn schedule_lookup_matches_runner_labels() {
    let schedule = TreatmentSchedule::new("1a", [(0, control()), (72, temozolomide())])
        .expect("schedule");
    let history = run(&treated_config(8));
    for record in &history.frames {
        let expected = &schedule.active_treatment(record.frame).name;
        assert!(record.colonies.iter().all(|c| &c.treatment == expected));
    }
}

#[test]
fn wave_disturbance_from_settings_keeps_signals_bounded() {
    let config: SimulationConfig = serde_json::from_str(
        r#"{
            "run": {"delta": 3600, "seed": 12, "stop": {"stop_at_frame": 60}},
            "colonies": [{
                "initial_size": 2,
                "signal": {"linked_sister_inheritance": true},
                "treatments": {
                    "0": {
                        "name": "Control",
                        "division_curve": {"name": "Gaussian", "mean": 20.0, "std": 2.0},
                        "death_curve": {"name": "Gaussian", "mean": 200.0, "std": 2.0}
                    },
                    "24": {
                        "name": "Pulsed",
                        "division_curve": {"name": "Gaussian", "mean": 20.0, "std": 2.0},
                        "death_curve": {"name": "Gaussian", "mean": 200.0, "std": 2.0},
                        "signal_disturbance": {
                            "name": "Wave", "period": 12, "amplitude": 2.0,
                            "vertical_shift": 0.5, "noise": 0.4
                        }
                    }
                }
            }]
        }"#,
    )
    .expect("parse");
    let pulsed = &config.colonies[0].treatments[&24];
    assert_eq!(
        pulsed.signal_disturbance.map(|d| d.family()),
        Some("Wave")
    );
    let history = run(&config);
    assert!(
        history
            .cell_rows()
            .all(|row| (SIGNAL_MIN..=SIGNAL_MAX).contains(&row.signal))
    );
    let late: Vec<f64> = history
        .cell_rows()
        .filter(|row| row.frame.0 > 30 && row.state == CellState::Alive)
        .map(|row| row.signal)
        .collect();
    assert!(!late.is_empty());
    assert!(late.iter().any(|signal| signal.abs() > 0.5));
}

#[test]
fn invalid_wave_is_rejected_before_seeding() {
    let mut config = treated_config(1);
    config.colonies[0].signal.disturbance = Some(SignalDisturbance::Wave {
        period: 24.0,
        amplitude: 1.0,
        vertical_shift: 0.0,
        noise: 1.5,
    });
    assert!(SimulationRunner::new(&config).is_err());
}
