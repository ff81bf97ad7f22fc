//! Sessions driven from description files on disk.

use std::fs;

use ical_core::Rig;
use ical_pipeline::observer::{Recording, ReplayCollector};
use ical_pipeline::session::{CalibrationSession, SessionState};
use ical_pipeline::SessionError;

const CAMERAS: &str = r#"
cameras:
  - name: cam0
    intrinsics: { fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0, width: 640, height: 480 }
    fixed_intrinsics: [0, 1, 2, 3, 4, 5, 6, 7, 8]
"#;

const TARGETS: &str = r#"
targets:
  - name: board
    points: [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.1, 0.1, 0.0], [0.0, 0.1, 0.0]]
    circle_grid: { circle_diameter: 0.0 }
    pose: { x: 0.01, z: 1.02 }
"#;

#[test]
fn malformed_target_file_leaves_session_usable() {
    let dir = tempfile::tempdir().unwrap();
    let cameras = dir.path().join("cameras.yaml");
    let targets = dir.path().join("targets.yaml");
    fs::write(&cameras, CAMERAS).unwrap();
    fs::write(&targets, "targets: [ {name: broken").unwrap();

    let (rig, errors) = Rig::load_lenient(&cameras, &targets);
    assert_eq!(errors.len(), 1);
    assert_eq!(rig.cameras.len(), 1);
    assert!(rig.targets.is_empty());

    let mut session = CalibrationSession::new(rig);
    session.set_collector("cam0", Box::new(ReplayCollector::new([Vec::new()])));
    session.start().unwrap();
    let report = session.collect_observations().unwrap();
    assert_eq!(report.total_observations, 0);
    assert!(matches!(session.run(1.0), Err(SessionError::NoObservations)));
    assert_eq!(session.state(), SessionState::ObservationsAdded);
}

#[test]
fn replayed_recording_solves_and_pushes_camera_info() {
    let dir = tempfile::tempdir().unwrap();
    let cameras = dir.path().join("cameras.yaml");
    let targets = dir.path().join("targets.yaml");
    fs::write(&cameras, CAMERAS).unwrap();
    fs::write(&targets, TARGETS).unwrap();
    let rig = Rig::load(&cameras, &targets).unwrap();

    // Detections of the board seen straight on at 1 m.
    let recording: Recording = serde_json::from_str(
        r#"{ "frames": [ { "camera": "cam0", "observations": [
            { "target": "board", "point_id": 0, "image": [320.0, 240.0] },
            { "target": "board", "point_id": 1, "image": [370.0, 240.0] },
            { "target": "board", "point_id": 2, "image": [370.0, 290.0] },
            { "target": "board", "point_id": 3, "image": [320.0, 290.0] } ] } ] }"#,
    )
    .unwrap();

    let mut session = CalibrationSession::new(rig);
    session.set_collector(
        "cam0",
        Box::new(ReplayCollector::from_recording(&recording, "cam0")),
    );
    session.start().unwrap();
    session.collect_observations().unwrap();

    let outcome = session.run(1e-9).unwrap();
    assert!(outcome.is_accepted());
    let report = outcome.report();
    assert!(report.initial_cost > report.final_cost);
    assert!((report.targets[0].pose.z - 1.0).abs() < 1e-6);
    assert!(report.targets[0].pose.x.abs() < 1e-6);

    let saved = session.save().unwrap();
    assert_eq!(saved[0].name, "cam0");
    assert_eq!(saved[0].intrinsics.fx, 500.0);
    assert!(session.log.iter().all(|e| e.success));
    assert_eq!(
        session.log.iter().map(|e| e.operation.as_str()).collect::<Vec<_>>(),
        vec!["start", "collect", "run", "save"]
    );
}

#[test]
fn recorded_frames_stay_with_their_scene() {
    let dir = tempfile::tempdir().unwrap();
    let cameras = dir.path().join("cameras.yaml");
    let targets = dir.path().join("targets.yaml");
    fs::write(
        &cameras,
        r#"
cameras:
  - name: a
    intrinsics: { fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0, width: 640, height: 480 }
  - name: b
    intrinsics: { fx: 500.0, fy: 500.0, cx: 320.0, cy: 240.0, width: 640, height: 480 }
"#,
    )
    .unwrap();
    fs::write(
        &targets,
        r#"
targets:
  - name: board
    points: [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.1, 0.1, 0.0], [0.0, 0.1, 0.0]]
    pose: { z: 1.0 }
    is_moving: true
"#,
    )
    .unwrap();
    let rig = Rig::load(&cameras, &targets).unwrap();

    // Camera b only saw the board at scene 1.
    let recording: Recording = serde_json::from_str(
        r#"{ "frames": [
            { "camera": "a", "scene": 0, "observations": [
                { "target": "board", "point_id": 0, "image": [320.0, 240.0] },
                { "target": "board", "point_id": 1, "image": [370.0, 240.0] },
                { "target": "board", "point_id": 2, "image": [370.0, 290.0] },
                { "target": "board", "point_id": 3, "image": [320.0, 290.0] } ] },
            { "camera": "a", "scene": 1, "observations": [
                { "target": "board", "point_id": 0, "image": [420.0, 240.0] },
                { "target": "board", "point_id": 1, "image": [470.0, 240.0] },
                { "target": "board", "point_id": 2, "image": [470.0, 290.0] },
                { "target": "board", "point_id": 3, "image": [420.0, 290.0] } ] },
            { "camera": "b", "scene": 1, "observations": [
                { "target": "board", "point_id": 0, "image": [555.0, 200.0] },
                { "target": "board", "point_id": 1, "image": [605.0, 200.0] },
                { "target": "board", "point_id": 2, "image": [605.0, 250.0] },
                { "target": "board", "point_id": 3, "image": [555.0, 250.0] } ] } ] }"#,
    )
    .unwrap();

    let mut session = CalibrationSession::new(rig);
    for name in ["a", "b"] {
        session.set_collector(
            name,
            Box::new(ReplayCollector::from_recording(&recording, name)),
        );
    }
    session.start().unwrap();

    session.advance_scene(0).unwrap();
    let first = session.collect_observations().unwrap();
    assert_eq!(first.accepted(), 1);
    let rejected: Vec<_> = first.rejected().collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].0, "b");
    assert!(matches!(rejected[0].1, SessionError::Collector { .. }));

    session.advance_scene(1).unwrap();
    let second = session.collect_observations().unwrap();
    assert_eq!(second.accepted(), 2);
    assert_eq!(session.total_observations(), 12);

    let board = session.registry().target_by_name("board").unwrap();
    let residuals = session.problem().unwrap().residuals();
    for r in residuals.iter().filter(|r| r.camera == "b") {
        assert_eq!(r.scene, 1);
        assert_eq!(r.target_pose, board.pose_at(1).unwrap());
    }
    assert_eq!(residuals.iter().filter(|r| r.camera == "b").count(), 4);
}
