// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
use std::fs;

use echo_physics::config::{
    BroadPhaseKind, ConfigError, ConfigService, ConfigStore, PHYSICS_CONFIG_KEY,
};
use echo_physics::PhysicsConfig;
use echo_physics_config_fs::FsConfigStore;

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FsConfigStore::with_base_dir(dir.path()).expect("store");
    assert!(matches!(store.load_raw("absent"), Err(ConfigError::NotFound)));

    let service = ConfigService::new(store);
    assert_eq!(service.load_physics().expect("defaults"), PhysicsConfig::default());
}

#[test]
fn base_dir_is_created_on_demand() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("a").join("b");
    let store = FsConfigStore::with_base_dir(&nested).expect("store");
    assert!(nested.is_dir());
    assert_eq!(store.path_for(PHYSICS_CONFIG_KEY), nested.join("physics.json"));
}

#[test]
fn physics_config_round_trips_through_json_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = ConfigService::new(FsConfigStore::with_base_dir(dir.path()).expect("store"));

    let mut config = PhysicsConfig::default();
    config.broad_phase.kind = BroadPhaseKind::AabbTree;
    config.constraint_solver.iterations = 16;
    service.save(PHYSICS_CONFIG_KEY, &config).expect("save");

    let text = fs::read_to_string(dir.path().join("physics.json")).expect("file written");
    assert!(text.contains("\"AabbTree\""), "{text}");
    assert_eq!(service.load_physics().expect("load"), config);
}

#[test]
fn hand_edited_file_is_validated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let json = r#"{ "island": { "linear_sleeping_threshold": -1.0 } }"#;
    fs::write(dir.path().join("physics.json"), json).expect("write");
    let service = ConfigService::new(FsConfigStore::with_base_dir(dir.path()).expect("store"));
    assert!(matches!(service.load_physics(), Err(ConfigError::Invalid(_))));

    fs::write(dir.path().join("physics.json"), "not json").expect("write");
    assert!(matches!(service.load_physics(), Err(ConfigError::Serde(_))));
}
