// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
use std::cell::RefCell;
use std::collections::HashMap;

use echo_physics::config::{
    BroadPhaseKind, ConfigError, ConfigService, ConfigStore, PHYSICS_CONFIG_KEY,
};
use echo_physics::{PhysicsConfig, PhysicsError};

#[derive(Default)]
struct MemoryStore {
    blobs: RefCell<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    fn with(key: &str, json: &str) -> Self {
        let store = Self::default();
        store.blobs.borrow_mut().insert(key.to_owned(), json.as_bytes().to_vec());
        store
    }
}

impl ConfigStore for MemoryStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        self.blobs.borrow().get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        self.blobs.borrow_mut().insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let service = ConfigService::new(MemoryStore::default());
    assert_eq!(service.load_physics().expect("defaults"), PhysicsConfig::default());
}

#[test]
fn partial_document_keeps_defaults_for_missing_keys() {
    let json =
        r#"{ "constraint_solver": { "iterations": 25 }, "broad_phase": { "kind": "AabbTree" } }"#;
    let service = ConfigService::new(MemoryStore::with(PHYSICS_CONFIG_KEY, json));
    let config = service.load_physics().expect("valid config");
    assert_eq!(config.constraint_solver.iterations, 25);
    assert_eq!(config.broad_phase.kind, BroadPhaseKind::AabbTree);
    let defaults = PhysicsConfig::default();
    assert_eq!(config.constraint_solver.bias_factor, defaults.constraint_solver.bias_factor);
    assert_eq!(config.narrow_phase, PhysicsConfig::default().narrow_phase);
}

#[test]
fn saved_config_is_loaded_back() {
    let service = ConfigService::new(MemoryStore::default());
    let mut config = PhysicsConfig::default();
    config.island.linear_sleeping_threshold = 0.05;
    config.narrow_phase.contact_breaking_threshold = 0.01;
    service.save(PHYSICS_CONFIG_KEY, &config).expect("save");
    assert_eq!(service.load_physics().expect("load"), config);
}

#[test]
fn out_of_range_values_are_rejected() {
    let json = r#"{ "constraint_solver": { "bias_factor": 1.5 } }"#;
    let service = ConfigService::new(MemoryStore::with(PHYSICS_CONFIG_KEY, json));
    match service.load_physics() {
        Err(ConfigError::Invalid(PhysicsError::InvalidConfig(message))) => {
            assert!(message.contains("constraint_solver.bias_factor"), "{message}");
        }
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[test]
fn malformed_json_is_a_serde_error() {
    let service = ConfigService::new(MemoryStore::with(PHYSICS_CONFIG_KEY, "{ not json"));
    assert!(matches!(service.load_physics(), Err(ConfigError::Serde(_))));
}

#[test]
fn validation_names_the_offending_key() {
    let mut config = PhysicsConfig::default();
    config.narrow_phase.gjk_max_iteration = 0;
    let err = config.validate().expect_err("zero iterations");
    assert!(err.to_string().contains("narrow_phase.gjk_max_iteration"), "{err}");

    let mut config = PhysicsConfig::default();
    config.collision_shape.inner_margin = f32::NAN;
    assert!(config.validate().is_err());
}

#[test]
fn character_air_control_is_a_fraction() {
    let json = r#"{ "character": { "percentage_control_in_air": 1.5 } }"#;
    let service = ConfigService::new(MemoryStore::with(PHYSICS_CONFIG_KEY, json));
    let err = service.load_physics().expect_err("out of range");
    assert!(err.to_string().contains("character.percentage_control_in_air"), "{err}");

    let json = r#"{ "character": { "time_keep_move_in_air": 0.25 } }"#;
    let service = ConfigService::new(MemoryStore::with(PHYSICS_CONFIG_KEY, json));
    let config = service.load_physics().expect("valid config");
    assert_eq!(config.character.time_keep_move_in_air, 0.25);
    assert_eq!(config.character.percentage_control_in_air, 0.4);
}
