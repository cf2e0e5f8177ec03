//! Conductor manager behavior against the in-memory store and a scripted
//! driver bundle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forge_conductor::{
    acquire, ConductorConfig, ConductorError, ConductorManager, ConductorService, LockMode,
};
use forge_domain::{Node, NodePatch, PowerState, ProvisionState};
use forge_driver::fake::FakeVendor;
use forge_driver::{DeployInterface, DriverBundle, DriverError, DriverRegistry, PowerInterface};
use forge_store::{InMemoryStore, InventoryStore, StoreError};
use uuid::Uuid;

// ── Scripted driver ──────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedPower {
    probes: Mutex<VecDeque<PowerState>>,
    validate_error: Mutex<Option<String>>,
    set_error: Mutex<Option<String>>,
    set_calls: AtomicUsize,
}

impl ScriptedPower {
    fn push_probe(&self, state: PowerState) {
        self.probes.lock().unwrap().push_back(state);
    }

    fn fail_validate(&self, msg: &str) {
        *self.validate_error.lock().unwrap() = Some(msg.to_string());
    }

    fn fail_set(&self, msg: &str) {
        *self.set_error.lock().unwrap() = Some(msg.to_string());
    }

    fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PowerInterface for ScriptedPower {
    async fn validate(&self, _node: &Node) -> Result<(), DriverError> {
        match self.validate_error.lock().unwrap().clone() {
            Some(msg) => Err(DriverError::InvalidParameterValue(msg)),
            None => Ok(()),
        }
    }

    async fn get_power_state(&self, _node: &Node) -> Result<PowerState, DriverError> {
        Ok(self
            .probes
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted get_power_state call"))
    }

    async fn set_power_state(&self, _node: &Node, _target: PowerState) -> Result<(), DriverError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        match self.set_error.lock().unwrap().clone() {
            Some(msg) => Err(DriverError::OperationFailed(msg)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct ScriptedDeploy {
    validate_error: Mutex<Option<String>>,
    deploy_result: Mutex<Option<Result<ProvisionState, String>>>,
    tear_down_result: Mutex<Option<Result<ProvisionState, String>>>,
}

impl ScriptedDeploy {
    fn on_deploy(&self, result: Result<ProvisionState, &str>) {
        *self.deploy_result.lock().unwrap() = Some(result.map_err(|m| m.to_string()));
    }

    fn on_tear_down(&self, result: Result<ProvisionState, &str>) {
        *self.tear_down_result.lock().unwrap() = Some(result.map_err(|m| m.to_string()));
    }

    fn fail_validate(&self, msg: &str) {
        *self.validate_error.lock().unwrap() = Some(msg.to_string());
    }
}

#[async_trait]
impl DeployInterface for ScriptedDeploy {
    async fn validate(&self, _node: &Node) -> Result<(), DriverError> {
        match self.validate_error.lock().unwrap().clone() {
            Some(msg) => Err(DriverError::InvalidParameterValue(msg)),
            None => Ok(()),
        }
    }

    async fn deploy(&self, _node: &Node) -> Result<ProvisionState, DriverError> {
        self.deploy_result
            .lock()
            .unwrap()
            .take()
            .expect("unscripted deploy call")
            .map_err(DriverError::OperationFailed)
    }

    async fn tear_down(&self, _node: &Node) -> Result<ProvisionState, DriverError> {
        self.tear_down_result
            .lock()
            .unwrap()
            .take()
            .expect("unscripted tear_down call")
            .map_err(DriverError::OperationFailed)
    }
}

// ── Test environment ─────────────────────────────────────────────────────────

struct Env {
    store: Arc<InMemoryStore>,
    power: Arc<ScriptedPower>,
    deploy: Arc<ScriptedDeploy>,
    registry: Arc<DriverRegistry>,
    manager: ConductorManager,
}

fn env() -> Env {
    let store = Arc::new(InMemoryStore::new());
    let power = Arc::new(ScriptedPower::default());
    let deploy = Arc::new(ScriptedDeploy::default());

    let mut registry = DriverRegistry::new();
    registry.register(
        DriverBundle::new("fake", power.clone(), deploy.clone()).with_vendor(Arc::new(FakeVendor)),
    );
    // a bundle with no vendor extension, for the unsupported-extension paths
    registry.register(DriverBundle::new("bare", power.clone(), deploy.clone()));
    let registry = Arc::new(registry);

    let manager = ConductorManager::new("test-host", store.clone(), registry.clone());
    Env {
        store,
        power,
        deploy,
        registry,
        manager,
    }
}

async fn create_node(env: &Env, tweak: impl FnOnce(&mut Node)) -> Node {
    let mut node = Node::new("fake");
    tweak(&mut node);
    env.store.create_node(&node).await.unwrap()
}

async fn fetch(env: &Env, id: i64) -> Node {
    env.store.get_node(id).await.unwrap()
}

// ── Membership & keepalive ───────────────────────────────────────────────────

#[tokio::test]
async fn start_registers_conductor() {
    let env = env();
    assert!(matches!(
        env.store.get_conductor("test-host").await,
        Err(StoreError::ConductorNotFound(_))
    ));

    let mut service = ConductorService::new(
        ConductorConfig::new("test-host"),
        env.store.clone(),
        env.registry.clone(),
    );
    service.start().await.unwrap();

    let row = env.store.get_conductor("test-host").await.unwrap();
    assert_eq!(row.hostname, "test-host");
    assert_eq!(row.drivers, env.registry.names());
    service.stop().await.unwrap();
}

#[tokio::test]
async fn start_overwrites_previous_registration() {
    let env = env();
    env.store
        .register_conductor("test-host", &["stale-driver".to_string()])
        .await
        .unwrap();

    let mut service = ConductorService::new(
        ConductorConfig::new("test-host"),
        env.store.clone(),
        env.registry.clone(),
    );
    service.start().await.unwrap();

    let row = env.store.get_conductor("test-host").await.unwrap();
    assert_eq!(row.drivers, vec!["bare".to_string(), "fake".to_string()]);
    service.stop().await.unwrap();
}

#[tokio::test]
async fn keepalive_touches_heartbeat_and_stop_deregisters() {
    let env = env();
    let mut config = ConductorConfig::new("test-host");
    config.heartbeat_interval = 1;
    let mut service = ConductorService::new(config, env.store.clone(), env.registry.clone());
    service.start().await.unwrap();

    let before = env.store.get_conductor("test-host").await.unwrap().updated_at;
    tokio::time::sleep(std::time::Duration::from_millis(1400)).await;
    let after = env.store.get_conductor("test-host").await.unwrap().updated_at;
    assert!(after > before);

    service.stop().await.unwrap();
    assert!(matches!(
        env.store.get_conductor("test-host").await,
        Err(StoreError::ConductorNotFound(_))
    ));
}

// ── get_node_power_state ─────────────────────────────────────────────────────

#[tokio::test]
async fn get_power_state_is_a_live_probe() {
    let env = env();
    let node = create_node(&env, |_| {}).await;
    env.power.push_probe(PowerState::PowerOff);
    env.power.push_probe(PowerState::PowerOn);

    let state = env.manager.get_node_power_state(&node.uuid).await.unwrap();
    assert_eq!(state, PowerState::PowerOff);
    let state = env.manager.get_node_power_state(&node.uuid).await.unwrap();
    assert_eq!(state, PowerState::PowerOn);

    // nothing persisted, no lock left behind
    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.power_state, PowerState::NoState);
    assert_eq!(stored.reservation, None);
}

#[tokio::test]
async fn get_power_state_unknown_node() {
    let env = env();
    let err = env
        .manager
        .get_node_power_state(&Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Store(StoreError::NodeNotFound(_))
    ));
}

// ── update_node ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_node_persists_changed_fields() {
    let env = env();
    let node = create_node(&env, |n| {
        n.extra.insert("test".into(), "one".into());
    })
    .await;

    let mut patch = NodePatch::new(node.uuid);
    patch.extra = Some(HashMap::from([("test".to_string(), "two".into())]));
    let saved = env.manager.update_node(&patch).await.unwrap();

    assert_eq!(saved.extra.get("test"), Some(&"two".into()));
    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.extra.get("test"), Some(&"two".into()));
    assert_eq!(stored.reservation, None);
}

#[tokio::test]
async fn update_node_rejects_power_state() {
    let env = env();
    let node = create_node(&env, |_| {}).await;

    let mut patch = NodePatch::new(node.uuid);
    patch.power_state = Some(PowerState::PowerOn);
    let err = env.manager.update_node(&patch).await.unwrap_err();
    assert!(matches!(err, ConductorError::InvalidUpdate(_)));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.power_state, PowerState::NoState);
}

#[tokio::test]
async fn update_node_fails_when_already_locked() {
    let env = env();
    let node = create_node(&env, |n| {
        n.extra.insert("test".into(), "one".into());
    })
    .await;

    let holder = acquire(
        env.store.clone(),
        &env.registry,
        "another-host",
        &[node.uuid],
        LockMode::Exclusive,
        None,
    )
    .await
    .unwrap();

    let mut patch = NodePatch::new(node.uuid);
    patch.extra = Some(HashMap::from([("test".to_string(), "two".into())]));
    let err = env.manager.update_node(&patch).await.unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Store(StoreError::NodeLocked { .. })
    ));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.extra.get("test"), Some(&"one".into()));
    holder.release().await;
}

#[tokio::test]
async fn update_node_unknown_driver_leaves_node_untouched() {
    let env = env();
    let node = create_node(&env, |_| {}).await;

    let mut patch = NodePatch::new(node.uuid);
    patch.driver = Some("wrong-driver".to_string());
    let err = env.manager.update_node(&patch).await.unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::DriverNotFound(_))
    ));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.driver, "fake");
    assert_eq!(stored.reservation, None);
}

#[tokio::test]
async fn associate_instance_requires_live_power_off() {
    let env = env();
    let node = create_node(&env, |n| {
        n.power_state = PowerState::PowerOn;
    })
    .await;
    env.power.push_probe(PowerState::PowerOn);

    let mut patch = NodePatch::new(node.uuid);
    patch.instance_uuid = Some(Some(Uuid::new_v4()));
    let err = env.manager.update_node(&patch).await.unwrap_err();
    match err {
        ConductorError::NodeInWrongPowerState { pstate, .. } => {
            assert_eq!(pstate, PowerState::PowerOn)
        }
        other => panic!("expected NodeInWrongPowerState, got {other:?}"),
    }

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.instance_uuid, None);
}

#[tokio::test]
async fn associate_instance_when_powered_off() {
    let env = env();
    let node = create_node(&env, |_| {}).await;
    env.power.push_probe(PowerState::PowerOff);

    let instance = Uuid::new_v4();
    let mut patch = NodePatch::new(node.uuid);
    patch.instance_uuid = Some(Some(instance));
    env.manager.update_node(&patch).await.unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.instance_uuid, Some(instance));
}

#[tokio::test]
async fn disassociate_instance_skips_power_check() {
    let env = env();
    let node = create_node(&env, |n| {
        n.power_state = PowerState::PowerOn;
        n.instance_uuid = Some(Uuid::new_v4());
    })
    .await;
    // no probe scripted: a get_power_state call would panic the test

    let mut patch = NodePatch::new(node.uuid);
    patch.instance_uuid = Some(None);
    env.manager.update_node(&patch).await.unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.instance_uuid, None);
}

// ── change_node_power_state ──────────────────────────────────────────────────

#[tokio::test]
async fn power_on_success() {
    let env = env();
    let node = create_node(&env, |n| {
        n.power_state = PowerState::PowerOff;
    })
    .await;
    env.power.push_probe(PowerState::PowerOff);

    env.manager
        .change_node_power_state(&node.uuid, PowerState::PowerOn)
        .await
        .unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.power_state, PowerState::PowerOn);
    assert_eq!(stored.target_power_state, PowerState::NoState);
    assert_eq!(stored.last_error, None);
    assert_eq!(stored.reservation, None);
    assert_eq!(env.power.set_calls(), 1);
}

#[tokio::test]
async fn power_change_same_state_short_circuits() {
    let env = env();
    let node = create_node(&env, |n| {
        n.power_state = PowerState::PowerOn;
        // stale leftovers from an interrupted operation
        n.target_power_state = PowerState::PowerOn;
        n.last_error = Some("old failure".into());
    })
    .await;
    env.power.push_probe(PowerState::PowerOn);
    env.power.fail_set("should not be called");

    env.manager
        .change_node_power_state(&node.uuid, PowerState::PowerOn)
        .await
        .unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(env.power.set_calls(), 0);
    assert_eq!(stored.power_state, PowerState::PowerOn);
    assert_eq!(stored.target_power_state, PowerState::NoState);
    assert_eq!(stored.last_error, None);
}

#[tokio::test]
async fn power_change_driver_failure_keeps_power_state() {
    let env = env();
    let node = create_node(&env, |n| {
        n.power_state = PowerState::PowerOff;
    })
    .await;
    env.power.push_probe(PowerState::PowerOff);
    env.power.fail_set("IPMI unreachable");

    let err = env
        .manager
        .change_node_power_state(&node.uuid, PowerState::PowerOn)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::OperationFailed(_))
    ));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.power_state, PowerState::PowerOff);
    assert_eq!(stored.target_power_state, PowerState::NoState);
    let last_error = stored.last_error.expect("last_error must be recorded");
    assert!(last_error.contains("IPMI unreachable"));
}

#[tokio::test]
async fn power_change_validate_failure_is_recorded() {
    let env = env();
    let node = create_node(&env, |n| {
        n.power_state = PowerState::PowerOff;
    })
    .await;
    env.power.fail_validate("missing ipmi address");

    let err = env
        .manager
        .change_node_power_state(&node.uuid, PowerState::PowerOn)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::InvalidParameterValue(_))
    ));

    let stored = fetch(&env, node.id).await;
    assert_eq!(env.power.set_calls(), 0);
    assert_eq!(stored.power_state, PowerState::PowerOff);
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn power_change_rejects_invalid_target() {
    let env = env();
    let node = create_node(&env, |_| {}).await;

    let err = env
        .manager
        .change_node_power_state(&node.uuid, PowerState::NoState)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::InvalidParameterValue(_))
    ));
    assert_eq!(env.power.set_calls(), 0);
    assert!(fetch(&env, node.id).await.last_error.is_some());
}

// ── deploy / tear down ───────────────────────────────────────────────────────

#[tokio::test]
async fn deploy_completes_to_active() {
    let env = env();
    let node = create_node(&env, |_| {}).await;
    env.deploy.on_deploy(Ok(ProvisionState::DeployDone));

    env.manager.do_node_deploy(&node.uuid).await.unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::Active);
    assert_eq!(stored.target_provision_state, ProvisionState::NoState);
    assert_eq!(stored.last_error, None);
    assert_eq!(stored.reservation, None);
}

#[tokio::test]
async fn deploy_pending_keeps_recovery_hint() {
    let env = env();
    let node = create_node(&env, |_| {}).await;
    env.deploy.on_deploy(Ok(ProvisionState::Deploying));

    env.manager.do_node_deploy(&node.uuid).await.unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::Deploying);
    assert_eq!(stored.target_provision_state, ProvisionState::DeployDone);
    assert_eq!(stored.last_error, None);
}

#[tokio::test]
async fn deploy_driver_failure_lands_in_error() {
    let env = env();
    let node = create_node(&env, |_| {}).await;
    env.deploy.on_deploy(Err("test"));

    let err = env.manager.do_node_deploy(&node.uuid).await.unwrap_err();
    assert!(matches!(err, ConductorError::Driver(_)));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::Error);
    assert_eq!(stored.target_provision_state, ProvisionState::NoState);
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn deploy_refused_outside_nostate() {
    let env = env();
    let node = create_node(&env, |n| {
        n.provision_state = ProvisionState::Active;
    })
    .await;

    let err = env.manager.do_node_deploy(&node.uuid).await.unwrap_err();
    assert!(matches!(err, ConductorError::InstanceDeployFailure(_)));
    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::Active);
}

#[tokio::test]
async fn deploy_validate_failure_is_recorded() {
    let env = env();
    let node = create_node(&env, |_| {}).await;
    env.deploy.fail_validate("no image configured");

    let err = env.manager.do_node_deploy(&node.uuid).await.unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::InvalidParameterValue(_))
    ));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::NoState);
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn tear_down_completes_to_nostate() {
    let env = env();
    let node = create_node(&env, |n| {
        n.provision_state = ProvisionState::Active;
        n.instance_uuid = Some(Uuid::new_v4());
    })
    .await;
    env.deploy.on_tear_down(Ok(ProvisionState::Deleted));

    env.manager.do_node_tear_down(&node.uuid).await.unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::NoState);
    assert_eq!(stored.target_provision_state, ProvisionState::NoState);
    assert_eq!(stored.last_error, None);
}

#[tokio::test]
async fn tear_down_pending_keeps_recovery_hint() {
    let env = env();
    let node = create_node(&env, |n| {
        n.provision_state = ProvisionState::Error;
    })
    .await;
    env.deploy.on_tear_down(Ok(ProvisionState::Deleting));

    env.manager.do_node_tear_down(&node.uuid).await.unwrap();

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::Deleting);
    assert_eq!(stored.target_provision_state, ProvisionState::Deleted);
}

#[tokio::test]
async fn tear_down_driver_failure_lands_in_error() {
    let env = env();
    let node = create_node(&env, |n| {
        n.provision_state = ProvisionState::Active;
    })
    .await;
    env.deploy.on_tear_down(Err("disk wipe failed"));

    let err = env.manager.do_node_tear_down(&node.uuid).await.unwrap_err();
    assert!(matches!(err, ConductorError::Driver(_)));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.provision_state, ProvisionState::Error);
    assert_eq!(stored.target_provision_state, ProvisionState::NoState);
    assert!(stored.last_error.is_some());
}

#[tokio::test]
async fn tear_down_refused_from_unprovisioned() {
    let env = env();
    let node = create_node(&env, |_| {}).await;

    let err = env.manager.do_node_tear_down(&node.uuid).await.unwrap_err();
    assert!(matches!(err, ConductorError::InstanceDeployFailure(_)));
}

// ── vendor passthru ──────────────────────────────────────────────────────────

#[tokio::test]
async fn vendor_validate_returns_driver_payload() {
    let env = env();
    let node = create_node(&env, |_| {}).await;

    let payload = env
        .manager
        .validate_vendor_action(&node.uuid, "first_method", &HashMap::new())
        .await
        .unwrap();
    assert_eq!(payload["method"], "first_method");

    env.manager
        .do_vendor_action(&node.uuid, "first_method", &HashMap::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn vendor_unknown_method_is_invalid() {
    let env = env();
    let node = create_node(&env, |_| {}).await;

    let err = env
        .manager
        .validate_vendor_action(&node.uuid, "second_method", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::InvalidParameterValue(_))
    ));
}

#[tokio::test]
async fn vendor_missing_extension_is_unsupported() {
    let env = env();
    let node = create_node(&env, |n| {
        n.driver = "bare".into();
    })
    .await;

    let err = env
        .manager
        .validate_vendor_action(&node.uuid, "first_method", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::UnsupportedDriverExtension { .. })
    ));

    let err = env
        .manager
        .do_vendor_action(&node.uuid, "first_method", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConductorError::Driver(DriverError::UnsupportedDriverExtension { .. })
    ));
}

// ── lock contention ──────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_exclusive_acquire_has_one_winner() {
    let env = env();
    let node = create_node(&env, |_| {}).await;

    let node_uuids = [node.uuid];
    let (a, b) = tokio::join!(
        acquire(
            env.store.clone(),
            &env.registry,
            "host-a",
            &node_uuids,
            LockMode::Exclusive,
            None,
        ),
        acquire(
            env.store.clone(),
            &env.registry,
            "host-b",
            &node_uuids,
            LockMode::Exclusive,
            None,
        ),
    );

    let (winner, loser) = match (a, b) {
        (Ok(t), Err(e)) | (Err(e), Ok(t)) => (t, e),
        (Ok(_), Ok(_)) => panic!("both exclusive acquires succeeded"),
        (Err(e1), Err(e2)) => panic!("both exclusive acquires failed: {e1:?} / {e2:?}"),
    };
    assert!(matches!(
        loser,
        ConductorError::Store(StoreError::NodeLocked { .. })
    ));

    let stored = fetch(&env, node.id).await;
    assert_eq!(stored.reservation.as_deref(), Some(winner.host()));
    winner.release().await;
}
