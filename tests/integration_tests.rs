use async_trait::async_trait;
use nas_snmp_monitor::config::{AuthProtocol, PrivProtocol, SessionRecord, SnmpVersion};
use nas_snmp_monitor::coordinator::PollState;
use nas_snmp_monitor::metrics::catalogue::{self, OID_FAN_STATUS, OID_SYSTEM_TEMPERATURE, OID_SYS_UPTIME};
use nas_snmp_monitor::snmp::{parse_oid, RawVariable, VarBinding};
use nas_snmp_monitor::{
    self_test, Connector, Coordinator, CoordinatorSettings, MonitorError, PollInterval, Result,
    SensorValue, SessionConfig, SnapshotAssembler, SnmpTransport,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::StreamExt;

/// Shared state behind every session a [`ScriptedConnector`] opens.
#[derive(Default)]
struct Agent {
    mib: Mutex<BTreeMap<Vec<u32>, RawVariable>>,
    down: AtomicBool,
    get_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Agent {
    fn set(&self, oid: &str, value: RawVariable) {
        let key = parse_oid(oid).expect("valid oid");
        self.mib.lock().unwrap().insert(key, value);
    }

    fn remove(&self, oid: &str) {
        let key = parse_oid(oid).expect("valid oid");
        self.mib.lock().unwrap().remove(&key);
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(MonitorError::session_error("agent unreachable"));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(())
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct ScriptedSession(Arc<Agent>);

#[async_trait]
impl SnmpTransport for ScriptedSession {
    async fn get(&mut self, oid: &str) -> Result<RawVariable> {
        self.0.enter()?;
        let delay = *self.0.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let key = parse_oid(oid).unwrap_or_default();
        let value = self
            .0
            .mib
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or(RawVariable::NoSuchObject);
        self.0.leave();
        Ok(value)
    }

    async fn get_next(&mut self, oid: &str) -> Result<VarBinding> {
        self.0.enter()?;
        let key = parse_oid(oid).unwrap_or_default();
        let next = self
            .0
            .mib
            .lock()
            .unwrap()
            .range((std::ops::Bound::Excluded(key), std::ops::Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
        self.0.leave();
        Ok(match next {
            Some((k, value)) => VarBinding {
                oid: k.iter().map(u32::to_string).collect::<Vec<_>>().join("."),
                value,
            },
            None => VarBinding {
                oid: oid.to_string(),
                value: RawVariable::EndOfMibView,
            },
        })
    }
}

struct ScriptedConnector {
    agent: Arc<Agent>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    fn new(agent: Arc<Agent>) -> Arc<Self> {
        Arc::new(Self {
            agent,
            connects: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _config: &SessionConfig) -> Result<Box<dyn SnmpTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.agent.down.load(Ordering::SeqCst) {
            return Err(MonitorError::session_error("connection refused"));
        }
        Ok(Box::new(ScriptedSession(self.agent.clone())))
    }
}

fn disk_oid(column: u32, index: u32) -> String {
    format!("{}.1.{}.{}", catalogue::DISK_TABLE_ROOT, column, index)
}

fn volume_oid(column: u32, index: u32) -> String {
    format!("{}.1.{}.{}", catalogue::VOLUME_TABLE_ROOT, column, index)
}

fn add_disk(agent: &Agent, index: u32, model: &str, temperature: &str) {
    agent.set(&disk_oid(1, index), RawVariable::Integer(index as i64));
    agent.set(&disk_oid(2, index), RawVariable::octet_string("WDC"));
    agent.set(&disk_oid(3, index), RawVariable::octet_string(model));
    agent.set(&disk_oid(4, index), RawVariable::octet_string("WD-SERIAL"));
    agent.set(&disk_oid(5, index), RawVariable::octet_string(temperature));
    agent.set(&disk_oid(6, index), RawVariable::octet_string("3.64 TB"));
}

/// A healthy EX2 Ultra with one disk and one volume.
fn healthy_agent() -> Arc<Agent> {
    let agent = Arc::new(Agent::default());
    agent.set("1.3.6.1.4.1.2021.10.1.3.1", RawVariable::octet_string("0,42"));
    agent.set("1.3.6.1.4.1.2021.10.1.3.2", RawVariable::octet_string("0.35"));
    agent.set("1.3.6.1.4.1.2021.10.1.3.3", RawVariable::octet_string("0.30"));
    agent.set("1.3.6.1.4.1.2021.4.5.0", RawVariable::Integer(1_048_576));
    agent.set("1.3.6.1.4.1.2021.4.11.0", RawVariable::octet_string("1.354.752,0"));
    agent.set("1.3.6.1.4.1.2021.4.6.0", RawVariable::Integer(524_288));
    agent.set(OID_SYSTEM_TEMPERATURE, RawVariable::octet_string("Centigrade:48 \tFahrenheit:118"));
    agent.set(OID_FAN_STATUS, RawVariable::octet_string("fan0: running"));
    agent.set("1.3.6.1.2.1.2.2.1.10.2", RawVariable::Unsigned(123_456));
    agent.set("1.3.6.1.2.1.2.2.1.16.2", RawVariable::Unsigned(654_321));
    agent.set(OID_SYS_UPTIME, RawVariable::TimeTicks(360_045));
    add_disk(&agent, 1, "WD40EFRX", "Centigrade:38 \tFahrenheit:100");
    agent.set(&volume_oid(1, 1), RawVariable::Integer(1));
    agent.set(&volume_oid(2, 1), RawVariable::octet_string("Volume_1"));
    agent.set(&volume_oid(3, 1), RawVariable::octet_string("ext4"));
    agent.set(&volume_oid(4, 1), RawVariable::octet_string("RAID1"));
    agent.set(&volume_oid(5, 1), RawVariable::octet_string("3.6 TB"));
    agent.set(&volume_oid(6, 1), RawVariable::octet_string("500 GB"));
    agent
}

fn v2c_config(interval: PollInterval) -> SessionConfig {
    SessionConfig::v2c("http://192.168.1.50/", "public", interval).unwrap()
}

fn coordinator(agent: &Arc<Agent>) -> (Coordinator, Arc<ScriptedConnector>) {
    let connector = ScriptedConnector::new(agent.clone());
    let coordinator = Coordinator::new(
        "nas",
        v2c_config(PollInterval::Secs30),
        CoordinatorSettings::default(),
        connector.clone(),
    );
    (coordinator, connector)
}

#[tokio::test]
async fn test_full_snapshot_is_normalized() {
    let agent = healthy_agent();
    let (mut coordinator, _) = coordinator(&agent);

    let snapshot = coordinator.poll_once().await.unwrap();

    assert_eq!(snapshot.sequence, 1);
    assert_eq!(snapshot.sensor("cpu_load_1min"), &SensorValue::Float(0.42));
    assert_eq!(snapshot.sensor("ram_total"), &SensorValue::Float(1024.0));
    assert_eq!(snapshot.sensor("ram_free"), &SensorValue::Float(1323.0));
    assert_eq!(snapshot.sensor("system_temperature"), &SensorValue::Float(48.0));
    assert_eq!(snapshot.sensor("system_uptime"), &SensorValue::Float(3600.5));
    assert_eq!(snapshot.sensor("network_in"), &SensorValue::Integer(123_456));
    assert!(snapshot.unavailable_sensors().is_empty());

    let disk = &snapshot.disks[&1];
    assert_eq!(disk.model, SensorValue::Text("WD40EFRX".into()));
    assert_eq!(disk.temperature, SensorValue::Float(38.0));
    assert_eq!(disk.capacity, SensorValue::Float(3640.0));

    let volume = &snapshot.volumes[&1];
    assert_eq!(volume.name, SensorValue::Text("Volume_1".into()));
    assert_eq!(volume.free_space, SensorValue::Float(500.0));
    assert!(snapshot.unavailable_tables.is_empty());
}

#[tokio::test]
async fn test_disk_rows_follow_installed_disks() {
    let agent = healthy_agent();
    let (mut coordinator, _) = coordinator(&agent);
    assert_eq!(coordinator.poll_once().await.unwrap().disks.len(), 1);

    add_disk(&agent, 2, "WD40EFZX", "Centigrade:41 \tFahrenheit:105");
    let snapshot = coordinator.poll_once().await.unwrap();
    assert_eq!(snapshot.disks.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(snapshot.disks[&2].temperature, SensorValue::Float(41.0));
}

#[tokio::test]
async fn test_orphan_cells_do_not_add_disks() {
    let agent = healthy_agent();
    agent.set(&disk_oid(2, 7), RawVariable::octet_string("WDC"));
    agent.set(&disk_oid(5, 9), RawVariable::octet_string("Centigrade:40 \tFahrenheit:104"));
    let (mut coordinator, _) = coordinator(&agent);

    let snapshot = coordinator.poll_once().await.unwrap();
    assert_eq!(snapshot.disks.keys().copied().collect::<Vec<_>>(), vec![1]);
    assert_eq!(snapshot.disks[&1].temperature, SensorValue::Float(38.0));
}

#[tokio::test]
async fn test_single_unreadable_scalar_is_isolated() {
    let agent = healthy_agent();
    agent.remove(OID_FAN_STATUS);
    agent.set(OID_SYSTEM_TEMPERATURE, RawVariable::octet_string("n/a"));
    let (mut coordinator, _) = coordinator(&agent);

    let snapshot = coordinator.poll_once().await.unwrap();

    assert_eq!(snapshot.sensor("fan_status"), &SensorValue::Unavailable);
    assert_eq!(snapshot.sensor("system_temperature"), &SensorValue::Unavailable);
    assert_eq!(snapshot.sensor("ram_total"), &SensorValue::Float(1024.0));
    assert_eq!(coordinator.consecutive_failures(), 0);
}

#[tokio::test]
async fn test_session_failure_keeps_cached_snapshot() {
    let agent = healthy_agent();
    let (mut coordinator, connector) = coordinator(&agent);
    let first = coordinator.poll_once().await.unwrap();

    agent.set_down(true);
    let err = coordinator.poll_once().await.unwrap_err();
    assert!(err.is_session_level());
    assert_eq!(coordinator.consecutive_failures(), 1);
    assert!(!coordinator.is_stale());
    assert!(!coordinator.has_session());
    assert!(Arc::ptr_eq(&coordinator.latest().unwrap(), &first));

    agent.set_down(false);
    let second = coordinator.poll_once().await.unwrap();
    assert_eq!(second.sequence, 2);
    assert_eq!(coordinator.consecutive_failures(), 0);
    assert!(!coordinator.is_stale());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_two_consecutive_failures_mark_stale() {
    let agent = healthy_agent();
    let (mut coordinator, _) = coordinator(&agent);
    let view = coordinator.subscribe();
    coordinator.poll_once().await.unwrap();

    agent.set_down(true);
    coordinator.poll_once().await.unwrap_err();
    coordinator.poll_once().await.unwrap_err();

    let published = view.borrow().clone();
    assert_eq!(published.consecutive_failures, 2);
    assert!(published.stale);
    assert_eq!(published.sequence, 1);
    assert_eq!(published.state, PollState::Idle);
    assert_eq!(published.snapshot.map(|s| s.sequence), Some(1));

    agent.set_down(false);
    coordinator.poll_once().await.unwrap();
    assert!(!view.borrow().stale);
}

#[tokio::test]
async fn test_runaway_table_is_reported_unavailable() {
    let agent = healthy_agent();
    for index in 2..=80 {
        agent.set(&disk_oid(1, index), RawVariable::Integer(index as i64));
    }
    let (mut coordinator, _) = coordinator(&agent);

    let snapshot = coordinator.poll_once().await.unwrap();
    assert_eq!(snapshot.unavailable_tables, vec!["disks".to_string()]);
    assert!(snapshot.disks.is_empty());
    assert_eq!(snapshot.volumes.len(), 1);
}

#[tokio::test]
async fn test_reduced_sensor_set() {
    let agent = healthy_agent();
    let (coordinator, _) = coordinator(&agent);
    let only_uptime = &catalogue::SENSORS[10..];
    let mut coordinator = coordinator
        .with_assembler(SnapshotAssembler::new(&CoordinatorSettings::default()).with_sensors(only_uptime));

    let snapshot = coordinator.poll_once().await.unwrap();
    assert_eq!(snapshot.sensors.len(), 1);
    assert!(snapshot.sensors.contains_key("system_uptime"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_polls_never_overlap() {
    let agent = healthy_agent();
    *agent.get_delay.lock().unwrap() = Some(Duration::from_secs(4));
    let (coordinator, connector) = coordinator(&agent);
    let handle = coordinator.spawn();

    tokio::time::sleep(Duration::from_secs(200)).await;
    let view = handle.view();
    handle.shutdown().await;

    assert_eq!(agent.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert!(view.sequence >= 2);
    assert!(view.sequence <= 5);
    assert_eq!(view.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_stream_yields_each_success() {
    let agent = healthy_agent();
    let (coordinator, _) = coordinator(&agent);
    let handle = coordinator.spawn();
    let mut snapshots = handle.snapshots();

    let first = snapshots.next().await.unwrap();
    let second = snapshots.next().await.unwrap();
    assert_eq!(first.sequence, 1);
    assert_eq!(second.sequence, 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_handle_reconfigure_and_poll_now() {
    let agent = healthy_agent();
    let (coordinator, _) = coordinator(&agent);
    let handle = coordinator.spawn();

    let polled = handle.poll_now().await.unwrap();
    assert!(polled.sequence >= 1);

    handle.reconfigure(v2c_config(PollInterval::Secs120)).await.unwrap();
    let after = handle.poll_now().await.unwrap();
    assert!(after.sequence > polled.sequence);
    assert_eq!(handle.view().consecutive_failures, 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_inflight_poll() {
    let agent = healthy_agent();
    *agent.get_delay.lock().unwrap() = Some(Duration::from_secs(4));
    let (coordinator, _) = coordinator(&agent);
    let handle = coordinator.spawn();

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(handle.view().state, PollState::Polling);

    let started = tokio::time::Instant::now();
    handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(agent.in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_self_test_succeeds_against_healthy_agent() {
    let agent = healthy_agent();
    let connector = ScriptedConnector::new(agent);
    let snapshot = self_test(
        &v2c_config(PollInterval::Secs60),
        &CoordinatorSettings::default(),
        connector.as_ref(),
    )
    .await
    .unwrap();
    assert_eq!(snapshot.disks.len(), 1);
}

#[tokio::test]
async fn test_self_test_reports_missing_uptime() {
    let agent = healthy_agent();
    agent.remove(OID_SYS_UPTIME);
    let connector = ScriptedConnector::new(agent);
    let err = self_test(
        &v2c_config(PollInterval::Secs60),
        &CoordinatorSettings::default(),
        connector.as_ref(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), "no_such_object");
}

#[tokio::test]
async fn test_self_test_reports_runaway_table() {
    let agent = healthy_agent();
    for index in 2..=80 {
        agent.set(&disk_oid(1, index), RawVariable::Integer(index as i64));
    }
    let connector = ScriptedConnector::new(agent);
    let err = self_test(
        &v2c_config(PollInterval::Secs60),
        &CoordinatorSettings::default(),
        connector.as_ref(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), "table_walk_overflow");
}

#[tokio::test]
async fn test_self_test_reports_unreachable_agent() {
    let agent = healthy_agent();
    agent.set_down(true);
    let connector = ScriptedConnector::new(agent);
    let err = self_test(
        &v2c_config(PollInterval::Secs60),
        &CoordinatorSettings::default(),
        connector.as_ref(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), "cannot_connect");
}

#[test]
fn test_v3_record_reports_first_missing_field() {
    let record = SessionRecord {
        host: "nas.local".into(),
        snmp_version: Some(SnmpVersion::V3),
        username: Some("monitor".into()),
        auth_protocol: Some(AuthProtocol::Sha),
        priv_protocol: Some(PrivProtocol::Aes),
        priv_password: Some("privpass".into()),
        ..Default::default()
    };
    assert_eq!(
        record.validate().unwrap_err(),
        MonitorError::MissingCredentialField("auth_password")
    );
}
