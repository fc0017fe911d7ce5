//! The simulation loop: sole owner and mutator of `Dispatch`.
//!
//! Each tick applies operator commands, drains the request bridge one
//! submission at a time, sweeps stale agents, and publishes a snapshot.
//! Task generation runs on its own interval.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_city::MapFormat;
use courier_fleet::{Dispatch, FailureKind, FleetError, FleetSnapshot, NewAgent, TaskId};
use courier_protocol::{GraphIndex, Request, Response, StatusCode};
use tokio::sync::{mpsc, oneshot, watch};

use crate::bridge::{BridgeError, BridgeReceiver};
use crate::ServerError;

const CONTROL_CHANNEL_CAPACITY: usize = 32;

/// Timer settings for the loop.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub tick: Duration,
    pub task_interval: Duration,
    pub generate_tasks: bool,
    /// Period of the status log line, if any.
    pub status_interval: Option<Duration>,
    pub map_format: MapFormat,
}

/// Operator commands, applied at the start of a tick.
#[derive(Debug)]
enum ControlCommand {
    AddTask {
        destination: GraphIndex,
        name: String,
        reply: oneshot::Sender<Result<TaskId, FleetError>>,
    },
    SetGeneration(bool),
}

/// Handle for observers and operators. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SimulationHandle {
    control: mpsc::Sender<ControlCommand>,
    snapshot: watch::Receiver<FleetSnapshot>,
}

impl SimulationHandle {
    /// Open a task at a chosen node.
    pub async fn add_task(
        &self,
        destination: GraphIndex,
        name: impl Into<String>,
    ) -> Result<TaskId, ServerError> {
        let (reply, reply_rx) = oneshot::channel();
        self.control
            .send(ControlCommand::AddTask {
                destination,
                name: name.into(),
                reply,
            })
            .await
            .map_err(|_| BridgeError::Closed)?;
        let id = reply_rx.await.map_err(|_| BridgeError::Dropped)??;
        Ok(id)
    }

    pub async fn set_generation(&self, enabled: bool) -> Result<(), ServerError> {
        self.control
            .send(ControlCommand::SetGeneration(enabled))
            .await
            .map_err(|_| BridgeError::Closed)?;
        Ok(())
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FleetSnapshot> {
        self.snapshot.clone()
    }
}

pub struct Simulation {
    dispatch: Dispatch,
    requests: BridgeReceiver,
    control: mpsc::Receiver<ControlCommand>,
    snapshot_tx: watch::Sender<FleetSnapshot>,
    settings: SimulationSettings,
    /// Rendered once; the graph never changes after construction.
    map_text: String,
    listen_addr: Option<SocketAddr>,
    ticks: u64,
}

impl Simulation {
    pub fn new(
        dispatch: Dispatch,
        requests: BridgeReceiver,
        settings: SimulationSettings,
    ) -> (Self, SimulationHandle) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(FleetSnapshot::default());
        let map_text = dispatch.graph().render(settings.map_format);

        let sim = Self {
            dispatch,
            requests,
            control: control_rx,
            snapshot_tx,
            settings,
            map_text,
            listen_addr: None,
            ticks: 0,
        };
        sim.publish(None);

        let handle = SimulationHandle {
            control: control_tx,
            snapshot: snapshot_rx,
        };
        (sim, handle)
    }

    pub fn set_listen_addr(&mut self, addr: SocketAddr) {
        self.listen_addr = Some(addr);
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run until the task is cancelled.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(self.settings.tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut generation = tokio::time::interval(self.settings.task_interval);
        generation.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first fire so the first task arrives one interval in.
        generation.tick().await;

        let status_period = self.settings.status_interval.unwrap_or(Duration::from_secs(3600));
        let mut status = tokio::time::interval(status_period);
        status.tick().await;

        tracing::info!(
            tick_ms = self.settings.tick.as_millis() as u64,
            generate = self.settings.generate_tasks,
            "Simulation loop started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.tick(Utc::now());
                }
                _ = generation.tick() => {
                    if self.settings.generate_tasks {
                        self.dispatch.generate_task();
                    }
                }
                _ = status.tick(), if self.settings.status_interval.is_some() => {
                    self.log_status();
                }
            }
        }
    }

    /// Advance one tick at `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.ticks += 1;
        self.apply_control();

        let mut handled = 0usize;
        while let Some(submission) = self.requests.try_next() {
            let response = self.apply(&submission.request, submission.origin, now);
            let agent = submission.request.agent_name().to_string();
            if !submission.respond(response) {
                tracing::debug!(agent = %agent, "Requester gone, response discarded");
            }
            handled += 1;
        }

        let evicted = self.dispatch.sweep_stale(now);
        if handled > 0 || !evicted.is_empty() {
            tracing::trace!(tick = self.ticks, handled, evicted = evicted.len(), "Tick");
        }
        self.publish(Some(now));
    }

    fn apply_control(&mut self) {
        while let Ok(command) = self.control.try_recv() {
            match command {
                ControlCommand::AddTask {
                    destination,
                    name,
                    reply,
                } => {
                    let _ = reply.send(self.dispatch.add_task(destination, name));
                }
                ControlCommand::SetGeneration(enabled) => {
                    tracing::info!(enabled, "Task generation toggled");
                    self.settings.generate_tasks = enabled;
                }
            }
        }
    }

    /// Apply one request and build its response. Never fails: rejected
    /// operations become failure statuses.
    pub fn apply(&mut self, request: &Request, origin: SocketAddr, now: DateTime<Utc>) -> Response {
        let outcome = match request {
            Request::Registration {
                color,
                name,
                agent_type,
            } => self
                .dispatch
                .register(
                    NewAgent {
                        name: name.clone(),
                        color: *color,
                        agent_type: *agent_type,
                        hostname: origin.ip().to_string(),
                        port: origin.port(),
                    },
                    now,
                )
                .map(|node| Response::registered(node, self.map_text.clone())),
            Request::RequestForTask { name } => self
                .dispatch
                .request_work(name, now)
                .map(|order| Response::work(order.task_name, order.destination)),
            Request::PositionUpdate {
                name,
                start,
                end,
                fraction,
            } => self
                .dispatch
                .update_position(name, *start, *end, *fraction, now)
                .map(|_| Response::ok()),
            Request::TaskComplete { name } => {
                self.dispatch.complete_task(name, now).map(|_| Response::ok())
            }
            Request::Deregistration { name } => {
                self.dispatch.deregister(name).map(|_| Response::ok())
            }
            Request::StatusUpdate { name, status } => self
                .dispatch
                .update_status(name, status, now)
                .map(|_| Response::ok()),
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!(
                request = %request.kind(),
                agent = %request.agent_name(),
                error = %e,
                "Request rejected"
            );
            Response::failure(status_for(&e))
        })
    }

    fn snapshot(&self, now: Option<DateTime<Utc>>) -> FleetSnapshot {
        let mut snap = self.dispatch.snapshot();
        snap.listen_addr = self.listen_addr;
        snap.tick = self.ticks;
        snap.generation_enabled = self.settings.generate_tasks;
        snap.taken_at = now;
        snap
    }

    fn publish(&self, now: Option<DateTime<Utc>>) {
        self.snapshot_tx.send_replace(self.snapshot(now));
    }

    fn log_status(&self) {
        let snap = self.snapshot_tx.borrow();
        tracing::info!(
            addr = ?snap.listen_addr,
            agents = snap.agent_count(),
            open = snap.open_tasks,
            assigned = snap.assigned_tasks,
            completed = snap.completed_tasks,
            "Status"
        );
    }
}

/// Wire status for a rejected fleet operation.
pub fn status_for(error: &FleetError) -> StatusCode {
    match error.kind() {
        FailureKind::NoTasks => StatusCode::FailureNoTasks,
        FailureKind::NotFound | FailureKind::PolicyViolation => StatusCode::FailureOther,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge;
    use courier_city::CityGraph;
    use courier_fleet::DispatchConfig;
    use courier_protocol::{AgentType, ResponsePayload, Rgb, Vec3};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn simulation() -> (Simulation, SimulationHandle, bridge::RequestBridge) {
        let positions = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 9.0),
        ];
        let graph = CityGraph::from_layout(&positions, &[(0, 1), (0, 2)], 0).unwrap();
        let dispatch = Dispatch::new(graph, DispatchConfig::default(), StdRng::seed_from_u64(1));
        let (bridge, rx) = bridge::channel(16, Duration::from_secs(1));
        let (sim, handle) = Simulation::new(
            dispatch,
            rx,
            SimulationSettings {
                tick: Duration::from_millis(10),
                task_interval: Duration::from_secs(60),
                generate_tasks: false,
                status_interval: None,
                map_format: MapFormat::Compact,
            },
        );
        (sim, handle, bridge)
    }

    fn origin() -> SocketAddr {
        "192.168.1.20:6000".parse().unwrap()
    }

    fn register(name: &str) -> Request {
        Request::Registration {
            color: Rgb::GREEN,
            name: name.into(),
            agent_type: AgentType::FastLoadSlowMove,
        }
    }

    #[test]
    fn test_registration_echoes_node_and_map() {
        let (mut sim, _, _) = simulation();
        let response = sim.apply(&register("A"), origin(), Utc::now());
        let ResponsePayload::Registration { node, map } = response.payload else {
            panic!("expected registration payload");
        };
        assert_ne!(node, GraphIndex(0));
        assert!(map.starts_with("3\n"));

        let agent = sim.dispatch().agents().get("A").unwrap();
        assert_eq!(agent.hostname, "192.168.1.20");
        assert_eq!(agent.port, 6000);
    }

    #[test]
    fn test_failures_map_to_status_codes() {
        let (mut sim, _, _) = simulation();
        let now = Utc::now();
        sim.apply(&register("A"), origin(), now);

        let dup = sim.apply(&register("A"), origin(), now);
        assert_eq!(dup.status, StatusCode::FailureOther);

        let ghost = sim.apply(
            &Request::TaskComplete {
                name: "ghost".into(),
            },
            origin(),
            now,
        );
        assert_eq!(ghost.status, StatusCode::FailureOther);

        let to_hq = Request::PositionUpdate {
            name: "A".into(),
            start: GraphIndex(0),
            end: GraphIndex(0),
            fraction: 1.0,
        };
        assert!(sim.apply(&to_hq, origin(), now).is_success());
        let work = sim.apply(&Request::RequestForTask { name: "A".into() }, origin(), now);
        assert_eq!(work.status, StatusCode::FailureNoTasks);
    }

    #[test]
    fn test_status_update_overrides_status_text() {
        let (mut sim, _, _) = simulation();
        let now = Utc::now();
        sim.apply(&register("A"), origin(), now);
        let response = sim.apply(
            &Request::StatusUpdate {
                name: "A".into(),
                status: "charging".into(),
            },
            origin(),
            now,
        );
        assert!(response.is_success());
        assert_eq!(sim.dispatch().agents().get("A").unwrap().status, "charging");
    }

    #[tokio::test]
    async fn test_tick_drains_bridge_and_publishes() {
        let (mut sim, handle, bridge) = simulation();
        let waiter = tokio::spawn(async move { bridge.submit(register("A"), origin()).await });
        tokio::task::yield_now().await;

        sim.tick(Utc::now());
        let response = waiter.await.unwrap().unwrap();
        assert!(response.is_success());

        let snap = handle.snapshot();
        assert_eq!(snap.agent_count(), 1);
        assert_eq!(snap.tick, 1);
    }

    #[tokio::test]
    async fn test_control_commands_apply_on_tick() {
        let (mut sim, handle, _) = simulation();
        let add = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.add_task(GraphIndex(1), "Spare Lamp").await })
        };
        tokio::task::yield_now().await;
        sim.tick(Utc::now());
        add.await.unwrap().unwrap();
        assert_eq!(handle.snapshot().open_tasks, 1);
    }

    #[tokio::test]
    async fn test_generation_runs_on_interval_until_disabled() {
        let positions: Vec<Vec3> = (0..9).map(|i| Vec3::new(i as f32 * 3.0, 0.0, 0.0)).collect();
        let edges: Vec<(usize, usize)> = (1..9).map(|i| (i - 1, i)).collect();
        let graph = CityGraph::from_layout(&positions, &edges, 0).unwrap();
        let dispatch = Dispatch::new(graph, DispatchConfig::default(), StdRng::seed_from_u64(5));
        let (_bridge, rx) = bridge::channel(16, Duration::from_secs(1));
        let (sim, handle) = Simulation::new(
            dispatch,
            rx,
            SimulationSettings {
                tick: Duration::from_millis(5),
                task_interval: Duration::from_millis(20),
                generate_tasks: true,
                status_interval: None,
                map_format: MapFormat::Compact,
            },
        );
        let running = tokio::spawn(sim.run());

        let mut snapshots = handle.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while snapshots.borrow_and_update().open_tasks < 2 {
                snapshots.changed().await.unwrap();
            }
        })
        .await
        .expect("generation never produced two tasks");

        handle.set_generation(false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let paused = handle.snapshot();
        assert!(!paused.generation_enabled);
        assert!(paused.open_tasks < 8);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.snapshot().open_tasks, paused.open_tasks);
        running.abort();
    }

    #[test]
    fn test_silent_agents_are_swept_on_tick() {
        let (mut sim, handle, _) = simulation();
        let t0 = Utc::now();
        sim.apply(&register("A"), origin(), t0);
        sim.tick(t0 + chrono::Duration::seconds(5));
        assert_eq!(handle.snapshot().agent_count(), 1);
        sim.tick(t0 + chrono::Duration::seconds(31));
        assert_eq!(handle.snapshot().agent_count(), 0);
    }
}
