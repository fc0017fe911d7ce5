//! Courier Server - network front end and simulation loop
//!
//! Wires the pieces together:
//! - `ProtocolServer` accepts TCP connections and decodes request frames
//! - `RequestBridge` carries each request to the simulation loop and waits
//! - `Simulation` owns `Dispatch` and answers requests one tick at a time
//! - `AgentClient` drives a running server from the CLI or tests

pub mod bridge;
pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod server;
pub mod simulation;

use std::net::SocketAddr;

use courier_city::GraphBuilder;
use courier_fleet::Dispatch;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;

pub use bridge::{BridgeError, RequestBridge};
pub use client::{AgentClient, Registered};
pub use config::{ConfigOverrides, ServerConfig};
pub use error::{ClientError, ServerError};
pub use server::{ConnectionSettings, ProtocolServer};
pub use simulation::{Simulation, SimulationHandle, SimulationSettings};

/// Grow the city and set up dispatch state from `config`.
///
/// Returns the seed actually used so a run can be reproduced.
pub fn build_dispatch(config: &ServerConfig) -> Result<(Dispatch, u64), ServerError> {
    let seed = config.simulation.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let graph = GraphBuilder::new(config.graph.clone())?.build(&mut rng)?;
    Ok((Dispatch::new(graph, config.dispatch_config(), rng), seed))
}

/// A running backend: the listener and the simulation loop.
pub struct Backend {
    pub addr: SocketAddr,
    pub handle: SimulationHandle,
    server: JoinHandle<anyhow::Result<()>>,
    simulation: JoinHandle<anyhow::Result<()>>,
}

impl Backend {
    /// Bind the listener and start both tasks.
    pub async fn launch(config: &ServerConfig, dispatch: Dispatch) -> Result<Self, ServerError> {
        config.validate()?;

        let (bridge, requests) =
            bridge::channel(config.server.bridge_capacity, config.bridge_timeout());
        let server = ProtocolServer::bind(
            &config.server.bind,
            bridge,
            ConnectionSettings {
                frame_len: config.server.frame_len,
                read_timeout: config.frame_read_timeout(),
                max_connections: config.server.max_connections,
            },
        )
        .await?;
        let addr = server.local_addr()?;

        let (mut simulation, handle) = Simulation::new(
            dispatch,
            requests,
            SimulationSettings {
                tick: config.tick(),
                task_interval: config.task_interval(),
                generate_tasks: config.tasks.generate,
                status_interval: config.status_interval(),
                map_format: config.graph.format,
            },
        );
        simulation.set_listen_addr(addr);

        Ok(Self {
            addr,
            handle,
            server: tokio::spawn(server.run()),
            simulation: tokio::spawn(simulation.run()),
        })
    }

    /// Wait until either task exits.
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        tokio::select! {
            res = &mut self.server => res?,
            res = &mut self.simulation => res?,
        }
    }

    pub fn shutdown(&self) {
        self.server.abort();
        self.simulation.abort();
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
