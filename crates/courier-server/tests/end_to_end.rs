//! Full request lifecycles against a live listener on a loopback port.

use std::time::Duration;

use courier_city::{CityGraph, GraphBuilder, GraphConfig};
use courier_fleet::{Dispatch, DispatchConfig};
use courier_protocol::{
    decode_response, encode_request, AgentType, GraphIndex, Request, RequestKind, Rgb, StatusCode,
    Vec3, DEFAULT_FRAME_LEN,
};
use courier_server::server::{ConnectionSettings, ProtocolServer};
use courier_server::{bridge, AgentClient, Backend, ClientError, ServerConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// HQ at the origin, a drop-off 2 units away, a far node 52 units out, and
/// a spawn point off to the side.
///
/// Graph indices: 0 HQ, 1 near, 2 far, 3 spawn.
fn line_city() -> CityGraph {
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, 0.0),
        Vec3::new(52.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 10.0),
    ];
    CityGraph::from_layout(&positions, &[(0, 1), (1, 2), (0, 3)], 0).unwrap()
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.bind = "127.0.0.1:0".into();
    config.server.frame_read_timeout_ms = 500;
    config.simulation.tick_ms = 10;
    config.tasks.generate = false;
    config
}

async fn launch(graph: CityGraph) -> Backend {
    let config = test_config();
    let dispatch = Dispatch::new(graph, DispatchConfig::default(), StdRng::seed_from_u64(11));
    Backend::launch(&config, dispatch).await.unwrap()
}

fn client(backend: &Backend) -> AgentClient {
    AgentClient::new(backend.addr.to_string()).with_timeout(Duration::from_secs(5))
}

// ─── Delivery lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_delivery_lifecycle() {
    let backend = launch(line_city()).await;
    let agent = client(&backend);

    let registered = agent
        .register("A", Rgb::RED, AgentType::FastLoadSlowMove)
        .await
        .unwrap();
    assert_ne!(registered.node, GraphIndex(0));

    // Standing at HQ with nothing open.
    let resp = agent
        .update_position("A", GraphIndex(0), GraphIndex(0), 1.0)
        .await
        .unwrap();
    assert_eq!(resp.status, StatusCode::Success);
    let resp = agent.request_work("A").await.unwrap();
    assert_eq!(resp.status, StatusCode::FailureNoTasks);

    backend
        .handle
        .add_task(GraphIndex(1), "Red Parcel")
        .await
        .unwrap();
    let resp = agent.request_work("A").await.unwrap();
    assert_eq!(resp, courier_protocol::Response::work("Red Parcel".into(), GraphIndex(1)));

    // Too far from the destination to hand over.
    agent
        .update_position("A", GraphIndex(1), GraphIndex(2), 1.0)
        .await
        .unwrap();
    let resp = agent.complete_task("A").await.unwrap();
    assert_eq!(resp.status, StatusCode::FailureOther);

    agent
        .update_position("A", GraphIndex(2), GraphIndex(1), 1.0)
        .await
        .unwrap();
    let resp = agent.complete_task("A").await.unwrap();
    assert_eq!(resp.status, StatusCode::Success);

    let snap = backend.handle.snapshot();
    assert_eq!(snap.completed_tasks, 1);
    assert_eq!(snap.open_tasks, 0);
}

#[tokio::test]
async fn test_status_update_and_deregistration() {
    let backend = launch(line_city()).await;
    let agent = client(&backend);
    agent
        .register("B", Rgb::BLUE, AgentType::SlowLoadFastMove)
        .await
        .unwrap();

    let resp = agent.update_status("B", "waiting").await.unwrap();
    assert_eq!(resp.status, StatusCode::Success);

    let resp = agent.deregister("B").await.unwrap();
    assert_eq!(resp.status, StatusCode::Success);

    let resp = agent.deregister("B").await.unwrap();
    assert_eq!(resp.status, StatusCode::FailureOther);
    let resp = agent.request_work("B").await.unwrap();
    assert_eq!(resp.status, StatusCode::FailureOther);
}

// ─── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_registration_map_matches_city() {
    let mut rng = StdRng::seed_from_u64(3);
    let graph = GraphBuilder::new(GraphConfig::default())
        .unwrap()
        .build(&mut rng)
        .unwrap();
    let (nodes, edges) = (graph.node_count(), graph.edge_count());
    let backend = launch(graph).await;

    let registered = client(&backend)
        .register("mapper", Rgb::GREEN, AgentType::FastLoadSlowMove)
        .await
        .unwrap();
    let map = registered.parse_map().unwrap();
    assert_eq!(map.node_count(), nodes);
    assert_eq!(map.edge_count(), edges);
    assert!(registered.node.0 < nodes);
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let backend = launch(line_city()).await;
    let agent = client(&backend);
    agent
        .register("twin", Rgb::RED, AgentType::FastLoadSlowMove)
        .await
        .unwrap();

    let err = agent
        .register("twin", Rgb::RED, AgentType::FastLoadSlowMove)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Rejected(StatusCode::FailureOther)));
    assert_eq!(backend.handle.snapshot().agent_count(), 1);
}

// ─── Malformed frames ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_short_frame_gets_parse_error() {
    let backend = launch(line_city()).await;
    let request = Request::RequestForTask { name: "A".into() };
    let frame = encode_request(&request, DEFAULT_FRAME_LEN).unwrap();

    let raw = client(&backend)
        .exchange(&frame[..DEFAULT_FRAME_LEN - 1])
        .await
        .unwrap();
    let resp = decode_response(RequestKind::RequestForTask, &raw).unwrap();
    assert_eq!(resp.status, StatusCode::FailureRequestParsingError);
}

#[tokio::test]
async fn test_long_frame_gets_parse_error() {
    let backend = launch(line_city()).await;
    let mut frame = encode_request(
        &Request::RequestForTask { name: "A".into() },
        DEFAULT_FRAME_LEN,
    )
    .unwrap();
    frame.extend_from_slice(&[0u8; 8]);

    let raw = client(&backend).exchange(&frame).await.unwrap();
    let resp = decode_response(RequestKind::RequestForTask, &raw).unwrap();
    assert_eq!(resp.status, StatusCode::FailureRequestParsingError);
}

#[tokio::test]
async fn test_unknown_request_type_gets_parse_error() {
    let backend = launch(line_city()).await;
    let mut frame = vec![0u8; DEFAULT_FRAME_LEN];
    frame[0] = 9;

    let raw = client(&backend).exchange(&frame).await.unwrap();
    let resp = decode_response(RequestKind::Deregistration, &raw).unwrap();
    assert_eq!(resp.status, StatusCode::FailureRequestParsingError);
}

#[tokio::test]
async fn test_empty_connection_gets_no_response() {
    let backend = launch(line_city()).await;
    let raw = client(&backend).exchange(&[]).await.unwrap();
    assert!(raw.is_empty());
}

// ─── Bridge timeout ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unanswered_request_closes_without_response() {
    // Nobody drains the receiver, so every submission times out.
    let (bridge, _requests) = bridge::channel(8, Duration::from_millis(100));
    let server = ProtocolServer::bind(
        "127.0.0.1:0",
        bridge,
        ConnectionSettings {
            frame_len: DEFAULT_FRAME_LEN,
            read_timeout: Duration::from_millis(500),
            max_connections: 4,
        },
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let task = tokio::spawn(server.run());

    let err = AgentClient::new(addr.to_string())
        .with_timeout(Duration::from_secs(5))
        .request_work("A")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NoResponse));
    task.abort();
}
