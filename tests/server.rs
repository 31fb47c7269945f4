//! End-to-end tests over a real IPC socket: one responder task, one
//! client, full configure/process/sentinel lifecycle.

use std::sync::Arc;
use std::time::Duration;

use labeld_core::config::ExecConfig;
use labeld_core::engine::InferenceEngine;
use labeld_core::error::EngineError;
use labeld_core::protocol::Framing;
use labeld_core::responder::{Responder, ResponderHandle};
use labeld_core::session::Session;
use labeld_core::transport::Endpoint;
use labeld_core::ReplClient;
use ndarray::{array, ArrayD};
use serde_json::json;
use tempfile::TempDir;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

async fn start(session: Session) -> (TempDir, String, ResponderHandle) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("labeld-test.sock");
    let endpoint = Endpoint::Ipc { path: path.clone() };
    let uri = endpoint.as_zmq();
    let responder = Responder::new(
        endpoint,
        Arc::new(zmq::Context::new()),
        Duration::from_secs(60),
    );
    let handle = responder.run(session).await.expect("responder should bind");
    (dir, uri, handle)
}

fn client(uri: &str) -> ReplClient {
    ReplClient::new(uri).with_timeout(CLIENT_TIMEOUT)
}

#[tokio::test]
async fn full_session_lifecycle() {
    let (_dir, uri, mut handle) = start(Session::new(Framing::Tagged)).await;
    let client = client(&uri);

    // Configure with a bare device index; echo carries stringified values
    // for both groups.
    let echo = client.configure(json!({"device": 0})).await.expect("configure");
    assert_eq!(echo["setup"]["device"], "0");
    assert_eq!(echo["setup"]["gpu"], "true");
    assert_eq!(echo["execution"]["z_axis"], "0");
    assert_eq!(echo["execution"]["stitch_threshold"], "0.1");

    // A 2-axis image comes back as a 2-axis label map.
    let img = array![
        [0.9f32, 0.9, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.8],
        [0.0, 0.0, 0.0, 0.8],
    ]
    .into_dyn();
    let labels = client.process(&img).await.expect("process");
    assert_eq!(labels.shape(), img.shape());
    assert_ne!(labels[[0, 0]], 0);
    assert_ne!(labels[[1, 3]], 0);
    assert_ne!(labels[[0, 0]], labels[[1, 3]]);

    // Sentinel terminates the loop without a reply.
    client.shutdown().await.expect("shutdown");
    tokio::time::timeout(CLIENT_TIMEOUT, handle.wait())
        .await
        .expect("responder should exit after the sentinel");
    assert!(!handle.is_running());
}

#[tokio::test]
async fn data_before_configure_yields_no_result() {
    let (_dir, uri, mut handle) = start(Session::new(Framing::Tagged)).await;
    let client = client(&uri);

    let img = array![[1.0f32]].into_dyn();
    // The server answers with an empty reply, which the client reports as
    // a dropped request.
    assert!(client.process(&img).await.is_err());

    // The session is still alive and configurable afterwards.
    let echo = client.configure(json!({})).await.expect("configure");
    assert_eq!(echo["setup"]["model"], "threshold");
    assert!(client.process(&img).await.is_ok());

    handle.stop().await;
}

#[tokio::test]
async fn malformed_control_does_not_kill_the_session() {
    let (_dir, uri, mut handle) = start(Session::new(Framing::Legacy)).await;
    let client = client(&uri).with_framing(Framing::Legacy);

    // Legacy mode: non-JSON bytes classify as data and are dropped while
    // unconfigured. More than one byte, so it is not a sentinel.
    let img = array![[0.5f32, 0.5]].into_dyn();
    assert!(client.process(&img).await.is_err());

    // A valid control message still succeeds.
    let echo = client
        .configure(json!({"model": "threshold", "gpu": false}))
        .await
        .expect("configure");
    assert_eq!(echo["setup"]["gpu"], "false");

    handle.stop().await;
}

#[tokio::test]
async fn unknown_model_keeps_the_session_unconfigured() {
    let (_dir, uri, mut handle) = start(Session::new(Framing::Tagged)).await;
    let client = client(&uri);

    assert!(client.configure(json!({"model": "cellpose"})).await.is_err());

    // Construction failure is retryable.
    assert!(client.configure(json!({})).await.is_ok());

    handle.stop().await;
}

/// Engine that returns a canned 3-axis stack regardless of input.
struct StackEngine;

impl InferenceEngine for StackEngine {
    fn process(
        &mut self,
        _input: &ArrayD<f32>,
        _exec: &ExecConfig,
    ) -> Result<ArrayD<u32>, EngineError> {
        Ok(array![[[2u32, 2], [0, 0]], [[3, 3], [1, 0]]].into_dyn())
    }

    fn name(&self) -> &str {
        "stack"
    }
}

#[tokio::test]
async fn stacked_engine_output_is_projected_over_the_wire() {
    let exec = ExecConfig {
        z_axis: 0,
        stitch_threshold: 0.1,
        project_2d: true,
        batch_axis: true,
    };
    let session = Session::with_engine(Framing::Tagged, Box::new(StackEngine), exec);
    let (_dir, uri, mut handle) = start(session).await;
    let client = client(&uri);

    let img = array![[0.0f32, 0.0], [0.0, 0.0]].into_dyn();
    let labels = client.process(&img).await.expect("process");
    // Max projection erased label 2, relabeling closed the gap, and the
    // batch-axis shim prepended a singleton axis.
    assert_eq!(labels, array![[[2u32, 2], [1, 0]]].into_dyn());

    handle.stop().await;
}

#[tokio::test]
async fn sentinel_works_from_the_uninitialized_state() {
    let (_dir, uri, mut handle) = start(Session::new(Framing::Tagged)).await;
    let client = client(&uri);

    client.shutdown().await.expect("shutdown");
    tokio::time::timeout(CLIENT_TIMEOUT, handle.wait())
        .await
        .expect("responder should exit after the sentinel");
}
