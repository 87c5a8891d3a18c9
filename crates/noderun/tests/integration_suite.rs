//! End-to-end tests: an engine talking to a session over an in-memory duplex.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use futures::SinkExt;
use futures::StreamExt;
use serde_json::Value;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use noderun::AsyncNode;
use noderun::Call;
use noderun::NodeBuilder;
use noderun::Registry;
use noderun::Server;
use noderun::ServerConfig;
use noderun::Session;
use noderun::Ty;
use noderun::mock_transport::DuplexChannelTransport;
use noderun::transport;
use noderun::transport::Transport;
use pinwire::NodeSpec;
use pinwire::OutgoingMessage;
use pinwire::Reply;
use pinwire::WireType;

struct Doubler;

#[async_trait::async_trait]
impl AsyncNode for Doubler {
    async fn call(&self, call: &mut Call) -> anyhow::Result<Value> {
        let x: f64 = call.arg(0)?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        call.context()?.debug_log("doubled after sleeping");
        Ok(json!(x * 2.0))
    }
}

fn registry() -> Arc<Registry> {
    let mut registry = Registry::with_namespace("test");

    registry
        .register_node(
            NodeBuilder::sync(|call| {
                let a: i64 = call.arg(0)?;
                let b: i64 = call.arg(1)?;
                Ok(json!(a + b))
            })
            .name("add")
            .input::<i64>("a")
            .input::<i64>("b")
            .output::<i64>(),
        )
        .unwrap();

    registry
        .register_node(
            NodeBuilder::sync(|call| {
                let count = call.context()?.get_or_insert_with(|| 0i64)?;
                *count += 1;
                Ok(json!(*count))
            })
            .name("counter")
            .context()
            .output::<i64>(),
        )
        .unwrap();

    registry
        .register_node(
            NodeBuilder::sync(|call| {
                let mode: String = call.arg(0)?;
                let count = call.context()?.get_or_insert_with(|| 0i64)?;
                *count += 1;
                let n = *count;
                match mode.as_str() {
                    "bail" => bail!("asked to fail at {}", n),
                    "panic" => panic!("asked to panic at {}", n),
                    _ => Ok(json!(n)),
                }
            })
            .name("flaky_counter")
            .context()
            .input::<String>("mode")
            .output::<i64>(),
        )
        .unwrap();

    registry
        .register_node(
            NodeBuilder::sync(|call| {
                let s: String = call.arg(0)?;
                let (head, tail) = s.split_once(' ').unwrap_or((s.as_str(), ""));
                Ok(json!([head, tail]))
            })
            .name("split")
            .input::<String>("s")
            .returns(Ty::of::<(String, String)>()),
        )
        .unwrap();

    registry
        .register_node(
            NodeBuilder::sync(|call| {
                let x: i64 = call.arg(0)?;
                if x < 0 {
                    bail!("negative input {}", x);
                }
                Ok(json!(x))
            })
            .name("non_negative")
            .input::<i64>("x")
            .output::<i64>(),
        )
        .unwrap();

    registry
        .register_node(
            NodeBuilder::sync(|call| {
                let msg: String = call.arg(0)?;
                let ctx = call.context()?;
                ctx.debug_log(format!("got {}", msg));
                ctx.debug_log("done");
                Ok(json!(msg.len()))
            })
            .name("feedback")
            .context()
            .input::<String>("msg")
            .output::<u64>(),
        )
        .unwrap();

    registry
        .register_node(
            NodeBuilder::sync(|_| panic!("kaboom"))
                .name("explode")
                .output::<i64>(),
        )
        .unwrap();

    registry
        .register_node(
            NodeBuilder::asynchronous(Doubler)
                .context()
                .input::<f64>("x")
                .output::<f64>(),
        )
        .unwrap();

    Arc::new(registry)
}

/// The engine side of a connection.
struct Engine {
    transport: DuplexChannelTransport,
    next_id: u64,
}

impl Engine {
    fn connect(registry: Arc<Registry>) -> (Self, JoinHandle<transport::Result<()>>) {
        let (engine, host) = DuplexChannelTransport::pair();
        let options = ServerConfig::default().discovery_options();
        let handle = tokio::spawn(async move { Session::new(registry, options).run(&host).await });
        (Self { transport: engine, next_id: 0 }, handle)
    }

    async fn recv(&self) -> OutgoingMessage {
        let bytes = tokio::time::timeout(Duration::from_secs(5), self.transport.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("transport failed")
            .expect("host closed the connection");
        OutgoingMessage::decode(&bytes).expect("host sent an undecodable frame")
    }

    /// Sends one command and collects the debug messages preceding its reply.
    async fn request(&mut self, node: u64, key: &str, body: Value) -> (Vec<OutgoingMessage>, OutgoingMessage) {
        self.next_id += 1;
        let mut frame = json!({"id": self.next_id, "node": node});
        frame[key] = body;
        self.transport.send(frame.to_string().as_bytes()).await.unwrap();

        let mut debug = Vec::new();
        loop {
            let msg = self.recv().await;
            if let Reply::DebugMessage(_) = msg.reply {
                debug.push(msg);
                continue;
            }
            assert_eq!(msg.id, self.next_id, "reply correlates with its request");
            assert_eq!(msg.node, Some(node));
            return (debug, msg);
        }
    }

    async fn discovery(&mut self) -> Vec<NodeSpec> {
        let (_, reply) = self.request(0, "discovery", json!({})).await;
        match reply.reply {
            Reply::DiscoveryOk(discovery) => discovery.nodes,
            other => panic!("expected discovery_ok, got {:?}", other),
        }
    }

    async fn init(&mut self, node: u64, spec: &NodeSpec) -> Reply {
        let (_, reply) = self.request(node, "init", init_body(spec)).await;
        reply.reply
    }

    async fn exec(&mut self, node: u64, inputs: Value) -> Reply {
        let (_, reply) = self.request(node, "exec", json!({"exec_id": 1, "time": 0, "inputs": inputs})).await;
        reply.reply
    }
}

/// An `init` body wiring one socket to every pin of `spec`.
fn init_body(spec: &NodeSpec) -> Value {
    let flow = |pins: &[pinwire::PinSpec]| -> Vec<Value> {
        pins.iter()
            .filter(|p| p.is_flow())
            .enumerate()
            .map(|(i, _)| json!({"label": "", "exec_id": i}))
            .collect()
    };
    let data = |pins: &[pinwire::PinSpec]| -> Vec<Value> {
        pins.iter()
            .filter(|p| !p.is_flow())
            .map(|p| json!({"label": p.label, "type": "any"}))
            .collect()
    };
    json!({
        "node_id": format!("{}-1", spec.name),
        "node_type": spec.name,
        "exec_inputs": flow(spec.inputs.as_slice()),
        "exec_outputs": flow(spec.outputs.as_slice()),
        "data_inputs": data(spec.inputs.as_slice()),
        "data_outputs": data(spec.outputs.as_slice()),
    })
}

fn spec<'a>(specs: &'a [NodeSpec], name: &str) -> &'a NodeSpec {
    specs
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("{} missing from discovery", name))
}

fn outputs(reply: Reply) -> Vec<Value> {
    match reply {
        Reply::ExecOk(exec) => exec.outputs,
        other => panic!("expected exec_ok, got {:?}", other),
    }
}

// --- Discovery ---

#[tokio::test]
async fn test_discovery_is_stable_and_flow_led() {
    let (mut engine, _host) = Engine::connect(registry());
    let first = engine.discovery().await;
    let second = engine.discovery().await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 8);
    for node in &first {
        assert_eq!(node.inputs[0].ty, WireType::Flow, "{}", node.name);
        assert_eq!(node.inputs[0].label, "");
        assert_eq!(node.outputs[0].ty, WireType::Flow, "{}", node.name);
        assert!(node.name.starts_with("test/"));
    }
    assert_eq!(spec(&first, "test/non_negative").label, "Non Negative");
    assert_eq!(spec(&first, "test/Doubler").label, "Doubler");
}

#[tokio::test]
async fn test_discovery_lists_builtin_types() {
    let (mut engine, _host) = Engine::connect(registry());
    let (_, reply) = engine.request(0, "discovery", json!({})).await;
    let Reply::DiscoveryOk(discovery) = reply.reply else {
        panic!("expected discovery_ok");
    };
    assert_eq!(discovery.options.init_timeout, 2.0);
    assert!(discovery.types.iter().any(|t| t.name == "vec3"));
}

// --- Init ---

#[tokio::test]
async fn test_init_checks_cardinality() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    let add = spec(&specs, "test/add");

    assert_eq!(engine.init(1, add).await, Reply::InitOk);

    let mut body = init_body(add);
    body["data_inputs"] = json!([
        {"label": "a", "type": "i64"},
        {"label": "b", "type": "i64"},
        {"label": "c", "type": "i64"},
    ]);
    let (_, reply) = engine.request(2, "init", body).await;
    assert_eq!(reply.reply, Reply::Error("expected 2 data inputs, got 3".into()));

    // The failed init left no instance behind.
    assert!(matches!(engine.exec(2, json!([1, 2])).await, Reply::Error(_)));
    assert_eq!(outputs(engine.exec(1, json!([1, 2])).await), vec![json!(3)]);
}

#[tokio::test]
async fn test_init_unknown_type() {
    let (mut engine, _host) = Engine::connect(registry());
    let (_, reply) = engine
        .request(1, "init", json!({"node_id": "x", "node_type": "test/missing"}))
        .await;
    assert_eq!(reply.reply, Reply::Error("node test/missing not found".into()));
}

#[tokio::test]
async fn test_reinit_resets_state() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    let counter = spec(&specs, "test/counter");

    engine.init(1, counter).await;
    engine.exec(1, json!([])).await;
    engine.exec(1, json!([])).await;

    engine.init(1, counter).await;
    assert_eq!(outputs(engine.exec(1, json!([])).await), vec![json!(1)]);
}

// --- Exec ---

#[tokio::test]
async fn test_exec_add() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    engine.init(7, spec(&specs, "test/add")).await;

    let (_, reply) = engine
        .request(7, "exec", json!({"exec_id": 42, "time": 0, "inputs": [2, 3]}))
        .await;
    match reply.reply {
        Reply::ExecOk(exec) => {
            assert_eq!(exec.exec_id, 42);
            assert_eq!(exec.outputs, vec![json!(5)]);
        }
        other => panic!("expected exec_ok, got {:?}", other),
    }
}

#[tokio::test]
async fn test_counter_keeps_state_per_instance() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    let counter = spec(&specs, "test/counter");
    engine.init(1, counter).await;
    engine.init(2, counter).await;

    assert_eq!(outputs(engine.exec(1, json!([])).await), vec![json!(1)]);
    assert_eq!(outputs(engine.exec(1, json!([])).await), vec![json!(2)]);
    assert_eq!(outputs(engine.exec(2, json!([])).await), vec![json!(1)]);
    assert_eq!(outputs(engine.exec(1, json!([])).await), vec![json!(3)]);
}

#[tokio::test]
async fn test_tuple_output() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    let split = spec(&specs, "test/split");
    let labels: Vec<&str> = split.outputs.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(labels, vec!["", "out1", "out2"]);

    engine.init(3, split).await;
    let out = outputs(engine.exec(3, json!(["hello world"])).await);
    assert_eq!(out, vec![json!("hello"), json!("world")]);
}

#[tokio::test]
async fn test_state_survives_failed_execs() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    engine.init(4, spec(&specs, "test/flaky_counter")).await;

    assert_eq!(outputs(engine.exec(4, json!(["ok"])).await), vec![json!(1)]);
    match engine.exec(4, json!(["bail"])).await {
        Reply::Error(msg) => assert!(msg.contains("asked to fail at 2"), "{}", msg),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(outputs(engine.exec(4, json!(["ok"])).await), vec![json!(3)]);
    match engine.exec(4, json!(["panic"])).await {
        Reply::Error(msg) => assert!(msg.contains("asked to panic at 4"), "{}", msg),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(outputs(engine.exec(4, json!(["ok"])).await), vec![json!(5)]);
}

#[tokio::test]
async fn test_exec_unknown_instance_leaves_others_alone() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    engine.init(1, spec(&specs, "test/counter")).await;
    engine.exec(1, json!([])).await;

    assert_eq!(engine.exec(99, json!([])).await, Reply::Error("node 99 is not initialized".into()));
    assert_eq!(outputs(engine.exec(1, json!([])).await), vec![json!(2)]);
}

#[tokio::test]
async fn test_node_error_then_recovery() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    engine.init(5, spec(&specs, "test/non_negative")).await;

    match engine.exec(5, json!([-1])).await {
        Reply::Error(msg) => assert!(msg.contains("negative input -1"), "{}", msg),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(outputs(engine.exec(5, json!([4])).await), vec![json!(4)]);
}

#[tokio::test]
async fn test_panic_becomes_error_reply() {
    let (mut engine, host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    engine.init(1, spec(&specs, "test/explode")).await;
    engine.init(2, spec(&specs, "test/add")).await;

    match engine.exec(1, json!([])).await {
        Reply::Error(msg) => assert!(msg.contains("kaboom"), "{}", msg),
        other => panic!("expected error, got {:?}", other),
    }
    assert_eq!(outputs(engine.exec(2, json!([1, 1])).await), vec![json!(2)]);
    assert!(!host.is_finished());
}

#[tokio::test]
async fn test_debug_messages_precede_reply() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    engine.init(4, spec(&specs, "test/feedback")).await;

    let (debug, reply) = engine
        .request(4, "exec", json!({"exec_id": 1, "inputs": ["ping"]}))
        .await;
    assert_eq!(
        debug,
        vec![
            OutgoingMessage::debug(Some(4), "got ping"),
            OutgoingMessage::debug(Some(4), "done"),
        ]
    );
    assert_eq!(outputs(reply.reply), vec![json!(4)]);
}

#[tokio::test]
async fn test_async_node() {
    let (mut engine, _host) = Engine::connect(registry());
    let specs = engine.discovery().await;
    engine.init(6, spec(&specs, "test/Doubler")).await;

    let (debug, reply) = engine
        .request(6, "exec", json!({"exec_id": 1, "inputs": [1.5]}))
        .await;
    assert_eq!(debug, vec![OutgoingMessage::debug(Some(6), "doubled after sleeping")]);
    assert_eq!(outputs(reply.reply), vec![json!(3.0)]);
}

// --- Connections ---

#[tokio::test]
async fn test_instances_are_per_connection() {
    let registry = registry();
    let (mut a, _host_a) = Engine::connect(Arc::clone(&registry));
    let (mut b, _host_b) = Engine::connect(registry);
    let specs = a.discovery().await;

    a.init(1, spec(&specs, "test/counter")).await;
    a.exec(1, json!([])).await;

    assert!(matches!(b.exec(1, json!([])).await, Reply::Error(_)));
    b.init(1, spec(&specs, "test/counter")).await;
    assert_eq!(outputs(b.exec(1, json!([])).await), vec![json!(1)]);
    assert_eq!(outputs(a.exec(1, json!([])).await), vec![json!(2)]);
}

#[tokio::test]
async fn test_session_ends_when_peer_closes() {
    let (engine, host) = Engine::connect(registry());
    drop(engine);
    let result = tokio::time::timeout(Duration::from_secs(5), host).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_serves_over_websocket() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(registry(), ServerConfig::default());
    let serving = tokio::spawn(async move { server.serve(listener).await });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
        .await
        .unwrap();

    socket
        .send(Message::Text(json!({"id": 1, "discovery": {}}).to_string()))
        .await
        .unwrap();
    let Some(Ok(Message::Text(text))) = socket.next().await else {
        panic!("expected a text frame");
    };
    let reply = OutgoingMessage::decode(text.as_bytes()).unwrap();
    assert_eq!(reply.id, 1);
    assert!(matches!(reply.reply, Reply::DiscoveryOk(_)));

    socket.close(None).await.unwrap();
    serving.abort();
}
