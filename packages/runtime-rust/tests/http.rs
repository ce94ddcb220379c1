//! Client and server over a real socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{admin, anonymous, server};
use jsonwebtoken::{encode, EncodingKey, Header};
use tandem_core::{OperationError, PayloadFormat};
use tandem_runtime::demo::People;
use tandem_runtime::network::Claims;
use tandem_runtime::{forwarding_core, HttpTransport, NetworkConfig, NetworkModule, RuntimeConfig};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SECRET: &str = "integration-secret";

struct Running {
    base_url: String,
    stop: oneshot::Sender<()>,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn start(format: PayloadFormat, jwt_secret: Option<&str>) -> (common::Server, Running) {
    let server = server(format);
    let mut network = NetworkModule::new(NetworkConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        jwt_secret: jwt_secret.map(str::to_string),
        drain_timeout: Duration::from_secs(2),
        ..NetworkConfig::default()
    });
    network.attach(Arc::clone(&server.runtime.endpoint));
    network.attach_events(server.runtime.events.clone(), Duration::from_secs(2));
    let port = network.start().await.unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(network.serve(async move {
        let _ = stopped.await;
    }));
    // serve() flips the health state to Ready before accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let running = Running {
        base_url: format!("http://127.0.0.1:{port}"),
        stop,
        task,
    };
    (server, running)
}

fn people(base_url: &str, format: PayloadFormat, bearer: Option<String>) -> People {
    let mut transport = HttpTransport::new(base_url);
    if let Some(token) = bearer {
        transport = transport.with_bearer(token);
    }
    let core = forwarding_core(
        &RuntimeConfig {
            node_id: "client".to_string(),
            format,
            ..RuntimeConfig::default()
        },
        Arc::new(common::table()),
        common::client_gate(),
        Arc::new(transport),
        &CancellationToken::new(),
    );
    People::new(Arc::new(core))
}

fn token(sub: &str, roles: &[&str]) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        roles: roles.iter().map(|role| (*role).to_string()).collect(),
        exp: None,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn stop(running: Running) {
    running.stop.send(()).unwrap();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn person_lifecycle_over_http() {
    for format in [PayloadFormat::Ordinal, PayloadFormat::Named] {
        let (server, running) = start(format, Some(SECRET)).await;
        let people = people(&running.base_url, format, Some(token("alice", &["admin"])));
        let ctx = admin("client");

        let person = people.create("Grace", &ctx, CancellationToken::new()).await.unwrap();
        let saved = people.save(person, &ctx, CancellationToken::new()).await.unwrap().unwrap();
        let fetched = people.fetch(saved.id, &ctx, CancellationToken::new()).await.unwrap();
        assert_eq!(fetched.name, "Grace");
        assert_eq!(people.count(&ctx, CancellationToken::new()).await.unwrap(), 1);
        assert_eq!(server.store.writes(), 1);

        stop(running).await;
    }
}

#[tokio::test]
async fn principal_comes_from_the_bearer_token() {
    let (server, running) = start(PayloadFormat::Ordinal, Some(SECRET)).await;
    let ctx = admin("client");

    // No token: the server sees an anonymous caller.
    let anonymous_client = people(&running.base_url, PayloadFormat::Ordinal, None);
    let person = anonymous_client.create("Grace", &ctx, CancellationToken::new()).await.unwrap();
    let err = anonymous_client.save(person.clone(), &ctx, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, OperationError::NotAuthorized { .. }));

    // A forged token is rejected before dispatch.
    let forged = people(&running.base_url, PayloadFormat::Ordinal, Some("not.a.jwt".to_string()));
    let err = forged.save(person.clone(), &ctx, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, OperationError::Transport { .. }));

    let signed_in = people(&running.base_url, PayloadFormat::Ordinal, Some(token("bob", &[])));
    assert!(signed_in.save(person, &ctx, CancellationToken::new()).await.unwrap().is_some());
    assert_eq!(server.store.writes(), 1);

    stop(running).await;
}

#[tokio::test]
async fn health_reports_ready_then_shutdown_drains_events() {
    let (server, running) = start(PayloadFormat::Named, None).await;

    let health: serde_json::Value = reqwest::get(format!("{}/health", running.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["state"], "ready");
    assert_eq!(health["node_id"], "server");

    let people = people(&running.base_url, PayloadFormat::Named, None);
    let mut handle = people.audit("over http", &anonymous("client")).unwrap();
    handle.finished().await;

    stop(running).await;
    assert_eq!(server.runtime.events.pending_count(), 0);
    assert_eq!(server.audit.entries(), ["over http"]);
}

#[tokio::test]
async fn unreachable_peer_is_a_transport_error() {
    let people = people("http://127.0.0.1:9", PayloadFormat::Ordinal, None);
    let err = people.count(&admin("client"), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, OperationError::Transport { .. }));
}
