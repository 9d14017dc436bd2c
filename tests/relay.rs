//! End-to-end tests that exercise the public API the way a real deployment
//! would: build a `Config`, bind a `Server`, and talk to it over real
//! sockets.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ss_relay::cipher::CipherMethod;
use ss_relay::config::Config;
use ss_relay::server::Server;

async fn spawn_echo_upstream() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut sock, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match sock.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if sock.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

fn args(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn full_stack_relays_bytes_through_the_public_api() {
    let upstream_addr = spawn_echo_upstream().await;

    let port_probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_port = port_probe.local_addr().unwrap().port();
    drop(port_probe);

    let config = Config::from_args(args(&[
        "-s",
        "127.0.0.1",
        "-p",
        &relay_port.to_string(),
        "-k",
        "integration-test-password",
        "-m",
        "rc4",
        "-t",
        "5",
    ]))
    .unwrap();

    let server = Server::bind(&config).await.unwrap();
    let metrics = server.metrics();
    tokio::spawn(server.serve());

    // Give the acceptor task a moment to start its accept loop.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut client = TcpStream::connect(("127.0.0.1", relay_port)).await.unwrap();

    let cipher = CipherMethod::new("rc4", "integration-test-password").unwrap();
    let (mut enc, mut dec) = cipher.new_contexts();

    let ip = match upstream_addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => panic!("expected an IPv4 loopback address"),
    };
    let mut header = vec![1u8];
    header.extend_from_slice(&ip.octets());
    header.extend_from_slice(&upstream_addr.port().to_be_bytes());

    let payload = b"the quick brown fox".to_vec();
    let mut wire = header;
    wire.extend_from_slice(&payload);
    enc.encrypt(&mut wire);
    client.write_all(&wire).await.unwrap();

    let mut response = vec![0u8; payload.len()];
    client.read_exact(&mut response).await.unwrap();
    dec.decrypt(&mut response);
    assert_eq!(response, payload);

    // The session is still live from the relay's point of view until the
    // client drops its half of the connection.
    assert!(metrics.total_connections() >= 1);
}

#[tokio::test]
async fn multiple_payloads_in_one_session_round_trip_in_order() {
    let upstream_addr = spawn_echo_upstream().await;

    let port_probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_port = port_probe.local_addr().unwrap().port();
    drop(port_probe);

    let config = Config::from_args(args(&[
        "-s",
        "127.0.0.1",
        "-p",
        &relay_port.to_string(),
        "-k",
        "another-password",
        "-m",
        "table",
    ]))
    .unwrap();

    let server = Server::bind(&config).await.unwrap();
    tokio::spawn(server.serve());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut client = TcpStream::connect(("127.0.0.1", relay_port)).await.unwrap();
    let cipher = CipherMethod::new("table", "another-password").unwrap();
    let (mut enc, mut dec) = cipher.new_contexts();

    let ip = match upstream_addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => panic!("expected an IPv4 loopback address"),
    };
    let mut header = vec![1u8];
    header.extend_from_slice(&ip.octets());
    header.extend_from_slice(&upstream_addr.port().to_be_bytes());
    enc.encrypt(&mut header);
    client.write_all(&header).await.unwrap();

    for chunk in [&b"first chunk"[..], &b"second chunk"[..], &b"third chunk"[..]] {
        let mut wire = chunk.to_vec();
        enc.encrypt(&mut wire);
        client.write_all(&wire).await.unwrap();

        let mut response = vec![0u8; chunk.len()];
        client.read_exact(&mut response).await.unwrap();
        dec.decrypt(&mut response);
        assert_eq!(response, chunk);
    }
}

#[tokio::test]
async fn domain_name_header_resolves_and_connects() {
    let upstream_addr = spawn_echo_upstream().await;

    let port_probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let relay_port = port_probe.local_addr().unwrap().port();
    drop(port_probe);

    let config = Config::from_args(args(&[
        "-s",
        "127.0.0.1",
        "-p",
        &relay_port.to_string(),
        "-k",
        "domain-test-password",
        "-m",
        "rc4",
    ]))
    .unwrap();

    let server = Server::bind(&config).await.unwrap();
    tokio::spawn(server.serve());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut client = TcpStream::connect(("127.0.0.1", relay_port)).await.unwrap();
    let cipher = CipherMethod::new("rc4", "domain-test-password").unwrap();
    let (mut enc, mut dec) = cipher.new_contexts();

    let name = "localhost";
    let mut header = vec![3u8, name.len() as u8];
    header.extend_from_slice(name.as_bytes());
    header.extend_from_slice(&upstream_addr.port().to_be_bytes());

    let payload = b"via domain name".to_vec();
    let mut wire = header;
    wire.extend_from_slice(&payload);
    enc.encrypt(&mut wire);
    client.write_all(&wire).await.unwrap();

    let mut response = vec![0u8; payload.len()];
    client.read_exact(&mut response).await.unwrap();
    dec.decrypt(&mut response);
    assert_eq!(response, payload);
}
