use dnsproxy::client::{DnsClient, PlainClient};
use dnsproxy::types::{Header, ResourceRecord};
use dnsproxy::{default_clients, wire, DnsClass, DnsUpstream, Message, Rcode, RecordType, ResolveError, UpstreamPool};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

fn answer(query: &Message, rcode: Rcode, truncated: bool) -> Vec<u8> {
    let response = query.to_response(rcode);
    let response = response.with_header(Header { tc: truncated, ..*response.header() });
    let response = if rcode == Rcode::NoError && !truncated {
        response.with_answers(vec![ResourceRecord::a(query.qname(), 120, Ipv4Addr::new(203, 0, 113, 7))])
    } else {
        response
    };
    wire::encode(&response).unwrap()
}

/// UDP responder answering every datagram with `rcode`, optionally truncated.
async fn udp_server(rcode: Rcode, truncated: bool) -> (SocketAddr, Arc<AtomicUsize>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    udp_server_on(socket, rcode, truncated)
}

fn udp_server_on(socket: UdpSocket, rcode: Rcode, truncated: bool) -> (SocketAddr, Arc<AtomicUsize>) {
    let addr = socket.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else { break };
            counter.fetch_add(1, Ordering::SeqCst);
            let query = wire::decode(&buf[..len]).unwrap();
            socket.send_to(&answer(&query, rcode, truncated), src).await.unwrap();
        }
    });
    (addr, hits)
}

fn tcp_server_on(listener: TcpListener) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await.unwrap();
            let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            stream.read_exact(&mut query).await.unwrap();

            let body = answer(&wire::decode(&query).unwrap(), Rcode::NoError, false);
            let mut reply = (body.len() as u16).to_be_bytes().to_vec();
            reply.extend_from_slice(&body);
            stream.write_all(&reply).await.unwrap();
        }
    });
    hits
}

fn pool(upstreams: Vec<DnsUpstream>) -> UpstreamPool {
    UpstreamPool::new(upstreams, default_clients().unwrap()).with_client_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_response_echoes_question() {
    let (addr, _) = udp_server(Rcode::NoError, false).await;
    let pool = pool(vec![DnsUpstream::parse(&format!("udp://{}", addr)).unwrap()]);

    let request = Message::query("google.fr", RecordType::A, DnsClass::IN).with_id(0x1234);
    let resource = pool.resolve(&request).await.unwrap();

    assert!(resource.response.header().qr);
    assert_eq!(resource.response.id(), 0x1234);
    assert_eq!(resource.response.queries(), request.queries());
    assert_eq!(resource.client.name(), "plain");
    assert_eq!(resource.response.answers()[0].ip_addr(), Some(Ipv4Addr::new(203, 0, 113, 7).into()));
    assert_eq!(resource.cache_max_age(), Some(120));
}

#[tokio::test]
async fn test_truncated_udp_falls_back_to_tcp_once() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let socket = UdpSocket::bind(("127.0.0.1", port)).await.unwrap();
    let (addr, udp_hits) = udp_server_on(socket, Rcode::NoError, true);
    let tcp_hits = tcp_server_on(listener);

    let upstream = DnsUpstream::parse(&format!("udp://{}", addr)).unwrap();
    let request = Message::query("big.example", RecordType::TXT, DnsClass::IN).with_id(77);
    let response = PlainClient::new().query(&upstream, &request, Duration::from_secs(2)).await.unwrap();

    assert!(!response.is_truncated());
    assert_eq!(response.answers().len(), 1);
    assert_eq!(udp_hits.load(Ordering::SeqCst), 1);
    assert_eq!(tcp_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_nxdomain_upstream_is_skipped() {
    let (nx_addr, nx_hits) = udp_server(Rcode::NxDomain, false).await;
    let (ok_addr, ok_hits) = udp_server(Rcode::NoError, false).await;
    let pool = pool(vec![
        DnsUpstream::parse(&format!("udp://{}", nx_addr)).unwrap().with_code("nx"),
        DnsUpstream::parse(&format!("udp://{}", ok_addr)).unwrap().with_code("ok"),
    ]);

    let request = Message::query("maybe.example", RecordType::A, DnsClass::IN).with_id(5);
    let resource = pool.resolve(&request).await.unwrap();
    assert_eq!(resource.upstream.code(), "ok");
    assert_eq!(resource.response.rcode(), Rcode::NoError);
    assert_eq!(nx_hits.load(Ordering::SeqCst), 1);
    assert_eq!(ok_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dot_stamp_is_not_supported() {
    let (ok_addr, ok_hits) = udp_server(Rcode::NoError, false).await;
    let pool = pool(vec![
        DnsUpstream::parse("tls://1.1.1.1:853").unwrap(),
        DnsUpstream::parse(&format!("udp://{}", ok_addr)).unwrap(),
    ]);

    let request = Message::query("example.com", RecordType::A, DnsClass::IN);
    let err = pool.resolve(&request).await.unwrap_err();
    assert!(matches!(err, ResolveError::UpstreamNotSupported(_)));
    assert_eq!(ok_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_upstreams_are_listed() {
    let silent_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let silent_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let pool = UpstreamPool::new(
        vec![
            DnsUpstream::parse(&format!("udp://{}", silent_a.local_addr().unwrap())).unwrap().with_code("a"),
            DnsUpstream::parse(&format!("udp://{}", silent_b.local_addr().unwrap())).unwrap().with_code("b"),
        ],
        default_clients().unwrap(),
    )
    .with_client_timeout(Duration::from_millis(200));

    let request = Message::query("example.com", RecordType::A, DnsClass::IN);
    match pool.resolve(&request).await {
        Err(ResolveError::UnableToResolve { upstreams, failures }) => {
            assert_eq!(upstreams, vec!["a", "b"]);
            assert_eq!(failures.len(), 2);
            assert!(failures[0].starts_with("a via plain"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
