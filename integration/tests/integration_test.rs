//! End-to-end tests of the Modbus TCP slave over real sockets

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use mbslave::server::*;
use mbslave::tcp::TcpFrame;
use mbslave::*;

const UNIT: UnitId = UnitId::new(1);

async fn spawn_server(config: ServerConfig) -> (Server, SocketAddr) {
    let mut server = Server::new(&[UNIT, UnitId::new(2)], config);
    let addr = server
        .listen_tcp(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    (server, addr)
}

async fn request(stream: &mut TcpStream, frame: TcpFrame) -> TcpFrame {
    stream.write_all(&frame.serialize()).await.unwrap();

    let mut bytes = vec![0; 7];
    stream.read_exact(&mut bytes).await.unwrap();
    let length = u16::from_be_bytes([bytes[4], bytes[5]]) as usize;
    let mut body = vec![0; length - 1];
    stream.read_exact(&mut body).await.unwrap();
    bytes.extend_from_slice(&body);

    TcpFrame::decode(&bytes).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn reads_and_writes_over_tcp() {
    let (server, addr) = spawn_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // write single coil ON at 0, then read it back
    let response = request(
        &mut stream,
        TcpFrame::new(1, UNIT, 0x05, &[0x00, 0x00, 0xFF, 0x00]),
    )
    .await;
    assert_eq!(response, TcpFrame::new(1, UNIT, 0x05, &[0x00, 0x00, 0xFF, 0x00]));

    let response = request(
        &mut stream,
        TcpFrame::new(2, UNIT, 0x01, &[0x00, 0x00, 0x00, 0x01]),
    )
    .await;
    assert_eq!(response, TcpFrame::new(2, UNIT, 0x01, &[0x01, 0x01]));

    // write multiple registers, then read them back
    let response = request(
        &mut stream,
        TcpFrame::new(
            3,
            UNIT,
            0x10,
            &[0x00, 0x0A, 0x00, 0x02, 0x04, 0xCA, 0xFE, 0xBE, 0xEF],
        ),
    )
    .await;
    assert_eq!(response.data, &[0x00, 0x0A, 0x00, 0x02]);

    let response = request(
        &mut stream,
        TcpFrame::new(4, UNIT, 0x03, &[0x00, 0x0A, 0x00, 0x02]),
    )
    .await;
    assert_eq!(response.data, &[0x04, 0xCA, 0xFE, 0xBE, 0xEF]);

    // the other device is untouched
    let response = request(
        &mut stream,
        TcpFrame::new(5, UnitId::new(2), 0x03, &[0x00, 0x0A, 0x00, 0x02]),
    )
    .await;
    assert_eq!(response.data, &[0x04, 0x00, 0x00, 0x00, 0x00]);

    server.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn answers_protocol_exceptions() {
    let (server, addr) = spawn_server(ServerConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // unknown unit
    let response = request(&mut stream, TcpFrame::new(1, UnitId::new(9), 0x03, &[])).await;
    assert_eq!(response.function, 0x83);
    assert_eq!(response.data, &[u8::from(ExceptionCode::ServerDeviceFailure)]);

    // unbound function code
    let response = request(&mut stream, TcpFrame::new(2, UNIT, 0x07, &[])).await;
    assert_eq!(response.function, 0x87);
    assert_eq!(response.data, &[u8::from(ExceptionCode::IllegalFunction)]);

    // address range past the end of the table
    let response = request(
        &mut stream,
        TcpFrame::new(3, UNIT, 0x03, &[0xFF, 0xFF, 0x00, 0x02]),
    )
    .await;
    assert_eq!(response.function, 0x83);
    assert_eq!(response.data, &[u8::from(ExceptionCode::IllegalDataAddress)]);

    server.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_handlers_and_transactions() {
    let (server, addr) = spawn_server(ServerConfig::default()).await;

    server
        .register_handler(
            UNIT,
            0x41,
            handler_fn(|store, request| {
                let device = store
                    .get(request.unit_id())
                    .ok_or(ExceptionCode::ServerDeviceFailure)?;
                Ok(device.input_registers()[0].to_be_bytes().to_vec())
            }),
        )
        .await
        .unwrap();
    assert_eq!(
        server
            .register_handler(UnitId::new(3), 0x41, handler_fn(|_, _| Ok(Vec::new())))
            .await,
        Err(Error::Config(ConfigError::UnknownUnitId(UnitId::new(3))))
    );

    server
        .transaction(|store| {
            if let Some(device) = store.get_mut(UNIT) {
                device.input_registers_mut()[0] = 0x1234;
            }
        })
        .await
        .unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let response = request(&mut stream, TcpFrame::new(1, UNIT, 0x41, &[])).await;
    assert_eq!(response, TcpFrame::new(1, UNIT, 0x41, &[0x12, 0x34]));

    server.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_clients_are_serialized() {
    let (server, addr) = spawn_server(ServerConfig::default()).await;

    // increment holding register 0 with a read-modify-write that is not atomic by itself
    server
        .register_handler(
            UNIT,
            0x42,
            handler_fn(|store, _request| {
                let device = store
                    .get_mut(UNIT)
                    .ok_or(ExceptionCode::ServerDeviceFailure)?;
                let value = device.holding_registers()[0];
                std::thread::sleep(Duration::from_micros(20));
                device.holding_registers_mut()[0] = value + 1;
                Ok(Vec::new())
            }),
        )
        .await
        .unwrap();

    let mut clients = Vec::new();
    for client in 0..4u16 {
        clients.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for i in 0..25u16 {
                let tx_id = client * 100 + i;
                let response = request(&mut stream, TcpFrame::new(tx_id, UNIT, 0x42, &[])).await;
                assert_eq!(response.tx_id, tx_id);
            }
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    let value = server
        .transaction(|store| store.get(UNIT).map(|x| x.holding_registers()[0]))
        .await
        .unwrap();
    assert_eq!(value, Some(100));

    server.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oldest_session_is_closed_when_max_sessions_exceeded() {
    let config = ServerConfig {
        max_sessions: 1,
        ..Default::default()
    };
    let (server, addr) = spawn_server(config).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    request(&mut first, TcpFrame::new(1, UNIT, 0x03, &[0x00, 0x00, 0x00, 0x01])).await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    request(&mut second, TcpFrame::new(2, UNIT, 0x03, &[0x00, 0x00, 0x00, 0x01])).await;

    // the first connection was closed by the server
    let mut buffer = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), first.read(&mut buffer))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    server.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn close_stops_listener_and_sessions() {
    let (server, addr) = spawn_server(ServerConfig::default()).await;
    let sender = server.sender();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    request(&mut stream, TcpFrame::new(1, UNIT, 0x03, &[0x00, 0x00, 0x00, 0x01])).await;

    server.close().await;

    // the session was closed
    let mut buffer = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buffer))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    // no new connections are accepted
    assert!(TcpStream::connect(addr).await.is_err());

    // and nothing is dispatched anymore
    let frame = TcpFrame::new(2, UNIT, 0x03, &[0x00, 0x00, 0x00, 0x01]);
    assert_eq!(sender.submit(Box::new(frame)).await, Err(Error::Shutdown));
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_frame_closes_only_that_session() {
    let (server, addr) = spawn_server(ServerConfig::default()).await;

    let mut good = TcpStream::connect(addr).await.unwrap();
    let mut bad = TcpStream::connect(addr).await.unwrap();

    // unknown protocol id
    bad.write_all(&[0x00, 0x01, 0xCA, 0xFE, 0x00, 0x06, 0x01])
        .await
        .unwrap();
    let mut buffer = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(5), bad.read(&mut buffer))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));

    let response = request(
        &mut good,
        TcpFrame::new(1, UNIT, 0x03, &[0x00, 0x00, 0x00, 0x01]),
    )
    .await;
    assert_eq!(response.data, &[0x02, 0x00, 0x00]);

    server.close().await;
}
