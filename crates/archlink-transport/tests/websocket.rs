//! Integration tests for the WebSocket connector.
//!
//! These tests spin up a real loopback WebSocket server (raw
//! `tokio-tungstenite`) and connect to it through [`WebSocketConnector`],
//! so frames really travel over TCP.

#[cfg(feature = "websocket")]
mod websocket {
    use archlink_transport::{
        Connection, Connector, TransportError, WebSocketConnector,
    };
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on a random port and returns it with its address.
    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        (listener, addr)
    }

    async fn accept(listener: TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_connector_send_and_receive_text_frames() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(accept(listener));

        let conn = WebSocketConnector
            .connect(&format!("ws://{addr}"))
            .await
            .expect("should open");
        let mut server_ws = server.await.expect("task should complete");

        assert!(conn.id().into_inner() > 0);

        // --- Client sends, server receives ---
        conn.send(r#"[{"cmd":"Sync"}]"#)
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.to_text().unwrap(), r#"[{"cmd":"Sync"}]"#);

        // --- Server sends, client receives ---
        server_ws
            .send(Message::text(r#"[{"cmd":"RoomInfo"}]"#))
            .await
            .unwrap();
        let frame = conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(frame, br#"[{"cmd":"RoomInfo"}]"#);

        conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_connector_send_is_not_blocked_by_pending_recv() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(accept(listener));

        let conn = std::sync::Arc::new(
            WebSocketConnector
                .connect(&format!("ws://{addr}"))
                .await
                .expect("should open"),
        );
        let mut server_ws = server.await.unwrap();

        // Park a reader on the connection; nothing will arrive for it yet.
        let reader = {
            let conn = std::sync::Arc::clone(&conn);
            tokio::spawn(async move { conn.recv().await })
        };
        tokio::task::yield_now().await;

        conn.send("[]").await.expect("send should not wait for recv");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.to_text().unwrap(), "[]");

        server_ws.send(Message::Close(None)).await.unwrap();
        let result = reader.await.unwrap().expect("recv should not error");
        assert!(result.is_none(), "close frame ends the stream");
    }

    #[tokio::test]
    async fn test_connector_binary_frames_are_accepted() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(accept(listener));

        let conn = WebSocketConnector
            .connect(&format!("ws://{addr}"))
            .await
            .unwrap();
        let mut server_ws = server.await.unwrap();

        server_ws
            .send(Message::Binary(b"[1,2]".to_vec().into()))
            .await
            .unwrap();
        let frame = conn.recv().await.unwrap().unwrap();
        assert_eq!(frame, b"[1,2]");
    }

    #[tokio::test]
    async fn test_connector_unreachable_port_fails_to_open() {
        // Grab a free port, then release it so nothing listens there.
        let (listener, addr) = listener().await;
        drop(listener);

        let url = format!("ws://{addr}");
        let result = WebSocketConnector.connect(&url).await;

        assert!(
            matches!(result, Err(TransportError::OpenFailed { url: ref u, .. }) if *u == url),
            "expected OpenFailed"
        );
    }
}
