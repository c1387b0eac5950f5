use std::sync::Arc;
use std::time::Duration;

use camstream::capture::{self, FrameSource, PixelFormat};
use camstream::hardware::CameraHardware;
use camstream::server::{self, AppState};
use camstream::stream::{SessionState, StreamSession, WriterSink};
use camstream::Config;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn small_camera(format: PixelFormat) -> Config {
    let mut config = Config::default();
    config.capture.width = 64;
    config.capture.height = 48;
    config.capture.format = format;
    config.sensor.settle_ms = 0;
    config
}

fn open(config: &Config) -> (Arc<dyn FrameSource>, Arc<CameraHardware>) {
    let (source, sensor) = capture::open(&config.capture).unwrap();
    let hardware = Arc::new(CameraHardware::new(sensor, config.sensor.clone()));
    (source, hardware)
}

/// Read from `reader` until `needle` has been seen `times` times.
async fn read_until<R: AsyncRead + Unpin>(reader: &mut R, needle: &[u8], times: usize) -> Vec<u8> {
    let mut seen = Vec::new();
    let mut buf = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(10), async {
        while seen.windows(needle.len()).filter(|w| *w == needle).count() < times {
            let n = reader.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream ended early");
            seen.extend_from_slice(&buf[..n]);
        }
    })
    .await
    .expect("timed out waiting for stream data");
    seen
}

async fn serve(config: Config) -> (std::net::SocketAddr, Arc<CameraHardware>) {
    let (source, hardware) = open(&config);
    let app = server::router(AppState {
        source,
        hardware: hardware.clone(),
        config: Arc::new(config),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });
    (addr, hardware)
}

async fn get(addr: std::net::SocketAddr, path: &str) -> TcpStream {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: camstream\r\nConnection: close\r\n\r\n");
    socket.write_all(request.as_bytes()).await.unwrap();
    socket
}

#[tokio::test]
async fn http_stream_serves_multipart_jpegs() {
    let (addr, hardware) = serve(small_camera(PixelFormat::Yuyv)).await;

    let mut socket = get(addr, "/stream").await;
    let seen = read_until(&mut socket, b"--jpgboundary\r\n", 3).await;
    let text = String::from_utf8_lossy(&seen).to_lowercase();

    assert!(text.starts_with("http/1.1 200 ok\r\n"));
    assert!(text.contains("content-type: multipart/x-mixed-replace; boundary=jpgboundary\r\n"));
    assert!(text.contains("access-control-allow-origin: *\r\n"));
    assert!(text.contains("content-type: image/jpeg\r\ncontent-length: "));
    assert!(seen.windows(2).any(|w| w == [0xFF, 0xD8]));
    assert!(hardware.is_configured());
}

#[tokio::test]
async fn control_page_and_file_list() {
    let storage = tempfile::tempdir().unwrap();
    std::fs::write(storage.path().join("clip.jpg"), [0u8; 42]).unwrap();

    let mut config = small_camera(PixelFormat::Mjpeg);
    config.storage.root = Some(storage.path().to_path_buf());
    let (addr, _) = serve(config).await;

    let mut page = Vec::new();
    get(addr, "/").await.read_to_end(&mut page).await.unwrap();
    let page = String::from_utf8(page).unwrap();
    assert!(page.contains("<img src=\"/stream\""));
    assert!(page.contains("'/stream?' + Date.now()"));

    let mut list = Vec::new();
    get(addr, "/files").await.read_to_end(&mut list).await.unwrap();
    let list = String::from_utf8(list).unwrap();
    assert!(list.contains("<li>clip.jpg (42 bytes)</li>"));
}

#[tokio::test]
async fn writer_session_ends_cleanly_when_the_client_hangs_up() {
    let config = small_camera(PixelFormat::Mjpeg);
    let (source, hardware) = open(&config);
    let (client, server) = tokio::io::duplex(1 << 16);

    let session = StreamSession::new(WriterSink::new(server), source.clone(), hardware, &config);
    let task = tokio::spawn(session.run());

    let mut client = client;
    let seen = read_until(&mut client, b"--jpgboundary\r\n", 2).await;
    assert!(seen.starts_with(b"HTTP/1.1 200 OK\r\n"));
    drop(client);

    let report = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.state, SessionState::Closed);
    assert!(report.frames_sent >= 1);
    assert_eq!(source.pool().outstanding(), 0);
}

#[tokio::test]
async fn sessions_share_the_frame_pool() {
    let mut config = small_camera(PixelFormat::Mjpeg);
    // A session blocked on a full client buffer still holds its frame
    config.capture.buffer_count = 3;
    let (source, hardware) = open(&config);

    let mut tasks = Vec::new();
    let mut clients = Vec::new();
    for _ in 0..3 {
        let (client, server) = tokio::io::duplex(1 << 16);
        let session = StreamSession::new(
            WriterSink::new(server),
            source.clone(),
            hardware.clone(),
            &config,
        );
        tasks.push(tokio::spawn(session.run()));
        clients.push(client);
    }

    for client in &mut clients {
        read_until(client, b"--jpgboundary\r\n", 2).await;
    }
    drop(clients);

    for task in tasks {
        let report = task.await.unwrap();
        assert_eq!(report.state, SessionState::Closed);
    }
    assert_eq!(source.pool().outstanding(), 0);
}
