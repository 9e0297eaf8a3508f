//! Integration tests for the protocol exchange and attachment capture over TCP

use mail_sink::{ShutdownHandle, SinkConfig, SinkServer, SinkStats};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;

struct TestServer {
    addr: String,
    stats: Arc<SinkStats>,
    shutdown: ShutdownHandle,
    running: thread::JoinHandle<()>,
}

impl TestServer {
    /// Stop the server; returns once queued attachments are on disk
    fn stop(self) {
        self.shutdown.shutdown();
        self.running.join().unwrap();
    }
}

fn start_test_server(config: SinkConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let server = SinkServer::with_listener(listener, config).unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let stats = server.stats();
    let shutdown = server.shutdown_handle().unwrap();

    // Start server in background thread
    let running = thread::spawn(move || {
        if let Err(e) = server.run() {
            eprintln!("Error running server: {e}");
        }
    });

    TestServer {
        addr,
        stats,
        shutdown,
        running,
    }
}

fn saving_config(dir: &Path) -> SinkConfig {
    SinkConfig::new("test.local")
        .with_save_attachments(true)
        .with_attachment_dir(dir)
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: &str) -> (Self, String) {
        let stream = TcpStream::connect(addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        let mut client = Self { stream, reader };
        let greeting = client.read_reply();
        (client, greeting)
    }

    fn read_reply(&mut self) -> String {
        let mut response = String::new();
        self.reader.read_line(&mut response).unwrap();
        response.trim_end().to_string()
    }

    fn send_line(&mut self, line: &str) {
        write!(self.stream, "{line}\r\n").unwrap();
        self.stream.flush().unwrap();
    }

    fn send_command(&mut self, command: &str) -> String {
        self.send_line(command);
        self.read_reply()
    }
}

#[test]
fn test_greeting_names_hostname() {
    let server = start_test_server(SinkConfig::new("mx.example.org"));

    let (mut client, greeting) = Client::connect(&server.addr);
    assert_eq!(greeting, "220 mx.example.org SMTP mail-sink");
    assert_eq!(client.send_command("QUIT"), "221 Bye");

    server.stop();
}

#[test]
fn test_unrecognized_commands_are_accepted() {
    let server = start_test_server(SinkConfig::new("test.local"));
    let (mut client, _) = Client::connect(&server.addr);

    for command in [
        "HELO test",
        "EHLO client.local",
        "MAIL FROM:<sender@example.com>",
        "RCPT TO:<recipient@example.com>",
        "RSET",
        "VRFY somebody",
        "AUTH LOGIN",
        "STARTTLS",
        "complete nonsense",
        "",
    ] {
        assert_eq!(client.send_command(command), "250 Ok", "command {command:?}");
    }

    assert_eq!(client.send_command("quit"), "221 Bye");
    server.stop();
}

#[test]
fn test_data_exchange_saves_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(saving_config(dir.path()));
    let (mut client, _) = Client::connect(&server.addr);

    assert_eq!(client.send_command("HELO test"), "250 Ok");
    assert_eq!(
        client.send_command("DATA"),
        "354 End data with <CR><LF>.<CR><LF>."
    );
    client.send_line("Content-Disposition: attachment; filename=\"a.txt\"");
    client.send_line("Content-Transfer-Encoding: base64");
    client.send_line("aGVsbG8=");
    client.send_line("--boundary--");
    assert_eq!(client.send_command("."), "250 Ok, queued as 31337");
    assert_eq!(client.send_command("QUIT"), "221 Bye");

    let stats = Arc::clone(&server.stats);
    server.stop();

    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
    assert_eq!(stats.accepted_connections(), 1);
    assert_eq!(stats.messages_received(), 1);
    assert_eq!(stats.attachments_saved(), 1);
}

#[test]
fn test_multiline_payload_in_mime_message() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(saving_config(dir.path()));
    let (mut client, _) = Client::connect(&server.addr);

    let payload: Vec<u8> = (0..=255u8).cycle().take(600).collect();
    // 76 column base64, the way mail clients wrap it
    let encoded = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&payload)
    };

    client.send_command("MAIL FROM:<a@example.com>");
    client.send_command("RCPT TO:<b@example.com>");
    assert!(client.send_command("DATA").starts_with("354"));
    client.send_line("Subject: report");
    client.send_line("MIME-Version: 1.0");
    client.send_line("Content-Type: multipart/mixed; boundary=\"XYZ\"");
    client.send_line("");
    client.send_line("--XYZ");
    client.send_line("Content-Type: text/plain");
    client.send_line("");
    client.send_line("See attached.");
    client.send_line("--XYZ");
    client.send_line("Content-Type: application/octet-stream; name=\"data.bin\"");
    client.send_line("Content-Disposition: attachment; filename=\"data.bin\"");
    client.send_line("Content-Transfer-Encoding: base64");
    client.send_line("");
    for chunk in encoded.as_bytes().chunks(76) {
        client.send_line(std::str::from_utf8(chunk).unwrap());
    }
    client.send_line("--XYZ--");
    assert_eq!(client.send_command("."), "250 Ok, queued as 31337");
    client.send_command("QUIT");

    server.stop();
    assert_eq!(fs::read(dir.path().join("data.bin")).unwrap(), payload);
}

#[test]
fn test_invalid_base64_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(saving_config(dir.path()));
    let (mut client, _) = Client::connect(&server.addr);

    client.send_command("DATA");
    client.send_line("filename=\"broken.bin\"");
    client.send_line("Content-Transfer-Encoding: base64");
    client.send_line("this is !!! not base64");
    client.send_line("--b--");
    assert_eq!(client.send_command("."), "250 Ok, queued as 31337");

    // Session carries on normally
    assert_eq!(client.send_command("NOOP"), "250 Ok");
    assert_eq!(client.send_command("QUIT"), "221 Bye");

    server.stop();
    assert!(!dir.path().join("broken.bin").exists());
}

#[test]
fn test_missing_filename_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(saving_config(dir.path()));
    let (mut client, _) = Client::connect(&server.addr);

    client.send_command("DATA");
    client.send_line("Content-Transfer-Encoding: base64");
    client.send_line("aGVsbG8=");
    client.send_line("--b--");
    client.send_command(".");
    client.send_command("QUIT");

    server.stop();
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_saving_disabled_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(
        SinkConfig::new("test.local").with_attachment_dir(dir.path()),
    );
    let (mut client, _) = Client::connect(&server.addr);

    client.send_command("DATA");
    client.send_line("filename=\"a.txt\"");
    client.send_line("Content-Transfer-Encoding: base64");
    client.send_line("aGVsbG8=");
    assert_eq!(client.send_command("."), "250 Ok, queued as 31337");
    client.send_command("QUIT");

    server.stop();
    assert!(!dir.path().join("a.txt").exists());
}

#[test]
fn test_body_lines_get_no_reply() {
    let server = start_test_server(SinkConfig::new("test.local"));
    let (mut client, _) = Client::connect(&server.addr);

    assert!(client.send_command("DATA").starts_with("354"));
    client.send_line("HELO inside the body");
    client.send_line("DATA");
    client.send_line("..");
    // The only reply is the one for the terminating dot
    assert_eq!(client.send_command("."), "250 Ok, queued as 31337");
    assert_eq!(client.send_command("HELO after"), "250 Ok");
    client.send_command("QUIT");

    server.stop();
}

#[test]
fn test_quit_during_body_capture() {
    let server = start_test_server(SinkConfig::new("test.local"));
    let (mut client, _) = Client::connect(&server.addr);

    client.send_command("DATA");
    client.send_line("unfinished");
    assert_eq!(client.send_command("QUIT"), "221 Bye");

    // Connection is closed by the server
    let mut rest = String::new();
    assert_eq!(client.reader.read_line(&mut rest).unwrap(), 0);

    server.stop();
}

#[test]
fn test_multiple_messages_per_connection() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(saving_config(dir.path()));
    let (mut client, _) = Client::connect(&server.addr);

    for (name, encoded) in [("one.txt", "b25l"), ("two.txt", "dHdv")] {
        client.send_command("DATA");
        client.send_line(&format!("filename=\"{name}\""));
        client.send_line("Content-Transfer-Encoding: base64");
        client.send_line(encoded);
        assert_eq!(client.send_command("."), "250 Ok, queued as 31337");
    }
    client.send_command("QUIT");

    let stats = Arc::clone(&server.stats);
    server.stop();
    assert_eq!(fs::read(dir.path().join("one.txt")).unwrap(), b"one");
    assert_eq!(fs::read(dir.path().join("two.txt")).unwrap(), b"two");
    assert_eq!(stats.messages_received(), 2);
}

#[test]
fn test_concurrent_connections() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_test_server(saving_config(dir.path()));

    let clients: Vec<_> = (0..8)
        .map(|i| {
            let addr = server.addr.clone();
            thread::spawn(move || {
                let (mut client, greeting) = Client::connect(&addr);
                assert!(greeting.starts_with("220"));
                assert_eq!(client.send_command(&format!("HELO client{i}")), "250 Ok");
                client.send_command("DATA");
                client.send_line(&format!("filename=\"file{i}.txt\""));
                client.send_line("Content-Transfer-Encoding: base64");
                client.send_line("eA==");
                client.send_line("--b--");
                assert_eq!(client.send_command("."), "250 Ok, queued as 31337");
                assert_eq!(client.send_command("QUIT"), "221 Bye");
            })
        })
        .collect();

    // A stalled client does not hold anybody else up
    let (_idle, _) = Client::connect(&server.addr);

    for client in clients {
        client.join().unwrap();
    }

    let stats = Arc::clone(&server.stats);
    server.stop();

    for i in 0..8 {
        assert_eq!(fs::read(dir.path().join(format!("file{i}.txt"))).unwrap(), b"x");
    }
    assert_eq!(stats.accepted_connections(), 9);
}
