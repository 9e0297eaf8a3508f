use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use lettre::{SmtpTransport, Transport};
use mail_sink::{SinkConfig, SinkServer};
use std::error::Error;
use std::fs;
use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn lettre_attachment_is_saved() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let server = SinkServer::with_listener(
        listener,
        SinkConfig::new("localhost")
            .with_save_attachments(true)
            .with_attachment_dir(dir.path()),
    )?;
    let stats = server.stats();
    let shutdown = server.shutdown_handle()?;
    let running = thread::spawn(move || server.run().expect("server run failed"));

    let report: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();

    let message = Message::builder()
        .from("花子 <hanako@example.com>".parse::<Mailbox>()?)
        .to("太郎 <tarou@example.com>".parse::<Mailbox>()?)
        .subject("月次レポート")
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain("添付をご確認ください".to_owned()))
                .singlepart(
                    Attachment::new("report.bin".to_owned())
                        .body(report.clone(), ContentType::parse("application/octet-stream").unwrap()),
                ),
        )?;

    let mailer = SmtpTransport::builder_dangerous("127.0.0.1")
        .port(port)
        .build();

    mailer.send(&message)?;

    // The body is handed to the workers just after the 250 reply
    let deadline = Instant::now() + Duration::from_secs(5);
    while stats.attachments_saved() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    shutdown.shutdown();
    running.join().expect("server thread panicked");

    assert_eq!(fs::read(dir.path().join("report.bin"))?, report);
    assert_eq!(stats.messages_received(), 1);
    assert_eq!(stats.attachments_saved(), 1);

    Ok(())
}
