use braid::time::sleep;
use braid::{RuntimeBuilder, io, task};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::{Duration, Instant};

fn pair() -> (UnixStream, UnixStream) {
    let (reader, writer) = UnixStream::pair().unwrap();
    reader.set_nonblocking(true).unwrap();
    writer.set_nonblocking(true).unwrap();

    (reader, writer)
}

#[test]
fn test_readable_waits_for_a_writer_thread() {
    let rt = RuntimeBuilder::new().build();
    let (mut reader, mut writer) = pair();
    let start = Instant::now();

    let writer_thread = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        writer.write_all(b"ping").unwrap();
        writer
    });

    let received = rt.block_on(async move {
        io::readable(&reader).await.unwrap();

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        buf[..n].to_vec()
    });

    writer_thread.join().unwrap();
    assert_eq!(received, b"ping");
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_readable_waits_for_a_writer_task() {
    let rt = RuntimeBuilder::new().build();
    let (mut reader, mut writer) = pair();

    let received = rt.block_on(async move {
        let producer = task::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            writer.write_all(b"pong").unwrap();
            writer
        });

        io::readable(&reader).await.unwrap();

        let mut buf = [0u8; 16];
        let n = reader.read(&mut buf).unwrap();
        let _writer = producer.await.unwrap();
        buf[..n].to_vec()
    });

    assert_eq!(received, b"pong");
}

#[test]
fn test_writable_is_ready_at_once() {
    let rt = RuntimeBuilder::new().build();
    let (_reader, mut writer) = pair();

    let written = rt.block_on(async move {
        io::writable(&writer).await.unwrap();
        writer.write(b"data").unwrap()
    });

    assert_eq!(written, 4);
}
