//! Integration tests for parcelwire.
//!
//! These drive servers, clients, publishers and subscribers through the
//! blocking public API, the way an application would.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use parcelwire::{errno, Parcel, Publisher, Reply, Scheme, Server, Subscriber, Topic, Transactor};

type Received = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn recording_subscriber(name: &str, scheme: Scheme) -> (Subscriber, Received) {
    let received: Received = Arc::default();
    let sink = Arc::clone(&received);
    let subscriber = Subscriber::builder(name)
        .scheme(scheme)
        .connect(move |topic: &Topic, content: &[u8]| {
            sink.lock()
                .unwrap()
                .push((topic.to_string(), content.to_vec()));
        })
        .unwrap();
    (subscriber, received)
}

fn socket_path(tag: &str) -> String {
    std::env::temp_dir()
        .join(format!("parcelwire-{}-{}.sock", tag, std::process::id()))
        .to_string_lossy()
        .into_owned()
}

/// Handler result comes back unchanged for a range of ops and payloads.
#[test]
fn test_transaction_round_trip() {
    let server = Server::create("it-round-trip", |op: i32, request: &mut Parcel| {
        if op < 0 {
            return Reply::error(-errno::ENOTSUP);
        }
        let mut body = Parcel::new();
        body.append(request.data()).unwrap();
        body.append_u32(op as u32).unwrap();
        Reply {
            code: op % 3,
            body: Some(body),
        }
    })
    .unwrap();

    let mut client = Transactor::connect("it-round-trip").unwrap();
    let payloads: [&[u8]; 3] = [b"", b"a", &[0u8; 1000]];

    for op in 0..6 {
        for payload in payloads {
            let mut output = Parcel::new();
            let code = client.transact(op, Some(&Parcel::from(payload)), Some(&mut output));

            let mut expected = payload.to_vec();
            expected.extend_from_slice(&(op as u32).to_be_bytes());
            assert_eq!(code, op % 3);
            assert_eq!(output.data(), expected.as_slice());
        }
    }

    let mut output = Parcel::from("untouched?");
    assert_eq!(client.transact(-1, None, Some(&mut output)), -errno::ENOTSUP);
    assert_eq!(output.data(), b"untouched?");

    client.disconnect();
    server.release();
}

/// The create-a-voice scenario: op CREATE with "tts\0" answers "created\0".
#[test]
fn test_create_scenario() {
    const CREATE: i32 = 1;

    let server = Server::create("svc", |op: i32, request: &mut Parcel| {
        if op == CREATE && request.data() == b"tts\0" {
            Reply::ok_with(Parcel::from("created\0"))
        } else {
            Reply::error(-errno::EINVAL)
        }
    })
    .unwrap();

    let mut client = Transactor::connect("svc").unwrap();
    let mut output = Parcel::bounded(64);
    let code = client.transact(CREATE, Some(&Parcel::from("tts\0")), Some(&mut output));

    assert_eq!(code, 0);
    assert_eq!(output.data(), b"created\0");
    server.release();
}

/// No listener: the transaction fails within the timeout window.
#[test]
fn test_no_server_fails_in_time() {
    let mut client = Transactor::connect("it-nobody-home").unwrap();
    let mut output = Parcel::new();

    let started = Instant::now();
    let code = client.transact(1, Some(&Parcel::from("ping")), Some(&mut output));
    let elapsed = started.elapsed();

    assert_eq!(code, -errno::ETIMEDOUT);
    assert!(output.is_empty());
    // Default send + receive timeouts are 200 ms each.
    assert!(elapsed < Duration::from_millis(800), "took {:?}", elapsed);
}

/// Concurrent clients never see each other's replies.
#[test]
fn test_concurrent_clients_get_own_replies() {
    const CLIENTS: u64 = 8;
    const ROUNDS: u64 = 25;

    let server = Server::create("it-concurrent", |_op: i32, request: &mut Parcel| {
        Reply::ok_with(request.clone())
    })
    .unwrap();

    let workers: Vec<_> = (0..CLIENTS)
        .map(|id| {
            thread::spawn(move || {
                let mut client = Transactor::builder("it-concurrent")
                    .send_timeout(Duration::from_secs(2))
                    .recv_timeout(Duration::from_secs(2))
                    .connect()
                    .unwrap();
                for round in 0..ROUNDS {
                    let nonce = (id << 32) | round;
                    let mut request = Parcel::new();
                    request.append_u64(nonce).unwrap();
                    let mut output = Parcel::new();

                    assert_eq!(client.transact(7, Some(&request), Some(&mut output)), 0);
                    assert_eq!(output.read_u64().unwrap(), nonce);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    server.release();
}

/// After release the handler is never called again.
#[test]
fn test_no_handler_calls_after_release() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let server = Server::create("it-release", move |_op: i32, _request: &mut Parcel| {
        counter.fetch_add(1, Ordering::SeqCst);
        Reply::ok()
    })
    .unwrap();

    let mut client = Transactor::builder("it-release")
        .send_timeout(Duration::from_millis(50))
        .recv_timeout(Duration::from_millis(50))
        .connect()
        .unwrap();
    assert_eq!(client.transact(1, None, None), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    server.release();

    assert!(client.transact(1, None, None) < 0);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Release waits for a running handler to return.
#[test]
fn test_release_waits_for_running_handler() {
    let entered = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));
    let (entered_flag, finished_flag) = (Arc::clone(&entered), Arc::clone(&finished));

    let server = Server::create("it-slow", move |_op: i32, _request: &mut Parcel| {
        entered_flag.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(150));
        finished_flag.store(true, Ordering::SeqCst);
        Reply::ok()
    })
    .unwrap();

    let caller = thread::spawn(|| {
        let mut client = Transactor::connect("it-slow").unwrap();
        client.transact(1, None, None)
    });

    assert!(wait_until(Duration::from_secs(2), || entered.load(Ordering::SeqCst)));
    server.release();
    assert!(finished.load(Ordering::SeqCst));

    caller.join().unwrap();
}

/// A handler may itself be a client of another server.
#[test]
fn test_nested_transaction_from_handler() {
    let inner = Server::create("it-inner", |_op: i32, request: &mut Parcel| {
        let value = request.read_u32().unwrap_or(0);
        let mut body = Parcel::new();
        body.append_u32(value * 2).unwrap();
        Reply::ok_with(body)
    })
    .unwrap();

    let mut downstream = Transactor::connect("it-inner").unwrap();
    let outer = Server::create("it-outer", move |op: i32, request: &mut Parcel| {
        let mut doubled = Parcel::new();
        let code = downstream.transact(op, Some(request), Some(&mut doubled));
        if code < 0 {
            return Reply::error(code);
        }
        Reply::ok_with(doubled)
    })
    .unwrap();

    let mut client = Transactor::connect("it-outer").unwrap();
    let mut request = Parcel::new();
    request.append_u32(21).unwrap();
    let mut output = Parcel::new();

    assert_eq!(client.transact(1, Some(&request), Some(&mut output)), 0);
    assert_eq!(output.read_u32().unwrap(), 42);

    outer.release();
    inner.release();
}

/// Structured payloads travel as MessagePack inside the parcel.
#[test]
fn test_msgpack_payload_transaction() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Volume {
        stream: String,
        level: u8,
    }

    let server = Server::create("it-msgpack", |_op: i32, request: &mut Parcel| {
        let result = request.read_msgpack::<Volume>().and_then(|mut volume| {
            volume.level = volume.level.min(100);
            let mut body = Parcel::new();
            body.append_msgpack(&volume)?;
            Ok(Some(body))
        });
        Reply::from(result)
    })
    .unwrap();

    let mut client = Transactor::connect("it-msgpack").unwrap();
    let mut request = Parcel::new();
    request
        .append_msgpack(&Volume {
            stream: "music".into(),
            level: 180,
        })
        .unwrap();
    let mut output = Parcel::new();

    assert_eq!(client.transact(2, Some(&request), Some(&mut output)), 0);
    let volume: Volume = output.read_msgpack().unwrap();
    assert_eq!(
        volume,
        Volume {
            stream: "music".into(),
            level: 100
        }
    );

    // Garbage in is reported as an argument error.
    assert_eq!(
        client.transact(2, Some(&Parcel::from(&[0xc1u8][..])), None),
        -errno::EINVAL
    );
    server.release();
}

/// Topic filters select by prefix; unmatched topics are never delivered.
#[test]
fn test_topic_filtering() {
    let publisher = Publisher::create("it-topics").unwrap();
    let (music, music_seen) = recording_subscriber("it-topics", Scheme::Inproc);
    let (everything, all_seen) = recording_subscriber("it-topics", Scheme::Inproc);
    music.register_topic("music").unwrap();
    everything.register_topic("").unwrap();
    assert_eq!(publisher.subscriber_count(), 2);

    for i in 0..10u8 {
        publisher.publish("music", Some(&Parcel::from(&[i][..])));
        publisher.publish("wakeup", Some(&Parcel::from(&[i][..])));
    }

    assert!(wait_until(Duration::from_secs(2), || {
        all_seen.lock().unwrap().len() == 20
    }));
    assert!(wait_until(Duration::from_secs(2), || {
        music_seen.lock().unwrap().len() == 10
    }));

    let music_seen = music_seen.lock().unwrap();
    assert!(music_seen.iter().all(|(topic, _)| topic == "music"));
    let order: Vec<u8> = music_seen.iter().map(|(_, content)| content[0]).collect();
    assert_eq!(order, (0..10).collect::<Vec<_>>());
}

/// Without a registered topic nothing is delivered; unregistering stops delivery.
#[test]
fn test_register_and_unregister() {
    let publisher = Publisher::create("it-registration").unwrap();
    let (subscriber, seen) = recording_subscriber("it-registration", Scheme::Inproc);

    publisher.publish("alarm", Some(&Parcel::from("early")));
    thread::sleep(Duration::from_millis(50));
    assert!(seen.lock().unwrap().is_empty());

    subscriber.register_topic("alarm").unwrap();
    publisher.publish("alarm", Some(&Parcel::from("ring")));
    assert!(wait_until(Duration::from_secs(2), || {
        seen.lock().unwrap().len() == 1
    }));

    subscriber.unregister_topic("alarm").unwrap();
    publisher.publish("alarm", Some(&Parcel::from("snooze")));
    thread::sleep(Duration::from_millis(50));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, b"ring");
}

/// Subscribers may connect before the publisher exists.
#[test]
fn test_subscriber_before_publisher() {
    let (subscriber, seen) = recording_subscriber("it-late-publisher", Scheme::Inproc);
    subscriber.register_topic("news").unwrap();

    let publisher = Publisher::create("it-late-publisher").unwrap();
    assert_eq!(publisher.subscriber_count(), 1);
    publisher.publish("news", None);

    assert!(wait_until(Duration::from_secs(2), || {
        seen.lock().unwrap().len() == 1
    }));
    assert_eq!(seen.lock().unwrap()[0], ("news".to_string(), Vec::new()));
    assert!(subscriber.is_running());
}

/// Long topics are cut to 15 bytes on the wire.
#[test]
fn test_long_topic_truncated() {
    let publisher = Publisher::create("it-long-topic").unwrap();
    let (subscriber, seen) = recording_subscriber("it-long-topic", Scheme::Inproc);
    subscriber.register_topic("notifications/system").unwrap();

    publisher.publish("notifications/sound", Some(&Parcel::from("x")));

    assert!(wait_until(Duration::from_secs(2), || {
        seen.lock().unwrap().len() == 1
    }));
    assert_eq!(seen.lock().unwrap()[0].0, "notifications/s");
}

/// Transactions over a Unix domain socket.
#[cfg(unix)]
#[test]
fn test_ipc_transaction() {
    let path = socket_path("reqrep");
    let server = Server::builder(&path)
        .scheme(Scheme::Ipc)
        .create(|op: i32, request: &mut Parcel| {
            let mut body = request.clone();
            body.append_u16(op as u16).unwrap();
            Reply::ok_with(body)
        })
        .unwrap();

    let mut client = Transactor::builder(&path)
        .scheme(Scheme::Ipc)
        .recv_timeout(Duration::from_secs(2))
        .connect()
        .unwrap();

    for op in 1..4 {
        let mut output = Parcel::new();
        assert_eq!(
            client.transact(op, Some(&Parcel::from("abc")), Some(&mut output)),
            0
        );
        assert_eq!(output.data(), &[b'a', b'b', b'c', 0, op as u8]);
    }

    client.disconnect();
    server.release();
    assert!(!std::path::Path::new(&path).exists());
}

/// Publish/subscribe over a Unix domain socket.
#[cfg(unix)]
#[test]
fn test_ipc_publish_subscribe() {
    let path = socket_path("pubsub");
    let publisher = Publisher::builder(&path)
        .scheme(Scheme::Ipc)
        .create()
        .unwrap();
    let (subscriber, seen) = recording_subscriber(&path, Scheme::Ipc);
    subscriber.register_topic("music").unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        publisher.subscriber_count() == 1
    }));
    publisher.publish("wakeup", Some(&Parcel::from("skip")));
    publisher.publish("music", Some(&Parcel::from("play")));

    assert!(wait_until(Duration::from_secs(2), || {
        !seen.lock().unwrap().is_empty()
    }));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("music".to_string(), b"play".to_vec())]
    );

    subscriber.disconnect();
    publisher.release();
}

/// A live ipc path cannot be taken over; a dead one can be reused.
#[cfg(unix)]
#[test]
fn test_ipc_path_in_use() {
    let path = socket_path("in-use");
    let echo = |_op: i32, request: &mut Parcel| Reply::ok_with(request.clone());
    let first = Server::builder(&path)
        .scheme(Scheme::Ipc)
        .create(echo)
        .unwrap();

    let second = Server::builder(&path).scheme(Scheme::Ipc).create(echo);
    assert!(matches!(second, Err(parcelwire::IpcError::AddressInUse(_))));
    assert!(matches!(
        Publisher::builder(&path).scheme(Scheme::Ipc).create(),
        Err(parcelwire::IpcError::AddressInUse(_))
    ));

    // The refused binds left the first server reachable.
    let mut client = Transactor::builder(&path)
        .scheme(Scheme::Ipc)
        .recv_timeout(Duration::from_secs(2))
        .connect()
        .unwrap();
    let mut output = Parcel::new();
    assert_eq!(
        client.transact(1, Some(&Parcel::from("still")), Some(&mut output)),
        0
    );
    assert_eq!(output.data(), b"still");
    assert!(std::path::Path::new(&path).exists());

    first.release();
    let again = Server::builder(&path)
        .scheme(Scheme::Ipc)
        .create(echo)
        .unwrap();
    assert!(std::path::Path::new(&path).exists());
    again.release();
}

/// TCP port 0 binds an ephemeral port that `address()` reports.
#[test]
fn test_tcp_ephemeral_port() {
    let server = Server::create("tcp://127.0.0.1:0", |op: i32, _request: &mut Parcel| {
        Reply::error(-op)
    })
    .unwrap();
    let address = server.address().to_string();
    assert!(address.starts_with("tcp://127.0.0.1:"));
    assert_ne!(address, "tcp://127.0.0.1:0");

    let mut client = Transactor::builder(&address)
        .recv_timeout(Duration::from_secs(2))
        .connect()
        .unwrap();
    assert_eq!(client.transact(5, None, None), -5);

    let publisher = Publisher::create("tcp://127.0.0.1:0").unwrap();
    let (subscriber, seen) = recording_subscriber(&publisher.address().to_string(), Scheme::Tcp);
    subscriber.register_topic("").unwrap();
    assert!(wait_until(Duration::from_secs(2), || {
        publisher.subscriber_count() == 1
    }));
    publisher.publish("tick", Some(&Parcel::from("1")));
    assert!(wait_until(Duration::from_secs(2), || {
        seen.lock().unwrap().len() == 1
    }));

    client.disconnect();
    server.release();
}
