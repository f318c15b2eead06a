//! Dispatcher behaviour against a scripted controller: confirmation,
//! timeouts and faults, pipelined flow control, link loss and abort.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pnp_motion::driver::{Completion, ConnectionState, Dispatcher};
use pnp_motion::machine::MachineContext;
use pnp_motion::{
    parse_config, CommandClass, CommunicationError, Error, MachineEvent, MockController, Variables,
};

// =============================================================================
// Helpers
// =============================================================================

fn context(settings: &str) -> MachineContext {
    let toml = format!(
        r#"
[drivers.main]
transport = {{ type = "tcp", host = "localhost", port = 9000 }}
reconnect_backoff_ms = 10
{}
"#,
        settings
    );
    MachineContext::new(parse_config(&toml).expect("Should parse driver config"))
}

fn connect(context: &MachineContext, mock: &MockController) -> Dispatcher {
    let mut d = Dispatcher::new("main", context, Box::new(mock.transport()))
        .expect("Should create dispatcher");
    d.connect().expect("Should connect");
    d
}

fn submit(d: &mut Dispatcher, line: &str) -> Result<Completion, Error> {
    let command = d.encoder().raw(line)?;
    d.submit(command)
}

fn states(context: &MachineContext) -> Arc<Mutex<Vec<ConnectionState>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    context.events().subscribe(move |event| {
        if let MachineEvent::DriverState { to, .. } = event {
            sink.lock().unwrap().push(*to);
        }
    });
    seen
}

// =============================================================================
// Confirmation flow control
// =============================================================================

#[test]
fn confirmed_reply_resolves_before_timeout() {
    let ctx = context("timeout_ms = 2000");
    let mock = MockController::new();
    mock.on_delayed("^G1", Duration::from_millis(50), &["ok"]);
    let mut d = connect(&ctx, &mock);

    match submit(&mut d, "G1 X10 Y10").expect("Should confirm") {
        Completion::Confirmed(confirmed) => {
            assert!(confirmed.elapsed >= Duration::from_millis(50));
            assert!(confirmed.elapsed < Duration::from_millis(2000));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(d.consecutive_timeouts(), 0);
    assert!(d.is_idle());
}

#[test]
fn silent_controller_times_out_at_deadline() {
    let ctx = context("timeout_ms = 2000");
    let mock = MockController::new();
    let mut d = connect(&ctx, &mock);

    let started = Instant::now();
    let err = submit(&mut d, "G1 X10 Y10").unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(2000));
    assert_eq!(
        err.communication(),
        Some(&CommunicationError::Timeout(Duration::from_millis(2000)))
    );
    assert_eq!(d.consecutive_timeouts(), 1);
    assert_eq!(d.state(), ConnectionState::Connected);
}

#[test]
fn consecutive_timeouts_fault_the_driver() {
    let ctx = context("timeout_ms = 100\nmax_consecutive_timeouts = 3");
    let seen = states(&ctx);
    let timeouts = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&timeouts);
    ctx.events().subscribe(move |event| {
        if matches!(event, MachineEvent::CommandTimedOut { .. }) {
            *counter.lock().unwrap() += 1;
        }
    });

    let mock = MockController::new();
    let mut d = connect(&ctx, &mock);

    for _ in 0..3 {
        let err = submit(&mut d, "G1 X10 Y10").unwrap_err();
        assert!(matches!(err.communication(), Some(CommunicationError::Timeout(_))));
    }
    assert_eq!(d.state(), ConnectionState::Fault);
    assert!(!d.is_available());
    assert_eq!(*timeouts.lock().unwrap(), 3);
    assert_eq!(seen.lock().unwrap().last(), Some(&ConnectionState::Fault));

    // Fails fast without touching the link
    let written = mock.written().len();
    let started = Instant::now();
    let err = submit(&mut d, "G1 X20").unwrap_err();
    assert!(matches!(err, Error::DriverUnavailable(_)));
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(mock.written().len(), written);
}

#[test]
fn reset_recovers_a_faulted_driver() {
    let ctx = context("timeout_ms = 100\nmax_consecutive_timeouts = 1");
    let mock = MockController::new();
    mock.silence("^G1");
    let mut d = connect(&ctx, &mock);

    assert!(submit(&mut d, "G1 X1").is_err());
    assert_eq!(d.state(), ConnectionState::Fault);

    mock.on("^M400", &["ok"]);
    d.reset().expect("Should reconnect");
    assert_eq!(d.state(), ConnectionState::Connected);
    assert_eq!(d.consecutive_timeouts(), 0);
    assert!(submit(&mut d, "M400").is_ok());
    assert_eq!(mock.opens(), 2);
}

#[test]
fn confirmation_clears_timeout_count() {
    let ctx = context("timeout_ms = 100\nmax_consecutive_timeouts = 3");
    let mock = MockController::new();
    mock.on("^M400", &["ok"]);
    let mut d = connect(&ctx, &mock);

    assert!(submit(&mut d, "G1 X1").is_err());
    assert!(submit(&mut d, "G1 X2").is_err());
    assert_eq!(d.consecutive_timeouts(), 2);

    assert!(submit(&mut d, "M400").is_ok());
    assert_eq!(d.consecutive_timeouts(), 0);
    assert!(submit(&mut d, "G1 X3").is_err());
    assert_eq!(d.state(), ConnectionState::Connected);
}

#[test]
fn captures_accumulate_until_confirmation() {
    let ctx = context(
        r#"
[drivers.main.patterns]
position_report = 'X:(?P<X>-?\d+\.\d+)'

[drivers.main.commands]
position_report = "M114"
"#,
    );
    let mock = MockController::new().reply_ok();
    mock.on("^M114", &["busy", "X:42.000", "ok"]);
    let mut d = connect(&ctx, &mock);

    let commands = d
        .encoder()
        .encode(CommandClass::PositionReport, &Variables::new())
        .expect("Should encode");
    let confirmed = d.execute(commands[0].clone()).expect("Should confirm");
    assert_eq!(confirmed.captures.get("X").map(String::as_str), Some("42.000"));
}

#[test]
fn command_class_confirms_on_its_own_pattern() {
    let ctx = context(
        r#"
[drivers.main.commands]
home = "G28"

[drivers.main.patterns.confirm_by_class]
home = "^homed"
"#,
    );
    let mock = MockController::new().reply_ok();
    mock.on_delayed("^G28", Duration::from_millis(30), &["ok", "homed"]);
    let mut d = connect(&ctx, &mock);

    let commands = d
        .encoder()
        .encode(CommandClass::Home, &Variables::new())
        .expect("Should encode");
    let started = Instant::now();
    d.execute(commands[0].clone()).expect("Should confirm on homed");
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(d.is_idle());

    // Other classes keep the driver-wide pattern
    assert!(matches!(
        submit(&mut d, "M400").expect("Should confirm on ok"),
        Completion::Confirmed(_)
    ));
}

#[test]
fn abort_signal_interrupts_a_wait() {
    let ctx = context("timeout_ms = 5000");
    let mock = MockController::new();
    let mut d = connect(&ctx, &mock);

    let signal = ctx.abort().clone();
    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        signal.trigger();
    });

    let started = Instant::now();
    let err = submit(&mut d, "G28").unwrap_err();
    assert!(err.is_aborted());
    assert!(started.elapsed() < Duration::from_millis(5000));
    trigger.join().unwrap();
}

// =============================================================================
// Pipelined flow control
// =============================================================================

#[test]
fn queued_flow_control_bounds_the_window() {
    let ctx = context("flow_control = \"queued\"\nqueue_depth = 2\ntimeout_ms = 2000");
    let mock = MockController::new();
    mock.on_delayed("^G1", Duration::from_millis(100), &["ok"]);
    let mut d = connect(&ctx, &mock);

    for x in 1..=2 {
        let completion = submit(&mut d, &format!("G1 X{}", x)).expect("Should queue");
        assert!(matches!(completion, Completion::Queued(_)));
    }
    assert_eq!(d.in_flight(), 2);

    // The third waits for a slot
    submit(&mut d, "G1 X3").expect("Should queue");
    assert!(d.in_flight() <= 2);

    d.flush().expect("Should flush");
    assert!(d.is_idle());
    assert_eq!(mock.written(), vec!["G1 X1", "G1 X2", "G1 X3"]);
}

#[test]
fn queued_failure_is_reported_later() {
    let ctx = context("flow_control = \"queued\"\nqueue_depth = 4");
    let mock = MockController::new().reply_ok();
    mock.on("^G1 X2", &["error:2 out of range"]);
    let mut d = connect(&ctx, &mock);

    assert!(submit(&mut d, "G1 X1").is_ok());
    assert!(submit(&mut d, "G1 X2").is_ok());

    let third = submit(&mut d, "G1 X3");
    let flushed = d.flush();
    let failures: Vec<Error> = [third.err(), flushed.err()].into_iter().flatten().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].communication(),
        Some(&CommunicationError::ErrorResponse("error:2 out of range".into()))
    );

    // Reported once only
    assert!(d.flush().is_ok());
}

#[test]
fn handshake_flow_control_streams_freely() {
    let ctx = context("flow_control = \"handshake\"\ntimeout_ms = 3000");
    let mock = MockController::new();
    mock.on_delayed("^G1", Duration::from_millis(20), &["ok"]);
    let mut d = connect(&ctx, &mock);

    for x in 0..10 {
        submit(&mut d, &format!("G1 X{}", x)).expect("Should stream");
    }
    assert_eq!(mock.written().len(), 10);
    assert!(d.in_flight() > 1);

    d.flush().expect("Should flush");
    assert_eq!(d.in_flight(), 0);
}

#[test]
fn cancelled_commands_are_never_written() {
    let ctx = context("flow_control = \"queued\"");
    let mock = MockController::new().reply_ok();
    let mut d = connect(&ctx, &mock);

    let keep = d.enqueue(d.encoder().raw("G1 X1").expect("Should bind")).unwrap();
    let cancelled = d.enqueue(d.encoder().raw("G1 X2").expect("Should bind")).unwrap();
    assert_eq!(d.queued(), 2);
    assert!(d.cancel(cancelled));

    d.wait(keep).expect("Should confirm");
    d.flush().expect("Cancellations are not failures");
    assert_eq!(mock.written(), vec!["G1 X1"]);
}

// =============================================================================
// Link loss and abort
// =============================================================================

#[test]
fn closed_link_reconnects_and_replays_setup() {
    let ctx = context("[drivers.main.commands]\nconnect = \"G21\"");
    let seen = states(&ctx);
    let mock = MockController::new().reply_ok();
    let mut d = connect(&ctx, &mock);
    assert_eq!(mock.written(), vec!["G21"]);

    mock.disconnect();
    thread::sleep(Duration::from_millis(100));
    d.keep_alive().expect("Should process the closed link");

    submit(&mut d, "G1 X1").expect("Should confirm after reconnect");
    assert_eq!(mock.opens(), 2);
    assert_eq!(mock.written(), vec!["G21", "G21", "G1 X1"]);
    assert_eq!(d.state(), ConnectionState::Connected);

    let seen = seen.lock().unwrap();
    assert_eq!(
        &seen[seen.len() - 2..],
        [ConnectionState::Connecting, ConnectionState::Connected]
    );
}

#[test]
fn link_loss_fails_the_command_in_flight() {
    let ctx = context("timeout_ms = 2000");
    let mock = MockController::new().reply_ok();
    mock.silence("^M400");
    let mut d = connect(&ctx, &mock);

    let remote = mock.clone();
    let cut = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        remote.disconnect();
    });

    let err = submit(&mut d, "M400").unwrap_err();
    cut.join().unwrap();
    assert_eq!(err.communication(), Some(&CommunicationError::Disconnected));
    assert_eq!(d.state(), ConnectionState::Connected);
    assert_eq!(mock.opens(), 2);
}

#[test]
fn failed_reconnect_faults_the_driver() {
    let ctx = context("reconnect_attempts = 2");
    let mock = MockController::new().reply_ok();
    let mut d = connect(&ctx, &mock);

    mock.fail_opens(5);
    mock.disconnect();
    thread::sleep(Duration::from_millis(100));
    d.keep_alive().expect("Link events are processed");

    assert_eq!(d.state(), ConnectionState::Fault);
    assert_eq!(mock.opens(), 3);
    assert!(matches!(submit(&mut d, "G1 X1"), Err(Error::DriverUnavailable(_))));
}

#[test]
fn abort_sends_emergency_stop_and_disconnects() {
    let ctx = context("flow_control = \"queued\"\n[drivers.main.commands]\nemergency_stop = \"M112\"");
    let mock = MockController::new();
    let mut d = connect(&ctx, &mock);

    submit(&mut d, "G1 X1").expect("Should queue");
    d.enqueue(d.encoder().raw("G1 X2").expect("Should bind")).unwrap();
    d.abort();

    assert_eq!(mock.written().last().map(String::as_str), Some("M112"));
    assert_eq!(d.state(), ConnectionState::Disconnected);
    assert_eq!(d.queued(), 0);
    assert_eq!(d.in_flight(), 0);
    assert!(matches!(submit(&mut d, "G1 X3"), Err(Error::DriverUnavailable(_))));
}

#[test]
fn json_driver_confirms_by_echo() {
    let ctx = context("kind = \"json_parameter\"");
    let mock = MockController::new();
    mock.on(r#"^\{"xvm""#, &[r#"{"r":{"xvm":5000.000},"f":[1,0,8]}"#]);
    mock.on(r#"^\{"yvm""#, &[r#"{"er":{"msg":"Unrecognized command"}}"#]);
    let mut d = connect(&ctx, &mock);

    let confirmed = d
        .execute(d.encoder().raw(r#"{"xvm":5000}"#).expect("Should bind"))
        .expect("Should confirm");
    let value: f64 = confirmed.captures["Value"].parse().unwrap();
    assert_eq!(value, 5000.0);

    let err = submit(&mut d, r#"{"yvm":5000}"#).unwrap_err();
    assert_eq!(
        err.communication(),
        Some(&CommunicationError::ErrorResponse("Unrecognized command".into()))
    );
}
